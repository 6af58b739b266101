use crate::error::{AppError, Result};
use async_openai::{Client, config::OpenAIConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

// Application settings. Credentials come from the environment; paths and
// model parameters are persisted in data/settings.json so a deployment can
// tweak them without rebuilding.
#[derive(Serialize, Deserialize, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,      // Where profiles, personas, lore and logs live.
    pub model: String,          // Chat completion model.
    pub blank_sheet: PathBuf,   // The fillable character sheet template.
    pub index_path: PathBuf,    // Prebuilt rules vector index.
    #[serde(skip)]
    pub openai_api_key: Option<String>,
    #[serde(skip)]
    pub slack_bot_token: Option<String>, // xoxb- token for the Web API.
    #[serde(skip)]
    pub slack_app_token: Option<String>, // xapp- token for Socket Mode.
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from("./data"),
            model: "gpt-4o".to_string(),
            blank_sheet: PathBuf::from("./data/blank_sheet.pdf"),
            index_path: PathBuf::from("./data/rules_index.db"),
            openai_api_key: None,
            slack_bot_token: None,
            slack_app_token: None,
        }
    }
}

const SETTINGS_PATH: &str = "./data/settings.json";

impl Settings {
    // Load settings from the default file path, then pull credentials from
    // the environment. On a first run the defaults are written back so a
    // deployment has a file to edit.
    pub fn load() -> Self {
        let mut settings = match Self::load_settings_from_file(SETTINGS_PATH) {
            Ok(settings) => settings,
            Err(_) => {
                let defaults = Self::default();
                if let Err(e) = defaults.save_to_file(SETTINGS_PATH) {
                    log::warn!("Could not write default settings: {e}");
                }
                defaults
            }
        };
        settings.openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        settings.slack_bot_token = std::env::var("SLACK_BOT_TOKEN").ok();
        settings.slack_app_token = std::env::var("SLACK_APP_TOKEN").ok();
        settings
    }

    pub fn load_settings_from_file(path: &str) -> std::io::Result<Self> {
        let data = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&data)?;
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &str) -> std::io::Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(data.as_bytes())?;
        Ok(())
    }

    // Startup validation. A missing credential or a missing rules index is a
    // configuration error: the process must exit non-zero rather than limp.
    pub fn validate(&self) -> Result<()> {
        if self.openai_api_key.as_deref().unwrap_or("").is_empty() {
            return Err(AppError::MissingConfig("OPENAI_API_KEY".into()));
        }
        if self.slack_bot_token.as_deref().unwrap_or("").is_empty() {
            return Err(AppError::MissingConfig("SLACK_BOT_TOKEN".into()));
        }
        if self.slack_app_token.as_deref().unwrap_or("").is_empty() {
            return Err(AppError::MissingConfig("SLACK_APP_TOKEN".into()));
        }
        if !self.index_path.exists() {
            return Err(AppError::MissingConfig(format!(
                "rules index not found at {} (run `pathvar build-index` first)",
                self.index_path.display()
            )));
        }
        Ok(())
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.data_dir.join("player_profiles.json")
    }

    pub fn personas_path(&self) -> PathBuf {
        self.data_dir.join("preset_personas.json")
    }

    pub fn lore_path(&self) -> PathBuf {
        self.data_dir.join("lore.json")
    }

    // Asynchronously validate an API key with OpenAI's services.
    pub async fn validate_api_key(api_key: &str) -> bool {
        let client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
        client.models().list().await.is_ok()
    }
}
