use crate::error::{AppError, Result};
use crate::profile::ProfileStore;
use serde::{Deserialize, Serialize};
use std::path::Path;

// One message from a stored DM conversation log. Extra Slack fields are
// dropped on read; only sender, timestamp and text matter here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogMessage {
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
}

impl LogMessage {
    pub fn ts_value(&self) -> f64 {
        self.ts.parse().unwrap_or(0.0)
    }
}

// Filename-safe label: spaces become underscores, anything outside
// [A-Za-z0-9_-] is dropped.
pub fn sanitize_log_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "Unnamed_Persona".to_string()
    } else {
        cleaned
    }
}

// Log label for a user: their claimed persona's name when the profile
// carries one, otherwise the raw user id.
pub fn log_name_for(profiles: &ProfileStore, user_id: &str) -> String {
    profiles
        .get(user_id)
        .and_then(|p| p.creation_data.persona_name.as_deref())
        .map(sanitize_log_name)
        .unwrap_or_else(|| user_id.to_string())
}

// Readable transcript: one "[sender]: text" block per message in timestamp
// order, empty messages dropped.
pub fn render_log(messages: &[LogMessage]) -> String {
    let mut ordered: Vec<&LogMessage> = messages.iter().collect();
    ordered.sort_by(|a, b| a.ts_value().total_cmp(&b.ts_value()));
    ordered
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .map(|m| {
            let sender = if m.user.is_empty() {
                "Unknown"
            } else {
                m.user.as_str()
            };
            format!("[{}]: {}\n\n", sender, m.text.trim())
        })
        .collect()
}

// Renders every `<user>_conversation.json` under `logs_dir` into a
// `<persona>_readable_log.txt` under `output_dir`. A malformed log file is
// logged and skipped. Returns how many transcripts were written.
pub fn render_logs_dir(
    logs_dir: &Path,
    output_dir: &Path,
    profiles: &ProfileStore,
) -> Result<usize> {
    std::fs::create_dir_all(output_dir)?;
    let mut rendered = 0usize;
    for entry in std::fs::read_dir(logs_dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(user_id) = file_name.strip_suffix("_conversation.json") else {
            continue;
        };
        let messages: Vec<LogMessage> = match std::fs::File::open(entry.path())
            .map_err(AppError::from)
            .and_then(|f| serde_json::from_reader(f).map_err(AppError::from))
        {
            Ok(messages) => messages,
            Err(e) => {
                log::error!("Skipping {file_name}: {e:#}");
                continue;
            }
        };
        let transcript = render_log(&messages);
        if transcript.is_empty() {
            log::info!("No text messages in {file_name}.");
            continue;
        }
        let output = output_dir.join(format!(
            "{}_readable_log.txt",
            log_name_for(profiles, user_id)
        ));
        std::fs::write(&output, transcript)?;
        rendered += 1;
    }
    log::info!("Rendered {rendered} readable logs.");
    Ok(rendered)
}
