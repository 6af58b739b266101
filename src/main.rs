use clap::{Parser, Subcommand};
use pathvar::character::CharacterSheet;
use pathvar::dialogue::DialogueEngine;
use pathvar::error::Result;
use pathvar::logging;
use pathvar::logs;
use pathvar::lore::Lore;
use pathvar::onboarding::{BotAction, OnboardingEngine, Responder, SheetService};
use pathvar::persona::PersonaCatalog;
use pathvar::profile::{CreationStatus, PlayerProfile, ProfileStore};
use pathvar::retriever::{self, RulesRetriever};
use pathvar::settings::Settings;
use pathvar::sheet;
use pathvar::slack::{InboundEvent, SlackClient};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Parser)]
#[command(name = "pathvar", about = "Slack onboarding NPC for the PATH Variable campaign")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Slack bot (default).
    Serve,
    /// Build the rules vector index from a directory of rulebook PDFs.
    BuildIndex {
        #[arg(long, default_value = "./documents")]
        documents_dir: PathBuf,
    },
    /// Refresh persona class/scores/background from filled character PDFs.
    UpdatePersonas {
        #[arg(long, default_value = "./char_sheets")]
        sheets_dir: PathBuf,
    },
    /// Render DM conversation logs into readable per-persona transcripts.
    ParseLogs {
        #[arg(long, default_value = "./data/conversation_logs")]
        logs_dir: PathBuf,
        #[arg(long, default_value = "./data/readable_logs")]
        output_dir: PathBuf,
    },
    /// Return a claimed persona to the selection pool.
    ReleasePersona { name: String },
}

// Live conversational brain: vector retrieval feeding a chat completion.
struct CcResponder {
    dialogue: DialogueEngine,
    retriever: RulesRetriever,
    lore: Lore,
}

impl Responder for CcResponder {
    async fn respond(
        &self,
        message: &str,
        profile: &PlayerProfile,
        character: Option<&CharacterSheet>,
        riddle: &str,
        persona_roster: &str,
    ) -> String {
        let context = self.retriever.retrieve(message).await;
        self.dialogue
            .respond(
                message,
                profile,
                character,
                &self.lore,
                riddle,
                persona_roster,
                &context,
            )
            .await
    }
}

struct PdfiumSheets {
    blank: PathBuf,
}

impl SheetService for PdfiumSheets {
    fn fill(&self, sheet: &CharacterSheet, output: &Path) -> bool {
        sheet::fill_character_sheet(sheet, &self.blank, output)
    }

    fn parse(&self, path: &Path) -> Result<CharacterSheet> {
        sheet::parse_character_sheet(path)
    }
}

type Engine = OnboardingEngine<CcResponder, PdfiumSheets>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = Settings::load();

    if let Err(e) = std::fs::create_dir_all(&settings.data_dir) {
        eprintln!("Cannot create data directory: {e}");
        exit(1);
    }
    if let Err(e) = logging::init(&settings.data_dir) {
        eprintln!("Cannot initialize logging: {e}");
    }

    let outcome = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::BuildIndex { documents_dir } => build_index(settings, &documents_dir).await,
        Command::UpdatePersonas { sheets_dir } => update_personas(settings, &sheets_dir),
        Command::ParseLogs {
            logs_dir,
            output_dir,
        } => parse_logs(settings, &logs_dir, &output_dir).await,
        Command::ReleasePersona { name } => release_persona(settings, &name),
    };

    if let Err(e) = outcome {
        log::error!("Fatal: {e:#}");
        eprintln!("Fatal: {e}");
        exit(1);
    }
}

async fn serve(settings: Settings) -> Result<()> {
    settings.validate()?;
    let api_key = settings.openai_api_key.clone().unwrap_or_default();
    let bot_token = settings.slack_bot_token.clone().unwrap_or_default();
    let app_token = settings.slack_app_token.clone().unwrap_or_default();

    if !Settings::validate_api_key(&api_key).await {
        return Err(pathvar::error::AppError::MissingConfig(
            "OPENAI_API_KEY (rejected by the OpenAI API)".into(),
        ));
    }

    let lore = Lore::load_from_file(&settings.lore_path()).unwrap_or_else(|e| {
        log::warn!("Could not load lore data: {e:#}. Continuing with empty lore.");
        Lore::default()
    });
    let profiles = ProfileStore::load_from_file(&settings.profiles_path())?;
    let personas = PersonaCatalog::load_from_file(&settings.personas_path()).unwrap_or_else(|e| {
        log::warn!("Could not load persona catalog: {e:#}. Continuing with empty catalog.");
        PersonaCatalog::empty(&settings.personas_path())
    });
    log::info!(
        "Loaded {} profiles and {} personas.",
        profiles.len(),
        personas.personas().len()
    );

    let retriever = RulesRetriever::open(&settings.index_path).await?;
    let responder = CcResponder {
        dialogue: DialogueEngine::new(&api_key, &settings.model),
        retriever,
        lore: lore.clone(),
    };
    let sheets = PdfiumSheets {
        blank: settings.blank_sheet.clone(),
    };
    let work_dir = std::env::temp_dir().join("pathvar_sheets");
    let engine = Arc::new(Mutex::new(OnboardingEngine::new(
        profiles, personas, lore, responder, sheets, work_dir,
    )));

    let client = SlackClient::new(&bot_token, &app_token);
    scan_and_initiate(&client, &engine).await;

    // Socket Mode loop: reconnect on any drop, with a short backoff.
    loop {
        let mut listener = match client.connect_socket_mode().await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("Socket Mode connection failed: {e:#}. Retrying.");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };
        loop {
            match listener.next_event().await {
                Ok(event) => handle_event(&client, &engine, event).await,
                Err(e) => {
                    log::warn!("Socket Mode stream ended: {e:#}. Reconnecting.");
                    break;
                }
            }
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

// Proactive sweep at startup: every eligible workspace member without a
// profile gets the welcome letter.
async fn scan_and_initiate(client: &SlackClient, engine: &Arc<Mutex<Engine>>) {
    let users = match client.list_users().await {
        Ok(users) => users,
        Err(e) => {
            log::error!("Could not list workspace users: {e:#}");
            return;
        }
    };
    log::info!("Scanning {} workspace members for initiation.", users.len());
    for user in users.iter().filter(|u| u.is_onboardable()) {
        let actions = {
            let mut engine = engine.lock().await;
            if engine.known_user(&user.id) {
                continue;
            }
            engine.initiate(&user.id)
        };
        if let Err(e) = execute_actions(client, &actions).await {
            log::error!("Failed to deliver welcome to {}: {e:#}", user.id);
            engine.lock().await.mark_initiation_failed(&user.id);
        }
    }
}

async fn handle_event(client: &SlackClient, engine: &Arc<Mutex<Engine>>, event: InboundEvent) {
    if event.event_type == "team_join" {
        log::info!("New user joined the team: {}", event.user);
        let actions = engine.lock().await.initiate(&event.user);
        if let Err(e) = execute_actions(client, &actions).await {
            log::error!("Failed to deliver welcome to {}: {e:#}", event.user);
            engine.lock().await.mark_initiation_failed(&event.user);
        }
        return;
    }

    if event.is_mention() {
        log::info!("Mention from {} in channel {}.", event.user, event.channel);
        let reply = engine
            .lock()
            .await
            .handle_mention(&event.user, &event.text)
            .await;
        if let Err(e) = client
            .post_threaded(&event.channel, event.thread_ts.as_deref(), &reply)
            .await
        {
            log::error!("Failed to deliver mention reply to {}: {e:#}", event.user);
        }
        return;
    }

    if !event.is_actionable_dm() {
        log::debug!(
            "Ignoring event type {:?} (subtype {:?}, bot {:?})",
            event.event_type,
            event.subtype,
            event.bot_id
        );
        return;
    }

    let actions = dispatch_dm(client, engine, &event).await;
    if let Err(e) = execute_actions(client, &actions).await {
        log::error!("Failed to deliver reply to {}: {e:#}", event.user);
    }
}

// Routes a DM either to the sheet re-upload path or the state machine.
async fn dispatch_dm(
    client: &SlackClient,
    engine: &Arc<Mutex<Engine>>,
    event: &InboundEvent,
) -> Vec<BotAction> {
    let created = {
        let engine = engine.lock().await;
        engine
            .profiles
            .get(&event.user)
            .is_some_and(|p| p.creation_status == CreationStatus::CharacterCreated)
    };

    if created {
        if let Some(file) = event.pdf_attachment() {
            let dest = std::env::temp_dir().join(format!("pathvar_upload_{}.pdf", event.user));
            return match client.download_file(&file.url_private_download, &dest).await {
                Ok(()) => {
                    let mut engine = engine.lock().await;
                    engine.handle_sheet_upload(&event.user, &event.channel, &dest)
                }
                Err(e) => {
                    log::error!("Failed to download sheet from {}: {e:#}", event.user);
                    vec![BotAction::Post {
                        channel: event.channel.clone(),
                        text: "I couldn't retrieve that file. Try sending it again.".to_string(),
                    }]
                }
            };
        }
    }

    let mut engine = engine.lock().await;
    engine
        .handle_dm(&event.user, &event.channel, &event.text)
        .await
}

async fn execute_actions(client: &SlackClient, actions: &[BotAction]) -> Result<()> {
    for action in actions {
        match action {
            BotAction::Post { channel, text } => client.post_message(channel, text).await?,
            BotAction::UploadSheet {
                channel,
                path,
                title,
                comment,
            } => {
                if let Err(e) = client.upload_file(channel, path, title, comment).await {
                    log::error!("Sheet upload failed: {e:#}");
                    client
                        .post_message(
                            channel,
                            "I generated your character sheet, but couldn't seem to send it. Apologies. Please tell me about your character's backstory.",
                        )
                        .await?;
                }
                // Sent or not, the rendered PDF has served its purpose.
                if let Err(e) = tokio::fs::remove_file(path).await {
                    log::debug!("Could not remove sheet artifact {}: {e}", path.display());
                }
            }
        }
    }
    Ok(())
}

async fn build_index(settings: Settings, documents_dir: &Path) -> Result<()> {
    if settings.openai_api_key.as_deref().unwrap_or("").is_empty() {
        return Err(pathvar::error::AppError::MissingConfig("OPENAI_API_KEY".into()));
    }
    retriever::build_index(documents_dir, &settings.index_path).await
}

// Refreshes the catalog from filled persona sheets: class, background and
// ability scores are read back from each PDF whose character name matches a
// persona.
fn update_personas(settings: Settings, sheets_dir: &Path) -> Result<()> {
    let mut catalog = PersonaCatalog::load_from_file(&settings.personas_path())?;
    let mut updated = 0usize;

    let mut pdfs: Vec<PathBuf> = std::fs::read_dir(sheets_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
                && !path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case("blank.pdf"))
        })
        .collect();
    pdfs.sort();
    log::info!("Found {} character PDFs in {}.", pdfs.len(), sheets_dir.display());

    for pdf in &pdfs {
        let parsed = match sheet::parse_character_sheet(pdf) {
            Ok(sheet) => sheet,
            Err(e) => {
                log::warn!("Skipping {}: {e:#}", pdf.display());
                continue;
            }
        };
        if parsed.name.is_empty() || parsed.name == sheet::DEFAULT_NAME {
            log::warn!("Skipping {}: no character name parsed.", pdf.display());
            continue;
        }
        let Some(entry) = catalog
            .personas_mut()
            .iter_mut()
            .find(|p| p.name == parsed.name)
        else {
            log::warn!(
                "No matching persona for character '{}' from {}.",
                parsed.name,
                pdf.display()
            );
            continue;
        };
        entry.class = parsed.class.key();
        entry.background = parsed.background.clone();
        entry.ability_scores = vec![
            parsed.abilities.strength,
            parsed.abilities.dexterity,
            parsed.abilities.constitution,
            parsed.abilities.intelligence,
            parsed.abilities.wisdom,
            parsed.abilities.charisma,
        ];
        log::info!("Updated persona '{}' from {}.", parsed.name, pdf.display());
        updated += 1;
    }

    if updated > 0 {
        catalog.save()?;
        log::info!("Saved {updated} updated personas.");
    } else {
        log::info!("No personas updated.");
    }
    Ok(())
}

// Refreshes the raw conversation logs over the Web API when a bot token is
// available, then renders them into per-persona transcripts. Without a
// token, whatever is already on disk gets rendered.
async fn parse_logs(settings: Settings, logs_dir: &Path, output_dir: &Path) -> Result<()> {
    let profiles = ProfileStore::load_from_file(&settings.profiles_path())?;

    let bot_token = settings.slack_bot_token.clone().unwrap_or_default();
    if bot_token.is_empty() {
        log::warn!("SLACK_BOT_TOKEN not set; rendering existing logs without refreshing.");
    } else {
        let client = SlackClient::new(&bot_token, "");
        std::fs::create_dir_all(logs_dir)?;
        match client.list_im_channels().await {
            Ok(channels) => {
                for im in channels.iter().filter(|im| profiles.contains(&im.user)) {
                    match client.conversation_history(&im.id).await {
                        Ok(messages) => {
                            let path = logs_dir.join(format!("{}_conversation.json", im.user));
                            std::fs::write(&path, serde_json::to_string_pretty(&messages)?)?;
                            log::info!("Saved {} messages for {}.", messages.len(), im.user);
                        }
                        Err(e) => {
                            log::error!("Could not fetch history for {}: {e:#}", im.user)
                        }
                    }
                }
            }
            Err(e) => {
                log::error!("Could not list DM conversations: {e:#}. Rendering existing logs.")
            }
        }
    }

    let rendered = logs::render_logs_dir(logs_dir, output_dir, &profiles)?;
    log::info!(
        "Wrote {rendered} readable transcripts into {}.",
        output_dir.display()
    );
    Ok(())
}

fn release_persona(settings: Settings, name: &str) -> Result<()> {
    let mut catalog = PersonaCatalog::load_from_file(&settings.personas_path())?;
    catalog.release(name);
    catalog.save()?;
    log::info!("Persona '{name}' returned to the selection pool.");
    Ok(())
}
