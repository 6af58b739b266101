use crate::character::{AbilityScores, CharacterSheet, build_from_persona};
use crate::error::Result;
use crate::lore::Lore;
use crate::persona::PersonaCatalog;
use crate::profile::{CreationStatus, PlayerProfile, ProfileStore};
use crate::session::SessionStore;
use std::path::{Path, PathBuf};

// The riddle gate: every riddle has the same answer, compared trimmed and
// case-insensitively.
pub const RIDDLE_ANSWER: &str = "echo $path";

pub const DEBUG_TRIGGER: &str = "debug trigger";
pub const DEBUG_RESET_PROFILES: &str = "debug reset profiles";

pub const WELCOME_LETTER: &str = "To Whom the World Whispers Differently,

You are cordially invited to board the PATH Variable, departing from World Trade Center at precisely Midnight on the Vernal Conjunction.

This is not a public route. It appears only for those who would change the tracks upon which reality runs.

You have been chosen—not by fate, but by pattern. By deviation. By your refusal to become predictable.

Bring nothing but your mind, your memory, and this token of your character.

Regards,
C.C.";

// Side effects the state machine wants performed. The transport executes
// them in order; the machine itself never touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotAction {
    Post {
        channel: String,
        text: String,
    },
    UploadSheet {
        channel: String,
        path: PathBuf,
        title: String,
        comment: String,
    },
}

// The conversational brain, seam for tests. The live implementation runs
// retrieval plus a chat completion; tests substitute a canned reply.
pub trait Responder {
    fn respond(
        &self,
        message: &str,
        profile: &PlayerProfile,
        character: Option<&CharacterSheet>,
        riddle: &str,
        persona_roster: &str,
    ) -> impl Future<Output = String> + Send;
}

// PDF rendering seam. The live implementation drives pdfium; tests stub it.
pub trait SheetService {
    fn fill(&self, sheet: &CharacterSheet, output: &Path) -> bool;
    fn parse(&self, path: &Path) -> Result<CharacterSheet>;
}

pub struct OnboardingEngine<R, S> {
    pub profiles: ProfileStore,
    pub personas: PersonaCatalog,
    pub sessions: SessionStore,
    lore: Lore,
    responder: R,
    sheets: S,
    work_dir: PathBuf,
}

impl<R: Responder, S: SheetService> OnboardingEngine<R, S> {
    pub fn new(
        profiles: ProfileStore,
        personas: PersonaCatalog,
        lore: Lore,
        responder: R,
        sheets: S,
        work_dir: PathBuf,
    ) -> Self {
        OnboardingEngine {
            profiles,
            personas,
            sessions: SessionStore::new(),
            lore,
            responder,
            sheets,
            work_dir,
        }
    }

    pub fn known_user(&self, user_id: &str) -> bool {
        self.profiles.contains(user_id)
    }

    // Starts (or restarts) onboarding: fresh profile, welcome letter, one
    // riddle. Posting to the user id opens their DM channel implicitly.
    pub fn initiate(&mut self, user_id: &str) -> Vec<BotAction> {
        log::info!("Initiating onboarding for user {user_id}.");
        if self.sessions.remove(user_id).is_some() {
            log::warn!("Cleared previous character session for {user_id} during initiation.");
        }
        self.profiles.insert(user_id, PlayerProfile::new());

        let riddle_text = match self.lore.random_riddle() {
            Some(riddle) => {
                format!("_Solve this riddle to begin your journey:_\n\n{riddle}")
            }
            None => {
                log::warn!("No riddles found in lore data.");
                "No riddle found, but proceed with caution.".to_string()
            }
        };

        if let Some(profile) = self.profiles.get_mut(user_id) {
            profile.creation_status = CreationStatus::AwaitingRiddleAnswer;
        }
        self.persist_profiles();

        vec![
            BotAction::Post {
                channel: user_id.to_string(),
                text: WELCOME_LETTER.to_string(),
            },
            BotAction::Post {
                channel: user_id.to_string(),
                text: riddle_text,
            },
        ]
    }

    // Called by the transport when delivering the welcome failed. The next
    // DM from the user will re-initiate.
    pub fn mark_initiation_failed(&mut self, user_id: &str) {
        if let Some(profile) = self.profiles.get_mut(user_id) {
            profile.creation_status = CreationStatus::InitiationFailed;
        }
        self.persist_profiles();
    }

    // One inbound direct message, dispatched on the player's creation
    // status. Returns the side effects to perform.
    pub async fn handle_dm(&mut self, user_id: &str, channel: &str, text: &str) -> Vec<BotAction> {
        let text = text.trim();
        let text_lower = text.to_lowercase();

        if !self.profiles.contains(user_id) {
            log::info!("User {user_id} sent DM but has no profile. Initiating.");
            return self.initiate(user_id);
        }

        if text_lower == DEBUG_TRIGGER {
            log::info!("Debug trigger activated by {user_id}. Re-initiating.");
            return self.initiate(user_id);
        }
        if text_lower == DEBUG_RESET_PROFILES {
            self.profiles.clear();
            self.persist_profiles();
            return vec![post(
                channel,
                "Debug profiles reset. All player profiles have been cleared.",
            )];
        }

        let status = self
            .profiles
            .get(user_id)
            .map(|p| p.creation_status)
            .unwrap_or(CreationStatus::Unknown);

        match status {
            CreationStatus::AwaitingRiddleAnswer => {
                if text_lower == RIDDLE_ANSWER {
                    if let Some(profile) = self.profiles.get_mut(user_id) {
                        profile.creation_status = CreationStatus::AwaitingPersonaSelection;
                    }
                    self.persist_profiles();
                    log::info!("User {user_id} solved the riddle.");
                }
                // The riddle phase always answers in character, solved or not.
                let reply = self.respond_freeform(user_id, text).await;
                vec![post(channel, &reply)]
            }

            CreationStatus::NeedsWelcome
            | CreationStatus::InitiationFailed
            | CreationStatus::Unknown
                if !self.sessions.contains(user_id) =>
            {
                // Reached the machine without a proper initiation: skip
                // straight to persona selection, keeping whatever data
                // survived.
                log::warn!(
                    "User {user_id} in state {status:?} without initiation. Prompting persona selection."
                );
                if let Some(profile) = self.profiles.get_mut(user_id) {
                    profile.creation_status = CreationStatus::AwaitingPersonaSelection;
                }
                self.persist_profiles();
                let menu = self.personas.unclaimed_menu();
                vec![post(
                    channel,
                    &format!(
                        "Welcome to the PATH Variable. Please select one of the following personas by typing its name:\n{menu}"
                    ),
                )]
            }

            CreationStatus::AwaitingPersonaSelection => {
                self.handle_persona_selection(user_id, channel, text).await
            }

            CreationStatus::AwaitingBackstoryInput => {
                if let Some(profile) = self.profiles.get_mut(user_id) {
                    profile.backstory_notes = text.to_string();
                    profile.creation_status = CreationStatus::CharacterCreated;
                }
                self.persist_profiles();
                log::info!("Stored backstory notes for {user_id}.");
                let reply = self.respond_freeform(user_id, text).await;
                vec![post(channel, &reply)]
            }

            // Creation finished (or an odd state with a live session):
            // free-form conversation with rulebook context.
            _ => {
                let reply = self.respond_freeform(user_id, text).await;
                vec![post(channel, &reply)]
            }
        }
    }

    // Persona selection: direct name match first, then a second pass over
    // the LLM's reply in case CC picked for the player.
    async fn handle_persona_selection(
        &mut self,
        user_id: &str,
        channel: &str,
        text: &str,
    ) -> Vec<BotAction> {
        if let Some(name) = self.personas.match_unclaimed(text).map(|p| p.name.clone()) {
            return match self.claim_and_build(user_id, channel, &name) {
                Ok(actions) => actions,
                Err(e) => self.recover_failed_build(user_id, channel, &e),
            };
        }

        log::info!("No direct persona match in '{text}'. Querying LLM.");
        let reply = self.respond_freeform(user_id, text).await;

        if let Some(name) = self.personas.match_unclaimed(&reply).map(|p| p.name.clone()) {
            log::info!("LLM response indicated selection of persona: {name}");
            return match self.claim_and_build(user_id, channel, &name) {
                Ok(mut actions) => {
                    // The LLM reply carries the confirmation; send it after
                    // the sheet.
                    actions.push(post(channel, &reply));
                    actions
                }
                Err(e) => self.recover_failed_build(user_id, channel, &e),
            };
        }

        vec![post(channel, &reply)]
    }

    // Claims the persona, builds the level 1 character, renders the sheet.
    // Anything failing after the claim leaves the claim in place: the player
    // retries with the persona still theirs.
    fn claim_and_build(
        &mut self,
        user_id: &str,
        channel: &str,
        persona_name: &str,
    ) -> Result<Vec<BotAction>> {
        let persona = self.personas.claim(persona_name)?;
        if let Err(e) = self.personas.save() {
            log::error!("Failed to save persona catalog: {e:#}");
        }

        let outcome = build_from_persona(&persona);
        let pre_bonus: [u8; 6] = persona
            .ability_scores
            .as_slice()
            .try_into()
            .unwrap_or([15, 14, 13, 12, 10, 8]);

        if let Some(profile) = self.profiles.get_mut(user_id) {
            let data = &mut profile.creation_data;
            data.persona_name = Some(persona.name.clone());
            data.class_key = Some(outcome.class_key.clone());
            data.background = Some(persona.background.clone());
            data.species = Some("Human".to_string());
            data.ability_scores = Some(AbilityScores::assign_descending(pre_bonus));
            data.languages = outcome.languages.clone();
        }

        std::fs::create_dir_all(&self.work_dir)?;
        let safe_name: String = outcome
            .sheet
            .name
            .chars()
            .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
            .collect();
        let output = self.work_dir.join(format!("{safe_name}_{user_id}_L1.pdf"));

        let filled = self.sheets.fill(&outcome.sheet, &output);
        self.sessions.put(user_id, outcome.sheet.clone());

        let action = if filled {
            BotAction::UploadSheet {
                channel: channel.to_string(),
                path: output,
                title: format!("{} - Level 1 Sheet", outcome.sheet.name),
                comment: format!(
                    "Excellent choice: {} – {}.\n\nYour Level 1 character sheet is attached, based on the chosen persona. Now, tell me about their origins, motivations, flaws... their story.",
                    persona.name, persona.archetype
                ),
            }
        } else {
            post(
                channel,
                "I couldn't generate the character sheet PDF, apologies. Let's proceed anyway. Please tell me about your character's backstory.",
            )
        };

        if let Some(profile) = self.profiles.get_mut(user_id) {
            profile.creation_status = CreationStatus::AwaitingBackstoryInput;
        }
        self.persist_profiles();
        Ok(vec![action])
    }

    // A build failure after claiming reverts the status so the player can
    // choose again. The claim itself stands: the persona stays theirs.
    fn recover_failed_build(
        &mut self,
        user_id: &str,
        channel: &str,
        error: &crate::error::AppError,
    ) -> Vec<BotAction> {
        log::error!("Persona instantiation failed for {user_id}: {error:#}");
        self.sessions.remove(user_id);
        if let Some(profile) = self.profiles.get_mut(user_id) {
            profile.creation_status = CreationStatus::AwaitingPersonaSelection;
        }
        self.persist_profiles();
        vec![post(
            channel,
            "Apologies, I encountered an issue setting up your character from that persona. Let's try selecting again.",
        )]
    }

    // A channel mention skips the state machine entirely: the mention tag
    // is stripped and the rest goes straight to the free-form responder.
    pub async fn handle_mention(&self, user_id: &str, text: &str) -> String {
        let stripped = match text.split_once('>') {
            Some((_, rest)) => rest.trim(),
            None => text.trim(),
        };
        self.respond_freeform(user_id, stripped).await
    }

    // A player with a finished character re-uploads their sheet after
    // leveling; the parsed result replaces their in-memory session.
    pub fn handle_sheet_upload(
        &mut self,
        user_id: &str,
        channel: &str,
        pdf_path: &Path,
    ) -> Vec<BotAction> {
        let parsed = self.sheets.parse(pdf_path);
        // The uploaded copy is transient; the session holds the result.
        if let Err(e) = std::fs::remove_file(pdf_path) {
            log::debug!("Could not remove uploaded sheet {}: {e}", pdf_path.display());
        }
        match parsed {
            Ok(sheet) => {
                let summary = sheet.summary();
                self.sessions.put(user_id, sheet);
                log::info!("Updated character session for {user_id} from uploaded sheet.");
                vec![post(
                    channel,
                    &format!("Your updated sheet has been absorbed into my records.\n{summary}"),
                )]
            }
            Err(e) => {
                log::error!("Failed to parse uploaded sheet from {user_id}: {e:#}");
                vec![post(
                    channel,
                    "I couldn't make sense of that sheet, I'm afraid. Send me a cleaner copy.",
                )]
            }
        }
    }

    async fn respond_freeform(&self, user_id: &str, text: &str) -> String {
        let profile = self
            .profiles
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        let riddle = self.lore.random_riddle().unwrap_or_default().to_string();
        let roster = self.personas.unclaimed_roster();
        self.responder
            .respond(text, &profile, self.sessions.get(user_id), &riddle, &roster)
            .await
    }

    // Store save failures degrade to a log line; the conversation goes on.
    fn persist_profiles(&self) {
        if let Err(e) = self.profiles.save() {
            log::error!("Failed to save player profiles: {e:#}");
        }
    }
}

fn post(channel: &str, text: &str) -> BotAction {
    BotAction::Post {
        channel: channel.to_string(),
        text: text.to_string(),
    }
}
