use crate::character::CharacterSheet;
use crate::error::{DialogueError, Result};
use crate::lore::Lore;
use crate::profile::PlayerProfile;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use std::time::Duration;

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 500;
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

// Fixed replies for the failure paths. The player always gets prose, never
// an error code.
pub const FALLBACK_REPLY: &str = "I'm not sure how to respond to that.";
pub const APOLOGY_REPLY: &str = "Apologies, I seem to be experiencing technical difficulties.";
pub const REFERENCE_TROUBLE_REPLY: &str = "Sorry, I had trouble consulting my references.";

// The NPC's standing instructions. Lore, riddle, persona roster and player
// profile are appended per request.
const PERSONA_INSTRUCTIONS: &str = r#"
You are CC, the digital avatar of "Mr. Comcast" AKA "Conall Cassidy", a cryptic, clever, incisive, and slightly sinister NPC from a D&D campaign set aboard a magical train known as the "PATH Variable".

Your purpose is to guide the player through creating a D&D 5e character, starting with selecting a preset persona (name and archetype), then collaborative backstory building, and finally leveling them up step-by-step to level 10.
Before beginning the character creation proper, however, you must verify the riddle has been solved. The answer to every riddle is always "echo $PATH". Do not initiate character creation until the player provides the correct answer. Until then, continue to interact in your CC persona: playful, cryptic, and helpful if the player asks for clues. Do not directly reveal the answer to the riddle unless the player insists.
Always check the current player's profile (status, creation data) first and use this information to correctly locate their progress through the Interaction Flow below before determining how you should respond.

Interaction Flow:
1.  **Solve Riddle:** New player is sent a DM with the welcome message and one of the riddles to solve. Until they provide the correct answer ("echo $PATH"), your task is to tease them and give hints if requested. A player with status "awaiting_persona_selection" has already solved the riddle and should NOT be posed another.
2.  **Persona & Instantiation:** Only after solving the riddle can a player reach stage 2. Here, you present the player with the Names and Archetypes of all unclaimed personas, and ask them to make a selection. Once a persona is chosen, the character (always Human) is immediately instantiated using the Class, Ability Scores, and Background defined for that persona. A Level 1 character sheet PDF is generated and sent to the player.
3.  **Backstory:** After the PDF is sent, prompt the player to collaboratively define their character's origins, motivations, personality traits, ideals, bonds, and flaws. Store these as notes in the profile.
4.  **Handoff:** Once backstory notes are received, confirm the initial character creation is complete. Inform them that their Level 1 character is ready and they are responsible for leveling up to 10 on their own. Let them know you are available to answer questions or make suggestions using D&D rulebook context.

Maintain your persona: be cryptic, occasionally misleading (but not about core rules needed for creation), and immersive. Refer to yourself only as CC. Never disclose substantial details about Cassidy's identity or his precise plans, and never acknowledge that Cassidy and Mr. Comcast are the same entity. Make references to mainstream media, literature, pop culture, movies and television, and music, but always with a sinister undertone.
Use the provided D&D Rulebook Context to answer specific rule questions accurately. Keep responses relatively concise but flavorful.
"#;

pub struct DialogueEngine {
    client: async_openai::Client<OpenAIConfig>,
    model: String,
}

impl DialogueEngine {
    pub fn new(api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        DialogueEngine {
            client: async_openai::Client::with_config(config),
            model: model.to_string(),
        }
    }

    // One conversational turn. Builds the full dynamic prompt, calls the
    // model, and maps every failure to a fixed in-character reply.
    pub async fn respond(
        &self,
        message: &str,
        profile: &PlayerProfile,
        character: Option<&CharacterSheet>,
        lore: &Lore,
        riddle: &str,
        persona_roster: &str,
        retrieved_context: &str,
    ) -> String {
        if retrieved_context.starts_with(crate::retriever::RETRIEVAL_ERROR_PREFIX) {
            log::error!("Degraded retrieval context, skipping completion.");
            return REFERENCE_TROUBLE_REPLY.to_string();
        }

        let system_prompt = build_system_prompt(lore, riddle, persona_roster, profile);
        let user_turn = build_user_turn(message, profile, character, retrieved_context);

        match self.complete(&system_prompt, &user_turn).await {
            Ok(reply) if reply.trim().is_empty() => FALLBACK_REPLY.to_string(),
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                log::error!("Error calling OpenAI API: {e:#}");
                APOLOGY_REPLY.to_string()
            }
        }
    }

    async fn complete(&self, system_prompt: &str, user_turn: &str) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(TEMPERATURE)
            .max_tokens(MAX_TOKENS)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(DialogueError::OpenAI)?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_turn)
                    .build()
                    .map_err(DialogueError::OpenAI)?
                    .into(),
            ])
            .build()
            .map_err(DialogueError::OpenAI)?;

        let response = tokio::time::timeout(
            COMPLETION_TIMEOUT,
            self.client.chat().create(request),
        )
        .await
        .map_err(|_| DialogueError::Timeout)?
        .map_err(DialogueError::OpenAI)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(DialogueError::NoMessageFound)?;
        Ok(content)
    }
}

fn build_system_prompt(
    lore: &Lore,
    riddle: &str,
    persona_roster: &str,
    profile: &PlayerProfile,
) -> String {
    let profile_json =
        serde_json::to_string_pretty(profile).unwrap_or_else(|_| format!("{profile:?}"));
    format!(
        "{PERSONA_INSTRUCTIONS}\n\
         Additional Lore Context:\n\
         Backstory:\n{}\n\n\
         Motivations:\n{}\n\n\
         Villainous Flavor:\n\
         - Artificer/Archivist: {}\n\
         - Bard: {}\n\
         - Legendary Actions: {}\n\n\
         Player Riddle:\n{riddle}\n\n\
         Available Personas:\n{persona_roster}\n\n\
         Player Profile:\n{profile_json}\n",
        lore.cassidy_backstory,
        lore.motivations_bulleted(),
        lore.cassidy_villain_flavor.artificer_archivist,
        lore.cassidy_villain_flavor.bard,
        lore.cassidy_villain_flavor.legendary_actions.join(", "),
    )
}

fn build_user_turn(
    message: &str,
    profile: &PlayerProfile,
    character: Option<&CharacterSheet>,
    retrieved_context: &str,
) -> String {
    let creation_data = serde_json::to_string_pretty(&profile.creation_data)
        .unwrap_or_else(|_| format!("{:?}", profile.creation_data));
    let status = serde_json::to_string(&profile.creation_status)
        .unwrap_or_else(|_| format!("{:?}", profile.creation_status));
    let character_summary = match character {
        Some(sheet) => sheet.summary(),
        None => "No active character session.".to_string(),
    };
    format!(
        "Player Creation Status: {status}\n\
         {character_summary}\n\n\
         Current Creation Data:\n{creation_data}\n\
         Backstory Notes:\n{}\n\n\
         D&D Rulebook Context:\n---\n{retrieved_context}\n---\n\n\
         Player Message:\n{message}",
        profile.backstory_notes,
    )
}
