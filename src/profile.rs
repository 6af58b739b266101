use crate::character::AbilityScores;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// Onboarding states. Serialized labels match the legacy profile files, and
// anything unrecognized lands in `Unknown`, the error state that forces
// re-initialization.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreationStatus {
    NeedsWelcome,
    AwaitingRiddleAnswer,
    AwaitingPersonaSelection,
    AwaitingBackstoryInput,
    CharacterCreated,
    InitiationFailed,
    #[serde(other)]
    Unknown,
}

// Data accumulated phase by phase during onboarding. Every field is
// optional: which ones are populated tells you how far the player got.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CreationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ability_scores: Option<AbilityScores>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
}

// Per-user persistent record of onboarding progress. Never deleted;
// abandoned profiles simply stay where they are.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PlayerProfile {
    pub creation_status: CreationStatus,
    #[serde(default)]
    pub creation_data: CreationData,
    #[serde(default)]
    pub backstory_notes: String,
}

impl PlayerProfile {
    pub fn new() -> Self {
        PlayerProfile {
            creation_status: CreationStatus::NeedsWelcome,
            creation_data: CreationData::default(),
            backstory_notes: String::new(),
        }
    }
}

impl Default for PlayerProfile {
    fn default() -> Self {
        Self::new()
    }
}

// The profile store: user_id -> profile, flat JSON file on disk. Callers
// serialize access through a mutex at the application level; the store
// itself only guarantees that each `save` is atomic on disk.
pub struct ProfileStore {
    profiles: HashMap<String, PlayerProfile>,
    path: PathBuf,
}

impl ProfileStore {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let profiles = match std::fs::File::open(path) {
            Ok(file) => serde_json::from_reader(file)?,
            Err(_) => HashMap::new(), // First run: start empty.
        };
        Ok(ProfileStore {
            profiles,
            path: path.to_path_buf(),
        })
    }

    pub fn get(&self, user_id: &str) -> Option<&PlayerProfile> {
        self.profiles.get(user_id)
    }

    pub fn get_mut(&mut self, user_id: &str) -> Option<&mut PlayerProfile> {
        self.profiles.get_mut(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.profiles.contains_key(user_id)
    }

    pub fn insert(&mut self, user_id: &str, profile: PlayerProfile) {
        self.profiles.insert(user_id.to_string(), profile);
    }

    pub fn clear(&mut self) {
        self.profiles.clear();
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    // Write-temp-then-rename so a crash mid-write leaves the previous file
    // intact. Last writer wins.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(&self.profiles)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, &self.path)?;
        log::info!("Player profiles saved.");
        Ok(())
    }
}
