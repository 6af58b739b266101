use crate::error::Result;
use rand::prelude::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Static campaign lore: loaded once at startup, immutable afterwards.
// Every field defaults so a sparse lore.json still loads.
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Lore {
    #[serde(default)]
    pub cassidy_backstory: String,
    #[serde(default)]
    pub cassidy_motivations: Vec<String>,
    #[serde(default)]
    pub cassidy_villain_flavor: VillainFlavor,
    #[serde(default)]
    pub riddles: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct VillainFlavor {
    #[serde(default)]
    pub artificer_archivist: String,
    #[serde(default)]
    pub bard: String,
    #[serde(default)]
    pub legendary_actions: Vec<String>,
}

impl Lore {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let lore: Lore = serde_json::from_reader(file)?;
        Ok(lore)
    }

    // One riddle per call, chosen at random like the original welcome flow.
    pub fn random_riddle(&self) -> Option<&str> {
        self.riddles.choose(&mut rand::rng()).map(String::as_str)
    }

    pub fn motivations_bulleted(&self) -> String {
        self.cassidy_motivations
            .iter()
            .map(|m| format!("- {m}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
