use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// A pre-authored character template a player claims during onboarding.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Persona {
    pub name: String,
    pub archetype: String,
    #[serde(default)]
    pub public_role: String,
    #[serde(default)]
    pub invitation_reason: String,
    #[serde(default)]
    pub secret_or_twist: String,
    #[serde(default = "default_class")]
    pub class: String,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "standard_array")]
    pub ability_scores: Vec<u8>,
    #[serde(default)]
    pub claimed: bool,
}

fn default_class() -> String {
    "fighter".to_string()
}

fn default_background() -> String {
    "Folk Hero".to_string()
}

pub fn standard_array() -> Vec<u8> {
    vec![15, 14, 13, 12, 10, 8]
}

impl Persona {
    // One line of the roster shown to the dialogue engine.
    pub fn roster_line(&self) -> String {
        format!(
            "- {} ({}): {} | {} | Secret: {}",
            self.name, self.archetype, self.public_role, self.invitation_reason, self.secret_or_twist
        )
    }
}

// The persona catalog, backed by a flat JSON array on disk. All mutation
// goes through `claim`, which is a check-and-set: callers holding the
// catalog lock cannot race each other into a double claim.
pub struct PersonaCatalog {
    personas: Vec<Persona>,
    path: PathBuf,
}

impl PersonaCatalog {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let personas: Vec<Persona> = serde_json::from_reader(file)?;
        Ok(PersonaCatalog {
            personas,
            path: path.to_path_buf(),
        })
    }

    pub fn empty(path: &Path) -> Self {
        PersonaCatalog {
            personas: Vec::new(),
            path: path.to_path_buf(),
        }
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn personas_mut(&mut self) -> &mut Vec<Persona> {
        &mut self.personas
    }

    pub fn unclaimed(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter().filter(|p| !p.claimed)
    }

    // Roster of unclaimed personas, one per line, for prompt interpolation.
    pub fn unclaimed_roster(&self) -> String {
        self.unclaimed()
            .map(Persona::roster_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    // Short selection menu shown directly to players.
    pub fn unclaimed_menu(&self) -> String {
        self.unclaimed()
            .map(|p| format!("• {} – {}", p.name, p.archetype))
            .collect::<Vec<_>>()
            .join("\n")
    }

    // First unclaimed persona whose name appears (case-insensitively) in the
    // given text. Deterministic: catalog order, first match wins.
    pub fn match_unclaimed(&self, text: &str) -> Option<&Persona> {
        let text_lower = text.to_lowercase();
        self.unclaimed()
            .find(|p| text_lower.contains(&p.name.to_lowercase()))
    }

    // Atomic check-and-set: flips `claimed` on the named persona and returns
    // a snapshot, or fails if someone already holds the claim.
    pub fn claim(&mut self, name: &str) -> Result<Persona> {
        let persona = self
            .personas
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| AppError::PersonaClaimed(format!("{name} (not in catalog)")))?;
        if persona.claimed {
            return Err(AppError::PersonaClaimed(persona.name.clone()));
        }
        persona.claimed = true;
        Ok(persona.clone())
    }

    // Explicit reset, used by deployment tooling only. A failed character
    // build does NOT call this: the claim intentionally stands.
    pub fn release(&mut self, name: &str) {
        if let Some(persona) = self
            .personas
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
        {
            persona.claimed = false;
        }
    }

    // Durable save: write to a temp file then rename over the catalog, so a
    // crash mid-write never leaves a truncated file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(&self.personas)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, &self.path)?;
        log::info!("Preset personas saved.");
        Ok(())
    }
}
