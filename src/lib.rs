pub mod character;
pub mod dialogue;
pub mod error;
pub mod logging;
pub mod logs;
pub mod lore;
pub mod onboarding;
pub mod persona;
pub mod profile;
pub mod retriever;
pub mod session;
pub mod settings;
pub mod sheet;
pub mod slack;

// Re-export commonly used items for easier access
pub use character::{Ability, AbilityScores, CharacterSheet, ClassKind, Skill};
pub use error::{AppError, Result};
pub use lore::Lore;
pub use onboarding::{BotAction, OnboardingEngine, Responder, SheetService};
pub use persona::{Persona, PersonaCatalog};
pub use profile::{CreationStatus, PlayerProfile, ProfileStore};
pub use settings::Settings;
