use crate::character::CharacterSheet;
use std::collections::HashMap;

// In-memory character sessions, keyed by user id. Characters live only for
// the life of the process; the PDF artifact is their durable form.
#[derive(Default)]
pub struct SessionStore {
    sessions: HashMap<String, CharacterSheet>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<&CharacterSheet> {
        self.sessions.get(user_id)
    }

    pub fn put(&mut self, user_id: &str, sheet: CharacterSheet) {
        self.sessions.insert(user_id.to_string(), sheet);
    }

    pub fn remove(&mut self, user_id: &str) -> Option<CharacterSheet> {
        self.sessions.remove(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }
}
