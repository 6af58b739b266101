use crate::persona::Persona;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

// The six ability scores, in sheet order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::flat(10)
    }
}

impl AbilityScores {
    pub fn flat(score: u8) -> Self {
        AbilityScores {
            strength: score,
            dexterity: score,
            constitution: score,
            intelligence: score,
            wisdom: score,
            charisma: score,
        }
    }

    // Assigns six raw scores to abilities in descending order, STR first.
    // This is the default assignment used when a persona carries an
    // unordered score list.
    pub fn assign_descending(mut raw: [u8; 6]) -> Self {
        raw.sort_unstable_by(|a, b| b.cmp(a));
        AbilityScores {
            strength: raw[0],
            dexterity: raw[1],
            constitution: raw[2],
            intelligence: raw[3],
            wisdom: raw[4],
            charisma: raw[5],
        }
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: u8) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    pub fn modifier(score: u8) -> i8 {
        // Widen before subtracting: scores above 127 come in from parsed
        // sheets and must not wrap.
        (score as i16 - 10).div_euclid(2) as i8
    }

    // The single playable ancestry aboard the PATH Variable is Human:
    // +1 to every score.
    pub fn apply_human_bonus(&mut self) {
        for ability in Ability::all() {
            self.set(ability, self.get(ability).saturating_add(1));
        }
    }
}

// The twelve 5e base classes. Iteration order doubles as the fallback
// order: an unrecognized class key degrades to the first variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClassKind::Barbarian => "Barbarian",
            ClassKind::Bard => "Bard",
            ClassKind::Cleric => "Cleric",
            ClassKind::Druid => "Druid",
            ClassKind::Fighter => "Fighter",
            ClassKind::Monk => "Monk",
            ClassKind::Paladin => "Paladin",
            ClassKind::Ranger => "Ranger",
            ClassKind::Rogue => "Rogue",
            ClassKind::Sorcerer => "Sorcerer",
            ClassKind::Warlock => "Warlock",
            ClassKind::Wizard => "Wizard",
        };
        write!(f, "{name}")
    }
}

impl ClassKind {
    pub fn key(&self) -> String {
        self.to_string().to_lowercase()
    }

    // Case-insensitive lookup by class key; tolerates multiclass strings
    // like "Fighter 1 / Wizard 2" by taking the first word.
    pub fn from_key(key: &str) -> Option<ClassKind> {
        let key = key
            .split(['/', ' '])
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        ClassKind::iter().find(|c| c.key() == key)
    }

    pub fn default_class() -> ClassKind {
        ClassKind::iter().next().unwrap_or(ClassKind::Barbarian)
    }

    pub fn hit_die(&self) -> u8 {
        match self {
            ClassKind::Barbarian => 12,
            ClassKind::Fighter | ClassKind::Paladin | ClassKind::Ranger => 10,
            ClassKind::Sorcerer | ClassKind::Wizard => 6,
            _ => 8,
        }
    }

    pub fn saving_throws(&self) -> [Ability; 2] {
        use Ability::*;
        match self {
            ClassKind::Barbarian => [Strength, Constitution],
            ClassKind::Bard => [Dexterity, Charisma],
            ClassKind::Cleric => [Wisdom, Charisma],
            ClassKind::Druid => [Intelligence, Wisdom],
            ClassKind::Fighter => [Strength, Constitution],
            ClassKind::Monk => [Strength, Dexterity],
            ClassKind::Paladin => [Wisdom, Charisma],
            ClassKind::Ranger => [Strength, Dexterity],
            ClassKind::Rogue => [Dexterity, Intelligence],
            ClassKind::Sorcerer => [Constitution, Charisma],
            ClassKind::Warlock => [Wisdom, Charisma],
            ClassKind::Wizard => [Intelligence, Wisdom],
        }
    }

    // A fixed two-skill pick per class, standing in for the SRD's
    // choose-N lists. Good enough for a level 1 sheet.
    pub fn skill_proficiencies(&self) -> [Skill; 2] {
        use Skill::*;
        match self {
            ClassKind::Barbarian => [Athletics, Intimidation],
            ClassKind::Bard => [Performance, Persuasion],
            ClassKind::Cleric => [Insight, Religion],
            ClassKind::Druid => [Nature, AnimalHandling],
            ClassKind::Fighter => [Athletics, Perception],
            ClassKind::Monk => [Acrobatics, Stealth],
            ClassKind::Paladin => [Athletics, Persuasion],
            ClassKind::Ranger => [Survival, Perception],
            ClassKind::Rogue => [Stealth, SleightOfHand],
            ClassKind::Sorcerer => [Arcana, Deception],
            ClassKind::Warlock => [Arcana, Intimidation],
            ClassKind::Wizard => [Arcana, History],
        }
    }

    pub fn starting_equipment(&self) -> Vec<String> {
        let kit: &[&str] = match self {
            ClassKind::Barbarian => &["Greataxe", "Two handaxes", "Explorer's pack", "Four javelins"],
            ClassKind::Bard => &["Rapier", "Diplomat's pack", "Lute", "Leather armor", "Dagger"],
            ClassKind::Cleric => &["Mace", "Scale mail", "Light crossbow", "Shield", "Holy symbol"],
            ClassKind::Druid => &["Wooden shield", "Scimitar", "Leather armor", "Druidic focus"],
            ClassKind::Fighter => &["Chain mail", "Longsword", "Shield", "Light crossbow"],
            ClassKind::Monk => &["Shortsword", "Dungeoneer's pack", "Ten darts"],
            ClassKind::Paladin => &["Chain mail", "Longsword", "Shield", "Holy symbol"],
            ClassKind::Ranger => &["Scale mail", "Two shortswords", "Longbow", "Quiver of 20 arrows"],
            ClassKind::Rogue => &["Rapier", "Shortbow", "Burglar's pack", "Leather armor", "Thieves' tools"],
            ClassKind::Sorcerer => &["Light crossbow", "Arcane focus", "Dungeoneer's pack", "Two daggers"],
            ClassKind::Warlock => &["Light crossbow", "Arcane focus", "Scholar's pack", "Leather armor"],
            ClassKind::Wizard => &["Quarterstaff", "Arcane focus", "Scholar's pack", "Spellbook"],
        };
        kit.iter().map(|s| s.to_string()).collect()
    }
}

// The eighteen 5e skills with their governing abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum Skill {
    Acrobatics,
    AnimalHandling,
    Arcana,
    Athletics,
    Deception,
    History,
    Insight,
    Intimidation,
    Investigation,
    Medicine,
    Nature,
    Perception,
    Performance,
    Persuasion,
    Religion,
    SleightOfHand,
    Stealth,
    Survival,
}

impl Skill {
    pub fn ability(&self) -> Ability {
        use Ability::*;
        match self {
            Skill::Athletics => Strength,
            Skill::Acrobatics | Skill::SleightOfHand | Skill::Stealth => Dexterity,
            Skill::Arcana
            | Skill::History
            | Skill::Investigation
            | Skill::Nature
            | Skill::Religion => Intelligence,
            Skill::AnimalHandling
            | Skill::Insight
            | Skill::Medicine
            | Skill::Perception
            | Skill::Survival => Wisdom,
            Skill::Deception
            | Skill::Intimidation
            | Skill::Performance
            | Skill::Persuasion => Charisma,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Skill::Acrobatics => "Acrobatics",
            Skill::AnimalHandling => "Animal Handling",
            Skill::Arcana => "Arcana",
            Skill::Athletics => "Athletics",
            Skill::Deception => "Deception",
            Skill::History => "History",
            Skill::Insight => "Insight",
            Skill::Intimidation => "Intimidation",
            Skill::Investigation => "Investigation",
            Skill::Medicine => "Medicine",
            Skill::Nature => "Nature",
            Skill::Perception => "Perception",
            Skill::Performance => "Performance",
            Skill::Persuasion => "Persuasion",
            Skill::Religion => "Religion",
            Skill::SleightOfHand => "Sleight of Hand",
            Skill::Stealth => "Stealth",
            Skill::Survival => "Survival",
        }
    }
}

// A character's information sheet: the in-memory instantiation of 5e rules
// for one player. Created from a claimed persona or a parsed PDF, never
// persisted except through the sheet artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSheet {
    pub name: String,
    pub class: ClassKind,
    pub level: u8,
    pub species: String,
    pub background: String,
    pub abilities: AbilityScores,

    // Derived at construction, overridable by a parsed sheet.
    pub max_hp: u16,
    pub current_hp: u16,
    pub temp_hp: u16,
    pub armor_class: u8,
    pub speed: u8,

    pub save_proficiencies: Vec<Ability>,
    pub skill_proficiencies: Vec<Skill>,
    pub skill_expertise: Vec<Skill>,
    pub inventory: Vec<String>,
    pub languages: Vec<String>,

    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub ideals: String,
    #[serde(default)]
    pub bonds: String,
    #[serde(default)]
    pub flaws: String,
    #[serde(default)]
    pub backstory: String,
}

impl CharacterSheet {
    pub fn new(
        name: String,
        class: ClassKind,
        level: u8,
        species: String,
        background: String,
        abilities: AbilityScores,
    ) -> Self {
        let level = level.max(1);
        let con_mod = AbilityScores::modifier(abilities.constitution);
        let dex_mod = AbilityScores::modifier(abilities.dexterity);
        let hit_die = class.hit_die();

        // Level 1 HP is max die + CON; later levels take the fixed average.
        let per_level = (hit_die / 2 + 1) as i32;
        let max_hp = (hit_die as i32 + con_mod as i32)
            + (level as i32 - 1) * (per_level + con_mod as i32);
        let max_hp = max_hp.max(1) as u16;

        CharacterSheet {
            name,
            class,
            level,
            species,
            background,
            abilities,
            max_hp,
            current_hp: max_hp,
            temp_hp: 0,
            armor_class: (10 + dex_mod as i32).max(1) as u8,
            speed: 30,
            save_proficiencies: class.saving_throws().to_vec(),
            skill_proficiencies: class.skill_proficiencies().to_vec(),
            skill_expertise: Vec::new(),
            inventory: class.starting_equipment(),
            languages: vec!["Common".to_string()],
            personality: String::new(),
            ideals: String::new(),
            bonds: String::new(),
            flaws: String::new(),
            backstory: String::new(),
        }
    }

    // Minimal fallback character used when construction from external data
    // fails. Callers must handle the degraded result gracefully.
    pub fn fallback(name: &str) -> Self {
        CharacterSheet::new(
            name.to_string(),
            ClassKind::default_class(),
            1,
            "Human".to_string(),
            "Folk Hero".to_string(),
            AbilityScores::default(),
        )
    }

    pub fn proficiency_bonus(&self) -> u8 {
        // 5e progression: +2 at level 1, +1 every four levels.
        2 + (self.level.max(1) - 1) / 4
    }

    pub fn ability_modifier(&self, ability: Ability) -> i8 {
        AbilityScores::modifier(self.abilities.get(ability))
    }

    pub fn save_modifier(&self, ability: Ability) -> i8 {
        let mut modifier = self.ability_modifier(ability);
        if self.save_proficiencies.contains(&ability) {
            modifier += self.proficiency_bonus() as i8;
        }
        modifier
    }

    pub fn skill_modifier(&self, skill: Skill) -> i8 {
        let mut modifier = self.ability_modifier(skill.ability());
        if self.skill_expertise.contains(&skill) {
            modifier += 2 * self.proficiency_bonus() as i8;
        } else if self.skill_proficiencies.contains(&skill) {
            modifier += self.proficiency_bonus() as i8;
        }
        modifier
    }

    pub fn passive_perception(&self) -> i8 {
        10 + self.skill_modifier(Skill::Perception)
    }

    pub fn initiative(&self) -> i8 {
        self.ability_modifier(Ability::Dexterity)
    }

    pub fn hit_dice(&self) -> String {
        format!("{}d{}", self.level, self.class.hit_die())
    }

    pub fn class_level(&self) -> String {
        format!("{} {}", self.class, self.level)
    }

    pub fn summary(&self) -> String {
        format!(
            "Character Summary: Level {}, Race: {}, Class: {}",
            self.level, self.species, self.class
        )
    }
}

// Outcome of building a character from a persona: the sheet itself plus the
// corrections and side-channel data the profile needs to remember.
pub struct BuildOutcome {
    pub sheet: CharacterSheet,
    pub class_key: String,      // Possibly corrected from the persona's key.
    pub languages: Vec<String>, // Racial trait info for later sheet rendering.
    pub degraded: bool,
}

// Builds a level 1 character from a claimed persona. Never fails hard: an
// unrecognized class key degrades to the default class (and the corrected
// key is reported back for the profile), and any inconsistency in the score
// list falls back to the standard array.
pub fn build_from_persona(persona: &Persona) -> BuildOutcome {
    let (class, degraded) = match ClassKind::from_key(&persona.class) {
        Some(class) => (class, false),
        None => {
            log::error!(
                "Invalid class key '{}' from persona '{}'. Defaulting to {}.",
                persona.class,
                persona.name,
                ClassKind::default_class()
            );
            (ClassKind::default_class(), true)
        }
    };

    let raw: [u8; 6] = match persona.ability_scores.as_slice().try_into() {
        Ok(raw) => raw,
        Err(_) => {
            log::error!(
                "Invalid ability_scores list length in persona '{}'. Falling back to the standard array.",
                persona.name
            );
            [15, 14, 13, 12, 10, 8]
        }
    };
    let mut abilities = AbilityScores::assign_descending(raw);
    abilities.apply_human_bonus();

    let languages = vec!["Common".to_string(), "One extra".to_string()];

    let mut sheet = CharacterSheet::new(
        persona.name.clone(),
        class,
        1,
        "Human".to_string(),
        persona.background.clone(),
        abilities,
    );
    sheet.languages = languages.clone();

    BuildOutcome {
        sheet,
        class_key: class.key(),
        languages,
        degraded,
    }
}
