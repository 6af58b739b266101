use crate::character::{Ability, AbilityScores, CharacterSheet, ClassKind, Skill};
use crate::error::{Result, SheetError};
use pdfium_render::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use strum::IntoEnumIterator;

// Sentinel values for checkbox-style form fields.
pub const CHECK_ON: &str = "/Yes";
pub const CHECK_OFF: &str = "/Off";

// Documented defaults applied when a field is missing or unparseable.
pub const DEFAULT_ABILITY_SCORE: u8 = 10;
pub const DEFAULT_ARMOR_CLASS: u8 = 10;
pub const DEFAULT_LEVEL: u8 = 1;
pub const DEFAULT_SPEED: u8 = 30;
pub const DEFAULT_NAME: &str = "Unnamed Character";
pub const DEFAULT_SPECIES: &str = "Human";
pub const DEFAULT_BACKGROUND: &str = "Folk Hero";

fn ability_field_prefix(ability: Ability) -> &'static str {
    ability.abbreviation() // STRscore, DEXbonus, CONsavePROF, ...
}

// Short field-name prefix used by the template's skill checkboxes.
fn skill_field_prefix(skill: Skill) -> &'static str {
    match skill {
        Skill::Acrobatics => "acro",
        Skill::AnimalHandling => "anhan",
        Skill::Arcana => "arcana",
        Skill::Athletics => "ath",
        Skill::Deception => "decep",
        Skill::History => "hist",
        Skill::Insight => "insight",
        Skill::Intimidation => "intim",
        Skill::Investigation => "invest",
        Skill::Medicine => "med",
        Skill::Nature => "nature",
        Skill::Perception => "per",
        Skill::Performance => "perf",
        Skill::Persuasion => "pers",
        Skill::Religion => "relig",
        Skill::SleightOfHand => "soh",
        Skill::Stealth => "stealth",
        Skill::Survival => "surv",
    }
}

// The template names skill modifier fields after the skill, without spaces.
// "Sleight of Hand" is the one irregular capitalization.
fn skill_modifier_field(skill: Skill) -> String {
    match skill {
        Skill::SleightOfHand => "SleightofHand".to_string(),
        other => other.display_name().replace(' ', ""),
    }
}

fn checkbox(flag: bool) -> String {
    if flag { CHECK_ON } else { CHECK_OFF }.to_string()
}

// Three raw encodings collapse to a boolean: '/Yes' is checked, '/Off' is
// unchecked, and any other appearance-state name counts as checked.
pub fn coerce_checkbox(raw: &str) -> bool {
    match raw {
        CHECK_ON => true,
        CHECK_OFF => false,
        other => other.starts_with('/'),
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<&String>, default: T) -> T {
    match raw {
        Some(s) if !s.trim().is_empty() => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

// --- Write path: character record -> named field values --------------------

// Every supported attribute maps to exactly one named field. Modifiers,
// proficiency checkboxes, passive perception and currency are computed here
// at fill time, never stored on the record.
pub fn render_fields(sheet: &CharacterSheet) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = vec![
        ("CharacterName".into(), sheet.name.clone()),
        ("ClassLevel".into(), sheet.class_level()),
        ("Race".into(), sheet.species.clone()),
        ("Background".into(), sheet.background.clone()),
        ("HPMax".into(), sheet.max_hp.to_string()),
        ("CurrentHP".into(), sheet.current_hp.to_string()),
        ("TempHP".into(), sheet.temp_hp.to_string()),
        ("HitDiceTotal".into(), sheet.hit_dice()),
        ("ACworn".into(), sheet.armor_class.to_string()),
        ("Init".into(), sheet.initiative().to_string()),
        ("Speed".into(), sheet.speed.to_string()),
        ("ProfBonus".into(), sheet.proficiency_bonus().to_string()),
        ("PWP".into(), sheet.passive_perception().to_string()),
        ("ProfsLangs".into(), render_profs_langs(sheet)),
        ("Equipment".into(), render_equipment(sheet)),
        ("PersonalityTraits".into(), sheet.personality.clone()),
        ("Ideals".into(), sheet.ideals.clone()),
        ("Bonds".into(), sheet.bonds.clone()),
        ("Flaws".into(), sheet.flaws.clone()),
    ];

    for ability in Ability::all() {
        let prefix = ability_field_prefix(ability);
        fields.push((format!("{prefix}score"), sheet.abilities.get(ability).to_string()));
        fields.push((
            format!("{prefix}bonus"),
            sheet.ability_modifier(ability).to_string(),
        ));
        fields.push((format!("{prefix}save"), sheet.save_modifier(ability).to_string()));
        fields.push((
            format!("{prefix}savePROF"),
            checkbox(sheet.save_proficiencies.contains(&ability)),
        ));
    }

    for skill in Skill::iter() {
        fields.push((
            skill_modifier_field(skill),
            sheet.skill_modifier(skill).to_string(),
        ));
        let prefix = skill_field_prefix(skill);
        fields.push((
            format!("{prefix}PROF"),
            checkbox(sheet.skill_proficiencies.contains(&skill)),
        ));
        fields.push((
            format!("{prefix}EXP"),
            checkbox(sheet.skill_expertise.contains(&skill)),
        ));
    }

    // Currency: nothing tracked on the record yet, so denominations fill
    // as zero.
    for coin in ["Copper", "Silver", "Electrum", "Gold", "Platinum"] {
        fields.push((coin.into(), "0".into()));
    }

    fields
}

fn render_profs_langs(sheet: &CharacterSheet) -> String {
    let profs = sheet
        .skill_proficiencies
        .iter()
        .map(|s| s.display_name())
        .collect::<Vec<_>>()
        .join(", ");
    let langs = sheet.languages.join(", ");
    format!(
        "Proficiencies: {}\nLanguages: {}",
        if profs.is_empty() { "None" } else { profs.as_str() },
        if langs.is_empty() { "None" } else { langs.as_str() },
    )
}

fn render_equipment(sheet: &CharacterSheet) -> String {
    if sheet.inventory.is_empty() {
        return "None".to_string();
    }
    sheet
        .inventory
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// --- Read path: named field values -> character record ---------------------

// Rebuilds a character from a map of raw field values. Partial-success
// philosophy: any single field's parse failure falls back to its documented
// default without discarding the rest. A map with no fields at all yields a
// minimal default character.
pub fn sheet_from_fields(fields: &HashMap<String, String>) -> CharacterSheet {
    if fields.is_empty() {
        return CharacterSheet::fallback("Unknown Character");
    }

    let name = match fields.get("CharacterName") {
        Some(n) if !n.trim().is_empty() => n.trim().to_string(),
        _ => DEFAULT_NAME.to_string(),
    };

    let (class, level) = parse_class_level(fields.get("ClassLevel"));

    let species = match fields.get("Race") {
        Some(r) if !r.trim().is_empty() => r.trim().to_string(),
        _ => DEFAULT_SPECIES.to_string(),
    };
    let background = match fields.get("Background") {
        Some(b) if !b.trim().is_empty() => b.trim().to_string(),
        _ => DEFAULT_BACKGROUND.to_string(),
    };

    let mut abilities = AbilityScores::default();
    for ability in Ability::all() {
        let field = format!("{}score", ability_field_prefix(ability));
        abilities.set(ability, parse_or(fields.get(&field), DEFAULT_ABILITY_SCORE));
    }

    let mut sheet = CharacterSheet::new(name, class, level, species, background, abilities);

    // Overridables: the sheet's numbers win over the constructor's when the
    // fields parse.
    sheet.max_hp = parse_or(fields.get("HPMax"), sheet.max_hp);
    sheet.current_hp = parse_or(fields.get("CurrentHP"), sheet.max_hp);
    sheet.temp_hp = parse_or(fields.get("TempHP"), 0);
    sheet.armor_class = parse_or(fields.get("ACworn"), DEFAULT_ARMOR_CLASS);
    sheet.speed = parse_or(fields.get("Speed"), DEFAULT_SPEED);

    // Proficiencies come from the checkboxes alone.
    sheet.save_proficiencies = Ability::all()
        .into_iter()
        .filter(|ability| {
            let field = format!("{}savePROF", ability_field_prefix(*ability));
            fields.get(&field).is_some_and(|v| coerce_checkbox(v))
        })
        .collect();
    sheet.skill_proficiencies = Skill::iter()
        .filter(|skill| {
            let field = format!("{}PROF", skill_field_prefix(*skill));
            fields.get(&field).is_some_and(|v| coerce_checkbox(v))
        })
        .collect();
    sheet.skill_expertise = Skill::iter()
        .filter(|skill| {
            let field = format!("{}EXP", skill_field_prefix(*skill));
            fields.get(&field).is_some_and(|v| coerce_checkbox(v))
        })
        .collect();

    if let Some(equipment) = fields.get("Equipment") {
        let items: Vec<String> = equipment
            .lines()
            .map(|line| line.trim_start_matches("- ").trim().to_string())
            .filter(|line| !line.is_empty() && line != "None")
            .collect();
        if !items.is_empty() {
            sheet.inventory = items;
        }
    }

    if let Some(profs_langs) = fields.get("ProfsLangs") {
        if let Some(line) = profs_langs
            .lines()
            .find_map(|l| l.trim().strip_prefix("Languages: "))
        {
            let langs: Vec<String> = line
                .split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty() && l != "None")
                .collect();
            if !langs.is_empty() {
                sheet.languages = langs;
            }
        }
    }

    for (field, target) in [
        ("PersonalityTraits", &mut sheet.personality),
        ("Ideals", &mut sheet.ideals),
        ("Bonds", &mut sheet.bonds),
        ("Flaws", &mut sheet.flaws),
    ] {
        if let Some(value) = fields.get(field) {
            *target = value.trim().to_string();
        }
    }

    sheet
}

// "Fighter 3" or "Fighter 1 / Wizard 2": first class wins, unknown class
// degrades to the default, unparseable level defaults to 1.
fn parse_class_level(raw: Option<&String>) -> (ClassKind, u8) {
    let raw = match raw {
        Some(r) if !r.trim().is_empty() => r.trim(),
        _ => return (ClassKind::default_class(), DEFAULT_LEVEL),
    };
    let class = ClassKind::from_key(raw).unwrap_or_else(|| {
        log::warn!("Unknown class in sheet field '{raw}'. Defaulting.");
        ClassKind::default_class()
    });
    let level = raw
        .split_whitespace()
        .nth(1)
        .and_then(|l| l.parse().ok())
        .unwrap_or(DEFAULT_LEVEL);
    (class, level)
}

// --- PDF edge ---------------------------------------------------------------

fn bind_pdfium() -> std::result::Result<Pdfium, PdfiumError> {
    match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) => Ok(Pdfium::new(Pdfium::bind_to_library(
            Pdfium::pdfium_platform_library_name_at_path(&dir),
        )?)),
        Err(_) => Ok(Pdfium::new(Pdfium::bind_to_system_library()?)),
    }
}

// Fills the blank template with a character's field values and writes the
// result to `output_path`. Reports success as a boolean and never lets an
// error escape: a missing template or a field absent from the template is
// logged and the rest of the fill proceeds.
pub fn fill_character_sheet(
    sheet: &CharacterSheet,
    blank_pdf_path: &Path,
    output_path: &Path,
) -> bool {
    match try_fill(sheet, blank_pdf_path, output_path) {
        Ok(()) => {
            log::info!("Successfully filled character sheet: {}", output_path.display());
            true
        }
        Err(e) => {
            log::error!("Failed to fill PDF character sheet: {e:#}");
            false
        }
    }
}

fn try_fill(sheet: &CharacterSheet, blank_pdf_path: &Path, output_path: &Path) -> Result<()> {
    if !blank_pdf_path.exists() {
        return Err(
            SheetError::TemplateNotFound(blank_pdf_path.display().to_string()).into(),
        );
    }

    let values: HashMap<String, String> = render_fields(sheet).into_iter().collect();
    let pdfium = bind_pdfium().map_err(SheetError::Pdfium)?;
    let mut document = pdfium
        .load_pdf_from_file(blank_pdf_path, None)
        .map_err(SheetError::Pdfium)?;

    if document.form().is_none() {
        return Err(
            SheetError::NoFormFields(blank_pdf_path.display().to_string()).into(),
        );
    }

    let mut matched = 0usize;
    for mut page in document.pages_mut().iter() {
        let mut annotations = page.annotations_mut();
        for mut annotation in annotations.iter() {
            let Some(field) = annotation.as_form_field_mut() else {
                continue;
            };
            let name = field.name().unwrap_or_default();
            let Some(value) = values.get(name.as_str()) else {
                continue;
            };
            let applied = if let Some(text) = field.as_text_field_mut() {
                text.set_value(value).is_ok()
            } else if let Some(checkbox) = field.as_checkbox_field_mut() {
                checkbox.set_checked(coerce_checkbox(value)).is_ok()
            } else {
                false
            };
            if applied {
                matched += 1;
            } else {
                log::warn!("Could not set sheet field '{name}'");
            }
        }
    }

    if matched < values.len() {
        // Partial fill is not a failure; templates drift.
        log::warn!(
            "Mapped {} fields but only {} were present in '{}'",
            values.len(),
            matched,
            blank_pdf_path.display()
        );
    }

    document
        .save_to_file(output_path)
        .map_err(SheetError::Pdfium)?;
    Ok(())
}

// Reads a filled form back into a character record. Tolerates a form with
// zero fields and any single attribute's parse failure.
pub fn parse_character_sheet(pdf_path: &Path) -> Result<CharacterSheet> {
    let pdfium = bind_pdfium().map_err(SheetError::Pdfium)?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(SheetError::Pdfium)?;

    let mut fields: HashMap<String, String> = HashMap::new();
    if let Some(form) = document.form() {
        for (name, value) in form.field_values(&document.pages()) {
            if let Some(value) = value {
                fields.insert(name, value);
            }
        }
    } else {
        log::warn!("No form fields found in '{}'.", pdf_path.display());
    }

    let sheet = sheet_from_fields(&fields);
    log::info!(
        "Parsed character '{}' from '{}'.",
        sheet.name,
        pdf_path.display()
    );
    Ok(sheet)
}
