use pathvar::character::{
    Ability, AbilityScores, CharacterSheet, ClassKind, Skill, build_from_persona,
};
use pathvar::error::Result;
use pathvar::logs::{LogMessage, render_log, render_logs_dir, sanitize_log_name};
use pathvar::lore::Lore;
use pathvar::onboarding::{
    BotAction, OnboardingEngine, Responder, SheetService, WELCOME_LETTER,
};
use pathvar::persona::{Persona, PersonaCatalog, standard_array};
use pathvar::profile::{CreationStatus, PlayerProfile, ProfileStore};
use pathvar::retriever::chunk_text;
use pathvar::sheet::{coerce_checkbox, render_fields, sheet_from_fields};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

// --- Test doubles -----------------------------------------------------------

#[derive(Clone)]
struct CannedResponder {
    reply: String,
}

impl Responder for CannedResponder {
    async fn respond(
        &self,
        _message: &str,
        _profile: &PlayerProfile,
        _character: Option<&CharacterSheet>,
        _riddle: &str,
        _persona_roster: &str,
    ) -> String {
        self.reply.clone()
    }
}

// Echoes the message it was asked about, for asserting what reached the
// responder.
struct EchoResponder;

impl Responder for EchoResponder {
    async fn respond(
        &self,
        message: &str,
        _profile: &PlayerProfile,
        _character: Option<&CharacterSheet>,
        _riddle: &str,
        _persona_roster: &str,
    ) -> String {
        format!("echo:{message}")
    }
}

struct StubSheets {
    fill_ok: bool,
}

impl SheetService for StubSheets {
    fn fill(&self, _sheet: &CharacterSheet, output: &Path) -> bool {
        if self.fill_ok {
            std::fs::write(output, b"%PDF-stub").expect("Failed to write stub PDF");
        }
        self.fill_ok
    }

    fn parse(&self, _path: &Path) -> Result<CharacterSheet> {
        Ok(CharacterSheet::fallback("Parsed Character"))
    }
}

type TestEngine = OnboardingEngine<CannedResponder, StubSheets>;

fn test_persona(name: &str, class: &str) -> Persona {
    Persona {
        name: name.to_string(),
        archetype: "The Wanderer".to_string(),
        public_role: "Conductor's aide".to_string(),
        invitation_reason: "Pattern deviation".to_string(),
        secret_or_twist: "Knows the timetable".to_string(),
        class: class.to_string(),
        background: "Folk Hero".to_string(),
        ability_scores: standard_array(),
        claimed: false,
    }
}

fn make_engine(dir: &TempDir, reply: &str, fill_ok: bool) -> TestEngine {
    make_engine_with_work_dir(dir, reply, fill_ok, dir.path().join("work"))
}

fn make_engine_with_work_dir(
    dir: &TempDir,
    reply: &str,
    fill_ok: bool,
    work_dir: PathBuf,
) -> TestEngine {
    let profiles = ProfileStore::load_from_file(&dir.path().join("player_profiles.json"))
        .expect("Failed to create profile store");
    let mut personas = PersonaCatalog::empty(&dir.path().join("preset_personas.json"));
    personas.personas_mut().push(test_persona("Vera Langley", "bard"));
    personas.personas_mut().push(test_persona("Edmund Hollow", "wizard"));
    let lore = Lore {
        riddles: vec!["I speak without a mouth. What am I?".to_string()],
        ..Lore::default()
    };
    OnboardingEngine::new(
        profiles,
        personas,
        lore,
        CannedResponder {
            reply: reply.to_string(),
        },
        StubSheets { fill_ok },
        work_dir,
    )
}

fn status_of<R: Responder, S: SheetService>(
    engine: &OnboardingEngine<R, S>,
    user: &str,
) -> CreationStatus {
    engine
        .profiles
        .get(user)
        .expect("profile missing")
        .creation_status
}

// --- Onboarding flow --------------------------------------------------------

#[tokio::test]
async fn unprompted_dm_initiates_onboarding() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "Greetings.", true);

    let actions = engine.handle_dm("U100", "D100", "hello?").await;

    assert_eq!(status_of(&engine, "U100"), CreationStatus::AwaitingRiddleAnswer);
    assert_eq!(actions.len(), 2);
    match &actions[0] {
        BotAction::Post { channel, text } => {
            assert_eq!(channel, "U100");
            assert_eq!(text, WELCOME_LETTER);
        }
        other => panic!("Expected welcome post, got {other:?}"),
    }
    match &actions[1] {
        BotAction::Post { text, .. } => assert!(text.contains("Solve this riddle")),
        other => panic!("Expected riddle post, got {other:?}"),
    }
}

#[tokio::test]
async fn riddle_gate_accepts_exact_answer_case_insensitively() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "Well well.", true);
    engine.initiate("U1");

    let actions = engine.handle_dm("U1", "D1", "  ECHO $PATH  ").await;

    assert_eq!(status_of(&engine, "U1"), CreationStatus::AwaitingPersonaSelection);
    // The riddle phase still answers in character.
    assert_eq!(
        actions,
        vec![BotAction::Post {
            channel: "D1".to_string(),
            text: "Well well.".to_string()
        }]
    );
}

#[tokio::test]
async fn riddle_gate_rejects_near_misses() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "Not quite.", true);
    engine.initiate("U1");

    for wrong in ["echo PATH", "echo $ PATH", "$PATH", "echo \"$PATH\""] {
        engine.handle_dm("U1", "D1", wrong).await;
        assert_eq!(
            status_of(&engine, "U1"),
            CreationStatus::AwaitingRiddleAnswer,
            "answer {wrong:?} should not pass the gate"
        );
    }
}

#[tokio::test]
async fn direct_persona_match_claims_builds_and_uploads() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "Splendid.", true);
    engine.initiate("U1");
    engine.handle_dm("U1", "D1", "echo $path").await;

    let actions = engine.handle_dm("U1", "D1", "I'll take vera langley please").await;

    assert_eq!(status_of(&engine, "U1"), CreationStatus::AwaitingBackstoryInput);
    assert!(engine.sessions.contains("U1"));
    let claimed = engine
        .personas
        .personas()
        .iter()
        .find(|p| p.name == "Vera Langley")
        .unwrap();
    assert!(claimed.claimed);

    match &actions[0] {
        BotAction::UploadSheet { title, comment, path, .. } => {
            assert!(title.contains("Vera Langley"));
            assert!(comment.contains("Excellent choice"));
            assert!(path.exists());
        }
        other => panic!("Expected sheet upload, got {other:?}"),
    }

    let data = &engine.profiles.get("U1").unwrap().creation_data;
    assert_eq!(data.persona_name.as_deref(), Some("Vera Langley"));
    assert_eq!(data.class_key.as_deref(), Some("bard"));
    assert_eq!(data.species.as_deref(), Some("Human"));
    assert_eq!(data.languages, vec!["Common", "One extra"]);
    // Stored scores are pre-bonus.
    assert_eq!(data.ability_scores.unwrap().strength, 15);
}

#[tokio::test]
async fn llm_reply_can_select_persona_on_second_pass() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "Edmund Hollow suits you, I think.", true);
    engine.initiate("U1");
    engine.handle_dm("U1", "D1", "echo $path").await;

    let actions = engine.handle_dm("U1", "D1", "you pick for me").await;

    assert!(
        engine
            .personas
            .personas()
            .iter()
            .find(|p| p.name == "Edmund Hollow")
            .unwrap()
            .claimed
    );
    assert_eq!(status_of(&engine, "U1"), CreationStatus::AwaitingBackstoryInput);
    // Sheet first, then the LLM's confirmation.
    assert!(matches!(actions[0], BotAction::UploadSheet { .. }));
    match &actions[1] {
        BotAction::Post { text, .. } => assert!(text.contains("Edmund Hollow")),
        other => panic!("Expected confirmation post, got {other:?}"),
    }
}

#[tokio::test]
async fn claimed_persona_cannot_be_selected_again() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "That seat is taken.", true);
    for user in ["U1", "U2"] {
        engine.initiate(user);
        engine.handle_dm(user, user, "echo $path").await;
    }

    engine.handle_dm("U1", "U1", "Vera Langley").await;
    let actions = engine.handle_dm("U2", "U2", "Vera Langley").await;

    // No second claim: the losing player just gets the LLM reply.
    assert_eq!(
        actions,
        vec![BotAction::Post {
            channel: "U2".to_string(),
            text: "That seat is taken.".to_string()
        }]
    );
    assert_eq!(status_of(&engine, "U2"), CreationStatus::AwaitingPersonaSelection);
    assert!(!engine.sessions.contains("U2"));
}

#[tokio::test]
async fn concurrent_selections_claim_exactly_once() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "Hmm.", true);
    for user in ["U1", "U2"] {
        engine.initiate(user);
        engine.handle_dm(user, user, "echo $path").await;
    }
    let engine = Arc::new(Mutex::new(engine));

    let a = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.lock().await.handle_dm("U1", "U1", "Vera Langley").await })
    };
    let b = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.lock().await.handle_dm("U2", "U2", "Vera Langley").await })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    let uploads = [&a, &b]
        .iter()
        .flat_map(|actions| actions.iter())
        .filter(|action| matches!(action, BotAction::UploadSheet { .. }))
        .count();
    assert_eq!(uploads, 1);
}

#[tokio::test]
async fn failed_build_reverts_status_but_keeps_claim() {
    let dir = TempDir::new().unwrap();
    // Point the work dir beneath a regular file so sheet output creation
    // fails after the claim succeeded.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();
    let mut engine = make_engine_with_work_dir(&dir, "Hm.", true, blocker.join("nested"));
    engine.initiate("U1");
    engine.handle_dm("U1", "D1", "echo $path").await;

    let actions = engine.handle_dm("U1", "D1", "Vera Langley").await;

    match &actions[0] {
        BotAction::Post { text, .. } => assert!(text.contains("try selecting again")),
        other => panic!("Expected apology post, got {other:?}"),
    }
    assert_eq!(status_of(&engine, "U1"), CreationStatus::AwaitingPersonaSelection);
    assert!(!engine.sessions.contains("U1"));
    // The claim intentionally stands.
    assert!(
        engine
            .personas
            .personas()
            .iter()
            .find(|p| p.name == "Vera Langley")
            .unwrap()
            .claimed
    );
}

#[tokio::test]
async fn fill_failure_still_advances_to_backstory() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "Onward.", false);
    engine.initiate("U1");
    engine.handle_dm("U1", "D1", "echo $path").await;

    let actions = engine.handle_dm("U1", "D1", "Vera Langley").await;

    match &actions[0] {
        BotAction::Post { text, .. } => {
            assert!(text.contains("couldn't generate the character sheet"))
        }
        other => panic!("Expected fallback post, got {other:?}"),
    }
    assert_eq!(status_of(&engine, "U1"), CreationStatus::AwaitingBackstoryInput);
    assert!(engine.sessions.contains("U1"));
}

#[tokio::test]
async fn backstory_is_stored_and_completes_creation() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "Noted.", true);
    engine.initiate("U1");
    engine.handle_dm("U1", "D1", "echo $path").await;
    engine.handle_dm("U1", "D1", "Vera Langley").await;

    engine
        .handle_dm("U1", "D1", "Raised among the signal lamps of Hoboken.")
        .await;

    let profile = engine.profiles.get("U1").unwrap();
    assert_eq!(profile.creation_status, CreationStatus::CharacterCreated);
    assert_eq!(
        profile.backstory_notes,
        "Raised among the signal lamps of Hoboken."
    );
}

#[tokio::test]
async fn unknown_status_without_session_prompts_persona_selection() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "Hm.", true);
    let mut profile = PlayerProfile::new();
    profile.creation_status = CreationStatus::Unknown;
    engine.profiles.insert("U1", profile);

    let actions = engine.handle_dm("U1", "D1", "where were we?").await;

    assert_eq!(status_of(&engine, "U1"), CreationStatus::AwaitingPersonaSelection);
    match &actions[0] {
        BotAction::Post { text, .. } => {
            assert!(text.contains("select one of the following personas"));
            assert!(text.contains("Vera Langley"));
        }
        other => panic!("Expected persona menu, got {other:?}"),
    }
}

#[tokio::test]
async fn debug_reset_clears_all_profiles() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "Hm.", true);
    engine.initiate("U1");
    engine.initiate("U2");
    assert_eq!(engine.profiles.len(), 2);

    let actions = engine.handle_dm("U1", "D1", "Debug Reset Profiles").await;

    assert!(engine.profiles.is_empty());
    match &actions[0] {
        BotAction::Post { text, .. } => assert!(text.contains("profiles have been cleared")),
        other => panic!("Expected reset confirmation, got {other:?}"),
    }
}

#[tokio::test]
async fn debug_trigger_restarts_onboarding() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "Hm.", true);
    engine.initiate("U1");
    engine.handle_dm("U1", "D1", "echo $path").await;
    engine.handle_dm("U1", "D1", "Vera Langley").await;
    assert!(engine.sessions.contains("U1"));

    let actions = engine.handle_dm("U1", "D1", "debug trigger").await;

    assert_eq!(status_of(&engine, "U1"), CreationStatus::AwaitingRiddleAnswer);
    assert!(!engine.sessions.contains("U1"));
    assert!(matches!(&actions[0], BotAction::Post { text, .. } if text == WELCOME_LETTER));
}

#[tokio::test]
async fn sheet_upload_replaces_character_session() {
    let dir = TempDir::new().unwrap();
    let mut engine = make_engine(&dir, "Hm.", true);
    engine.initiate("U1");
    engine.handle_dm("U1", "D1", "echo $path").await;
    engine.handle_dm("U1", "D1", "Vera Langley").await;

    let pdf = dir.path().join("upload.pdf");
    std::fs::write(&pdf, b"%PDF-stub").unwrap();
    let actions = engine.handle_sheet_upload("U1", "D1", &pdf);

    assert_eq!(engine.sessions.get("U1").unwrap().name, "Parsed Character");
    assert!(matches!(&actions[0], BotAction::Post { text, .. } if text.contains("Character Summary")));
    // The uploaded copy is cleaned up once it has been absorbed.
    assert!(!pdf.exists());
}

#[tokio::test]
async fn channel_mentions_answer_freeform_without_touching_state() {
    let dir = TempDir::new().unwrap();
    let profiles = ProfileStore::load_from_file(&dir.path().join("player_profiles.json")).unwrap();
    let personas = PersonaCatalog::empty(&dir.path().join("preset_personas.json"));
    let mut engine = OnboardingEngine::new(
        profiles,
        personas,
        Lore::default(),
        EchoResponder,
        StubSheets { fill_ok: true },
        dir.path().join("work"),
    );
    engine.initiate("U1");

    // The mention tag is stripped before the responder sees the text.
    let reply = engine.handle_mention("U1", "<@UBOT42> what is armor class?").await;
    assert_eq!(reply, "echo:what is armor class?");
    assert_eq!(status_of(&engine, "U1"), CreationStatus::AwaitingRiddleAnswer);

    // Mentions from strangers get an answer too, without opening a profile.
    let reply = engine.handle_mention("USTRANGER", "no tag at all").await;
    assert_eq!(reply, "echo:no tag at all");
    assert!(!engine.profiles.contains("USTRANGER"));
}

// --- Character math ---------------------------------------------------------

#[test]
fn ability_modifiers_follow_srd_table() {
    assert_eq!(AbilityScores::modifier(1), -5);
    assert_eq!(AbilityScores::modifier(8), -1);
    assert_eq!(AbilityScores::modifier(9), -1);
    assert_eq!(AbilityScores::modifier(10), 0);
    assert_eq!(AbilityScores::modifier(11), 0);
    assert_eq!(AbilityScores::modifier(15), 2);
    assert_eq!(AbilityScores::modifier(20), 5);
    // Out-of-range scores from a hostile sheet stay sane.
    assert_eq!(AbilityScores::modifier(200), 95);
    assert_eq!(AbilityScores::modifier(255), 122);
}

#[test]
fn build_from_persona_applies_human_bonus_to_all_scores() {
    let persona = test_persona("Vera Langley", "bard");
    let outcome = build_from_persona(&persona);
    let abilities = outcome.sheet.abilities;
    // Standard array sorted descending, +1 each.
    assert_eq!(abilities.strength, 16);
    assert_eq!(abilities.dexterity, 15);
    assert_eq!(abilities.constitution, 14);
    assert_eq!(abilities.intelligence, 13);
    assert_eq!(abilities.wisdom, 11);
    assert_eq!(abilities.charisma, 9);
    assert!(!outcome.degraded);
}

#[test]
fn unknown_class_key_degrades_to_default_with_corrected_key() {
    let persona = test_persona("Vera Langley", "artificer");
    let outcome = build_from_persona(&persona);
    assert_eq!(outcome.sheet.class, ClassKind::Barbarian);
    assert_eq!(outcome.class_key, "barbarian");
    assert!(outcome.degraded);
}

#[test]
fn wrong_length_score_list_falls_back_to_standard_array() {
    let mut persona = test_persona("Vera Langley", "bard");
    persona.ability_scores = vec![18, 18];
    let outcome = build_from_persona(&persona);
    assert_eq!(outcome.sheet.abilities.strength, 16); // 15 + 1
    assert_eq!(outcome.sheet.abilities.charisma, 9); // 8 + 1
}

#[test]
fn level_one_hp_is_max_die_plus_con() {
    let abilities = AbilityScores::assign_descending([15, 14, 13, 12, 10, 8]);
    let sheet = CharacterSheet::new(
        "Test".into(),
        ClassKind::Fighter,
        1,
        "Human".into(),
        "Folk Hero".into(),
        abilities,
    );
    // d10 max + CON mod (13 -> +1).
    assert_eq!(sheet.max_hp, 11);
    assert_eq!(sheet.current_hp, 11);
    assert_eq!(sheet.hit_dice(), "1d10");
    assert_eq!(sheet.proficiency_bonus(), 2);
}

#[test]
fn multiclass_strings_resolve_to_first_class() {
    assert_eq!(ClassKind::from_key("Fighter 1 / Wizard 2"), Some(ClassKind::Fighter));
    assert_eq!(ClassKind::from_key("WIZARD"), Some(ClassKind::Wizard));
    assert_eq!(ClassKind::from_key("bloodhunter"), None);
}

// --- Sheet field mapping ----------------------------------------------------

fn fields_map(sheet: &CharacterSheet) -> HashMap<String, String> {
    render_fields(sheet).into_iter().collect()
}

#[test]
fn rendered_fields_cover_the_template_contract() {
    let persona = test_persona("Vera Langley", "bard");
    let sheet = build_from_persona(&persona).sheet;
    let fields = fields_map(&sheet);

    assert_eq!(fields["CharacterName"], "Vera Langley");
    assert_eq!(fields["ClassLevel"], "Bard 1");
    assert_eq!(fields["Race"], "Human");
    assert_eq!(fields["STRscore"], "16");
    assert_eq!(fields["CHAbonus"], "-1");
    assert_eq!(fields["ProfBonus"], "2");
    // Bard saves: DEX and CHA.
    assert_eq!(fields["DEXsavePROF"], "/Yes");
    assert_eq!(fields["STRsavePROF"], "/Off");
    // Bard skills: Performance and Persuasion.
    assert_eq!(fields["perfPROF"], "/Yes");
    assert_eq!(fields["persPROF"], "/Yes");
    assert_eq!(fields["acroPROF"], "/Off");
    assert_eq!(fields["SleightofHand"], "2");
    assert!(fields["ProfsLangs"].contains("Languages: Common, One extra"));
    assert!(fields["Equipment"].contains("- Lute"));
    assert_eq!(fields["Gold"], "0");
}

#[test]
fn sheet_round_trips_through_the_field_contract() {
    let persona = test_persona("Vera Langley", "bard");
    let original = build_from_persona(&persona).sheet;

    let parsed = sheet_from_fields(&fields_map(&original));

    assert_eq!(parsed.name, original.name);
    assert_eq!(parsed.class, original.class);
    assert_eq!(parsed.level, original.level);
    assert_eq!(parsed.species, original.species);
    assert_eq!(parsed.background, original.background);
    assert_eq!(parsed.abilities, original.abilities);
    assert_eq!(parsed.max_hp, original.max_hp);
    assert_eq!(parsed.current_hp, original.current_hp);
    assert_eq!(parsed.temp_hp, original.temp_hp);
    assert_eq!(parsed.armor_class, original.armor_class);
    assert_eq!(parsed.save_proficiencies, original.save_proficiencies);
    assert_eq!(parsed.skill_proficiencies, original.skill_proficiencies);
    assert_eq!(parsed.inventory, original.inventory);
    assert_eq!(parsed.languages, original.languages);
}

#[test]
fn empty_field_map_yields_minimal_default_character() {
    let parsed = sheet_from_fields(&HashMap::new());
    assert_eq!(parsed.name, "Unknown Character");
    assert_eq!(parsed.class, ClassKind::default_class());
    assert_eq!(parsed.level, 1);
}

#[test]
fn blank_fields_take_documented_defaults_and_stay_stable() {
    let mut fields = HashMap::new();
    for name in ["CharacterName", "ClassLevel", "STRscore", "ACworn", "HPMax", "TempHP"] {
        fields.insert(name.to_string(), String::new());
    }

    let parsed = sheet_from_fields(&fields);
    assert_eq!(parsed.name, "Unnamed Character");
    assert_eq!(parsed.level, 1);
    assert_eq!(parsed.abilities.strength, 10);
    assert_eq!(parsed.armor_class, 10);
    assert_eq!(parsed.temp_hp, 0);
    assert_eq!(parsed.current_hp, parsed.max_hp);

    // Re-serializing the defaults and parsing again changes nothing.
    let reparsed = sheet_from_fields(&fields_map(&parsed));
    assert_eq!(reparsed.name, parsed.name);
    assert_eq!(reparsed.abilities, parsed.abilities);
    assert_eq!(reparsed.armor_class, parsed.armor_class);
    assert_eq!(reparsed.max_hp, parsed.max_hp);
    assert_eq!(reparsed.skill_proficiencies, parsed.skill_proficiencies);
}

#[test]
fn checkbox_coercion_accepts_any_slash_state_as_checked() {
    assert!(coerce_checkbox("/Yes"));
    assert!(!coerce_checkbox("/Off"));
    assert!(coerce_checkbox("/On"));
    assert!(coerce_checkbox("/1"));
    assert!(!coerce_checkbox(""));
    assert!(!coerce_checkbox("Yes"));
}

#[test]
fn expertise_doubles_proficiency() {
    let persona = test_persona("Vera Langley", "rogue");
    let mut sheet = build_from_persona(&persona).sheet;
    sheet.skill_expertise.push(Skill::Stealth);
    // DEX 15 -> +2, expertise adds 2 * proficiency (2).
    assert_eq!(sheet.skill_modifier(Skill::Stealth), 6);
    assert_eq!(sheet.save_modifier(Ability::Dexterity), 4);
}

// --- Profiles and personas --------------------------------------------------

#[test]
fn unrecognized_status_labels_deserialize_to_unknown() {
    let status: CreationStatus = serde_json::from_str("\"awaiting_asi_L4\"").unwrap();
    assert_eq!(status, CreationStatus::Unknown);
    let status: CreationStatus = serde_json::from_str("\"awaiting_riddle_answer\"").unwrap();
    assert_eq!(status, CreationStatus::AwaitingRiddleAnswer);
}

#[test]
fn profile_store_round_trips_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("player_profiles.json");
    let mut store = ProfileStore::load_from_file(&path).unwrap();
    let mut profile = PlayerProfile::new();
    profile.creation_status = CreationStatus::CharacterCreated;
    profile.backstory_notes = "Notes.".to_string();
    store.insert("U1", profile);
    store.save().unwrap();

    let reloaded = ProfileStore::load_from_file(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
    let profile = reloaded.get("U1").unwrap();
    assert_eq!(profile.creation_status, CreationStatus::CharacterCreated);
    assert_eq!(profile.backstory_notes, "Notes.");
}

#[test]
fn persona_match_is_case_insensitive_substring() {
    let dir = TempDir::new().unwrap();
    let mut catalog = PersonaCatalog::empty(&dir.path().join("p.json"));
    catalog.personas_mut().push(test_persona("Vera Langley", "bard"));

    assert!(catalog.match_unclaimed("give me VERA langley now").is_some());
    assert!(catalog.match_unclaimed("vera").is_none());

    catalog.claim("Vera Langley").unwrap();
    assert!(catalog.match_unclaimed("Vera Langley").is_none());
    assert!(catalog.claim("Vera Langley").is_err());
}

#[test]
fn claimed_personas_leave_the_roster_and_menu() {
    let dir = TempDir::new().unwrap();
    let mut catalog = PersonaCatalog::empty(&dir.path().join("p.json"));
    catalog.personas_mut().push(test_persona("Vera Langley", "bard"));
    catalog.personas_mut().push(test_persona("Edmund Hollow", "wizard"));
    catalog.claim("Vera Langley").unwrap();

    assert!(!catalog.unclaimed_roster().contains("Vera Langley"));
    assert!(catalog.unclaimed_roster().contains("Edmund Hollow"));
    assert!(!catalog.unclaimed_menu().contains("Vera Langley"));
}

#[test]
fn released_persona_returns_to_the_selection_pool() {
    let dir = TempDir::new().unwrap();
    let mut catalog = PersonaCatalog::empty(&dir.path().join("p.json"));
    catalog.personas_mut().push(test_persona("Vera Langley", "bard"));
    catalog.claim("Vera Langley").unwrap();
    assert!(catalog.match_unclaimed("Vera Langley").is_none());

    catalog.release("Vera Langley");

    assert!(catalog.match_unclaimed("Vera Langley").is_some());
    assert!(catalog.claim("Vera Langley").is_ok());
}

#[test]
fn persona_defaults_fill_sparse_catalog_entries() {
    let json = r#"[{"name": "Ghost", "archetype": "The Unseen"}]"#;
    let personas: Vec<Persona> = serde_json::from_str(json).unwrap();
    assert_eq!(personas[0].class, "fighter");
    assert_eq!(personas[0].background, "Folk Hero");
    assert_eq!(personas[0].ability_scores, standard_array());
    assert!(!personas[0].claimed);
}

// --- Dialogue degradation ---------------------------------------------------

#[tokio::test]
async fn degraded_retrieval_context_short_circuits_to_apology() {
    let engine = pathvar::dialogue::DialogueEngine::new("test-key", "gpt-4o");
    let reply = engine
        .respond(
            "what is armor class?",
            &PlayerProfile::new(),
            None,
            &Lore::default(),
            "",
            "",
            "Error: could not query the rules index.",
        )
        .await;
    assert_eq!(reply, pathvar::dialogue::REFERENCE_TROUBLE_REPLY);
}

// --- Conversation logs ------------------------------------------------------

#[test]
fn transcripts_render_in_timestamp_order_without_empty_messages() {
    let messages = vec![
        LogMessage {
            ts: "2.0".into(),
            user: "U2".into(),
            text: "second".into(),
        },
        LogMessage {
            ts: "1.0".into(),
            user: "U1".into(),
            text: "first".into(),
        },
        LogMessage {
            ts: "1.5".into(),
            user: String::new(),
            text: "   ".into(),
        },
    ];
    assert_eq!(render_log(&messages), "[U1]: first\n\n[U2]: second\n\n");
}

#[test]
fn readable_logs_are_named_after_the_claimed_persona() {
    let dir = TempDir::new().unwrap();
    let logs_dir = dir.path().join("conversation_logs");
    let out_dir = dir.path().join("readable_logs");
    std::fs::create_dir_all(&logs_dir).unwrap();
    std::fs::write(
        logs_dir.join("U1_conversation.json"),
        r#"[{"ts": "1.0", "user": "U1", "text": "hello"}]"#,
    )
    .unwrap();
    std::fs::write(
        logs_dir.join("U2_conversation.json"),
        r#"[{"ts": "1.0", "user": "U2", "text": "hi"}]"#,
    )
    .unwrap();

    let mut profiles = ProfileStore::load_from_file(&dir.path().join("p.json")).unwrap();
    let mut profile = PlayerProfile::new();
    profile.creation_data.persona_name = Some("Vera Langley".to_string());
    profiles.insert("U1", profile);

    let rendered = render_logs_dir(&logs_dir, &out_dir, &profiles).unwrap();
    assert_eq!(rendered, 2);
    let transcript =
        std::fs::read_to_string(out_dir.join("Vera_Langley_readable_log.txt")).unwrap();
    assert_eq!(transcript, "[U1]: hello\n\n");
    // Users without a claimed persona fall back to their id.
    assert!(out_dir.join("U2_readable_log.txt").exists());
}

#[test]
fn log_names_sanitize_to_filename_safe_labels() {
    assert_eq!(sanitize_log_name("Vera Langley"), "Vera_Langley");
    assert_eq!(sanitize_log_name("  a/b:c  "), "abc");
    assert_eq!(sanitize_log_name("!!!"), "Unnamed_Persona");
}

// --- Retrieval chunking -----------------------------------------------------

#[test]
fn long_text_chunks_with_overlap() {
    let text = (0..400)
        .map(|i| format!("word{i}"))
        .collect::<Vec<_>>()
        .join(" ");
    let chunks = chunk_text(&text);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.len() <= 512 + 16, "chunk too large: {}", chunk.len());
    }
    // Consecutive chunks share trailing context.
    let first_tail = chunks[0].split_whitespace().last().unwrap();
    assert!(chunks[1].contains(first_tail));
}

#[test]
fn short_text_is_a_single_chunk() {
    let chunks = chunk_text("a handful of words");
    assert_eq!(chunks, vec!["a handful of words".to_string()]);
}
