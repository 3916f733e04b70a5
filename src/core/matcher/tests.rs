use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;

use super::*;
use crate::core::intent::{EntityValue, IntentPayload};
use crate::core::recipe::{Recipe, RecipeStep, default_recipes};

fn catalog_of(recipes: Vec<Recipe>) -> CatalogSnapshot {
    Arc::new(
        recipes
            .into_iter()
            .map(|r| (r.name.clone(), Arc::new(r)))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn office_catalog() -> CatalogSnapshot {
    catalog_of(default_recipes())
}

fn keyword_recipe(name: &str, intent: &str, required: &[&str]) -> Recipe {
    Recipe {
        name: name.to_string(),
        intent: intent.to_string(),
        description: format!("{} recipe", name),
        steps: vec![RecipeStep::notification("done")],
        required_entities: required.iter().map(|s| s.to_string()).collect(),
        keywords: vec!["shared".into()],
        common_triggers: vec!["shared".into()],
        success_criteria: vec![],
    }
}

// --- Selection policy ---

#[test]
fn exact_intent_with_all_entities_succeeds() {
    let payload = IntentPayload::new("schedule_meeting")
        .with_alternates(&["scheduling"])
        .with_entity("time", "2pm")
        .with_entity("participants", vec!["@john"]);
    let outcome = select_recipe(&office_catalog(), &payload);
    assert_eq!(outcome.status, MatchStatus::Success);
    assert_eq!(outcome.recipe_name(), Some("Meeting Scheduler"));
    assert!(outcome.missing_requirements.is_empty());
    assert_eq!(outcome.suggested_next_steps, NextStep::ExecuteRecipe);
}

#[test]
fn missing_participants_reports_missing_info() {
    let payload = IntentPayload::new("schedule_meeting").with_entity("time", "2pm");
    let outcome = select_recipe(&office_catalog(), &payload);
    assert_eq!(outcome.status, MatchStatus::MissingInfo);
    assert_eq!(outcome.recipe_name(), Some("Meeting Scheduler"));
    assert_eq!(outcome.missing_requirements, vec!["participants".to_string()]);
    assert_eq!(outcome.suggested_next_steps, NextStep::RequestInfo);
}

#[test]
fn fuzzy_intent_falls_back_to_best_scoring_candidate() {
    let payload = IntentPayload::new("create_report")
        .with_alternates(&["document"])
        .with_keywords(&["create", "report", "document"]);
    let outcome = select_recipe(&office_catalog(), &payload);
    assert_eq!(outcome.recipe_name(), Some("Document Management"));
    assert_eq!(outcome.status, MatchStatus::MissingInfo);
    assert_eq!(outcome.missing_requirements, vec!["doc_type".to_string()]);
}

#[test]
fn primary_intent_beats_alternate_intent() {
    let payload = IntentPayload::new("research")
        .with_alternates(&["research", "document"])
        .with_keywords(&["research", "report", "analyze"]);
    let outcome = select_recipe(&office_catalog(), &payload);
    assert_eq!(outcome.recipe_name(), Some("Research Report"));
}

#[test]
fn keywords_alone_can_select_a_complete_recipe() {
    let payload = IntentPayload::new("arrange_call")
        .with_keywords(&["schedule", "meeting", "calendar"])
        .with_entity("time", "3pm")
        .with_entity("participants", vec!["@amy"]);
    let outcome = select_recipe(&office_catalog(), &payload);
    assert_eq!(outcome.recipe_name(), Some("Meeting Scheduler"));
    assert_eq!(outcome.status, MatchStatus::Success);
}

#[test]
fn fallback_prefers_fewest_missing_entities() {
    let catalog = catalog_of(vec![
        keyword_recipe("Alpha", "alpha_task", &["x", "y"]),
        keyword_recipe("Beta", "beta_task", &["x"]),
    ]);
    let payload = IntentPayload::new("zzz").with_keywords(&["shared"]);
    let outcome = select_recipe(&catalog, &payload);
    assert_eq!(outcome.recipe_name(), Some("Beta"));
    assert_eq!(outcome.missing_requirements, vec!["x".to_string()]);
}

#[test]
fn confident_top_candidate_wins_over_exact_intent_elsewhere() {
    let mut strong = keyword_recipe("Strong", "zzz_strong", &[]);
    strong.keywords = vec!["alpha".into(), "beta".into()];
    strong.common_triggers = vec!["alpha beta".into()];
    let weak = keyword_recipe("Weak", "target", &["missing"]);
    let catalog = catalog_of(vec![strong, weak]);
    // Strong: intent contained (0.8), keywords 1.0, trigger 1.0, entities 1.0.
    let payload = IntentPayload::new("target")
        .with_alternates(&["zzz"])
        .with_keywords(&["alpha", "beta"]);
    let outcome = select_recipe(&catalog, &payload);
    assert_eq!(outcome.recipe_name(), Some("Strong"));
    assert!(outcome.score >= CONFIDENT_THRESHOLD);
}

// --- Not found / errors ---

#[test]
fn unrelated_request_is_not_found() {
    let payload = IntentPayload::new("unknown_task")
        .with_alternates(&["unknown"])
        .with_keywords(&["something", "random"]);
    let outcome = select_recipe(&office_catalog(), &payload);
    assert_eq!(outcome.status, MatchStatus::NotFound);
    assert!(outcome.recipe.is_none());
    assert_eq!(outcome.suggested_next_steps, NextStep::Escalate);
}

#[test]
fn absent_intent_is_not_found_with_detail() {
    let payload = IntentPayload {
        intent: Some("   ".into()),
        ..IntentPayload::default()
    };
    let outcome = select_recipe(&office_catalog(), &payload);
    assert_eq!(outcome.status, MatchStatus::NotFound);
    assert!(outcome.detail.unwrap().contains("no intent"));
}

#[test]
fn failed_extraction_is_an_error_status() {
    let payload = IntentPayload {
        status: crate::core::intent::ExtractionStatus::Error,
        error: Some("extractor timed out".into()),
        ..IntentPayload::new("schedule_meeting")
    };
    let outcome = select_recipe(&office_catalog(), &payload);
    assert_eq!(outcome.status, MatchStatus::Error);
    assert_eq!(outcome.detail.as_deref(), Some("extractor timed out"));
}

#[test]
fn empty_catalog_is_not_found() {
    let outcome = select_recipe(&catalog_of(vec![]), &IntentPayload::new("research"));
    assert_eq!(outcome.status, MatchStatus::NotFound);
}

#[test]
fn malformed_catalog_entries_are_skipped() {
    let mut broken = keyword_recipe("Broken", "research", &[]);
    broken.steps.clear();
    let catalog = catalog_of(vec![broken]);
    let outcome = select_recipe(&catalog, &IntentPayload::new("research"));
    assert_eq!(outcome.status, MatchStatus::NotFound);
}

// --- Requirement validation ---

#[test]
fn follow_up_entities_satisfy_requirements() {
    let recipe = default_recipes().remove(0);
    let mut entities = crate::core::intent::Entities::new();
    entities.insert("time".into(), EntityValue::from("2pm"));
    let check = validate_requirements(&recipe, &entities);
    assert_eq!(check.status, MatchStatus::MissingInfo);
    assert_eq!(check.missing_requirements, vec!["participants".to_string()]);

    entities.insert("participants".into(), EntityValue::from(vec!["@john"]));
    let check = validate_requirements(&recipe, &entities);
    assert!(check.is_ready());
    assert_eq!(check.suggested_next_steps, NextStep::ExecuteRecipe);
}

#[tokio::test]
async fn engine_reads_live_catalog() {
    let catalog = Arc::new(crate::core::recipe::RecipeCatalog::new());
    let engine = MatchEngine::new(Arc::clone(&catalog));
    let payload = IntentPayload::new("research").with_entity("topic", "rust");
    assert_eq!(
        engine.match_payload(&payload).await.status,
        MatchStatus::NotFound
    );
    catalog.extend(default_recipes()).await;
    let outcome = engine.match_payload(&payload).await;
    assert_eq!(outcome.status, MatchStatus::Success);
    assert_eq!(outcome.recipe_name(), Some("Research Report"));
}

#[test]
fn outcome_serializes_status_codes() {
    let payload = IntentPayload::new("schedule_meeting").with_entity("time", "2pm");
    let outcome = select_recipe(&office_catalog(), &payload);
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["status"], "missing_info");
    assert_eq!(json["suggested_next_steps"], "request_info");
}

// --- Determinism ---

const INTENTS: &[&str] = &[
    "schedule_meeting",
    "research",
    "document",
    "email_send",
    "create_report",
    "scheduling",
    "unknown",
];
const WORDS: &[&str] = &[
    "schedule", "meeting", "research", "report", "create", "document", "email", "send", "random",
];
const ENTITY_KEYS: &[&str] = &["time", "participants", "topic", "doc_type", "recipient"];

fn payload_strategy() -> impl Strategy<Value = IntentPayload> {
    (
        prop::sample::select(INTENTS),
        prop::collection::vec(prop::sample::select(INTENTS), 0..3),
        prop::collection::vec(prop::sample::select(WORDS), 0..5),
        prop::collection::vec(prop::sample::select(ENTITY_KEYS), 0..4),
    )
        .prop_map(|(intent, alternates, keywords, keys)| {
            let mut payload = IntentPayload::new(intent)
                .with_alternates(&alternates)
                .with_keywords(&keywords);
            for key in keys {
                payload = payload.with_entity(key, "value");
            }
            payload
        })
}

proptest! {
    #[test]
    fn matching_is_deterministic(payload in payload_strategy()) {
        let catalog = office_catalog();
        let first = select_recipe(&catalog, &payload);
        let second = select_recipe(&catalog, &payload);
        prop_assert_eq!(first.status, second.status);
        prop_assert_eq!(first.recipe_name(), second.recipe_name());
        prop_assert_eq!(first.missing_requirements, second.missing_requirements);
        prop_assert_eq!(first.score.to_bits(), second.score.to_bits());
    }
}
