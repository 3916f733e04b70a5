//! Recipe matching: scores an extracted intent payload against the catalog
//! and decides whether a recipe is ready to run, needs more information, or
//! is absent.

mod scoring;

pub use scoring::{ScoreBreakdown, similarity_ratio};

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::intent::{Entities, ExtractionStatus, IntentPayload};
use crate::core::recipe::{CatalogSnapshot, Recipe, RecipeCatalog};

/// Candidates below this total are discarded.
pub const SURVIVAL_THRESHOLD: f64 = 0.4;
/// A top candidate at or above this total is accepted outright.
pub const CONFIDENT_THRESHOLD: f64 = 0.8;
/// Minimum total for the fewest-missing-entities fallback.
pub const FALLBACK_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Success,
    MissingInfo,
    NotFound,
    Error,
}

/// Hint telling the caller how to proceed after a match attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NextStep {
    #[serde(rename = "execute_recipe")]
    ExecuteRecipe,
    #[serde(rename = "request_info")]
    RequestInfo,
    /// Escalate to the recipe synthesis path.
    #[serde(rename = "consult_ceo")]
    Escalate,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub status: MatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<Arc<Recipe>>,
    pub missing_requirements: Vec<String>,
    pub score: f64,
    pub suggested_next_steps: NextStep,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl MatchOutcome {
    fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: MatchStatus::NotFound,
            recipe: None,
            missing_requirements: Vec::new(),
            score: 0.0,
            suggested_next_steps: NextStep::Escalate,
            detail: Some(detail.into()),
        }
    }

    fn error(detail: impl Into<String>) -> Self {
        Self {
            status: MatchStatus::Error,
            ..Self::not_found(detail)
        }
    }

    fn for_recipe(recipe: Arc<Recipe>, score: f64, entities: &Entities) -> Self {
        let validation = validate_requirements(&recipe, entities);
        Self {
            status: validation.status,
            missing_requirements: validation.missing_requirements,
            suggested_next_steps: validation.suggested_next_steps,
            recipe: Some(recipe),
            score,
            detail: None,
        }
    }

    pub fn recipe_name(&self) -> Option<&str> {
        self.recipe.as_deref().map(|r| r.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementCheck {
    pub status: MatchStatus,
    pub missing_requirements: Vec<String>,
    pub suggested_next_steps: NextStep,
}

impl RequirementCheck {
    pub fn is_ready(&self) -> bool {
        self.status == MatchStatus::Success
    }
}

/// Check that every required entity is present and non-empty.
pub fn validate_requirements(recipe: &Recipe, entities: &Entities) -> RequirementCheck {
    let missing = scoring::missing_entities(recipe, entities);
    if missing.is_empty() {
        RequirementCheck {
            status: MatchStatus::Success,
            missing_requirements: missing,
            suggested_next_steps: NextStep::ExecuteRecipe,
        }
    } else {
        RequirementCheck {
            status: MatchStatus::MissingInfo,
            missing_requirements: missing,
            suggested_next_steps: NextStep::RequestInfo,
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    recipe: Arc<Recipe>,
    score: f64,
    missing: usize,
}

pub fn score_recipe(payload: &IntentPayload, recipe: &Recipe) -> ScoreBreakdown {
    let keywords = payload.keyword_set();
    ScoreBreakdown {
        intent: scoring::intent_score(&payload.candidate_intents(), &recipe.intent),
        keyword: scoring::keyword_score(&keywords, recipe),
        trigger: scoring::trigger_score(&keywords, recipe),
        entity: scoring::entity_score(&scoring::missing_entities(recipe, &payload.entities)),
    }
}

/// Score every recipe in `catalog` and apply the selection policy. Pure
/// function of its inputs.
pub fn select_recipe(catalog: &CatalogSnapshot, payload: &IntentPayload) -> MatchOutcome {
    if payload.status == ExtractionStatus::Error {
        let reason = payload
            .error
            .clone()
            .unwrap_or_else(|| "intent extraction failed".to_string());
        return MatchOutcome::error(reason);
    }
    let Some(primary) = payload.primary_intent() else {
        return MatchOutcome::not_found("payload carries no intent");
    };

    let mut candidates: Vec<Candidate> = Vec::new();
    for (name, recipe) in catalog.iter() {
        if recipe.intent.trim().is_empty() || recipe.steps.is_empty() {
            debug!(recipe = %name, "Skipping malformed catalog entry");
            continue;
        }
        let breakdown = score_recipe(payload, recipe);
        let total = breakdown.total();
        debug!(
            recipe = %name,
            intent = breakdown.intent,
            keyword = breakdown.keyword,
            trigger = breakdown.trigger,
            entity = breakdown.entity,
            total,
            "Scored recipe"
        );
        if total < SURVIVAL_THRESHOLD {
            continue;
        }
        candidates.push(Candidate {
            recipe: Arc::clone(recipe),
            score: total,
            missing: scoring::missing_entities(recipe, &payload.entities).len(),
        });
    }

    // Stable sort keeps catalog (name) order among equal scores.
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let Some(top) = candidates.first() else {
        info!(intent = %primary, "No recipe matched");
        return MatchOutcome::not_found(format!("no recipe matches intent `{}`", primary));
    };

    let chosen = if top.score >= CONFIDENT_THRESHOLD {
        Some(top)
    } else if let Some(exact) = candidates
        .iter()
        .find(|c| c.recipe.intent.trim().to_lowercase() == primary)
    {
        Some(exact)
    } else {
        candidates
            .iter()
            .filter(|c| c.score >= FALLBACK_THRESHOLD)
            .min_by(|a, b| {
                a.missing
                    .cmp(&b.missing)
                    .then_with(|| b.score.total_cmp(&a.score))
            })
    };

    match chosen {
        Some(c) => {
            info!(
                intent = %primary,
                recipe = %c.recipe.name,
                score = c.score,
                "Recipe selected"
            );
            MatchOutcome::for_recipe(Arc::clone(&c.recipe), c.score, &payload.entities)
        }
        None => {
            info!(intent = %primary, best = top.score, "Only low-confidence candidates");
            MatchOutcome::not_found(format!(
                "best candidate `{}` scored {:.2}, below the confidence floor",
                top.recipe.name, top.score
            ))
        }
    }
}

/// Matching front-end bound to a live catalog.
#[derive(Clone)]
pub struct MatchEngine {
    catalog: Arc<RecipeCatalog>,
}

impl MatchEngine {
    pub fn new(catalog: Arc<RecipeCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<RecipeCatalog> {
        &self.catalog
    }

    pub async fn match_payload(&self, payload: &IntentPayload) -> MatchOutcome {
        let snapshot = self.catalog.snapshot().await;
        select_recipe(&snapshot, payload)
    }
}

#[cfg(test)]
mod tests;
