//! Per-recipe scoring components. All functions are pure and deterministic.

use std::collections::BTreeSet;

use crate::core::intent::{Entities, normalize};
use crate::core::recipe::Recipe;

pub const INTENT_WEIGHT: f64 = 0.4;
pub const KEYWORD_WEIGHT: f64 = 0.2;
pub const TRIGGER_WEIGHT: f64 = 0.2;
pub const ENTITY_WEIGHT: f64 = 0.2;

const EXACT_INTENT: f64 = 1.0;
const CONTAINED_INTENT: f64 = 0.8;
const HIGH_VALUE_BOOST: f64 = 0.2;
const INCOMPLETE_ENTITIES: f64 = 0.5;

/// Keywords whose presence in a match signals a strong fit.
const HIGH_VALUE_KEYWORDS: &[&str] = &[
    "schedule", "meeting", "email", "report", "research", "document", "urgent",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub intent: f64,
    pub keyword: f64,
    pub trigger: f64,
    pub entity: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        INTENT_WEIGHT * self.intent
            + KEYWORD_WEIGHT * self.keyword
            + TRIGGER_WEIGHT * self.trigger
            + ENTITY_WEIGHT * self.entity
    }
}

/// Normalized edit-distance similarity in `[0, 1]`.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    1.0 - prev[b.len()] as f64 / longest as f64
}

pub fn intent_score(candidates: &[String], recipe_intent: &str) -> f64 {
    let target = normalize(recipe_intent);
    candidates
        .iter()
        .map(|candidate| {
            if *candidate == target {
                EXACT_INTENT
            } else if candidate.contains(&target) || target.contains(candidate.as_str()) {
                CONTAINED_INTENT
            } else {
                similarity_ratio(candidate, &target)
            }
        })
        .fold(0.0, f64::max)
}

pub fn keyword_score(keywords: &BTreeSet<String>, recipe: &Recipe) -> f64 {
    let recipe_keywords: BTreeSet<String> = recipe
        .keywords
        .iter()
        .map(|k| normalize(k))
        .filter(|k| !k.is_empty())
        .collect();
    if recipe_keywords.is_empty() {
        return 0.0;
    }
    let matched: Vec<&String> = keywords.intersection(&recipe_keywords).collect();
    let mut score = matched.len() as f64 / recipe_keywords.len() as f64;
    if matched
        .iter()
        .any(|k| HIGH_VALUE_KEYWORDS.contains(&k.as_str()))
    {
        score = (score + HIGH_VALUE_BOOST).min(1.0);
    }
    score
}

pub fn trigger_score(keywords: &BTreeSet<String>, recipe: &Recipe) -> f64 {
    recipe
        .common_triggers
        .iter()
        .filter_map(|trigger| {
            let words: BTreeSet<String> = trigger.split_whitespace().map(normalize).collect();
            if words.is_empty() {
                return None;
            }
            Some(keywords.intersection(&words).count() as f64 / words.len() as f64)
        })
        .fold(0.0, f64::max)
}

/// Required entities that are absent or empty, in recipe order.
pub fn missing_entities(recipe: &Recipe, entities: &Entities) -> Vec<String> {
    recipe
        .required_entities
        .iter()
        .filter(|name| entities.get(*name).is_none_or(|v| v.is_empty()))
        .cloned()
        .collect()
}

pub fn entity_score(missing: &[String]) -> f64 {
    if missing.is_empty() {
        1.0
    } else {
        INCOMPLETE_ENTITIES
    }
}
