//! Structured output of the intent/entity extractor, as consumed by the
//! matching engine and the request tracker.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Entities keyed by name. Ordered so that merges and snapshots are
/// deterministic.
pub type Entities = BTreeMap<String, EntityValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Text(String),
    List(Vec<String>),
}

impl EntityValue {
    pub fn is_empty(&self) -> bool {
        match self {
            EntityValue::Text(s) => s.trim().is_empty(),
            EntityValue::List(items) => items.iter().all(|i| i.trim().is_empty()),
        }
    }

    /// Lists become a trimmed, de-duplicated, sorted set without blanks.
    pub fn normalized(self) -> Self {
        match self {
            EntityValue::List(items) => EntityValue::List(sorted_set(items)),
            text => text,
        }
    }

    fn into_items(self) -> Vec<String> {
        match self {
            EntityValue::Text(s) => vec![s],
            EntityValue::List(items) => items,
        }
    }

    /// Merge an incoming value into this one. Empty incoming values never
    /// overwrite. If either side is a list the result is the sorted union.
    pub fn merge(&mut self, incoming: EntityValue) {
        if incoming.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = incoming.normalized();
            return;
        }
        let either_list =
            matches!(self, EntityValue::List(_)) || matches!(incoming, EntityValue::List(_));
        if either_list {
            let current = std::mem::replace(self, EntityValue::List(Vec::new()));
            let mut items = current.into_items();
            items.extend(incoming.into_items());
            *self = EntityValue::List(sorted_set(items));
        } else {
            *self = incoming;
        }
    }
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityValue::Text(s) => f.write_str(s),
            EntityValue::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

impl From<&str> for EntityValue {
    fn from(value: &str) -> Self {
        EntityValue::Text(value.to_string())
    }
}

impl From<Vec<&str>> for EntityValue {
    fn from(value: Vec<&str>) -> Self {
        EntityValue::List(value.into_iter().map(str::to_string).collect())
    }
}

fn sorted_set(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Key-by-key merge following the tracker's monotonicity rule.
pub fn merge_entities(existing: &mut Entities, incoming: Entities) {
    for (key, value) in incoming {
        match existing.get_mut(&key) {
            Some(current) => current.merge(value),
            None => {
                if !value.is_empty() {
                    existing.insert(key, value.normalized());
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    #[default]
    Success,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentPayload {
    #[serde(default)]
    pub status: ExtractionStatus,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub all_intents: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub needs_tracking: bool,
    /// NLP-derived urgency, used only when the inbound message carries no
    /// explicit priority.
    #[serde(default)]
    pub urgency: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl IntentPayload {
    pub fn new(intent: &str) -> Self {
        Self {
            intent: Some(intent.to_string()),
            ..Self::default()
        }
    }

    pub fn with_entity(mut self, key: &str, value: impl Into<EntityValue>) -> Self {
        self.entities.insert(key.to_string(), value.into());
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_alternates(mut self, intents: &[&str]) -> Self {
        self.all_intents = intents.iter().map(|k| k.to_string()).collect();
        self
    }

    /// The primary intent, normalized. `None` when absent or blank.
    pub fn primary_intent(&self) -> Option<String> {
        self.intent
            .as_deref()
            .map(normalize)
            .filter(|s| !s.is_empty())
    }

    /// Primary intent followed by alternates, normalized and de-duplicated.
    pub fn candidate_intents(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let all = self
            .intent
            .iter()
            .chain(self.all_intents.iter())
            .map(|s| normalize(s))
            .filter(|s| !s.is_empty());
        for intent in all {
            if !out.contains(&intent) {
                out.push(intent);
            }
        }
        out
    }

    pub fn keyword_set(&self) -> BTreeSet<String> {
        self.keywords
            .iter()
            .map(|k| normalize(k))
            .filter(|k| !k.is_empty())
            .collect()
    }
}

pub(crate) fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_incoming_never_overwrites() {
        let mut current = EntityValue::from("2pm");
        current.merge(EntityValue::from("  "));
        assert_eq!(current, EntityValue::from("2pm"));
        current.merge(EntityValue::List(vec![]));
        assert_eq!(current, EntityValue::from("2pm"));
    }

    #[test]
    fn populated_text_is_replaced_by_new_text() {
        let mut current = EntityValue::from("2pm");
        current.merge(EntityValue::from("3pm"));
        assert_eq!(current, EntityValue::from("3pm"));
    }

    #[test]
    fn lists_merge_as_sorted_union() {
        let mut current = EntityValue::from(vec!["@john", "@amy"]);
        current.merge(EntityValue::from(vec!["@bob", "@john"]));
        assert_eq!(current, EntityValue::from(vec!["@amy", "@bob", "@john"]));
    }

    #[test]
    fn text_and_list_merge_into_list() {
        let mut current = EntityValue::from("@john");
        current.merge(EntityValue::from(vec!["@amy"]));
        assert_eq!(current, EntityValue::from(vec!["@amy", "@john"]));
    }

    #[test]
    fn merge_entities_fills_absent_and_skips_empty() {
        let mut existing = Entities::new();
        existing.insert("time".into(), EntityValue::from("2pm"));
        let mut incoming = Entities::new();
        incoming.insert("time".into(), EntityValue::from(""));
        incoming.insert("topic".into(), EntityValue::from(""));
        incoming.insert("participants".into(), EntityValue::from(vec!["@john"]));
        merge_entities(&mut existing, incoming);
        assert_eq!(existing.get("time"), Some(&EntityValue::from("2pm")));
        assert!(!existing.contains_key("topic"));
        assert_eq!(
            existing.get("participants"),
            Some(&EntityValue::from(vec!["@john"]))
        );
    }

    #[test]
    fn first_insert_of_a_list_is_cleaned_like_a_merge() {
        let mut existing = Entities::new();
        let mut incoming = Entities::new();
        incoming.insert(
            "participants".into(),
            EntityValue::from(vec!["@john", "", " @amy ", "@john"]),
        );
        merge_entities(&mut existing, incoming);
        assert_eq!(
            existing["participants"],
            EntityValue::from(vec!["@amy", "@john"])
        );
        assert_eq!(existing["participants"].to_string(), "@amy, @john");

        let mut blank = EntityValue::from("");
        blank.merge(EntityValue::from(vec!["@bob", "", "@amy"]));
        assert_eq!(blank, EntityValue::from(vec!["@amy", "@bob"]));
    }

    #[test]
    fn candidate_intents_dedup_and_normalize() {
        let payload = IntentPayload::new(" Schedule_Meeting ")
            .with_alternates(&["schedule_meeting", "scheduling", ""]);
        assert_eq!(
            payload.candidate_intents(),
            vec!["schedule_meeting".to_string(), "scheduling".to_string()]
        );
    }

    #[test]
    fn payload_deserializes_mixed_entity_shapes() {
        let json = r#"{
            "status": "success",
            "intent": "schedule_meeting",
            "all_intents": ["scheduling"],
            "entities": {"time": "2pm", "participants": ["@john"]},
            "confidence": 0.9,
            "needs_tracking": true
        }"#;
        let payload: IntentPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.entities["time"], EntityValue::from("2pm"));
        assert_eq!(
            payload.entities["participants"],
            EntityValue::from(vec!["@john"])
        );
        assert!(payload.urgency.is_none());
    }
}
