mod catalog;
mod default_recipes;

pub use catalog::{AddOutcome, CatalogSnapshot, RecipeCatalog};
pub use default_recipes::default_recipes;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_STEPS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    ApiCall,
    DatabaseQuery,
    Notification,
    /// A kind tag this build has no handler for. Accepted on the wire so the
    /// executor can report it as a step failure.
    Unrecognized(String),
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            StepKind::ApiCall => "api_call",
            StepKind::DatabaseQuery => "database_query",
            StepKind::Notification => "notification",
            StepKind::Unrecognized(kind) => kind,
        }
    }
}

impl From<String> for StepKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "api_call" => StepKind::ApiCall,
            "database_query" => StepKind::DatabaseQuery,
            "notification" => StepKind::Notification,
            _ => StepKind::Unrecognized(value),
        }
    }
}

impl From<StepKind> for String {
    fn from(value: StepKind) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeStep {
    #[serde(rename = "type", default = "missing_kind")]
    pub kind: StepKind,
    /// Action name for `api_call`, query type for `database_query`.
    #[serde(default, alias = "name", alias = "query_type")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn missing_kind() -> StepKind {
    StepKind::Unrecognized(String::new())
}

impl RecipeStep {
    pub fn api_call(action: &str, params: &[(&str, &str)]) -> Self {
        Self::with_kind(StepKind::ApiCall, action, params)
    }

    pub fn database_query(query_type: &str, params: &[(&str, &str)]) -> Self {
        Self::with_kind(StepKind::DatabaseQuery, query_type, params)
    }

    pub fn notification(message: &str) -> Self {
        let mut step = Self::with_kind(StepKind::Notification, "notify", &[]);
        step.message = Some(message.to_string());
        step
    }

    pub fn with_kind(kind: StepKind, action: &str, params: &[(&str, &str)]) -> Self {
        Self {
            kind,
            action: action.to_string(),
            endpoint: None,
            message: None,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// A named, parameterized workflow. Immutable once registered; a new version
/// is a fresh insert under the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<RecipeStep>,
    #[serde(default)]
    pub required_entities: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub common_triggers: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecipeError {
    #[error("recipe is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("recipe `{0}` has no steps")]
    NoSteps(String),
    #[error("recipe `{name}` has {count} steps, the limit is {max}", max = MAX_STEPS)]
    TooManySteps { name: String, count: usize },
    #[error("step {index} of `{name}` is malformed: {reason}")]
    MalformedStep {
        name: String,
        index: usize,
        reason: String,
    },
    #[error("step {index} of `{name}` refers back to the recipe itself")]
    SelfReference { name: String, index: usize },
    #[error("required entity name `{0}` is not a lowercase identifier")]
    InvalidEntityName(String),
    #[error("recipe `{0}` is already registered with identical content")]
    Duplicate(String),
}

fn is_entity_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl Recipe {
    /// Check the structural contract every catalog recipe must satisfy.
    pub fn validate(&self) -> Result<(), RecipeError> {
        if self.name.trim().is_empty() {
            return Err(RecipeError::MissingField("name"));
        }
        if self.intent.trim().is_empty() {
            return Err(RecipeError::MissingField("intent"));
        }
        if self.description.trim().is_empty() {
            return Err(RecipeError::MissingField("description"));
        }
        if self.steps.is_empty() {
            return Err(RecipeError::NoSteps(self.name.clone()));
        }
        if self.steps.len() > MAX_STEPS {
            return Err(RecipeError::TooManySteps {
                name: self.name.clone(),
                count: self.steps.len(),
            });
        }

        let self_refs = [self.name.to_lowercase(), self.intent.to_lowercase()];
        for (index, step) in self.steps.iter().enumerate() {
            let malformed = |reason: String| RecipeError::MalformedStep {
                name: self.name.clone(),
                index,
                reason,
            };
            match &step.kind {
                StepKind::Unrecognized(kind) if kind.is_empty() => {
                    return Err(malformed("missing step type".to_string()));
                }
                StepKind::Unrecognized(kind) => {
                    return Err(malformed(format!("unknown step type `{}`", kind)));
                }
                StepKind::ApiCall if step.action.trim().is_empty() => {
                    return Err(malformed("api_call step has no action".to_string()));
                }
                _ => {}
            }
            let refers_back = [Some(&step.action), step.endpoint.as_ref()]
                .into_iter()
                .flatten()
                .any(|target| self_refs.contains(&target.trim().to_lowercase()));
            if refers_back {
                return Err(RecipeError::SelfReference {
                    name: self.name.clone(),
                    index,
                });
            }
        }

        if let Some(bad) = self
            .required_entities
            .iter()
            .find(|e| !is_entity_identifier(e))
        {
            return Err(RecipeError::InvalidEntityName(bad.clone()));
        }
        Ok(())
    }
}
