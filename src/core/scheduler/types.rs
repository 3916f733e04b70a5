use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::intent::Entities;
use crate::core::recipe::Recipe;

/// Entities plus transport metadata a recipe runs against.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ExecutionContext {
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ExecutionContext {
    pub fn new(entities: Entities) -> Self {
        Self {
            entities,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Resolve a placeholder name. Entities shadow metadata.
    pub fn lookup(&self, name: &str) -> Option<String> {
        match self.entities.get(name) {
            Some(value) if !value.is_empty() => Some(value.to_string()),
            _ => self.metadata.get(name).cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResult {
    Success { details: String },
    Error { error: String },
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            TaskResult::Success { details } => details,
            TaskResult::Error { error } => error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub recipe: Arc<Recipe>,
    pub context: ExecutionContext,
    pub urgency: f64,
    pub queued_time: DateTime<Utc>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskHistoryEntry {
    pub task_id: String,
    pub recipe_name: String,
    pub request_id: Option<String>,
    pub urgency: f64,
    pub queued_time: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: TaskResult,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ActiveTask {
    pub task_id: String,
    pub recipe_name: String,
    pub urgency: f64,
    pub started_at: DateTime<Utc>,
}

/// Broadcast to subscribers after every task finishes.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub request_id: Option<String>,
    pub recipe_name: String,
    pub result: TaskResult,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmitError {
    #[error("urgency must be a finite number, got {0}")]
    InvalidUrgency(f64),
    #[error("recipe `{0}` has no steps to run")]
    EmptyRecipe(String),
    #[error("scheduler is shut down")]
    ShutDown,
}
