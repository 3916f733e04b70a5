use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::intent::{Entities, merge_entities};
use crate::core::recipe::Recipe;

pub const DEFAULT_PRIORITY: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    New,
    WaitingForInfo,
    Processing,
    Completed,
    Error,
    Timeout,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::New => "new",
            RequestStatus::WaitingForInfo => "waiting_for_info",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Error => "error",
            RequestStatus::Timeout => "timeout",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "new" => Some(RequestStatus::New),
            "waiting_for_info" => Some(RequestStatus::WaitingForInfo),
            "processing" => Some(RequestStatus::Processing),
            "completed" => Some(RequestStatus::Completed),
            "error" => Some(RequestStatus::Error),
            "timeout" => Some(RequestStatus::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Error | RequestStatus::Timeout
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn can_transition(from: RequestStatus, to: RequestStatus) -> bool {
    if from.is_terminal() {
        return false;
    }
    if from == to {
        return true;
    }
    match from {
        RequestStatus::New => matches!(
            to,
            RequestStatus::WaitingForInfo
                | RequestStatus::Processing
                | RequestStatus::Error
                | RequestStatus::Timeout
        ),
        RequestStatus::WaitingForInfo => matches!(
            to,
            RequestStatus::Processing | RequestStatus::Error | RequestStatus::Timeout
        ),
        RequestStatus::Processing => matches!(
            to,
            RequestStatus::Completed | RequestStatus::Error | RequestStatus::Timeout
        ),
        RequestStatus::Completed | RequestStatus::Error | RequestStatus::Timeout => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("request {id} is {current} and cannot move to {requested}")]
    IllegalTransition {
        id: String,
        current: RequestStatus,
        requested: RequestStatus,
    },
    #[error("request {0} is not active")]
    NotActive(String),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversationTurn {
    pub text: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
}

/// (channel_id, user_id)
pub type ConversationKey = (String, String);

#[derive(Debug, Clone, serde::Serialize)]
pub struct Request {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub status: RequestStatus,
    pub intent: Option<String>,
    pub entities: Entities,
    pub missing_entities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<Arc<Recipe>>,
    pub priority: f64,
    pub history: Vec<ConversationTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Final detail string once the request reaches a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<String>,
}

impl Request {
    pub fn new(channel_id: &str, user_id: &str, text: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
            created_at: now,
            last_updated: now,
            status: RequestStatus::New,
            intent: None,
            entities: Entities::new(),
            missing_entities: Vec::new(),
            recipe: None,
            priority: DEFAULT_PRIORITY,
            history: Vec::new(),
            task_id: None,
            completion: None,
        }
    }

    pub fn key(&self) -> ConversationKey {
        (self.channel_id.clone(), self.user_id.clone())
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    pub fn record_turn(&mut self, text: &str, is_user: bool) {
        let now = Utc::now();
        self.history.push(ConversationTurn {
            text: text.to_string(),
            is_user,
            timestamp: now,
        });
        self.last_updated = now;
    }

    /// Merge a follow-up turn's entities. Populated values survive unless the
    /// incoming value is itself non-empty.
    pub fn merge_entities(&mut self, incoming: Entities) {
        merge_entities(&mut self.entities, incoming);
        self.touch();
    }

    pub fn transition(&mut self, to: RequestStatus) -> Result<(), LifecycleError> {
        if !can_transition(self.status, to) {
            return Err(LifecycleError::IllegalTransition {
                id: self.id.clone(),
                current: self.status,
                requested: to,
            });
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    /// Move to a terminal state, recording the final detail.
    pub fn finish_with(
        &mut self,
        to: RequestStatus,
        detail: impl Into<String>,
    ) -> Result<(), LifecycleError> {
        self.transition(to)?;
        self.completion = Some(detail.into());
        Ok(())
    }

    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            request_id: self.id.clone(),
            status: self.status,
            intent: self.intent.clone(),
            entities: self.entities.clone(),
            priority: self.priority,
            created_at: self.created_at,
            last_updated: self.last_updated,
            conversation_length: self.history.len(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RequestSummary {
    pub request_id: String,
    pub status: RequestStatus,
    pub intent: Option<String>,
    pub entities: Entities,
    pub priority: f64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub conversation_length: usize,
}
