//! Step handlers. `api_call` steps dispatch by action name through an
//! [`ActionRegistry`]; queries and notifications each go to a single handler.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

use super::StepError;
use super::template::has_placeholder;
use crate::core::scheduler::types::ExecutionContext;

pub type Params = BTreeMap<String, String>;

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(&self, params: &Params, context: &ExecutionContext)
    -> Result<String, StepError>;
}

#[async_trait]
pub trait QueryHandler: Send + Sync {
    async fn query(&self, query_type: &str, params: &Params) -> Result<String, StepError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, context: &ExecutionContext)
    -> Result<String, StepError>;
}

fn require<'a>(action: &str, params: &'a Params, key: &str) -> Result<&'a str, StepError> {
    let value = params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StepError::MissingParam {
            action: action.to_string(),
            param: key.to_string(),
        })?;
    if has_placeholder(value) {
        return Err(StepError::UnresolvedParam {
            action: action.to_string(),
            param: key.to_string(),
        });
    }
    Ok(value)
}

// --- Built-in actions (simulated external systems) ---

pub struct CheckAvailability;

#[async_trait]
impl ActionHandler for CheckAvailability {
    async fn call(
        &self,
        params: &Params,
        _context: &ExecutionContext,
    ) -> Result<String, StepError> {
        let time = require("check_availability", params, "time")?;
        let participants = require("check_availability", params, "participants")?;
        Ok(format!("{} available at {}", participants, time))
    }
}

pub struct CreateMeeting;

#[async_trait]
impl ActionHandler for CreateMeeting {
    async fn call(
        &self,
        params: &Params,
        _context: &ExecutionContext,
    ) -> Result<String, StepError> {
        let time = require("create_meeting", params, "time")?;
        let participants = require("create_meeting", params, "participants")?;
        let title = params
            .get("title")
            .filter(|t| !t.trim().is_empty() && !has_placeholder(t))
            .map(String::as_str)
            .unwrap_or("Meeting");
        info!("Creating meeting '{}' at {} with {}", title, time, participants);
        Ok(format!("Meeting '{}' created for {} with {}", title, time, participants))
    }
}

pub struct SendEmail;

#[async_trait]
impl ActionHandler for SendEmail {
    async fn call(
        &self,
        params: &Params,
        _context: &ExecutionContext,
    ) -> Result<String, StepError> {
        let to = require("send_email", params, "to")?;
        let subject = require("send_email", params, "subject")?;
        info!("Sending email to {}: {}", to, subject);
        Ok(format!("Email '{}' sent to {}", subject, to))
    }
}

/// Logs the query and reports it as executed.
pub struct LoggingQueryHandler;

#[async_trait]
impl QueryHandler for LoggingQueryHandler {
    async fn query(&self, query_type: &str, params: &Params) -> Result<String, StepError> {
        if query_type.trim().is_empty() {
            return Err(StepError::Failed("database query has no query type".into()));
        }
        info!("Running query {} with {:?}", query_type, params);
        Ok(format!("Query {} completed", query_type))
    }
}

pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, message: &str, context: &ExecutionContext) -> Result<String, StepError> {
        let channel = context
            .metadata
            .get("channel_id")
            .map(String::as_str)
            .unwrap_or("-");
        info!(channel = %channel, "Notification: {}", message);
        Ok(format!("Notified: {}", message))
    }
}

#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("check_availability", Arc::new(CheckAvailability));
        registry.register("create_meeting", Arc::new(CreateMeeting));
        registry.register("send_email", Arc::new(SendEmail));
        registry
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn builtins_are_registered() {
        assert_eq!(
            ActionRegistry::with_builtins().names(),
            vec!["check_availability", "create_meeting", "send_email"]
        );
    }

    #[tokio::test]
    async fn send_email_requires_recipient() {
        let ctx = ExecutionContext::default();
        let err = SendEmail
            .call(&params(&[("subject", "hi")]), &ctx)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StepError::MissingParam {
                action: "send_email".into(),
                param: "to".into()
            }
        );
    }

    #[tokio::test]
    async fn unresolved_placeholder_is_rejected() {
        let ctx = ExecutionContext::default();
        let err = CreateMeeting
            .call(
                &params(&[("time", "{time}"), ("participants", "@john")]),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::UnresolvedParam { .. }));
    }

    #[tokio::test]
    async fn create_meeting_reports_details() {
        let ctx = ExecutionContext::default();
        let out = CreateMeeting
            .call(&params(&[("time", "2pm"), ("participants", "@john")]), &ctx)
            .await
            .unwrap();
        assert_eq!(out, "Meeting 'Meeting' created for 2pm with @john");
    }
}
