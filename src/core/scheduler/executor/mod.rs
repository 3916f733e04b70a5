//! Recipe execution. Steps run strictly in order; the first failing step
//! aborts the rest of the recipe.

mod actions;
pub mod template;

pub use actions::{
    ActionHandler, ActionRegistry, CheckAvailability, CreateMeeting, LoggingQueryHandler,
    Notifier, Params, QueryHandler, SendEmail, TracingNotifier,
};

use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::recipe::{Recipe, RecipeStep, StepKind};
use crate::core::scheduler::types::{ExecutionContext, TaskResult};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("unknown step type `{0}`")]
    UnknownKind(String),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("{action}: missing parameter `{param}`")]
    MissingParam { action: String, param: String },
    #[error("{action}: parameter `{param}` was never resolved")]
    UnresolvedParam { action: String, param: String },
    #[error("{0}")]
    Failed(String),
}

#[derive(Clone)]
pub struct StepExecutor {
    actions: ActionRegistry,
    queries: Arc<dyn QueryHandler>,
    notifier: Arc<dyn Notifier>,
}

impl Default for StepExecutor {
    fn default() -> Self {
        Self::new(
            ActionRegistry::with_builtins(),
            Arc::new(LoggingQueryHandler),
            Arc::new(TracingNotifier),
        )
    }
}

impl StepExecutor {
    pub fn new(
        actions: ActionRegistry,
        queries: Arc<dyn QueryHandler>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            actions,
            queries,
            notifier,
        }
    }

    pub async fn execute_step(
        &self,
        step: &RecipeStep,
        context: &ExecutionContext,
    ) -> Result<String, StepError> {
        let params = template::render_params(&step.params, context);
        match &step.kind {
            StepKind::ApiCall => {
                let handler = self
                    .actions
                    .get(&step.action)
                    .ok_or_else(|| StepError::UnknownAction(step.action.clone()))?;
                handler.call(&params, context).await
            }
            StepKind::DatabaseQuery => self.queries.query(&step.action, &params).await,
            StepKind::Notification => {
                let message = step
                    .message
                    .as_deref()
                    .or_else(|| params.get("message").map(String::as_str))
                    .unwrap_or_default();
                let message = template::render(message, context);
                self.notifier.notify(&message, context).await
            }
            StepKind::Unrecognized(kind) => Err(StepError::UnknownKind(kind.clone())),
        }
    }

    pub async fn run_recipe(&self, recipe: &Recipe, context: &ExecutionContext) -> TaskResult {
        let mut details = Vec::with_capacity(recipe.steps.len());
        for (index, step) in recipe.steps.iter().enumerate() {
            match self.execute_step(step, context).await {
                Ok(detail) => {
                    debug!("{} step {} ok: {}", recipe.name, index + 1, detail);
                    details.push(format!("Step {}: {}", index + 1, detail));
                }
                Err(e) => {
                    warn!("{} step {} failed: {}", recipe.name, index + 1, e);
                    return TaskResult::Error {
                        error: format!(
                            "Step {} ({}) failed: {}",
                            index + 1,
                            step.kind.as_str(),
                            e
                        ),
                    };
                }
            }
        }
        TaskResult::Success {
            details: details.join("\n"),
        }
    }
}
