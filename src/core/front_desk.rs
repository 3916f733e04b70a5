//! One inbound turn end to end: track the conversation, match a recipe, ask
//! for what is missing, and hand ready work to the scheduler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::intent::IntentPayload;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::matcher::{MatchEngine, MatchStatus, NextStep, validate_requirements};
use crate::core::recipe::{Recipe, RecipeError};
use crate::core::requests::{
    LifecycleError, Request, RequestStatus, RequestTracker, RequestTurn,
};
use crate::core::scheduler::{ExecutionContext, TaskResult, TaskScheduler};

pub const DEFAULT_URGENCY: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel_id: String,
    pub user_id: String,
    #[serde(default)]
    pub text: String,
    /// Caller-supplied priority. Overrides any NLP-derived urgency.
    #[serde(default)]
    pub priority: Option<f64>,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

/// Produces a brand-new recipe for a request the catalog cannot serve.
#[async_trait]
pub trait RecipeSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, payload: &IntentPayload) -> Option<Recipe>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub request_id: String,
    pub status: RequestStatus,
    pub suggested_next_steps: NextStep,
    pub missing_requirements: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub success_criteria: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Reply {
    fn for_request(request: &Request, next: NextStep, detail: Option<String>) -> Self {
        Self {
            request_id: request.id.clone(),
            status: request.status,
            suggested_next_steps: next,
            missing_requirements: request.missing_entities.clone(),
            recipe: request.recipe.as_ref().map(|r| r.name.clone()),
            task_id: request.task_id.clone(),
            success_criteria: request
                .recipe
                .as_ref()
                .map(|r| r.success_criteria.clone())
                .unwrap_or_default(),
            detail,
        }
    }
}

/// Explicit priority first, then NLP urgency, then the configured default.
/// Non-finite values are ignored.
pub fn resolve_urgency(explicit: Option<f64>, nlp: Option<f64>, default: f64) -> f64 {
    explicit
        .filter(|u| u.is_finite())
        .or_else(|| nlp.filter(|u| u.is_finite()))
        .unwrap_or(default)
}

/// What one maintenance pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: Vec<String>,
    pub recovered: Vec<String>,
}

pub struct FrontDesk {
    engine: MatchEngine,
    tracker: Arc<RequestTracker>,
    scheduler: TaskScheduler,
    synthesizer: Option<Arc<dyn RecipeSynthesizer>>,
    default_urgency: f64,
}

impl FrontDesk {
    pub fn new(
        engine: MatchEngine,
        tracker: Arc<RequestTracker>,
        scheduler: TaskScheduler,
    ) -> Self {
        Self {
            engine,
            tracker,
            scheduler,
            synthesizer: None,
            default_urgency: DEFAULT_URGENCY,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn RecipeSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_default_urgency(mut self, urgency: f64) -> Self {
        self.default_urgency = urgency;
        self
    }

    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    pub fn tracker(&self) -> &Arc<RequestTracker> {
        &self.tracker
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub async fn handle(&self, message: InboundMessage, payload: IntentPayload) -> Reply {
        let mut turn = self
            .tracker
            .begin_turn(&message.channel_id, &message.user_id, &message.text)
            .await;
        if let Some(priority) = message.priority.filter(|p| p.is_finite()) {
            turn.priority = priority;
        }

        let status = turn.status;
        let reply = match status {
            RequestStatus::New => self.open(&mut turn, &message, payload).await,
            RequestStatus::WaitingForInfo => self.follow_up(&mut turn, &message, payload).await,
            _ => Reply::for_request(
                &turn,
                NextStep::ExecuteRecipe,
                Some("request is already being processed".to_string()),
            ),
        };
        self.tracker.finish(turn).await;
        reply
    }

    async fn open(
        &self,
        turn: &mut RequestTurn,
        message: &InboundMessage,
        payload: IntentPayload,
    ) -> Reply {
        turn.priority = resolve_urgency(message.priority, payload.urgency, self.default_urgency);
        turn.intent = payload.primary_intent();
        turn.merge_entities(payload.entities.clone());

        let outcome = self.engine.match_payload(&payload).await;
        match (outcome.status, outcome.recipe) {
            (MatchStatus::Success | MatchStatus::MissingInfo, Some(recipe)) => {
                self.advance(turn, recipe, message).await
            }
            (MatchStatus::Error, _) => {
                let detail = outcome
                    .detail
                    .unwrap_or_else(|| "intent extraction failed".to_string());
                fail(turn, outcome.suggested_next_steps, detail)
            }
            _ => match self.synthesize(&message.text, &payload).await {
                Some(recipe) => self.advance(turn, recipe, message).await,
                None => {
                    let detail = outcome
                        .detail
                        .unwrap_or_else(|| "no matching recipe".to_string());
                    fail(turn, NextStep::Escalate, detail)
                }
            },
        }
    }

    async fn follow_up(
        &self,
        turn: &mut RequestTurn,
        message: &InboundMessage,
        payload: IntentPayload,
    ) -> Reply {
        turn.merge_entities(payload.entities.clone());
        match turn.recipe.clone() {
            Some(recipe) => self.advance(turn, recipe, message).await,
            None => self.open(turn, message, payload).await,
        }
    }

    /// Attach `recipe` and either wait for missing entities or dispatch.
    async fn advance(
        &self,
        turn: &mut RequestTurn,
        recipe: Arc<Recipe>,
        message: &InboundMessage,
    ) -> Reply {
        turn.recipe = Some(Arc::clone(&recipe));
        let check = validate_requirements(&recipe, &turn.entities);
        turn.missing_entities = check.missing_requirements;
        if !turn.missing_entities.is_empty() {
            if let Err(e) = turn.transition(RequestStatus::WaitingForInfo) {
                return fail(turn, NextStep::Escalate, e.to_string());
            }
            info!(
                "Request {} waiting for {:?}",
                turn.id, turn.missing_entities
            );
            return Reply::for_request(turn, NextStep::RequestInfo, None);
        }

        let mut context = ExecutionContext::new(turn.entities.clone())
            .with_metadata("channel_id", message.channel_id.as_str())
            .with_metadata("user_id", message.user_id.as_str())
            .with_metadata("request_id", turn.id.as_str());
        if let Some(thread_ts) = &message.thread_ts {
            context = context.with_metadata("thread_ts", thread_ts.as_str());
        }

        if let Err(e) = turn.transition(RequestStatus::Processing) {
            return fail(turn, NextStep::Escalate, e.to_string());
        }
        match self
            .scheduler
            .submit(recipe, context, turn.priority, Some(turn.id.clone()))
            .await
        {
            Ok(task_id) => {
                turn.task_id = Some(task_id);
                Reply::for_request(turn, NextStep::ExecuteRecipe, None)
            }
            Err(e) => fail(turn, NextStep::Escalate, e.to_string()),
        }
    }

    async fn synthesize(&self, text: &str, payload: &IntentPayload) -> Option<Arc<Recipe>> {
        let synthesizer = self.synthesizer.as_ref()?;
        let recipe = synthesizer.synthesize(text, payload).await?;
        let name = recipe.name.clone();
        let catalog = self.engine.catalog();
        match catalog.add(recipe).await {
            Ok(outcome) => {
                info!("Synthesized recipe {} ({:?})", name, outcome);
                catalog.get(&name).await
            }
            Err(RecipeError::Duplicate(_)) => catalog.get(&name).await,
            Err(e) => {
                warn!("Synthesized recipe {} rejected: {}", name, e);
                None
            }
        }
    }

    /// Resolve `processing` requests whose task already finished but whose
    /// outcome never reached the tracker.
    pub async fn reconcile_outcomes(&self) -> Vec<String> {
        reconcile_outcomes(&self.tracker, &self.scheduler).await
    }

    /// Periodic maintenance: time out idle requests, then recover lost
    /// task outcomes.
    pub async fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            timed_out: self.tracker.sweep_expired().await,
            recovered: self.reconcile_outcomes().await,
        };
        if !report.timed_out.is_empty() || !report.recovered.is_empty() {
            info!(
                "Sweep timed out {} and recovered {} request(s)",
                report.timed_out.len(),
                report.recovered.len()
            );
        }
        report
    }

    /// Feed scheduler outcomes back into the tracker until `cancel` fires.
    pub fn spawn_outcome_listener(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let mut outcomes = self.scheduler.subscribe();
        let tracker = Arc::clone(&self.tracker);
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            loop {
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = outcomes.recv() => received,
                };
                match outcome {
                    Ok(outcome) => {
                        let Some(request_id) = outcome.request_id else {
                            continue;
                        };
                        match tracker.record_task_result(&request_id, &outcome.result).await {
                            Ok(status) => info!("Request {} is now {}", request_id, status),
                            Err(LifecycleError::NotActive(_)) => {
                                debug!("Request {} was already resolved", request_id)
                            }
                            Err(e) => warn!("Could not record task {}: {}", outcome.task_id, e),
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Outcome listener fell behind, skipped {} outcomes", skipped);
                        let recovered = reconcile_outcomes(&tracker, &scheduler).await;
                        info!("Recovered {} request(s) from task history", recovered.len());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Runs the outcome listener for the lifetime of the service.
pub struct OutcomeRelay {
    desk: Arc<FrontDesk>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl OutcomeRelay {
    pub fn new(desk: Arc<FrontDesk>) -> Self {
        Self {
            desk,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }
}

#[async_trait]
impl LifecycleComponent for OutcomeRelay {
    async fn on_start(&mut self) -> anyhow::Result<()> {
        if self.handle.is_none() {
            self.handle = Some(self.desk.spawn_outcome_listener(self.cancel.clone()));
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> anyhow::Result<()> {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await?;
        }
        Ok(())
    }
}

async fn reconcile_outcomes(tracker: &RequestTracker, scheduler: &TaskScheduler) -> Vec<String> {
    let mut recovered = Vec::new();
    for (request_id, task_id) in tracker.processing_tasks().await {
        if scheduler.is_pending(&task_id).await {
            continue;
        }
        // Trimmed out of the history before anyone read it.
        let result = scheduler
            .task_result(&task_id)
            .await
            .unwrap_or_else(|| TaskResult::Error {
                error: format!("outcome of task {} was lost", task_id),
            });
        match tracker.record_task_result(&request_id, &result).await {
            Ok(status) => {
                info!("Recovered request {} as {}", request_id, status);
                recovered.push(request_id);
            }
            Err(e) => debug!("Request {} not recovered: {}", request_id, e),
        }
    }
    recovered
}

fn fail(turn: &mut RequestTurn, next: NextStep, detail: String) -> Reply {
    warn!("Request {} failed: {}", turn.id, detail);
    if let Err(e) = turn.finish_with(RequestStatus::Error, detail.clone()) {
        warn!("{}", e);
    }
    Reply::for_request(turn, next, Some(detail))
}
