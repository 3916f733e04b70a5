//! Priority task scheduler. Submissions may arrive from any number of
//! callers; a single worker drains the queue in urgency order and runs one
//! recipe at a time.

pub mod executor;
mod queue;
pub mod types;

pub use executor::{StepError, StepExecutor};
pub use types::{
    ActiveTask, ExecutionContext, SubmitError, Task, TaskHistoryEntry, TaskOutcome, TaskResult,
};

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::bounded::BoundedLog;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::recipe::Recipe;
use queue::TaskQueue;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;
const OUTCOME_CHANNEL_CAPACITY: usize = 256;

struct Shared {
    queue: Mutex<TaskQueue>,
    wake: Notify,
    paused: watch::Sender<bool>,
    cancel: CancellationToken,
    history: Mutex<BoundedLog<TaskHistoryEntry>>,
    active: Mutex<Option<ActiveTask>>,
    outcomes: broadcast::Sender<TaskOutcome>,
    executor: Arc<StepExecutor>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct TaskScheduler {
    shared: Arc<Shared>,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(StepExecutor::default(), DEFAULT_HISTORY_CAPACITY)
    }
}

impl TaskScheduler {
    pub fn new(executor: StepExecutor, history_capacity: usize) -> Self {
        let (paused, _) = watch::channel(false);
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(TaskQueue::default()),
                wake: Notify::new(),
                paused,
                cancel: CancellationToken::new(),
                history: Mutex::new(BoundedLog::new(history_capacity)),
                active: Mutex::new(None),
                outcomes,
                executor: Arc::new(executor),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Queue a recipe for execution. Returns the new task id.
    pub async fn submit(
        &self,
        recipe: Arc<Recipe>,
        context: ExecutionContext,
        urgency: f64,
        request_id: Option<String>,
    ) -> Result<String, SubmitError> {
        if !urgency.is_finite() {
            return Err(SubmitError::InvalidUrgency(urgency));
        }
        if self.shared.cancel.is_cancelled() {
            return Err(SubmitError::ShutDown);
        }
        if recipe.steps.is_empty() {
            return Err(SubmitError::EmptyRecipe(recipe.name.clone()));
        }

        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            recipe,
            context,
            urgency,
            queued_time: Utc::now(),
            request_id,
        };
        let id = task.id.clone();
        info!(
            "Queued task {} ({}) with urgency {}",
            id, task.recipe.name, urgency
        );
        self.shared.queue.lock().await.push(task);
        self.shared.wake.notify_one();
        Ok(id)
    }

    /// Spawn the worker. Calling this more than once has no effect.
    pub async fn start(&self) {
        let mut worker = self.shared.worker.lock().await;
        if worker.is_some() {
            return;
        }
        info!("Task scheduler worker starting");
        let shared = Arc::clone(&self.shared);
        *worker = Some(tokio::spawn(run_worker(shared)));
    }

    /// Hold the worker after its current task. Queued work is kept.
    pub fn pause(&self) {
        self.shared.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.shared.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    /// Stop accepting work and wait for the worker to exit. A task already
    /// running is allowed to finish.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        let handle = self.shared.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Scheduler worker ended abnormally: {}", e);
            }
        }
        info!("Task scheduler stopped");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskOutcome> {
        self.shared.outcomes.subscribe()
    }

    /// The newest `limit` history entries, oldest first.
    pub async fn get_task_history(&self, limit: usize) -> Vec<TaskHistoryEntry> {
        self.shared.history.lock().await.tail(limit)
    }

    pub async fn active_task(&self) -> Option<ActiveTask> {
        self.shared.active.lock().await.clone()
    }

    pub async fn queued_len(&self) -> usize {
        self.shared.queue.lock().await.len()
    }

    /// True while `task_id` is queued or running. Checked under the queue
    /// lock so a task being claimed is never missed.
    pub async fn is_pending(&self, task_id: &str) -> bool {
        let queue = self.shared.queue.lock().await;
        if queue.contains(task_id) {
            return true;
        }
        let active = self.shared.active.lock().await;
        active.as_ref().is_some_and(|a| a.task_id == task_id)
    }

    /// Result of a finished task, if it is still in the history.
    pub async fn task_result(&self, task_id: &str) -> Option<TaskResult> {
        self.shared
            .history
            .lock()
            .await
            .iter()
            .rev()
            .find(|e| e.task_id == task_id)
            .map(|e| e.result.clone())
    }
}

#[async_trait::async_trait]
impl LifecycleComponent for TaskScheduler {
    async fn on_start(&mut self) -> anyhow::Result<()> {
        self.start().await;
        Ok(())
    }

    async fn on_shutdown(&mut self) -> anyhow::Result<()> {
        self.shutdown().await;
        Ok(())
    }
}

async fn run_worker(shared: Arc<Shared>) {
    let mut paused = shared.paused.subscribe();
    loop {
        if shared.cancel.is_cancelled() {
            break;
        }
        if *paused.borrow_and_update() {
            tokio::select! {
                _ = shared.cancel.cancelled() => break,
                _ = paused.changed() => continue,
            }
        }

        // Claimed under the queue lock so a task is always either queued or active.
        let next = {
            let mut queue = shared.queue.lock().await;
            let task = queue.pop();
            if let Some(task) = &task {
                *shared.active.lock().await = Some(ActiveTask {
                    task_id: task.id.clone(),
                    recipe_name: task.recipe.name.clone(),
                    urgency: task.urgency,
                    started_at: Utc::now(),
                });
            }
            task
        };
        let Some(task) = next else {
            tokio::select! {
                _ = shared.cancel.cancelled() => break,
                _ = shared.wake.notified() => {}
                _ = paused.changed() => {}
            }
            continue;
        };
        run_task(&shared, task).await;
    }
    info!("Task scheduler worker exiting");
}

async fn run_task(shared: &Shared, task: Task) {
    let started_at = Utc::now();
    info!("Running task {} ({})", task.id, task.recipe.name);

    let executor = Arc::clone(&shared.executor);
    let recipe = Arc::clone(&task.recipe);
    let context = task.context.clone();
    let joined =
        tokio::spawn(async move { executor.run_recipe(&recipe, &context).await }).await;
    let result = match joined {
        Ok(result) => result,
        Err(e) => {
            error!("Task {} aborted: {}", task.id, e);
            TaskResult::Error {
                error: format!("task aborted: {}", e),
            }
        }
    };

    info!(
        "Task {} ({}) finished: {}",
        task.id,
        task.recipe.name,
        if result.is_success() { "success" } else { "error" }
    );

    shared.history.lock().await.push(TaskHistoryEntry {
        task_id: task.id.clone(),
        recipe_name: task.recipe.name.clone(),
        request_id: task.request_id.clone(),
        urgency: task.urgency,
        queued_time: task.queued_time,
        started_at,
        finished_at: Utc::now(),
        result: result.clone(),
    });

    // No subscribers is fine.
    let _ = shared.outcomes.send(TaskOutcome {
        task_id: task.id,
        request_id: task.request_id,
        recipe_name: task.recipe.name.clone(),
        result,
    });
    *shared.active.lock().await = None;
}

#[cfg(test)]
mod tests;
