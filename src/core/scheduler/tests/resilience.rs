use async_trait::async_trait;
use std::sync::Arc;

use super::{notify_recipe, wait_for_task};
use crate::core::recipe::{RecipeStep, StepKind};
use crate::core::scheduler::executor::{
    ActionHandler, ActionRegistry, LoggingQueryHandler, Params, TracingNotifier,
};
use crate::core::scheduler::{
    ExecutionContext, StepError, StepExecutor, TaskResult, TaskScheduler,
};

struct Explodes;

#[async_trait]
impl ActionHandler for Explodes {
    async fn call(
        &self,
        _params: &Params,
        _context: &ExecutionContext,
    ) -> Result<String, StepError> {
        panic!("handler blew up");
    }
}

#[tokio::test]
async fn unknown_step_kind_fails_only_its_own_task() {
    let scheduler = TaskScheduler::default();
    scheduler.start().await;

    let mut odd = (*notify_recipe("odd")).clone();
    odd.steps = vec![RecipeStep::with_kind(
        StepKind::Unrecognized("unknown_kind".into()),
        "whatever",
        &[],
    )];
    let bad = scheduler
        .submit(Arc::new(odd), ExecutionContext::default(), 1.0, None)
        .await
        .unwrap();
    let good = scheduler
        .submit(notify_recipe("fine"), ExecutionContext::default(), 1.0, None)
        .await
        .unwrap();
    wait_for_task(&scheduler, &good).await;

    let history = scheduler.get_task_history(10).await;
    let bad_entry = history.iter().find(|e| e.task_id == bad).unwrap();
    assert!(!bad_entry.result.is_success());
    assert!(bad_entry.result.message().contains("unknown_kind"));
    let good_entry = history.iter().find(|e| e.task_id == good).unwrap();
    assert!(good_entry.result.is_success());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn panicking_handler_is_recorded_as_error() {
    let mut actions = ActionRegistry::with_builtins();
    actions.register("explode", Arc::new(Explodes));
    let executor = StepExecutor::new(
        actions,
        Arc::new(LoggingQueryHandler),
        Arc::new(TracingNotifier),
    );
    let scheduler = TaskScheduler::new(executor, 100);
    scheduler.start().await;

    let mut boom = (*notify_recipe("boom")).clone();
    boom.steps = vec![RecipeStep::api_call("explode", &[])];
    let bad = scheduler
        .submit(Arc::new(boom), ExecutionContext::default(), 2.0, None)
        .await
        .unwrap();
    let after = scheduler
        .submit(notify_recipe("after"), ExecutionContext::default(), 1.0, None)
        .await
        .unwrap();
    wait_for_task(&scheduler, &after).await;

    let history = scheduler.get_task_history(10).await;
    let bad_entry = history.iter().find(|e| e.task_id == bad).unwrap();
    assert!(matches!(bad_entry.result, TaskResult::Error { .. }));
    scheduler.shutdown().await;
    assert!(scheduler.active_task().await.is_none());
}

#[tokio::test]
async fn subscribers_receive_outcomes_with_request_ids() {
    let scheduler = TaskScheduler::default();
    let mut outcomes = scheduler.subscribe();
    scheduler.start().await;
    let id = scheduler
        .submit(
            notify_recipe("tracked"),
            ExecutionContext::default(),
            1.0,
            Some("req-1".into()),
        )
        .await
        .unwrap();
    let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), outcomes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.task_id, id);
    assert_eq!(outcome.request_id.as_deref(), Some("req-1"));
    assert_eq!(outcome.recipe_name, "tracked");
    assert!(outcome.result.is_success());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn start_is_idempotent_and_shutdown_stops_worker() {
    let scheduler = TaskScheduler::default();
    scheduler.start().await;
    scheduler.start().await;
    scheduler.shutdown().await;
    assert_eq!(scheduler.queued_len().await, 0);
    assert!(scheduler.active_task().await.is_none());
}
