use super::{notify_recipe, wait_for_task};
use crate::core::scheduler::{ExecutionContext, SubmitError, TaskScheduler};

async fn history_names(scheduler: &TaskScheduler) -> Vec<String> {
    scheduler
        .get_task_history(usize::MAX)
        .await
        .into_iter()
        .map(|e| e.recipe_name)
        .collect()
}

#[tokio::test]
async fn higher_urgency_runs_first() {
    let scheduler = TaskScheduler::default();
    let mut ids = Vec::new();
    for (name, urgency) in [("low", 0.1), ("top", 5.0), ("mid", 1.0), ("high", 2.5)] {
        ids.push(
            scheduler
                .submit(notify_recipe(name), ExecutionContext::default(), urgency, None)
                .await
                .unwrap(),
        );
    }
    assert_eq!(scheduler.queued_len().await, 4);
    scheduler.start().await;
    for id in &ids {
        wait_for_task(&scheduler, id).await;
    }
    assert_eq!(scheduler.queued_len().await, 0);
    assert_eq!(
        history_names(&scheduler).await,
        vec!["top", "high", "mid", "low"]
    );
    scheduler.shutdown().await;
}

#[tokio::test]
async fn equal_urgency_preserves_submission_order() {
    let scheduler = TaskScheduler::default();
    let mut ids = Vec::new();
    for name in ["t1", "t2", "t3"] {
        ids.push(
            scheduler
                .submit(notify_recipe(name), ExecutionContext::default(), 1.0, None)
                .await
                .unwrap(),
        );
    }
    scheduler.start().await;
    for id in &ids {
        wait_for_task(&scheduler, id).await;
    }
    assert_eq!(history_names(&scheduler).await, vec!["t1", "t2", "t3"]);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn paused_worker_drains_in_urgency_order_after_resume() {
    let scheduler = TaskScheduler::default();
    scheduler.pause();
    assert!(scheduler.is_paused());
    scheduler.start().await;
    let mut ids = Vec::new();
    for (name, urgency) in [("a", 0.9), ("b", 0.5), ("c", 0.2)] {
        ids.push(
            scheduler
                .submit(notify_recipe(name), ExecutionContext::default(), urgency, None)
                .await
                .unwrap(),
        );
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(scheduler.get_task_history(10).await.is_empty());
    assert_eq!(scheduler.queued_len().await, 3);

    scheduler.resume();
    assert!(!scheduler.is_paused());
    for id in &ids {
        wait_for_task(&scheduler, id).await;
    }
    let urgencies: Vec<f64> = scheduler
        .get_task_history(10)
        .await
        .iter()
        .map(|e| e.urgency)
        .collect();
    assert_eq!(urgencies, vec![0.9, 0.5, 0.2]);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn history_is_bounded_and_keeps_newest() {
    let scheduler = TaskScheduler::default();
    scheduler.start().await;
    let mut last = String::new();
    for i in 0..1005 {
        last = scheduler
            .submit(
                notify_recipe(&format!("bulk-{}", i)),
                ExecutionContext::default(),
                1.0,
                None,
            )
            .await
            .unwrap();
    }
    wait_for_task(&scheduler, &last).await;
    let history = scheduler.get_task_history(usize::MAX).await;
    assert!(history.len() <= 1000);
    assert_eq!(history.last().map(|e| e.task_id.as_str()), Some(last.as_str()));
    scheduler.shutdown().await;
}

#[tokio::test]
async fn submit_rejects_bad_input() {
    let scheduler = TaskScheduler::default();
    let err = scheduler
        .submit(notify_recipe("x"), ExecutionContext::default(), f64::NAN, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::InvalidUrgency(_)));

    let mut empty = (*notify_recipe("empty")).clone();
    empty.steps.clear();
    assert_eq!(
        scheduler
            .submit(
                std::sync::Arc::new(empty),
                ExecutionContext::default(),
                1.0,
                None
            )
            .await,
        Err(SubmitError::EmptyRecipe("empty".into()))
    );

    scheduler.shutdown().await;
    assert_eq!(
        scheduler
            .submit(notify_recipe("late"), ExecutionContext::default(), 1.0, None)
            .await,
        Err(SubmitError::ShutDown)
    );
}
