mod ordering;
mod resilience;

use std::sync::Arc;
use std::time::Duration;

use crate::core::recipe::{Recipe, RecipeStep};
use crate::core::scheduler::TaskScheduler;

pub(super) fn notify_recipe(name: &str) -> Arc<Recipe> {
    Arc::new(Recipe {
        name: name.to_string(),
        intent: name.to_lowercase(),
        description: format!("{} test recipe", name),
        steps: vec![RecipeStep::notification("ping")],
        required_entities: vec![],
        keywords: vec![],
        common_triggers: vec![],
        success_criteria: vec![],
    })
}

/// Poll until `task_id` shows up in the history.
pub(super) async fn wait_for_task(scheduler: &TaskScheduler, task_id: &str) {
    let found = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let history = scheduler.get_task_history(usize::MAX).await;
            if history.iter().any(|e| e.task_id == task_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(found.is_ok(), "task {} never finished", task_id);
}
