//! Wires catalog, tracker, scheduler and front desk into a running service.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::AppConfig;
use crate::core::front_desk::{FrontDesk, OutcomeRelay, RecipeSynthesizer};
use crate::core::lifecycle::ServiceLifecycle;
use crate::core::matcher::MatchEngine;
use crate::core::recipe::{RecipeCatalog, default_recipes};
use crate::core::requests::RequestTracker;
use crate::core::scheduler::{StepExecutor, TaskScheduler};

/// Build the catalog the configuration describes: defaults first, then the
/// YAML file (whose entries replace defaults of the same name).
pub async fn load_catalog(config: &AppConfig) -> Result<Arc<RecipeCatalog>> {
    let catalog = Arc::new(RecipeCatalog::new());
    if config.recipes.seed_defaults {
        let seeded = catalog.extend(default_recipes()).await;
        info!("Seeded {} default recipes", seeded);
    }
    if let Some(path) = &config.recipes.path {
        catalog
            .load_yaml(path)
            .await
            .with_context(|| format!("loading recipes from {}", path.display()))?;
    }
    Ok(catalog)
}

pub struct FrontDeskService {
    desk: Arc<FrontDesk>,
    lifecycle: ServiceLifecycle,
}

impl FrontDeskService {
    pub async fn build(
        config: &AppConfig,
        executor: StepExecutor,
        synthesizer: Option<Arc<dyn RecipeSynthesizer>>,
    ) -> Result<Self> {
        let catalog = load_catalog(config).await?;
        let tracker = Arc::new(RequestTracker::new(
            chrono::Duration::minutes(config.tracker.timeout_minutes),
            config.tracker.archive_capacity,
        ));
        let scheduler = TaskScheduler::new(executor, config.scheduler.history_capacity);

        let mut desk = FrontDesk::new(
            MatchEngine::new(catalog),
            tracker,
            scheduler.clone(),
        )
        .with_default_urgency(config.scheduler.default_urgency);
        if let Some(synthesizer) = synthesizer {
            desk = desk.with_synthesizer(synthesizer);
        }
        let desk = Arc::new(desk);

        let mut lifecycle = ServiceLifecycle::new().await?;
        lifecycle.attach(Arc::new(Mutex::new(scheduler)));
        lifecycle.attach(Arc::new(Mutex::new(OutcomeRelay::new(Arc::clone(&desk)))));
        lifecycle
            .schedule_sweep(Arc::clone(&desk), &config.tracker.sweep_cron)
            .await?;

        Ok(Self { desk, lifecycle })
    }

    pub fn desk(&self) -> &Arc<FrontDesk> {
        &self.desk
    }

    pub async fn start(&mut self) -> Result<()> {
        self.lifecycle.start().await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.lifecycle.shutdown().await
    }
}
