use anyhow::{Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_FILE: &str = "frontdesk.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub recipes: RecipesConfig,

    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipesConfig {
    /// YAML catalog with a top-level `recipes:` list.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub seed_defaults: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: i64,

    #[serde(default = "default_capacity")]
    pub archive_capacity: usize,

    /// Six-field cron expression (seconds first).
    #[serde(default = "default_sweep_cron")]
    pub sweep_cron: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_urgency")]
    pub default_urgency: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_true() -> bool {
    true
}
fn default_timeout_minutes() -> i64 {
    30
}
fn default_capacity() -> usize {
    1000
}
fn default_sweep_cron() -> String {
    "0 * * * * *".to_string()
}
fn default_urgency() -> f64 {
    1.0
}
fn default_level() -> String {
    "info".to_string()
}

impl Default for RecipesConfig {
    fn default() -> Self {
        Self {
            path: None,
            seed_defaults: true,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
            archive_capacity: default_capacity(),
            sweep_cron: default_sweep_cron(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_capacity(),
            default_urgency: default_urgency(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults. A relative
    /// recipe path is resolved against the config file's directory.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No {} found, using defaults.", path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        let mut config = Self::parse(&content)?;
        if let (Some(recipes), Some(dir)) = (config.recipes.path.as_mut(), path.parent())
            && recipes.is_relative()
        {
            *recipes = dir.join(&*recipes);
        }
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tracker.timeout_minutes <= 0 {
            bail!(
                "tracker.timeout_minutes must be positive, got {}",
                self.tracker.timeout_minutes
            );
        }
        if !self.scheduler.default_urgency.is_finite() {
            bail!("scheduler.default_urgency must be a finite number");
        }
        crate::logging::parse_level(&self.logging.level)?;
        Ok(())
    }
}
