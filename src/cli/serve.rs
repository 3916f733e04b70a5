use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use frontdesk::core::scheduler::StepExecutor;
use frontdesk::{AppConfig, FrontDeskService, InboundMessage, IntentPayload};

/// Longest wait for queued work after stdin closes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ServeLine {
    #[serde(flatten)]
    message: InboundMessage,
    #[serde(default)]
    nlp: IntentPayload,
}

pub async fn run(config: &AppConfig) -> Result<()> {
    let mut service = FrontDeskService::build(config, StepExecutor::default(), None).await?;
    service.start().await?;
    info!("frontdesk ready, reading turns from stdin");

    let desk = service.desk().clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ServeLine>(&line) {
            Ok(turn) => {
                let reply = desk.handle(turn.message, turn.nlp).await;
                println!("{}", serde_json::to_string(&reply)?);
            }
            Err(e) => {
                warn!("Skipping malformed input line: {}", e);
                println!("{}", serde_json::json!({ "error": e.to_string() }));
            }
        }
    }

    let scheduler = desk.scheduler();
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while scheduler.queued_len().await > 0 || scheduler.active_task().await.is_some() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            "Shutting down with {} task(s) still queued",
            scheduler.queued_len().await
        );
    }
    service.shutdown().await
}
