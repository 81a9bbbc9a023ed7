//! Per-timeframe cron jobs driving the engine and orchestrator.

use crate::orchestrator::Orchestrator;
use anyhow::{Context, Result};
use folio_core::config::AppConfig;
use folio_core::Timeframe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// One independent periodic job per timeframe; a faster timeframe simply
/// ticks more often. Overlap protection is the orchestrator's idempotency
/// claim, not anything here.
pub struct TickScheduler {
    orchestrator: Arc<Orchestrator>,
    config_rx: watch::Receiver<AppConfig>,
}

impl TickScheduler {
    #[must_use]
    pub const fn new(
        orchestrator: Arc<Orchestrator>,
        config_rx: watch::Receiver<AppConfig>,
    ) -> Self {
        Self {
            orchestrator,
            config_rx,
        }
    }

    /// Starts the scheduler and runs until the process is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler fails to start or if job
    /// registration fails.
    pub async fn start(self) -> Result<()> {
        let scheduler_cfg = self.config_rx.borrow().scheduler.clone();
        if !scheduler_cfg.enabled {
            info!("Tick scheduler is disabled");
            return Ok(());
        }

        let scheduler = JobScheduler::new().await?;

        for (tf_str, cron) in &scheduler_cfg.jobs {
            let Some(timeframe) = Timeframe::parse(tf_str) else {
                warn!("Skipping job with unknown timeframe {tf_str}");
                continue;
            };

            let orchestrator = self.orchestrator.clone();
            let config_rx = self.config_rx.clone();
            let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
                let orchestrator = orchestrator.clone();
                let config_rx = config_rx.clone();
                Box::pin(async move {
                    let dry_run = config_rx.borrow().execution.dry_run;
                    orchestrator.set_dry_run(dry_run);
                    if let Err(e) = orchestrator.tick(timeframe).await {
                        error!(timeframe = %timeframe, "Tick failed: {e:#}");
                    }
                })
            })
            .context(format!("Invalid cron expression for {tf_str}: {cron}"))?;

            scheduler.add(job).await?;
            info!(timeframe = %timeframe, cron = %cron, "Registered tick job");
        }

        scheduler.start().await?;
        info!("Tick scheduler started");

        // Keep scheduler running
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
        }
    }
}
