use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::{is_valid_cron, SchedulerConfig};
use crate::core::RunOrchestrator;
use crate::models::RunSummary;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WatchStats {
    pub completed_runs: u64,
    pub failed_runs: u64,
    /// Ticks dropped because the previous run was still going.
    pub skipped_runs: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Repeats runs on a cron schedule, never two at once.
pub struct WatchScheduler {
    scheduler: JobScheduler,
    orchestrator: Arc<RunOrchestrator>,
    running: Arc<Mutex<()>>,
    stats: Arc<RwLock<WatchStats>>,
    config: SchedulerConfig,
    job_id: Option<Uuid>,
}

impl WatchScheduler {
    pub async fn new(orchestrator: Arc<RunOrchestrator>, config: SchedulerConfig) -> Result<Self> {
        if !is_valid_cron(&config.schedule) {
            return Err(anyhow::anyhow!("Invalid cron expression: {}", config.schedule));
        }

        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            orchestrator,
            running: Arc::new(Mutex::new(())),
            stats: Arc::new(RwLock::new(WatchStats::default())),
            config,
            job_id: None,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);

        let job = Job::new_async(self.config.schedule.as_str(), move |_uuid, _l| {
            let orchestrator = Arc::clone(&orchestrator);
            let running = Arc::clone(&running);
            let stats = Arc::clone(&stats);

            Box::pin(async move {
                Self::execute(&orchestrator, &running, &stats).await;
            })
        })?;

        self.job_id = Some(self.scheduler.add(job).await?);
        self.scheduler.start().await?;
        tracing::info!("Watch scheduler started with schedule: {}", self.config.schedule);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(job_id) = self.job_id.take() {
            self.scheduler.remove(&job_id).await?;
        }

        // Let an in-flight run reach its save point
        let _guard = self.running.lock().await;
        self.scheduler.shutdown().await?;
        tracing::info!("Watch scheduler shutdown");
        Ok(())
    }

    /// Run immediately, unless a run is already in progress.
    pub async fn run_now(&self) -> Option<std::result::Result<RunSummary, AppError>> {
        Self::execute(&self.orchestrator, &self.running, &self.stats).await
    }

    pub async fn stats(&self) -> WatchStats {
        self.stats.read().await.clone()
    }

    async fn execute(
        orchestrator: &RunOrchestrator,
        running: &Mutex<()>,
        stats: &RwLock<WatchStats>,
    ) -> Option<std::result::Result<RunSummary, AppError>> {
        let _guard = match running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Previous run still in progress, skipping this tick");
                stats.write().await.skipped_runs += 1;
                return None;
            }
        };

        let result = orchestrator.run().await;

        let mut stats = stats.write().await;
        stats.last_run = Some(Utc::now());
        match &result {
            Ok(_) => {
                stats.completed_runs += 1;
                stats.last_error = None;
            }
            Err(e) => {
                stats.failed_runs += 1;
                stats.last_error = Some(e.to_string());
                tracing::error!("Scheduled run failed: {}", e);
            }
        }

        Some(result)
    }
}
