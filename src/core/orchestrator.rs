use chrono::Utc;
use std::future::Future;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::reconciler::ReconciliationEngine;
use crate::config::AppConfig;
use crate::models::{ChangeEvent, RawItem, RunSummary, SourceFailure, TitleMatching};
use crate::plugins::manager::Notifier;
use crate::plugins::sources::{build_sources, SourceAdapterBox};
use crate::plugins::traits::{NotificationEvent, SourceAdapter};
use crate::storage::{open_dataset, DatasetBox};
use crate::utils::error::{AppError, ErrorClass, Result};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub matching: TitleMatching,
    /// How many sources are fetched at the same time.
    pub max_concurrent_sources: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            matching: TitleMatching::default(),
            max_concurrent_sources: 4,
        }
    }
}

/// Everything one source produced before it finished or failed.
struct Harvest {
    source_id: String,
    items: Vec<RawItem>,
    failure: Option<AppError>,
}

async fn harvest(source: &dyn SourceAdapter) -> Harvest {
    let span = tracing::info_span!("source", id = source.id());

    async move {
        let mut stream = source.fetch();
        let mut items = Vec::new();
        let mut failure = None;

        while let Some(next) = stream.next().await {
            match next {
                Ok(item) => items.push(item),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        tracing::info!("Collected {} items", items.len());
        Harvest {
            source_id: source.id().to_string(),
            items,
            failure,
        }
    }
    .instrument(span)
    .await
}

/// Drives one load, fetch, reconcile, persist, report cycle.
pub struct RunOrchestrator {
    dataset: DatasetBox,
    sources: Vec<SourceAdapterBox>,
    notifier: Notifier,
    options: RunOptions,
}

impl RunOrchestrator {
    pub fn new(dataset: DatasetBox, sources: Vec<SourceAdapterBox>, notifier: Notifier, options: RunOptions) -> Self {
        Self {
            dataset,
            sources,
            notifier,
            options,
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let dataset = open_dataset(&config.storage).await?;
        let sources = build_sources(&config.sources, &config.scraper)?;
        let notifier = Notifier::from_config(&config.notifications).await?;

        Ok(Self::new(
            dataset,
            sources,
            notifier,
            RunOptions {
                matching: config.matching,
                max_concurrent_sources: config.scraper.max_concurrent_sources,
            },
        ))
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    /// Execute one run. Only dataset load/save failures are returned; the
    /// dataset is written once, after every source has been attempted.
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        self.execute(run_id).instrument(span).await
    }

    /// Like [`run`](Self::run), but gives up as soon as `shutdown` resolves.
    /// The dataset is only ever replaced by a run that reached its save.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                tracing::warn!("Run interrupted");
                Err(AppError::Interrupted)
            }
        }
    }

    async fn execute(&self, run_id: Uuid) -> Result<RunSummary> {
        let started = Instant::now();
        let now = Utc::now();
        let mut summary = RunSummary::new(run_id, now);
        metrics::counter!("watcher_runs_total").increment(1);

        let catalog = match self.dataset.load().await {
            Ok(catalog) => catalog,
            Err(e) => return Err(self.abort("load", e).await),
        };

        tracing::info!(
            "Loaded {} existing items from {}, scraping {} sources",
            catalog.len(),
            self.dataset.describe(),
            self.sources.len()
        );
        self.notifier
            .notify(NotificationEvent::RunStarted {
                known_items: catalog.len(),
                sources: self.sources.len(),
            })
            .await;

        let mut engine = ReconciliationEngine::new(catalog, now, self.options.matching);

        // Fetch concurrently, reconcile one source at a time in configured order.
        // Boxed up front so the run future stays Send for the cron scheduler.
        let fetches: Vec<BoxFuture<'_, Harvest>> = self
            .sources
            .iter()
            .map(|source| harvest(&**source).boxed())
            .collect();
        let mut harvests = stream::iter(fetches).buffered(self.options.max_concurrent_sources.max(1));

        while let Some(harvested) = harvests.next().await {
            summary.sources_attempted += 1;
            let collected = harvested.items.len();

            for raw in harvested.items {
                match engine.reconcile(raw) {
                    Ok(event) => {
                        summary.record(&event);
                        self.forward(event).await;
                    }
                    Err(e) => {
                        summary.skipped_count += 1;
                        metrics::counter!("watcher_items_skipped_total").increment(1);
                        tracing::warn!("Skipping item from {}: {}", harvested.source_id, e);
                    }
                }
            }

            if let Some(error) = harvested.failure {
                summary.sources_failed += 1;
                metrics::counter!("watcher_source_failures_total").increment(1);
                tracing::warn!(
                    "Source {} failed after {} items: {}",
                    harvested.source_id,
                    collected,
                    error
                );

                self.notifier
                    .notify(NotificationEvent::SourceFailure(SourceFailure {
                        source_id: harvested.source_id,
                        cause: error.to_string(),
                        items_collected: collected,
                    }))
                    .await;
            }
        }

        let catalog = engine.into_catalog();
        if let Err(e) = self.dataset.save(&catalog).await {
            return Err(self.abort("save", e).await);
        }

        summary.elapsed = started.elapsed();
        metrics::counter!("watcher_items_new_total").increment(summary.new_count as u64);
        metrics::counter!("watcher_items_updated_total").increment(summary.updated_count as u64);
        metrics::histogram!("watcher_run_duration_seconds").record(summary.elapsed.as_secs_f64());

        tracing::info!(
            "Run finished: {} new, {} updated, {} unchanged, {} skipped, {}/{} sources failed in {:?}",
            summary.new_count,
            summary.updated_count,
            summary.unchanged_count,
            summary.skipped_count,
            summary.sources_failed,
            summary.sources_attempted,
            summary.elapsed
        );
        self.notifier
            .notify(NotificationEvent::RunSummary(summary.clone()))
            .await;

        Ok(summary)
    }

    async fn forward(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::NewItem { item } => {
                tracing::info!("New item: {} at {}", item.title, item.price);
                self.notifier.notify(NotificationEvent::NewItem { item }).await;
            }
            ChangeEvent::PriceChanged(change) => {
                tracing::info!("Price change: {} {} -> {}", change.title, change.old_price, change.new_price);
                self.notifier.notify(NotificationEvent::PriceChanged(change)).await;
            }
            ChangeEvent::Unchanged { title } => {
                tracing::trace!("Unchanged: {}", title);
            }
        }
    }

    /// Report a dataset failure and turn it into the fatal error the run returns.
    async fn abort(&self, operation: &'static str, error: AppError) -> AppError {
        let error = match error.class() {
            ErrorClass::Fatal => error,
            ErrorClass::Recoverable => AppError::persistence(operation, error),
        };

        tracing::error!("Dataset {} failed, aborting run: {}", operation, error);
        self.notifier
            .notify(NotificationEvent::Alert {
                message: format!("Run aborted, dataset {} failed: {}", operation, error),
            })
            .await;

        error
    }
}
