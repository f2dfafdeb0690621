use super::*;
use std::sync::Arc;
use deal_watcher::config::SchedulerConfig;
use deal_watcher::scheduler::WatchScheduler;
use deal_watcher::RunOrchestrator;

#[tokio::test]
async fn test_cron_tick_triggers_run() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;
    mount_telegram(&server).await;
    mount_plaid_page(&server, 1, 200, plaid_page(&[("Mod Podge 8oz", "$6.50", "/products/mod-podge")])).await;
    mount_plaid_page(&server, 2, 200, plaid_page(&[])).await;
    mount_enasco_page(&server, 1, 200, enasco_page(&[])).await;

    let config = get_test_config(&server, dir.path());
    let orchestrator = Arc::new(RunOrchestrator::from_config(&config).await?);
    let mut scheduler = WatchScheduler::new(
        Arc::clone(&orchestrator),
        SchedulerConfig {
            schedule: "*/1 * * * * *".to_string(),
        },
    )
    .await?;

    scheduler.start().await?;
    let dataset_path = config.storage.path.clone();
    let ran = wait_for_condition(|| {
        let path = dataset_path.clone();
        async move { path.exists() }
    }, 10)
    .await;
    scheduler.shutdown().await?;

    assert!(ran, "scheduled run never wrote the dataset");
    assert!(scheduler.stats().await.completed_runs >= 1);

    Ok(())
}

#[tokio::test]
async fn test_run_now_without_sources() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;

    let mut config = get_test_config(&server, dir.path());
    config.sources.clear();
    config.notifications.telegram = None;

    let orchestrator = Arc::new(RunOrchestrator::from_config(&config).await?);
    let scheduler = WatchScheduler::new(orchestrator, config.scheduler.clone()).await?;

    let summary = scheduler.run_now().await.expect("no run in progress")?;
    assert_eq!(summary.sources_attempted, 0);
    assert!(!summary.all_sources_failed());

    Ok(())
}
