use super::*;
use deal_watcher::models::Catalog;
use deal_watcher::storage::{CsvDataset, Dataset};
use deal_watcher::RunOrchestrator;
use rust_decimal::Decimal;
use std::fs;

async fn mount_first_catalog(server: &MockServer) {
    mount_plaid_page(
        server,
        1,
        200,
        plaid_page(&[
            ("Plaid Jumbo Marker Set", "$10,22", "/products/jumbo-marker-set"),
            ("FolkArt Brush Pack", "$4.99", "/products/brush-pack"),
        ]),
    )
    .await;
    mount_plaid_page(server, 2, 200, plaid_page(&[("Mod Podge 8oz", "$6.50", "/products/mod-podge")])).await;
    mount_plaid_page(server, 3, 200, plaid_page(&[])).await;

    mount_enasco_page(server, 1, 200, enasco_page(&[("Nasco Sketch Pad", "USD 13,33", "/p/sketch-pad")])).await;
    mount_enasco_page(server, 2, 200, enasco_page(&[])).await;
}

#[tokio::test]
async fn test_first_run_records_everything_as_new() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;
    mount_first_catalog(&server).await;
    mount_telegram(&server).await;

    let config = get_test_config(&server, dir.path());
    let orchestrator = RunOrchestrator::from_config(&config).await?;
    let summary = orchestrator.run().await?;

    assert_eq!(summary.new_count, 4);
    assert_eq!(summary.updated_count, 0);
    assert_eq!(summary.sources_attempted, 2);
    assert_eq!(summary.sources_failed, 0);

    let catalog = CsvDataset::new(&config.storage.path).load().await?;
    assert_eq!(catalog.len(), 4);
    let markers = catalog.get("Plaid Jumbo Marker Set").unwrap();
    assert_eq!(markers.price, Decimal::new(1022, 2));
    assert_eq!(markers.url, format!("{}/products/jumbo-marker-set", server.uri()));
    assert_eq!(markers.added_on, markers.updated_on);
    assert_eq!(catalog.get("Nasco Sketch Pad").unwrap().price, Decimal::new(1333, 2));

    // run started + 4 new items + summary
    let messages = telegram_messages(&server).await;
    assert_eq!(messages.len(), 6);
    assert!(messages[0].contains("Loaded 0 existing items"));
    assert!(messages.last().unwrap().contains("4 new items"));

    Ok(())
}

#[tokio::test]
async fn test_second_run_reports_price_drop_only() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;
    mount_first_catalog(&server).await;
    mount_telegram(&server).await;

    let config = get_test_config(&server, dir.path());
    RunOrchestrator::from_config(&config).await?.run().await?;

    server.reset().await;
    mount_telegram(&server).await;
    mount_plaid_page(
        &server,
        1,
        200,
        plaid_page(&[
            ("Plaid Jumbo Marker Set", "$8.00", "/products/jumbo-marker-set"),
            ("FolkArt Brush Pack", "$5.49", "/products/brush-pack"),
        ]),
    )
    .await;
    mount_plaid_page(&server, 2, 200, plaid_page(&[("Mod Podge 8oz", "$6.50", "/products/mod-podge")])).await;
    mount_plaid_page(&server, 3, 200, plaid_page(&[])).await;
    mount_enasco_page(&server, 1, 200, enasco_page(&[("Nasco Sketch Pad", "USD 13,33", "/p/sketch-pad")])).await;
    mount_enasco_page(&server, 2, 200, enasco_page(&[])).await;

    let summary = RunOrchestrator::from_config(&config).await?.run().await?;

    assert_eq!(summary.new_count, 0);
    assert_eq!(summary.updated_count, 2);
    assert_eq!(summary.unchanged_count, 2);

    // The increase is recorded but not announced
    let messages = telegram_messages(&server).await;
    let changes: Vec<_> = messages.iter().filter(|m| m.contains("price has been changed")).collect();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].contains("Plaid Jumbo Marker Set"));
    assert!(changes[0].contains("<b>Old Price:</b> $10.22 - <b>New Price:</b> $8.00"));

    let catalog = CsvDataset::new(&config.storage.path).load().await?;
    let brushes = catalog.get("FolkArt Brush Pack").unwrap();
    assert_eq!(brushes.price, Decimal::new(549, 2));
    assert!(brushes.updated_on > brushes.added_on);

    Ok(())
}

#[tokio::test]
async fn test_repeat_run_is_idempotent() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;
    mount_first_catalog(&server).await;
    mount_telegram(&server).await;

    let config = get_test_config(&server, dir.path());
    let orchestrator = RunOrchestrator::from_config(&config).await?;

    orchestrator.run().await?;
    let after_first = fs::read_to_string(&config.storage.path)?;

    let summary = orchestrator.run().await?;
    assert_eq!(summary.new_count, 0);
    assert_eq!(summary.updated_count, 0);
    assert_eq!(summary.unchanged_count, 4);
    assert_eq!(fs::read_to_string(&config.storage.path)?, after_first);

    Ok(())
}

#[tokio::test]
async fn test_broken_source_does_not_block_others() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;
    mount_plaid_page(&server, 1, 200, plaid_page(&[("Mod Podge 8oz", "$6.50", "/products/mod-podge")])).await;
    mount_plaid_page(&server, 2, 200, plaid_page(&[])).await;
    mount_enasco_page(&server, 1, 503, String::new()).await;

    let config = get_test_config(&server, dir.path());
    let orchestrator = RunOrchestrator::from_config(&config).await?;
    let recorder = RecordingChannel::default();
    orchestrator.notifier().register_channel(Box::new(recorder.clone())).await?;

    let summary = orchestrator.run().await?;

    assert_eq!(summary.new_count, 1);
    assert_eq!(summary.sources_failed, 1);
    assert_eq!(
        recorder.kinds(),
        vec!["run_started", "new_item", "source_failure", "run_summary"]
    );

    // Telegram is unreachable here, which must not fail the run
    assert!(orchestrator.notifier().report().failed > 0);
    assert!(CsvDataset::new(&config.storage.path).load().await?.contains("Mod Podge 8oz"));

    Ok(())
}

#[tokio::test]
async fn test_failed_save_keeps_previous_dataset() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;
    mount_first_catalog(&server).await;
    mount_telegram(&server).await;

    let config = get_test_config(&server, dir.path());
    let dataset = CsvDataset::new(&config.storage.path);
    dataset.save(&Catalog::new()).await?;
    let before = fs::read_to_string(&config.storage.path)?;

    // Occupy the temporary file name so the write cannot happen
    fs::create_dir(dir.path().join(".items.csv.tmp"))?;

    let result = RunOrchestrator::from_config(&config).await?.run().await;

    assert!(result.is_err());
    assert_eq!(fs::read_to_string(&config.storage.path)?, before);
    let messages = telegram_messages(&server).await;
    assert!(messages.last().unwrap().contains("Run aborted"));

    Ok(())
}
