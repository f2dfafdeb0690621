use super::*;
use deal_watcher::storage::{open_dataset, Dataset, SqliteDataset};
use deal_watcher::RunOrchestrator;
use rust_decimal::Decimal;

#[tokio::test]
async fn test_sqlite_backend_end_to_end() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;
    mount_telegram(&server).await;
    mount_plaid_page(&server, 1, 200, plaid_page(&[("Mod Podge 8oz", "$6.50", "/products/mod-podge")])).await;
    mount_plaid_page(&server, 2, 200, plaid_page(&[])).await;
    mount_enasco_page(&server, 1, 200, enasco_page(&[("Nasco Sketch Pad", "$1,299.00", "/p/sketch-pad")])).await;
    mount_enasco_page(&server, 2, 200, enasco_page(&[])).await;

    let mut config = get_test_config(&server, dir.path());
    config.storage.backend = StorageBackend::Sqlite;

    let summary = RunOrchestrator::from_config(&config).await?.run().await?;
    assert_eq!(summary.new_count, 2);

    let dataset = SqliteDataset::connect(&config.storage.url).await?;
    let catalog = dataset.load().await?;
    assert_eq!(catalog.get("Nasco Sketch Pad").unwrap().price, Decimal::new(1299, 0));
    assert!(!config.storage.path.exists());

    Ok(())
}

#[tokio::test]
async fn test_open_dataset_follows_backend() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let csv = StorageConfig {
        backend: StorageBackend::Csv,
        path: dir.path().join("items.csv"),
        url: String::new(),
    };
    assert!(open_dataset(&csv).await?.describe().starts_with("csv:"));

    let sqlite = StorageConfig {
        backend: StorageBackend::Sqlite,
        path: dir.path().join("unused.csv"),
        url: "sqlite::memory:".to_string(),
    };
    assert_eq!(open_dataset(&sqlite).await?.describe(), "sqlite::memory:");

    Ok(())
}
