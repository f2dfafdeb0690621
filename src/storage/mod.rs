pub mod csv;
pub mod sqlite;

use async_trait::async_trait;

use crate::config::{StorageBackend, StorageConfig};
use crate::models::Catalog;
use crate::utils::error::Result;

pub use self::csv::CsvDataset;
pub use self::sqlite::SqliteDataset;

/// Persisted catalog of previously seen items.
///
/// `load` never fails for absent state; it returns an empty catalog.
/// `save` replaces the stored catalog as a whole, or leaves it untouched.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Dataset: Send + Sync {
    fn describe(&self) -> String;

    async fn load(&self) -> Result<Catalog>;

    async fn save(&self, catalog: &Catalog) -> Result<()>;
}

pub type DatasetBox = Box<dyn Dataset>;

pub async fn open_dataset(config: &StorageConfig) -> Result<DatasetBox> {
    let dataset: DatasetBox = match config.backend {
        StorageBackend::Csv => Box::new(CsvDataset::new(&config.path)),
        StorageBackend::Sqlite => Box::new(SqliteDataset::connect(&config.url).await?),
    };

    tracing::debug!("Opened dataset {}", dataset.describe());
    Ok(dataset)
}
