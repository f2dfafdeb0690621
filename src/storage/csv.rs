use async_trait::async_trait;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::Dataset;
use crate::models::{Catalog, Item};
use crate::utils::error::{AppError, Result};

const HEADER: [&str; 5] = ["title", "price", "url", "added_on", "updated_on"];

/// Catalog stored as one CSV file with a header row and RFC 3339 timestamps.
#[derive(Debug, Clone)]
pub struct CsvDataset {
    path: PathBuf,
}

impl CsvDataset {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Dataset for CsvDataset {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    async fn load(&self) -> Result<Catalog> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_catalog(&path))
            .await
            .map_err(|e| AppError::persistence("load", e))?
    }

    async fn save(&self, catalog: &Catalog) -> Result<()> {
        let path = self.path.clone();
        let items: Vec<Item> = catalog.iter().cloned().collect();
        tokio::task::spawn_blocking(move || write_catalog(&path, &items))
            .await
            .map_err(|e| AppError::persistence("save", e))?
    }
}

fn read_catalog(path: &Path) -> Result<Catalog> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!("No dataset at {}, starting from an empty catalog", path.display());
            return Ok(Catalog::new());
        }
        Err(e) => return Err(AppError::persistence("load", format!("{}: {}", path.display(), e))),
    };

    let mut reader = csv::Reader::from_reader(file);
    let mut items = Vec::new();
    for record in reader.deserialize::<Item>() {
        match record {
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::warn!(
                    "Dataset {} is unreadable ({}), starting from an empty catalog",
                    path.display(),
                    e
                );
                return Ok(Catalog::new());
            }
        }
    }

    Ok(Catalog::from_items(items))
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

fn write_rows(path: &Path, items: &[Item]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(HEADER)?;
    for item in items {
        writer.serialize(item)?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| AppError::persistence("save", e))?;
    file.sync_all()?;
    Ok(())
}

/// Write next to the target, then rename over it. The old file stays intact
/// until the rename succeeds.
fn write_catalog(path: &Path, items: &[Item]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AppError::persistence("save", e))?;
    }

    let tmp = temp_path(path);
    let written = write_rows(&tmp, items).and_then(|_| fs::rename(&tmp, path).map_err(AppError::from));

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(AppError::persistence(
            "save",
            format!("{}: {}", path.display(), e),
        ));
    }

    tracing::debug!("Saved {} items to {}", items.len(), path.display());
    Ok(())
}
