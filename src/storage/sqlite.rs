use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

use super::Dataset;
use crate::models::{Catalog, Item};
use crate::utils::error::{AppError, Result};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    title      TEXT PRIMARY KEY NOT NULL,
    price      TEXT NOT NULL,
    url        TEXT NOT NULL,
    added_on   TEXT NOT NULL,
    updated_on TEXT NOT NULL
)
"#;

#[derive(Debug, FromRow)]
struct ItemRow {
    title: String,
    price: String,
    url: String,
    added_on: DateTime<Utc>,
    updated_on: DateTime<Utc>,
}

impl TryFrom<ItemRow> for Item {
    type Error = AppError;

    fn try_from(row: ItemRow) -> Result<Self> {
        let price = Decimal::from_str(&row.price)
            .map_err(|e| AppError::persistence("load", format!("bad price for '{}': {}", row.title, e)))?;

        Ok(Item {
            title: row.title,
            price,
            url: row.url,
            added_on: row.added_on,
            updated_on: row.updated_on,
        })
    }
}

/// Catalog kept in a single SQLite table.
pub struct SqliteDataset {
    pool: SqlitePool,
    url: String,
}

impl SqliteDataset {
    /// Open (or create) the database, including its parent directory.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::persistence("connect", e))?
            .create_if_missing(true);

        if let Some(parent) = options.clone().get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::persistence("connect", e))?;
            }
        }

        // One connection: a single writer, and `sqlite::memory:` stays one database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| AppError::persistence("connect", e))?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| AppError::persistence("connect", e))?;

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn replace_all(&self, catalog: &Catalog) -> std::result::Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM items").execute(&mut *tx).await?;

        for item in catalog.iter() {
            sqlx::query(
                r#"
                INSERT INTO items (title, price, url, added_on, updated_on)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.title)
            .bind(item.price.to_string())
            .bind(&item.url)
            .bind(item.added_on)
            .bind(item.updated_on)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }
}

#[async_trait]
impl Dataset for SqliteDataset {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn load(&self) -> Result<Catalog> {
        let rows = sqlx::query_as::<_, ItemRow>(
            "SELECT title, price, url, added_on, updated_on FROM items ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::persistence("load", e))?;

        match rows.into_iter().map(Item::try_from).collect::<Result<Vec<_>>>() {
            Ok(items) => Ok(Catalog::from_items(items)),
            Err(e) => {
                tracing::warn!("Stored items in {} are corrupt, starting empty: {}", self.url, e);
                Ok(Catalog::new())
            }
        }
    }

    async fn save(&self, catalog: &Catalog) -> Result<()> {
        self.replace_all(catalog)
            .await
            .map_err(|e| AppError::persistence("save", e))?;

        tracing::debug!("Saved {} items to {}", catalog.len(), self.url);
        Ok(())
    }
}
