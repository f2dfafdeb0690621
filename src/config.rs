use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::models::TitleMatching;
use crate::plugins::manager::NotifyPolicy;
use crate::plugins::notifiers::{DiscordConfig, TelegramConfig};
use crate::plugins::sources::HtmlSourceConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub matching: TitleMatching,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub sources: Vec<HtmlSourceConfig>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Csv,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// CSV file holding the catalog.
    #[serde(default = "default_csv_path")]
    pub path: PathBuf,
    /// SQLite connection string.
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("data/items.csv")
}

fn default_database_url() -> String {
    "sqlite://data/items.db?mode=rwc".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_csv_path(),
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
        .to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_page_delay_ms() -> u64 {
    500
}

fn default_max_concurrent_sources() -> usize {
    4
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            page_delay_ms: default_page_delay_ms(),
            max_concurrent_sources: default_max_concurrent_sources(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub policy: NotifyPolicy,
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub discord: Option<DiscordConfig>,
    /// Mirror every event to the log even when remote channels exist.
    #[serde(default)]
    pub log_events: bool,
}

fn default_delivery_timeout_ms() -> u64 {
    10_000
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            policy: NotifyPolicy::default(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            telegram: None,
            discord: None,
            log_events: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Six-field cron expression (seconds first) used by `watch`.
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

fn default_schedule() -> String {
    "0 0 */6 * * *".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedule: default_schedule(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for a daily rolling log file; stdout only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_file_prefix() -> String {
    "deal-watcher.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: String,
}

fn default_metrics_listen() -> String {
    "0.0.0.0:9001".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

impl AppConfig {
    /// Layered load: `config/default`, `config/{RUN_MODE}` and `config/local`,
    /// or only `path` when one is given, then `WATCHER__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = match path {
            Some(path) => Config::builder().add_source(File::from(path).required(true)),
            None => {
                let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
                Config::builder()
                    .add_source(File::with_name("config/default").required(false))
                    .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
                    // Add local config (ignored by git)
                    .add_source(File::with_name("config/local").required(false))
            }
        };

        let settings = builder
            .add_source(
                Environment::with_prefix("WATCHER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == StorageBackend::Csv && self.storage.path.as_os_str().is_empty() {
            return Err(ConfigError::Message("Storage path must not be empty".into()));
        }

        if self.storage.backend == StorageBackend::Sqlite && !self.storage.url.starts_with("sqlite:") {
            return Err(ConfigError::Message("Storage url must be a sqlite: connection string".into()));
        }

        if self.scraper.request_timeout == 0 {
            return Err(ConfigError::Message("Scraper request_timeout must be greater than 0".into()));
        }

        if self.scraper.max_concurrent_sources == 0 {
            return Err(ConfigError::Message(
                "Scraper max_concurrent_sources must be greater than 0".into(),
            ));
        }

        if self.notifications.delivery_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Notification delivery_timeout_ms must be greater than 0".into(),
            ));
        }

        if let Some(telegram) = &self.notifications.telegram {
            telegram
                .validate()
                .map_err(|e| ConfigError::Message(format!("Invalid Telegram configuration: {}", e)))?;
        }

        if let Some(discord) = &self.notifications.discord {
            discord
                .validate()
                .map_err(|e| ConfigError::Message(format!("Invalid Discord configuration: {}", e)))?;
        }

        if !is_valid_cron(&self.scheduler.schedule) {
            return Err(ConfigError::Message("Invalid cron expression in scheduler.schedule".into()));
        }

        if self.metrics.enabled && self.metrics.listen.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Message("Metrics listen must be a socket address".into()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate().map_err(ConfigError::Message)?;
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::Message(format!("Duplicate source id '{}'", source.id)));
            }
        }

        Ok(())
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &HtmlSourceConfig> {
        self.sources.iter().filter(|source| source.enabled)
    }
}

/// Shape check for the six- or seven-field expressions the scheduler accepts.
pub fn is_valid_cron(cron_expr: &str) -> bool {
    let parts: Vec<&str> = cron_expr.split_whitespace().collect();
    if parts.len() != 6 && parts.len() != 7 {
        return false;
    }

    parts.iter().all(|part| {
        part.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | ',' | '/' | '?'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source(id: &str) -> HtmlSourceConfig {
        HtmlSourceConfig {
            id: id.to_string(),
            enabled: true,
            domain: "https://plaidonline.com/".to_string(),
            page_url: "https://plaidonline.com/products?page={page}".to_string(),
            first_page: 1,
            page_step: 1,
            max_pages: 10,
            page_count_selector: None,
            item_selector: "div.item".to_string(),
            title_selector: "h3".to_string(),
            price_selectors: vec!["span.price".to_string()],
            link_selector: "a[href]".to_string(),
            page_delay_ms: None,
        }
    }

    fn valid_config() -> AppConfig {
        AppConfig {
            sources: vec![source("plaidonline"), source("enasco")],
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = valid_config();
        config.scraper.request_timeout = 0;

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("request_timeout must be greater than 0"));
    }

    #[test]
    fn test_config_validation_zero_concurrency() {
        let mut config = valid_config();
        config.scraper.max_concurrent_sources = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_duplicate_source() {
        let mut config = valid_config();
        config.sources.push(source("enasco"));

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Duplicate source id 'enasco'"));
    }

    #[test]
    fn test_config_validation_page_template() {
        let mut config = valid_config();
        config.sources[0].page_url = "https://plaidonline.com/products".to_string();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("{page}"));
    }

    #[test]
    fn test_config_validation_invalid_cron() {
        let mut config = valid_config();
        config.scheduler.schedule = "0 0 * * *".to_string();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Invalid cron expression"));
    }

    #[test]
    fn test_config_validation_metrics_listen() {
        let mut config = valid_config();
        config.metrics.enabled = true;
        config.metrics.listen = "not-an-address".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cron_validation() {
        assert!(is_valid_cron("0 0 */6 * * *"));
        assert!(is_valid_cron("0 30 9 * * Mon-Fri"));
        assert!(is_valid_cron("0 0 12 1 * * 2027"));

        assert!(!is_valid_cron("invalid"));
        assert!(!is_valid_cron("0 0 * * *"));
        assert!(!is_valid_cron("0 0 * * * $"));
    }

    #[test]
    fn test_enabled_sources_skips_disabled() {
        let mut config = valid_config();
        config.sources[0].enabled = false;

        let ids: Vec<_> = config.enabled_sources().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["enasco"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
matching = "trimmed"

[storage]
backend = "sqlite"
url = "sqlite::memory:"

[notifications.policy]
notify_all_changes = true

[[sources]]
id = "enasco"
domain = "https://www.enasco.com/"
page_url = "https://www.enasco.com/clearance?page={{page}}"
item_selector = "div.product"
title_selector = "a.name"
price_selectors = ["span.sale", "span.price"]
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.matching, TitleMatching::Trimmed);
        assert!(config.notifications.policy.notify_all_changes);
        assert!(config.notifications.policy.notify_new_items);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].first_page, 1);
        assert_eq!(config.sources[0].link_selector, "a[href]");
        assert!(config.sources[0].enabled);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[scraper]\nmax_concurrent_sources = 0\n").unwrap();

        assert!(AppConfig::load(Some(file.path())).is_err());
    }
}
