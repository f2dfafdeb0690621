// Integration tests for Deal Watcher
// These tests drive whole runs against mocked listing sites and a mocked Telegram API

pub mod pipeline_tests;
pub mod scheduler_tests;
pub mod storage_tests;

use async_trait::async_trait;
use deal_watcher::{
    config::{AppConfig, NotificationsConfig, ScraperConfig, StorageBackend, StorageConfig},
    plugins::notifiers::TelegramConfig,
    plugins::sources::HtmlSourceConfig,
    plugins::traits::notifier::NotificationResult,
    plugins::traits::{NotificationChannel, NotificationEvent},
};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const BOT_TOKEN: &str = "123456:integration";

/// Test configuration: two sources and Telegram, all served by `server`
pub fn get_test_config(server: &MockServer, data_dir: &Path) -> AppConfig {
    AppConfig {
        storage: StorageConfig {
            backend: StorageBackend::Csv,
            path: data_dir.join("items.csv"),
            url: format!("sqlite://{}?mode=rwc", data_dir.join("items.db").display()),
        },
        scraper: ScraperConfig {
            user_agent: "deal-watcher-tests".to_string(),
            request_timeout: 5,
            page_delay_ms: 0,
            max_concurrent_sources: 2,
        },
        notifications: NotificationsConfig {
            telegram: Some(TelegramConfig {
                bot_token: BOT_TOKEN.to_string(),
                chat_id: "-100200300".to_string(),
                api_base: server.uri(),
                disable_web_page_preview: true,
            }),
            ..NotificationsConfig::default()
        },
        sources: vec![plaid_source(server), enasco_source(server)],
        ..AppConfig::default()
    }
}

pub fn plaid_source(server: &MockServer) -> HtmlSourceConfig {
    HtmlSourceConfig {
        id: "plaidonline".to_string(),
        enabled: true,
        domain: format!("{}/", server.uri()),
        page_url: format!("{}/plaid/clearance?page={{page}}", server.uri()),
        first_page: 1,
        page_step: 1,
        max_pages: 10,
        page_count_selector: None,
        item_selector: "div.product-card".to_string(),
        title_selector: "h3.title".to_string(),
        price_selectors: vec!["span.sale".to_string(), "span.price".to_string()],
        link_selector: "a[href]".to_string(),
        page_delay_ms: None,
    }
}

pub fn enasco_source(server: &MockServer) -> HtmlSourceConfig {
    HtmlSourceConfig {
        id: "enasco".to_string(),
        enabled: true,
        domain: format!("{}/", server.uri()),
        page_url: format!("{}/enasco/sale/{{page}}", server.uri()),
        first_page: 1,
        page_step: 1,
        max_pages: 10,
        page_count_selector: None,
        item_selector: "li.item".to_string(),
        title_selector: "a.name".to_string(),
        price_selectors: vec!["span.amount".to_string()],
        link_selector: "a.name".to_string(),
        page_delay_ms: None,
    }
}

/// Render a plaidonline-style listing page from (title, price text, href)
pub fn plaid_page(items: &[(&str, &str, &str)]) -> String {
    let cards: String = items
        .iter()
        .map(|(title, price, href)| {
            format!(
                r#"<div class="product-card"><a href="{}"><img src="x.jpg"></a><h3 class="title">{}</h3><span class="price">{}</span></div>"#,
                href, title, price
            )
        })
        .collect();
    format!("<html><body><main>{}</main></body></html>", cards)
}

/// Render an enasco-style listing page from (title, price text, href)
pub fn enasco_page(items: &[(&str, &str, &str)]) -> String {
    let rows: String = items
        .iter()
        .map(|(title, price, href)| {
            format!(
                r#"<li class="item"><a class="name" href="{}">{}</a><span class="amount">{}</span></li>"#,
                href, title, price
            )
        })
        .collect();
    format!("<html><body><ul>{}</ul></body></html>", rows)
}

pub async fn mount_plaid_page(server: &MockServer, page: u32, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path("/plaid/clearance"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

pub async fn mount_enasco_page(server: &MockServer, page: u32, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path(format!("/enasco/sale/{}", page)))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

pub async fn mount_telegram(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/bot[^/]+/sendMessage$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 1 }
        })))
        .mount(server)
        .await;
}

/// Text of every Telegram message the mock server received
pub async fn telegram_messages(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path().ends_with("/sendMessage"))
        .filter_map(|request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).ok()?;
            body["text"].as_str().map(str::to_string)
        })
        .collect()
}

/// Channel that keeps every event it is handed
#[derive(Clone, Default)]
pub struct RecordingChannel {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl RecordingChannel {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, event: &NotificationEvent) -> deal_watcher::Result<NotificationResult> {
        self.events.lock().unwrap().push(event.clone());
        Ok(NotificationResult::default())
    }
}

/// Helper to wait for async operations
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout_seconds: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_secs(timeout_seconds);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    false
}
