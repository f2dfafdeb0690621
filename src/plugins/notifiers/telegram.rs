use crate::models::{ChangeType, RunSummary};
use crate::plugins::traits::{NotificationChannel, NotificationEvent};
use crate::plugins::traits::notifier::NotificationResult;
use crate::utils::error::{AppError, Result};
use async_trait::async_trait;
use html_escape::{encode_double_quoted_attribute, encode_text};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_disable_preview")]
    pub disable_web_page_preview: bool,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_disable_preview() -> bool {
    true
}

impl TelegramConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.bot_token.trim().is_empty() {
            return Err("Missing bot_token".to_string());
        }
        if !self.bot_token.contains(':') {
            return Err("Invalid Telegram bot token format".to_string());
        }
        if self.chat_id.trim().is_empty() {
            return Err("Missing chat_id".to_string());
        }
        if url::Url::parse(&self.api_base).is_err() {
            return Err("Invalid Telegram API base URL".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    description: Option<String>,
    result: Option<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

// Message prefixes
const ALERT: &str = "⚠️⚠️";
const ADD: &str = "🆕✨";
const UP: &str = "⬆️📈";
const DOWN: &str = "⬇️📉";

pub struct TelegramChannel {
    client: Client,
    config: TelegramConfig,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| AppError::Validation(format!("Invalid Telegram configuration: {}", e)))?;

        Ok(Self {
            client: Client::new(),
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    /// Render an event as a Telegram HTML message.
    pub fn format_message(event: &NotificationEvent) -> String {
        match event {
            NotificationEvent::RunStarted { known_items, sources } => format!(
                "{} Loaded {} existing items.\nStart scraping {} sources...",
                ALERT, known_items, sources
            ),
            NotificationEvent::NewItem { item } => format!(
                "{} <b>Hey! A new item was added!</b>\n<a href=\"{}\">{}</a> - <b>Price:</b> ${:.2}",
                ADD,
                encode_double_quoted_attribute(&item.url),
                encode_text(&item.title),
                item.price
            ),
            NotificationEvent::PriceChanged(change) => {
                let emoji = match change.change_type() {
                    ChangeType::Decreased => DOWN,
                    _ => UP,
                };
                format!(
                    "{} <b>Hey! An item's price has been changed!</b>\n<a href=\"{}\">{}</a>\n<b>Old Price:</b> ${:.2} - <b>New Price:</b> ${:.2}",
                    emoji,
                    encode_double_quoted_attribute(&change.url),
                    encode_text(&change.title),
                    change.old_price,
                    change.new_price
                )
            }
            NotificationEvent::SourceFailure(failure) => format!(
                "{} <b>Error while trying to scrape {}</b>: '{}'.\nItems collected before the failure: {}",
                ALERT,
                encode_text(&failure.source_id),
                encode_text(&failure.cause),
                failure.items_collected
            ),
            NotificationEvent::RunSummary(summary) => Self::format_summary(summary),
            NotificationEvent::Alert { message } => format!("{} {}", ALERT, encode_text(message)),
        }
    }

    fn format_summary(summary: &RunSummary) -> String {
        let emoji = if summary.new_count > 0 { ADD } else { ALERT };
        format!(
            "{} <b>Done.</b> {} new items, {} price changes, {} unchanged, {} skipped.\nSources: {} attempted, {} failed. Took {:.1}s.",
            emoji,
            summary.new_count,
            summary.updated_count,
            summary.unchanged_count,
            summary.skipped_count,
            summary.sources_attempted,
            summary.sources_failed,
            summary.elapsed.as_secs_f64()
        )
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, event: &NotificationEvent) -> Result<NotificationResult> {
        let payload = json!({
            "chat_id": self.config.chat_id,
            "text": Self::format_message(event),
            "parse_mode": "HTML",
            "disable_web_page_preview": self.config.disable_web_page_preview,
        });

        let response = self.client.post(self.endpoint()).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::notification(self.name(), format!("HTTP {}: {}", status, body)));
        }

        let body: SendMessageResponse = response.json().await?;
        if !body.ok {
            return Err(AppError::notification(
                self.name(),
                body.description.unwrap_or_else(|| "request rejected".to_string()),
            ));
        }

        Ok(NotificationResult {
            message_id: body.result.map(|m| m.message_id.to_string()),
        })
    }
}
