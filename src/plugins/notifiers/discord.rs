use crate::models::ChangeType;
use crate::plugins::traits::notifier::NotificationResult;
use crate::plugins::traits::{NotificationChannel, NotificationEvent};
use crate::utils::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscordConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub mention_role: Option<String>,
}

impl DiscordConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        let url = url::Url::parse(&self.webhook_url).map_err(|_| "Invalid Discord webhook URL format".to_string())?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err("Invalid Discord webhook URL format".to_string());
        }
        if !self.webhook_url.starts_with("https://discord.com/api/webhooks/") {
            tracing::warn!("Discord webhook {} is not a discord.com webhook URL", self.webhook_url);
        }
        Ok(())
    }
}

const COLOR_DROP: u32 = 0x00ff00;
const COLOR_RISE: u32 = 0xff9900;
const COLOR_INFO: u32 = 0x0099ff;
const COLOR_ERROR: u32 = 0xff0000;

pub struct DiscordChannel {
    client: Client,
    config: DiscordConfig,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| AppError::Validation(format!("Invalid Discord configuration: {}", e)))?;

        Ok(Self {
            client: Client::new(),
            config,
        })
    }

    fn get_embed_color(&self, change_type: ChangeType) -> u32 {
        match change_type {
            ChangeType::Decreased => COLOR_DROP, // Green for price drops
            ChangeType::Increased => COLOR_RISE, // Orange for price increases
            ChangeType::Unchanged => COLOR_INFO,
        }
    }

    fn get_emoji(&self, change_type: ChangeType) -> &str {
        match change_type {
            ChangeType::Decreased => "📉",
            ChangeType::Increased => "📈",
            ChangeType::Unchanged => "📊",
        }
    }

    fn create_embed(&self, event: &NotificationEvent) -> serde_json::Value {
        let mut embed = match event {
            NotificationEvent::PriceChanged(change) => {
                let change_type = change.change_type();
                let change_title = match change_type {
                    ChangeType::Decreased => "💰 Price Drop!",
                    ChangeType::Increased => "⚠️ Price Increase",
                    ChangeType::Unchanged => "📊 Update",
                };
                json!({
                    "title": format!("{} {}", self.get_emoji(change_type), change.title),
                    "url": change.url,
                    "color": self.get_embed_color(change_type),
                    "fields": [{
                        "name": change_title,
                        "value": format!(
                            "**Old:** ${:.2}\n**New:** ${:.2}\n**Change:** {:.2}",
                            change.old_price, change.new_price, change.difference()
                        ),
                        "inline": false
                    }]
                })
            }
            NotificationEvent::NewItem { item } => json!({
                "title": format!("🆕 {}", item.title),
                "url": item.url,
                "color": COLOR_INFO,
                "fields": [{
                    "name": "🏷️ Price",
                    "value": format!("${:.2}", item.price),
                    "inline": true
                }]
            }),
            NotificationEvent::SourceFailure(failure) => json!({
                "title": format!("⚠️ Source failed: {}", failure.source_id),
                "description": failure.cause,
                "color": COLOR_ERROR,
                "fields": [{
                    "name": "Items collected",
                    "value": failure.items_collected.to_string(),
                    "inline": true
                }]
            }),
            NotificationEvent::RunSummary(summary) => {
                let color = if summary.all_sources_failed() { COLOR_ERROR } else { COLOR_INFO };
                json!({
                    "title": "📊 Run summary",
                    "color": color,
                    "fields": [
                        { "name": "New", "value": summary.new_count.to_string(), "inline": true },
                        { "name": "Price changes", "value": summary.updated_count.to_string(), "inline": true },
                        { "name": "Skipped", "value": summary.skipped_count.to_string(), "inline": true },
                        {
                            "name": "Sources",
                            "value": format!("{} attempted, {} failed", summary.sources_attempted, summary.sources_failed),
                            "inline": false
                        }
                    ]
                })
            }
            NotificationEvent::RunStarted { known_items, sources } => json!({
                "title": "🔎 Run started",
                "description": format!("Loaded {} existing items, scraping {} sources", known_items, sources),
                "color": COLOR_INFO,
            }),
            NotificationEvent::Alert { message } => json!({
                "title": "⚠️ Alert",
                "description": message,
                "color": COLOR_INFO,
            }),
        };

        embed["timestamp"] = json!(chrono::Utc::now().to_rfc3339());
        embed["footer"] = json!({ "text": "Deal Watcher" });
        embed
    }

    fn create_webhook_payload(&self, event: &NotificationEvent) -> serde_json::Value {
        let mut payload = json!({
            "embeds": [self.create_embed(event)]
        });

        // Add webhook customization
        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }

        if let Some(avatar_url) = &self.config.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        // Only price drops ping the role
        if let (Some(role), NotificationEvent::PriceChanged(change)) = (&self.config.mention_role, event) {
            if change.is_decrease() {
                payload["content"] = json!(format!("<@&{}>", role));
            }
        }

        payload
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, event: &NotificationEvent) -> Result<NotificationResult> {
        let payload = self.create_webhook_payload(event);

        let response = self.client.post(&self.config.webhook_url).json(&payload).send().await?;
        if let Err(e) = response.error_for_status_ref() {
            return Err(AppError::notification(self.name(), e));
        }

        Ok(NotificationResult::default())
    }
}
