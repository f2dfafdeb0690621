use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Item, PriceChange, RunSummary, SourceFailure};
use crate::utils::error::Result;

/// Everything the run can tell an operator about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    RunStarted { known_items: usize, sources: usize },
    NewItem { item: Item },
    PriceChanged(PriceChange),
    SourceFailure(SourceFailure),
    RunSummary(RunSummary),
    Alert { message: String },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::RunStarted { .. } => "run_started",
            NotificationEvent::NewItem { .. } => "new_item",
            NotificationEvent::PriceChanged(_) => "price_changed",
            NotificationEvent::SourceFailure(_) => "source_failure",
            NotificationEvent::RunSummary(_) => "run_summary",
            NotificationEvent::Alert { .. } => "alert",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationResult {
    pub message_id: Option<String>,
}

/// Trait for implementing notification methods (Telegram, Discord, etc.)
///
/// Channels report failures; retrying and swallowing them is the
/// dispatcher's job.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, event: &NotificationEvent) -> Result<NotificationResult>;
}
