use crate::plugins::traits::notifier::NotificationResult;
use crate::plugins::traits::{NotificationChannel, NotificationEvent};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Writes events to the tracing log. Used when no remote channel is set up.
#[derive(Debug, Default)]
pub struct LogChannel;

impl LogChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, event: &NotificationEvent) -> Result<NotificationResult> {
        let payload = serde_json::to_string(event)?;
        match event {
            NotificationEvent::SourceFailure(_) => tracing::warn!(kind = event.kind(), "{}", payload),
            _ => tracing::info!(kind = event.kind(), "{}", payload),
        }
        Ok(NotificationResult::default())
    }
}
