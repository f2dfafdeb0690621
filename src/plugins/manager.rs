use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

use super::notifiers::{DiscordChannel, LogChannel, TelegramChannel};
use super::traits::notifier::{NotificationChannel, NotificationEvent, NotificationResult};
use crate::config::NotificationsConfig;
use crate::utils::error::{AppError, Result};

pub type NotificationChannelBox = Box<dyn NotificationChannel>;

/// Which events are worth sending at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifyPolicy {
    /// Send one message per newly discovered item.
    #[serde(default = "default_true")]
    pub notify_new_items: bool,
    /// Send price increases too; by default only drops are sent.
    #[serde(default)]
    pub notify_all_changes: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self {
            notify_new_items: true,
            notify_all_changes: false,
        }
    }
}

impl NotifyPolicy {
    pub fn allows(&self, event: &NotificationEvent) -> bool {
        match event {
            NotificationEvent::NewItem { .. } => self.notify_new_items,
            NotificationEvent::PriceChanged(change) => self.notify_all_changes || change.is_decrease(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeliveryOptions {
    /// Deadline for a single delivery attempt.
    pub timeout: Duration,
    /// Pause before the one retry after a timeout.
    pub retry_delay: Duration,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
    pub suppressed: usize,
}

#[derive(Default)]
struct DeliveryStats {
    sent: AtomicUsize,
    failed: AtomicUsize,
    suppressed: AtomicUsize,
}

/// Fans events out to every registered channel.
///
/// `notify` never fails: policy filtering, the retry-once-on-timeout rule and
/// error swallowing all happen here so the run never sees a delivery error.
#[derive(Clone)]
pub struct Notifier {
    channels: Arc<RwLock<HashMap<String, NotificationChannelBox>>>,
    policy: NotifyPolicy,
    options: DeliveryOptions,
    stats: Arc<DeliveryStats>,
}

impl Notifier {
    pub fn new(policy: NotifyPolicy, options: DeliveryOptions) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            policy,
            options,
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    /// Build the dispatcher with every channel the configuration enables.
    /// Falls back to the log channel when no remote channel is configured.
    pub async fn from_config(config: &NotificationsConfig) -> Result<Self> {
        let notifier = Self::new(
            config.policy,
            DeliveryOptions {
                timeout: Duration::from_millis(config.delivery_timeout_ms),
                retry_delay: Duration::from_millis(config.retry_delay_ms),
            },
        );

        if let Some(telegram) = &config.telegram {
            notifier.register_channel(Box::new(TelegramChannel::new(telegram.clone())?)).await?;
        }

        if let Some(discord) = &config.discord {
            notifier.register_channel(Box::new(DiscordChannel::new(discord.clone())?)).await?;
        }

        if config.log_events || notifier.list_channels().await.is_empty() {
            notifier.register_channel(Box::new(LogChannel::new())).await?;
        }

        Ok(notifier)
    }

    /// Register a channel, replacing any channel with the same name
    pub async fn register_channel(&self, channel: NotificationChannelBox) -> Result<()> {
        let name = channel.name().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("notification channel name must not be empty".into()));
        }

        let mut channels = self.channels.write().await;
        if channels.insert(name.clone(), channel).is_some() {
            tracing::debug!("Replaced notification channel {}", name);
        }
        Ok(())
    }

    /// Check if a channel exists
    pub async fn has_channel(&self, name: &str) -> bool {
        let channels = self.channels.read().await;
        channels.contains_key(name)
    }

    /// List all registered channel names, sorted
    pub async fn list_channels(&self) -> Vec<String> {
        let channels = self.channels.read().await;
        let mut names: Vec<String> = channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn report(&self) -> DeliveryReport {
        DeliveryReport {
            sent: self.stats.sent.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            suppressed: self.stats.suppressed.load(Ordering::Relaxed),
        }
    }

    /// Deliver an event to every channel the policy lets it through to.
    pub async fn notify(&self, event: NotificationEvent) {
        if !self.policy.allows(&event) {
            self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Suppressed {} notification by policy", event.kind());
            return;
        }

        let channels = self.channels.read().await;
        for (name, channel) in channels.iter() {
            match self.deliver(channel.as_ref(), &event).await {
                Ok(_) => {
                    self.stats.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("watcher_notifications_failed_total").increment(1);
                    tracing::warn!("Failed to deliver {} notification via {}: {}", event.kind(), name, e);
                }
            }
        }
    }

    async fn deliver(&self, channel: &dyn NotificationChannel, event: &NotificationEvent) -> Result<NotificationResult> {
        let timeout = self.options.timeout;
        let retry = FixedInterval::new(self.options.retry_delay).take(1);

        RetryIf::spawn(
            retry,
            || async move {
                match tokio::time::timeout(timeout, channel.send(event)).await {
                    Ok(result) => result,
                    Err(_) => Err(AppError::Timeout {
                        millis: timeout.as_millis() as u64,
                    }),
                }
            },
            |e: &AppError| {
                if e.is_timeout() {
                    tracing::debug!("Delivery via {} timed out, retrying once", channel.name());
                }
                e.is_timeout()
            },
        )
        .await
    }
}
