pub mod manager;
pub mod notifiers;
pub mod sources;
pub mod traits;

pub use manager::{DeliveryOptions, DeliveryReport, Notifier, NotifyPolicy};
pub use traits::{NotificationChannel, NotificationEvent, SourceAdapter};
