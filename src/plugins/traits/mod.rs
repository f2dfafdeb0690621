pub mod notifier;
pub mod source;

pub use notifier::{NotificationChannel, NotificationEvent};
pub use source::{ItemStream, SourceAdapter};
