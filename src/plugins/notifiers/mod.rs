// Notifier plugin implementations
pub mod discord;
pub mod logger;
pub mod telegram;

pub use discord::{DiscordChannel, DiscordConfig};
pub use logger::LogChannel;
pub use telegram::{TelegramChannel, TelegramConfig};
