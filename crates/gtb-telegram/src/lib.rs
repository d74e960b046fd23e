//! Telegram Bot API adapter: implements the core transport port over HTTP
//! long polling.

mod api;

pub use api::{BotProfile, TelegramApi};
