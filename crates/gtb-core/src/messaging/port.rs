use std::time::Duration;

use async_trait::async_trait;

use crate::{
    domain::ChatId,
    messaging::types::{Message, Update},
    Result,
};

/// Transport port for the messaging API.
///
/// Two stateless request/response operations. Retry and backoff policy
/// belongs to the caller (the poller), never to an implementation.
#[async_trait]
pub trait BotTransport: Send + Sync {
    /// Long-poll for updates with ids >= `offset`. The server holds the
    /// request open up to `timeout`; an empty batch is a normal outcome.
    async fn fetch_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>>;

    /// Send a plain-text message to a chat, returning the message as sent.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<Message>;
}
