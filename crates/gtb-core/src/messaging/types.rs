use serde::Deserialize;
use tracing::warn;

use crate::domain::ChatId;

/// One element of a fetched batch. Also the stream's sequence boundary:
/// the next fetch offset is `update_id + 1`.
#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    /// Absent for update kinds the bot does not consume (edits, channel
    /// posts, ...); such updates are acknowledged and skipped.
    #[serde(default)]
    pub message: Option<Message>,
}

/// An inbound chat message. Immutable once received.
///
/// Unknown upstream fields are ignored for forward compatibility; optional
/// fields tolerate absence.
#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "from")]
    pub from: Option<Sender>,
    pub chat: Chat,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Sender {
    pub id: i64,
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Decode a raw batch, one element at a time.
///
/// A malformed element is logged and skipped rather than failing the whole
/// batch: one bad record from upstream must not stall ingestion.
pub fn decode_batch(raw: Vec<serde_json::Value>) -> Vec<Update> {
    let mut updates = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_json::from_value::<Update>(value) {
            Ok(update) => updates.push(update),
            Err(err) => warn!("skipping malformed update: {err}"),
        }
    }
    updates
}
