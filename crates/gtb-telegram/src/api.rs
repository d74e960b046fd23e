use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use gtb_core::{
    domain::ChatId,
    messaging::{
        port::BotTransport,
        types::{decode_batch, Message, Update},
    },
    Error, Result,
};

/// Extra headroom on top of the long-poll timeout so the HTTP client never
/// gives up before the server does.
const LONG_POLL_MARGIN: Duration = Duration::from_secs(10);

/// Response envelope shared by every Bot API method.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> Result<T> {
        if !self.ok {
            return Err(Error::Transport(format!(
                "{method} returned ok=false: {}",
                self.description.unwrap_or_default()
            )));
        }
        self.result
            .ok_or_else(|| Error::Transport(format!("{method} returned ok=true without a result")))
    }
}

/// The bot's own identity, from `getMe`.
#[derive(Debug, Deserialize)]
pub struct BotProfile {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// Thin client for the three Bot API methods the bot consumes.
///
/// No retries and no backoff here; that policy belongs to the poller.
pub struct TelegramApi {
    http: Client,
    base_url: String,
    send_timeout: Duration,
}

impl TelegramApi {
    /// Build a client for `{api_url}/bot{token}`.
    pub fn new(api_url: &str, token: &str, send_timeout: Duration) -> Result<Self> {
        let http = Client::builder().build().map_err(http_err)?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            send_timeout,
        })
    }

    /// Token sanity check; used for the startup banner.
    pub async fn get_me(&self) -> Result<BotProfile> {
        let response = self
            .http
            .get(format!("{}/getMe", self.base_url))
            .timeout(self.send_timeout)
            .send()
            .await
            .map_err(http_err)?;
        Self::parse(response, "getMe").await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, method: &str) -> Result<T> {
        let status = response.status();
        let body = response.text().await.map_err(http_err)?;
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "{method} returned HTTP {status}: {body}"
            )));
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&body)?;
        envelope.into_result(method)
    }
}

#[async_trait]
impl BotTransport for TelegramApi {
    async fn fetch_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>> {
        let response = self
            .http
            .get(format!("{}/getUpdates", self.base_url))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout.as_secs().to_string()),
            ])
            .timeout(timeout + LONG_POLL_MARGIN)
            .send()
            .await
            .map_err(http_err)?;

        // Decoded per element so one malformed update cannot poison the batch.
        let raw: Vec<serde_json::Value> = Self::parse(response, "getUpdates").await?;
        let batch = decode_batch(raw);
        if !batch.is_empty() {
            debug!("fetched {} update(s)", batch.len());
        }
        Ok(batch)
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<Message> {
        let response = self
            .http
            .post(format!("{}/sendMessage", self.base_url))
            .json(&serde_json::json!({ "chat_id": chat_id.0, "text": text }))
            .timeout(self.send_timeout)
            .send()
            .await
            .map_err(http_err)?;

        Self::parse(response, "sendMessage").await
    }
}

fn http_err(err: reqwest::Error) -> Error {
    Error::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_ok_unwraps_the_result() {
        let envelope: ApiResponse<Vec<i64>> =
            serde_json::from_value(json!({"ok": true, "result": [1, 2]})).unwrap();
        assert_eq!(envelope.into_result("getUpdates").unwrap(), vec![1, 2]);
    }

    #[test]
    fn envelope_not_ok_carries_the_description() {
        let envelope: ApiResponse<Vec<i64>> =
            serde_json::from_value(json!({"ok": false, "description": "Unauthorized"})).unwrap();
        let err = envelope.into_result("getUpdates").unwrap_err();
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[test]
    fn envelope_ok_without_result_is_an_error() {
        let envelope: ApiResponse<Vec<i64>> =
            serde_json::from_value(json!({"ok": true})).unwrap();
        assert!(envelope.into_result("getUpdates").is_err());
    }

    #[test]
    fn base_url_tolerates_trailing_slash() {
        let api =
            TelegramApi::new("https://api.telegram.org/", "123:abc", Duration::from_secs(5))
                .unwrap();
        assert_eq!(api.base_url, "https://api.telegram.org/bot123:abc");
    }
}
