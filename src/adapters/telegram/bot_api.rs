//! Telegram Bot API sender. Implements MessageSender over HTTPS.
//!
//! Media is referenced by server-side file id; the registration control is
//! an inline keyboard attached to text sends. The client carries a request
//! timeout so one stuck delivery cannot hold a fan-out slot indefinitely.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::warn;

use crate::domain::DomainError;
use crate::ports::MessageSender;

/// Bot API sender. One HTTPS call per delivery.
pub struct BotApiSender {
    client: reqwest::Client,
    base_url: String,
}

impl BotApiSender {
    /// Create a sender for the given bot token.
    pub fn new(token: &str, timeout: Duration) -> Result<Self, DomainError> {
        Self::with_base_url(&format!("https://api.telegram.org/bot{token}"), timeout)
    }

    /// Create a sender against a custom API endpoint (local Bot API server).
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::Sender(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call(&self, method: &str, payload: &Value) -> Result<(), DomainError> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| DomainError::Sender(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(method, status = %status, body = %text, "Bot API returned error");
            return Err(DomainError::Sender(format!(
                "API error {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }
        Ok(())
    }

    fn registration_markup(event_id: i64) -> Value {
        json!({
            "inline_keyboard": [[{
                "text": "Register",
                "callback_data": format!("register_{event_id}"),
            }]]
        })
    }

    fn with_caption(mut payload: Value, caption: &str) -> Value {
        if !caption.is_empty() {
            payload["caption"] = Value::String(caption.to_string());
            payload["parse_mode"] = Value::String("HTML".to_string());
        }
        payload
    }
}

#[async_trait::async_trait]
impl MessageSender for BotApiSender {
    async fn send_text(
        &self,
        user_id: i64,
        text: &str,
        register_event: Option<i64>,
    ) -> Result<(), DomainError> {
        let mut payload = json!({
            "chat_id": user_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(event_id) = register_event {
            payload["reply_markup"] = Self::registration_markup(event_id);
        }
        self.call("sendMessage", &payload).await
    }

    async fn send_photo(
        &self,
        user_id: i64,
        file_id: &str,
        caption: &str,
    ) -> Result<(), DomainError> {
        let payload = Self::with_caption(json!({ "chat_id": user_id, "photo": file_id }), caption);
        self.call("sendPhoto", &payload).await
    }

    async fn send_voice(
        &self,
        user_id: i64,
        file_id: &str,
        caption: &str,
    ) -> Result<(), DomainError> {
        let payload = Self::with_caption(json!({ "chat_id": user_id, "voice": file_id }), caption);
        self.call("sendVoice", &payload).await
    }

    async fn send_video_note(&self, user_id: i64, file_id: &str) -> Result<(), DomainError> {
        let payload = json!({ "chat_id": user_id, "video_note": file_id });
        self.call("sendVideoNote", &payload).await
    }

    async fn send_video(
        &self,
        user_id: i64,
        file_id: &str,
        caption: &str,
    ) -> Result<(), DomainError> {
        let payload = Self::with_caption(json!({ "chat_id": user_id, "video": file_id }), caption);
        self.call("sendVideo", &payload).await
    }
}
