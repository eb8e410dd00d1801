//! Telegram Bot API delivery port.
//!
//! Dispatch shape depends on the attached media: plain text goes through
//! `sendMessage`, one attachment through `sendPhoto`/`sendVideo`/
//! `sendDocument` with the post text as caption, several through
//! `sendMediaGroup` with an optional follow-up message carrying the inline
//! keyboard (media groups cannot carry one).
//!
//! Failure classification drives the engine's retry decision: 429 is
//! retryable with the server-requested delay, 4xx client errors are
//! permanent, everything else (network, 5xx) is transient.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use telepost_core::traits::{Delivery, DeliveryError, DeliveryPort};
use telepost_core::types::{ChannelRef, InlineButton, RenderedPost};

/// Telegram delivery port. Stateless apart from the shared HTTP client;
/// the bot token travels with each destination.
pub struct TelegramPort {
    client: reqwest::Client,
}

impl TelegramPort {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn call(
        &self,
        token: &str,
        method: &str,
        payload: &Value,
    ) -> Result<Value, DeliveryError> {
        let response = self
            .client
            .post(api_url(token, method))
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::transient(format!("{method} request failed: {e}")))?;

        let status = response.status().as_u16();
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::transient(format!("invalid {method} response: {e}")))?;

        if body.ok {
            return Ok(body.result.unwrap_or(Value::Null));
        }
        let description = body
            .description
            .unwrap_or_else(|| "unknown Telegram error".into());
        Err(classify(
            status,
            format!("{method}: {description}"),
            body.parameters.and_then(|p| p.retry_after),
        ))
    }

    async fn send_text(
        &self,
        token: &str,
        chat_id: &str,
        post: &RenderedPost,
        keyboard: Option<Value>,
    ) -> Result<Delivery, DeliveryError> {
        let mut payload = base_payload(chat_id, post);
        payload["text"] = json!(post.html);
        payload["parse_mode"] = json!("HTML");
        payload["disable_web_page_preview"] = json!(post.options.disable_preview);
        if let Some(kb) = keyboard {
            payload["reply_markup"] = kb;
        }
        let result = self.call(token, "sendMessage", &payload).await?;
        Ok(Delivery {
            message_id: message_id(&result),
        })
    }

    async fn send_single_media(
        &self,
        token: &str,
        chat_id: &str,
        post: &RenderedPost,
        keyboard: Option<Value>,
    ) -> Result<Delivery, DeliveryError> {
        let item = &post.media[0];
        let kind = normalize_media_type(&item.kind);
        let method = match kind {
            "video" => "sendVideo",
            "document" => "sendDocument",
            _ => "sendPhoto",
        };

        let mut payload = base_payload(chat_id, post);
        payload[kind] = json!(item.url);
        if !post.html.is_empty() {
            payload["caption"] = json!(post.html);
            payload["parse_mode"] = json!("HTML");
        }
        if let Some(kb) = keyboard {
            payload["reply_markup"] = kb;
        }

        let result = self.call(token, method, &payload).await?;
        let receipt = message_id(&result);
        if post.options.pin {
            self.pin(token, chat_id, receipt.as_deref()).await;
        }
        Ok(Delivery { message_id: receipt })
    }

    async fn send_media_group(
        &self,
        token: &str,
        chat_id: &str,
        post: &RenderedPost,
        keyboard: Option<Value>,
    ) -> Result<Delivery, DeliveryError> {
        let group: Vec<Value> = post
            .media
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let mut entry = json!({
                    "type": normalize_media_type(&item.kind),
                    "media": item.url,
                });
                if idx == 0 && !post.html.is_empty() {
                    entry["caption"] = json!(post.html);
                    entry["parse_mode"] = json!("HTML");
                }
                entry
            })
            .collect();

        let mut payload = base_payload(chat_id, post);
        payload["media"] = json!(group);
        let result = self.call(token, "sendMediaGroup", &payload).await?;
        let mut receipt = message_id(&result);

        // media groups cannot carry a keyboard; send it as a follow-up
        if let Some(kb) = keyboard {
            let mut follow_up = base_payload(chat_id, post);
            follow_up["text"] = json!("More:");
            follow_up["reply_markup"] = kb;
            if let Ok(result) = self.call(token, "sendMessage", &follow_up).await {
                if let Some(id) = message_id(&result) {
                    receipt = Some(id);
                }
            }
        }

        if post.options.pin {
            self.pin(token, chat_id, receipt.as_deref()).await;
        }
        Ok(Delivery { message_id: receipt })
    }

    /// Best effort; a failed pin never fails the delivery.
    async fn pin(&self, token: &str, chat_id: &str, message_id: Option<&str>) {
        let Some(id) = message_id.and_then(|s| s.parse::<i64>().ok()) else {
            return;
        };
        let payload = json!({ "chat_id": chat_id, "message_id": id });
        if let Err(e) = self.call(token, "pinChatMessage", &payload).await {
            tracing::debug!("pinChatMessage failed: {e}");
        }
    }
}

impl Default for TelegramPort {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryPort for TelegramPort {
    async fn send(
        &self,
        destination: &ChannelRef,
        post: &RenderedPost,
    ) -> Result<Delivery, DeliveryError> {
        let chat_id = normalize_chat_id(&destination.chat_id);
        let token = &destination.bot_token;
        let keyboard = build_inline_keyboard(&post.buttons);
        match post.media.len() {
            0 => self.send_text(token, &chat_id, post, keyboard).await,
            1 => self.send_single_media(token, &chat_id, post, keyboard).await,
            _ => self.send_media_group(token, &chat_id, post, keyboard).await,
        }
    }
}

// --- Telegram API plumbing ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ApiParameters>,
}

#[derive(Debug, Deserialize)]
struct ApiParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

fn api_url(token: &str, method: &str) -> String {
    format!("https://api.telegram.org/bot{token}/{method}")
}

fn base_payload(chat_id: &str, post: &RenderedPost) -> Value {
    json!({
        "chat_id": chat_id,
        "disable_notification": post.options.disable_notification,
        "protect_content": post.options.protect_content,
    })
}

fn classify(status: u16, reason: String, retry_after: Option<u64>) -> DeliveryError {
    match status {
        429 => DeliveryError {
            retryable: true,
            reason,
            retry_after: retry_after.map(Duration::from_secs),
        },
        400 | 401 | 403 | 404 => DeliveryError {
            retryable: false,
            reason,
            retry_after: None,
        },
        _ => DeliveryError {
            retryable: true,
            reason,
            retry_after: None,
        },
    }
}

/// `sendMessage` returns one message, `sendMediaGroup` an array — the
/// receipt is the first message id either way.
fn message_id(result: &Value) -> Option<String> {
    let value = if result.is_array() {
        result.get(0)?
    } else {
        result
    };
    value.get("message_id").map(|id| id.to_string())
}

/// Accept raw ids, `@usernames`, bare usernames, and `t.me/...` links.
pub fn normalize_chat_id(raw: &str) -> String {
    let mut value = raw.trim();
    for prefix in ["https://t.me/", "http://t.me/", "t.me/"] {
        if let Some(stripped) = value.strip_prefix(prefix) {
            value = stripped;
        }
    }
    if value.starts_with('@') {
        return value.to_string();
    }
    let digits = value.trim_start_matches('-');
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return value.to_string();
    }
    if value.len() >= 5 && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return format!("@{value}");
    }
    value.to_string()
}

/// Map loose media-type aliases onto the three Bot API kinds.
pub fn normalize_media_type(raw: &str) -> &'static str {
    match raw.trim().to_lowercase().as_str() {
        "video" => "video",
        "document" | "gif" | "file" => "document",
        _ => "photo",
    }
}

/// One button per row; buttons missing text or url are dropped.
pub fn build_inline_keyboard(buttons: &[InlineButton]) -> Option<Value> {
    let rows: Vec<Value> = buttons
        .iter()
        .filter(|b| !b.text.is_empty() && !b.url.is_empty())
        .map(|b| json!([{ "text": b.text, "url": b.url }]))
        .collect();
    if rows.is_empty() {
        None
    } else {
        Some(json!({ "inline_keyboard": rows }))
    }
}
