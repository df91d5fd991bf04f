//! Telegram channel: Bot API client, long-poll loop and update handling.
//!
//! Talks to the Bot API REST surface directly. Polling uses `getUpdates`
//! with a 50 s server-side timeout and a fixed back-off after transient
//! errors; the webhook controller feeds the same `handle_update` path.

use crate::channels::dispatcher::{CLEANUP_CALLBACK, CommandDispatcher};
use crate::channels::util::{TELEGRAM_MAX_MESSAGE_CHARS, split_reply};
use crate::channels::NormalizedMessage;
use crate::http::shared_client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::oneshot;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Server-side long-poll timeout passed to getUpdates
const POLL_TIMEOUT_SECS: u64 = 50;

/// Fixed back-off after a failed poll
const POLL_RETRY_SECS: u64 = 5;

/// Client-side timeout for calls other than getUpdates
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Envelope every Bot API method replies with
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// The one-button cleanup keyboard attached to list replies
fn cleanup_keyboard() -> Value {
    json!({
        "inline_keyboard": [[
            { "text": "🧹 Clean done", "callback_data": CLEANUP_CALLBACK }
        ]]
    })
}

pub struct TelegramClient {
    token: String,
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        TelegramClient { token }
    }

    async fn call<T: DeserializeOwned + Default>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<T, String> {
        let url = format!("{}/bot{}/{}", TELEGRAM_API_BASE, self.token, method);
        let response = shared_client()
            .post(&url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let parsed: ApiResponse<T> = serde_json::from_str(&body)
            .map_err(|e| format!("Failed to parse {} response ({}): {}", method, status, e))?;

        if !parsed.ok {
            return Err(format!(
                "Telegram API error ({}): {}",
                status,
                parsed.description.unwrap_or_else(|| "unknown".to_string())
            ));
        }
        parsed
            .result
            .ok_or_else(|| format!("No result in {} response", method))
    }

    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, String> {
        let mut payload = json!({
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }
        // Client timeout must outlast the server-side long poll
        self.call(
            "getUpdates",
            &payload,
            Duration::from_secs(POLL_TIMEOUT_SECS + 10),
        )
        .await
    }

    /// Send a reply, splitting it under Telegram's message size limit. The
    /// cleanup keyboard goes on the last chunk only.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        offer_cleanup: bool,
    ) -> Result<(), String> {
        let chunks = split_reply(text, TELEGRAM_MAX_MESSAGE_CHARS);
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut payload = json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if offer_cleanup && i == last {
                payload["reply_markup"] = cleanup_keyboard();
            }
            let _: Value = self.call("sendMessage", &payload, REQUEST_TIMEOUT).await?;
        }
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), String> {
        let payload = json!({ "callback_query_id": callback_query_id });
        let _: Value = self
            .call("answerCallbackQuery", &payload, REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }

    /// Remove a registered webhook before polling. Pending updates are NOT
    /// dropped: messages queued while the host slept are collected on wake.
    pub async fn delete_webhook(&self) -> Result<(), String> {
        let payload = json!({ "drop_pending_updates": false });
        let _: Value = self.call("deleteWebhook", &payload, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    pub async fn set_webhook(&self, url: &str) -> Result<(), String> {
        let payload = json!({
            "url": url,
            "allowed_updates": ["message", "callback_query"],
        });
        let _: Value = self.call("setWebhook", &payload, REQUEST_TIMEOUT).await?;
        Ok(())
    }
}

/// Handle one update from either transport: normalize, dispatch, reply.
/// Errors are logged; nothing propagates to the caller.
pub async fn handle_update(
    update: Update,
    dispatcher: &CommandDispatcher,
    client: &TelegramClient,
) {
    if let Some(callback) = update.callback_query {
        let chat_id = callback.message.as_ref().map(|m| m.chat.id);
        let data = callback.data.as_deref().unwrap_or("");

        let result = dispatcher.dispatch_callback(callback.from.id, data).await;

        if let Err(e) = client.answer_callback_query(&callback.id).await {
            log::warn!("Telegram: answerCallbackQuery failed: {}", e);
        }
        if let Some(chat_id) = chat_id {
            if let Err(e) = client.send_message(chat_id, &result.reply, false).await {
                log::error!("Telegram: Failed to send callback reply: {}", e);
            }
        }
        return;
    }

    let message = match update.message {
        Some(message) => message,
        None => return,
    };
    let text = match message.text {
        Some(ref text) if !text.trim().is_empty() => text.clone(),
        _ => return,
    };
    let from = match message.from {
        Some(from) => from,
        None => return,
    };

    let user_name = from.username.clone().unwrap_or_else(|| from.first_name.clone());
    let preview: String = text.chars().take(50).collect();
    log::info!(
        "Telegram: Message {} from {} ({}): {}",
        message.message_id,
        user_name,
        from.id,
        preview
    );

    let normalized = NormalizedMessage {
        chat_id: message.chat.id,
        user_id: from.id,
        user_name,
        text,
    };

    let result = dispatcher.dispatch(normalized).await;
    if let Err(e) = client
        .send_message(message.chat.id, &result.reply, result.offer_cleanup)
        .await
    {
        log::error!("Telegram: Failed to send reply: {}", e);
    }
}

/// Continuous long-poll loop. Runs until the shutdown channel fires or the
/// sender is dropped.
pub async fn run_polling(
    client: std::sync::Arc<TelegramClient>,
    dispatcher: std::sync::Arc<CommandDispatcher>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    if let Err(e) = client.delete_webhook().await {
        log::warn!("Telegram: Failed to remove webhook before polling: {}", e);
    }

    log::info!("Telegram: Starting long-poll loop");
    let mut offset: Option<i64> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                log::info!("Telegram: Poll loop received shutdown signal");
                break;
            }
            result = client.get_updates(offset) => match result {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        handle_update(update, &dispatcher, &client).await;
                    }
                }
                Err(e) => {
                    log::error!("Telegram: Error polling updates: {}", e);
                    tokio::time::sleep(Duration::from_secs(POLL_RETRY_SECS)).await;
                }
            }
        }
    }
}
