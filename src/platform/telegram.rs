use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::payloads::GetUpdatesSetters;
use teloxide::prelude::*;
use teloxide::types::{ChatId, UpdateKind};
use teloxide::RequestError;
use tracing::{debug, error, info, warn};

use crate::bot::CommandDispatcher;
use crate::config::TelegramConfig;
use crate::platform::{IncomingMessage, ReplySender, UpdateSource};

/// Long-poll wait per getUpdates call, in seconds.
pub const POLL_TIMEOUT_SECS: u32 = 60;

/// Headroom on top of the long-poll wait before the HTTP client gives up.
const CLIENT_TIMEOUT_SLACK_SECS: u64 = 10;

/// Pause after a failed getUpdates before asking again.
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Build the single bot client shared by every handler.
///
/// teloxide's default client times out after 17s, shorter than the long poll,
/// so the client timeout is raised past `POLL_TIMEOUT_SECS`.
pub fn build_bot(config: &TelegramConfig) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(
            POLL_TIMEOUT_SECS as u64 + CLIENT_TIMEOUT_SLACK_SECS,
        ))
        .build()
        .context("Failed to build Telegram HTTP client")?;

    let bot = Bot::with_client(&config.bot_token, client);
    match &config.api_url {
        Some(url) => {
            let url = reqwest::Url::parse(url)
                .with_context(|| format!("Invalid TELEGRAM_API_URL: {}", url))?;
            Ok(bot.set_api_url(url))
        }
        None => Ok(bot),
    }
}

/// Check the token against Telegram and log who we are.
pub async fn verify_bot(bot: &Bot) -> Result<()> {
    let me = bot
        .get_me()
        .await
        .context("Failed to authenticate bot token")?;
    info!(
        "Authorized as @{} (ID: {})",
        me.username.as_deref().unwrap_or("unknown"),
        me.id
    );
    Ok(())
}

/// Message updates become an `IncomingMessage`; everything else is skipped.
pub fn incoming_from_update(update: &Update) -> Option<IncomingMessage> {
    match &update.kind {
        UpdateKind::Message(msg) => Some(IncomingMessage {
            chat_id: msg.chat.id.0,
            text: msg.text().unwrap_or_default().to_string(),
        }),
        _ => None,
    }
}

/// getUpdates offset that acknowledges `update_id`. `None` if it does not fit the API's i32.
fn next_offset(update_id: u32) -> Option<i32> {
    i32::try_from(update_id).ok()?.checked_add(1)
}

/// Sends replies through the Bot API.
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ReplySender for TelegramSender {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .with_context(|| format!("Failed to send message to chat {}", chat_id))?;
        Ok(())
    }
}

/// getUpdates long-polling. Handles one update fully before fetching the next.
pub struct PollingSource {
    bot: Bot,
}

impl PollingSource {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// getUpdates is refused while a webhook is registered.
    async fn clear_webhook(&self) {
        if let Err(e) = self.bot.delete_webhook().await {
            warn!("Failed to delete webhook: {} (continuing anyway)", e);
        }
    }

    /// Fetch one batch starting at `offset`, handle it in order, and return the next offset.
    async fn poll_once(
        &self,
        offset: i32,
        dispatcher: &CommandDispatcher,
    ) -> Result<i32, RequestError> {
        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .timeout(POLL_TIMEOUT_SECS)
            .await?;

        let mut offset = offset;
        for update in updates {
            match next_offset(update.id.0) {
                Some(next) => offset = next,
                None => warn!("Update id {} is out of offset range", update.id.0),
            }

            let Some(incoming) = incoming_from_update(&update) else {
                debug!("Skipping non-message update {}", update.id.0);
                continue;
            };

            if let Err(e) = dispatcher.handle(&incoming).await {
                error!("Error replying to chat {}: {:#}", incoming.chat_id, e);
            }
        }

        Ok(offset)
    }
}

#[async_trait]
impl UpdateSource for PollingSource {
    async fn run(self: Box<Self>, dispatcher: Arc<CommandDispatcher>) -> Result<()> {
        self.clear_webhook().await;

        info!("Polling for updates...");

        let mut offset: i32 = 0;
        loop {
            match self.poll_once(offset, &dispatcher).await {
                Ok(next) => offset = next,
                Err(e) => {
                    error!("getUpdates failed: {}", e);
                    tokio::time::sleep(POLL_ERROR_PAUSE).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::tests::{FakePersona, FakeWeather};
    use crate::bot::HELP_TEXT;
    use mockito::Matcher;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const TEST_BOT_TOKEN: &str = "test_bot_token_12345";

    /// teloxide's flattened update kinds only deserialize from text, not from a `Value`.
    fn parse_update(value: serde_json::Value) -> Update {
        serde_json::from_str(&value.to_string()).unwrap()
    }

    fn message_json(update_id: u32, content: serde_json::Value) -> serde_json::Value {
        let mut message = json!({
            "message_id": 1,
            "date": 1706529600,
            "chat": {"id": 123, "type": "private", "first_name": "Test"},
            "from": {"id": 123, "is_bot": false, "first_name": "Test"}
        });
        if let (Some(message), Some(content)) = (message.as_object_mut(), content.as_object()) {
            message.extend(content.clone());
        }
        json!({"update_id": update_id, "message": message})
    }

    fn edited_json(update_id: u32) -> serde_json::Value {
        json!({
            "update_id": update_id,
            "edited_message": {
                "message_id": 1,
                "date": 1706529600,
                "edit_date": 1706529700,
                "chat": {"id": 123, "type": "private", "first_name": "Test"},
                "text": "edited"
            }
        })
    }

    fn test_bot(api_url: String) -> Bot {
        build_bot(&TelegramConfig {
            bot_token: TEST_BOT_TOKEN.to_string(),
            api_url: Some(api_url),
        })
        .unwrap()
    }

    fn method_path(method: &str) -> String {
        format!("/bot{}/{}", TEST_BOT_TOKEN, method)
    }

    fn sent_message_body(text: &str) -> String {
        json!({
            "ok": true,
            "result": {
                "message_id": 1,
                "date": 1706529600,
                "chat": {"id": 123, "type": "private"},
                "from": {"id": 123456789, "is_bot": true, "first_name": "TestBot", "username": "testbot"},
                "text": text
            }
        })
        .to_string()
    }

    #[test]
    fn text_message_becomes_incoming() {
        let update = parse_update(message_json(10, json!({"text": "/temperature Paris"})));
        assert_eq!(
            incoming_from_update(&update),
            Some(IncomingMessage {
                chat_id: 123,
                text: "/temperature Paris".to_string(),
            })
        );
    }

    #[test]
    fn message_without_text_is_still_a_message() {
        let update = parse_update(message_json(
            10,
            json!({"location": {"latitude": 51.5, "longitude": -0.12}}),
        ));
        let incoming = incoming_from_update(&update).unwrap();
        assert_eq!(incoming.text, "");
    }

    #[test]
    fn edited_message_is_skipped() {
        let update = parse_update(edited_json(11));
        assert_eq!(incoming_from_update(&update), None);
    }

    #[test]
    fn offset_follows_update_id() {
        assert_eq!(next_offset(0), Some(1));
        assert_eq!(next_offset(6), Some(7));
        assert_eq!(next_offset(i32::MAX as u32), None);
        assert_eq!(next_offset(u32::MAX), None);
    }

    #[test]
    fn api_url_override_is_validated() {
        let config = TelegramConfig {
            bot_token: TEST_BOT_TOKEN.to_string(),
            api_url: Some("not a url".to_string()),
        };
        assert!(build_bot(&config).is_err());
    }

    #[tokio::test]
    async fn sender_posts_send_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", method_path("SendMessage").as_str())
            .match_body(Matcher::PartialJson(json!({
                "chat_id": 123,
                "text": "Temperature in Paris, France: 18°C"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(sent_message_body("Temperature in Paris, France: 18°C"))
            .create_async()
            .await;

        TelegramSender::new(test_bot(server.url()))
            .send_text(123, "Temperature in Paris, France: 18°C")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn polling_clears_webhook_first() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", method_path("DeleteWebhook").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":true}"#)
            .expect(1)
            .create_async()
            .await;

        PollingSource::new(test_bot(server.url()))
            .clear_webhook()
            .await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn poll_handles_messages_and_advances_offset() {
        let mut server = mockito::Server::new_async().await;
        let first_batch = server
            .mock("POST", method_path("GetUpdates").as_str())
            .match_body(Matcher::PartialJson(json!({"offset": 0, "timeout": 60})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "ok": true,
                    "result": [edited_json(5), message_json(6, json!({"text": "hello"}))]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let next_batch = server
            .mock("POST", method_path("GetUpdates").as_str())
            .match_body(Matcher::PartialJson(json!({"offset": 7})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":[]}"#)
            .create_async()
            .await;
        let send = server
            .mock("POST", method_path("SendMessage").as_str())
            .match_body(Matcher::PartialJson(json!({"chat_id": 123, "text": HELP_TEXT})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(sent_message_body(HELP_TEXT))
            .expect(1)
            .create_async()
            .await;

        let bot = test_bot(server.url());
        let dispatcher = CommandDispatcher::new(
            Arc::new(FakeWeather::default()),
            Arc::new(FakePersona::default()),
            Arc::new(TelegramSender::new(bot.clone())),
        );
        let source = PollingSource::new(bot);

        let offset = source.poll_once(0, &dispatcher).await.unwrap();
        assert_eq!(offset, 7);
        first_batch.assert_async().await;
        send.assert_async().await;

        let offset = source.poll_once(offset, &dispatcher).await.unwrap();
        assert_eq!(offset, 7);
        next_batch.assert_async().await;
    }

    #[tokio::test]
    async fn long_poll_outlasts_default_client_timeout() {
        // Answers only after teloxide's stock 17s client timeout has passed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(Duration::from_secs(20)).await;
            let body = r#"{"ok":true,"result":[]}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });

        let bot = test_bot(format!("http://{}", addr));
        let updates = bot
            .get_updates()
            .offset(0)
            .timeout(POLL_TIMEOUT_SECS)
            .await
            .unwrap();
        assert!(updates.is_empty());
    }
}
