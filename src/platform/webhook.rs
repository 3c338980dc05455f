use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};
use teloxide::prelude::*;
use tracing::{error, info, warn};

use crate::bot::CommandDispatcher;
use crate::platform::telegram::incoming_from_update;
use crate::platform::UpdateSource;

/// Receives pushed updates over HTTP and registers itself with Telegram on start.
pub struct WebhookSource {
    bot: Bot,
    app_url: reqwest::Url,
    port: u16,
}

impl WebhookSource {
    pub fn new(bot: Bot, app_url: &str, port: u16) -> Result<Self> {
        let app_url = reqwest::Url::parse(app_url)
            .with_context(|| format!("Invalid APP_URL: {}", app_url))?;
        Ok(Self { bot, app_url, port })
    }

    /// Tell Telegram to POST updates to `APP_URL`.
    async fn register(&self) -> Result<()> {
        self.bot
            .set_webhook(self.app_url.clone())
            .await
            .with_context(|| format!("Failed to register webhook at {}", self.app_url))?;
        info!("Webhook registered at {}", self.app_url);
        Ok(())
    }
}

/// `POST /` only; axum answers other methods with 405.
pub fn router(dispatcher: Arc<CommandDispatcher>) -> Router {
    Router::new()
        .route("/", post(receive_update))
        .with_state(dispatcher)
}

async fn receive_update(
    State(dispatcher): State<Arc<CommandDispatcher>>,
    body: Bytes,
) -> StatusCode {
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Rejecting malformed update: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    if let Some(incoming) = incoming_from_update(&update) {
        // Acknowledge now; the reply goes out on its own task.
        tokio::spawn(async move {
            if let Err(e) = dispatcher.handle(&incoming).await {
                error!("Error replying to chat {}: {:#}", incoming.chat_id, e);
            }
        });
    }

    StatusCode::OK
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down webhook server");
}

#[async_trait]
impl UpdateSource for WebhookSource {
    async fn run(self: Box<Self>, dispatcher: Arc<CommandDispatcher>) -> Result<()> {
        self.register().await?;

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("Bot started. Listening on port {}", self.port);

        axum::serve(listener, router(dispatcher))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Webhook server error")?;

        Ok(())
    }
}
