mod bot;
mod config;
mod error;
mod llm;
mod platform;
mod weather;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::CommandDispatcher;
use crate::config::{Config, RunMode};
use crate::llm::GeminiClient;
use crate::platform::telegram::{self, PollingSource, TelegramSender};
use crate::platform::webhook::WebhookSource;
use crate::platform::UpdateSource;
use crate::weather::WeatherClient;

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gokubot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenv {
        warn!("Could not load .env file: {}", e);
    }

    let config = Config::from_env().context("Failed to load configuration")?;
    let mode = config.run_mode(std::env::args().nth(1).as_deref())?;

    info!("Configuration loaded successfully");
    info!("  Mode: {}", mode);
    info!("  Model: {}", config.gemini.model);
    info!("  Weather API key set: {}", !config.weather.api_key.is_empty());
    info!("  Gemini API key set: {}", !config.gemini.api_key.is_empty());

    let bot = telegram::build_bot(&config.telegram)?;
    telegram::verify_bot(&bot).await?;

    let http = reqwest::Client::new();
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::new(WeatherClient::new(http.clone(), config.weather.clone())),
        Arc::new(GeminiClient::new(http, config.gemini.clone())),
        Arc::new(TelegramSender::new(bot.clone())),
    ));

    let source: Box<dyn UpdateSource> = match mode {
        RunMode::Poll => Box::new(PollingSource::new(bot)),
        RunMode::Webhook => {
            let app_url = config
                .server
                .app_url
                .as_deref()
                .context("APP_URL environment variable not set")?;
            Box::new(WebhookSource::new(bot, app_url, config.server.port)?)
        }
    };

    info!("Bot is starting...");
    source.run(dispatcher).await
}
