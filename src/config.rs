use anyhow::{bail, Context, Result};
use std::str::FromStr;

const DEFAULT_PORT: u16 = 8080;

fn default_weather_base_url() -> String {
    "http://api.weatherstack.com".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

/// How updates reach the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Poll,
    Webhook,
}

impl FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" | "polling" => Ok(RunMode::Poll),
            "webhook" => Ok(RunMode::Webhook),
            other => bail!("Unknown run mode '{}' (expected 'poll' or 'webhook')", other),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Poll => write!(f, "poll"),
            RunMode::Webhook => write!(f, "webhook"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Bot API base URL override, mostly for tests and local Bot API servers.
    pub api_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    /// Empty when unset; checked per lookup.
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Empty when unset; checked per question.
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Public base URL Telegram should POST updates to.
    pub app_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub weather: WeatherConfig,
    pub gemini: GeminiConfig,
    pub server: ServerConfig,
    /// Value of BOT_MODE, if any.
    pub mode: Option<RunMode>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = get("BOT_TOKEN").context("BOT_TOKEN environment variable not set")?;

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT value: {}", raw))?,
            None => DEFAULT_PORT,
        };

        let mode: Option<RunMode> = get("BOT_MODE").map(|m| m.parse()).transpose()?;

        Ok(Config {
            telegram: TelegramConfig {
                bot_token,
                api_url: get("TELEGRAM_API_URL"),
            },
            weather: WeatherConfig {
                api_key: get("WEATHER_API_KEY").unwrap_or_default(),
                base_url: get("WEATHER_API_URL").unwrap_or_else(default_weather_base_url),
            },
            gemini: GeminiConfig {
                api_key: get("GEMINI_API_KEY").unwrap_or_default(),
                base_url: get("GEMINI_API_URL").unwrap_or_else(default_gemini_base_url),
                model: get("GEMINI_MODEL").unwrap_or_else(default_gemini_model),
            },
            server: ServerConfig {
                port,
                app_url: get("APP_URL"),
            },
            mode,
        })
    }

    /// Pick the run mode: explicit argument, then BOT_MODE, then webhook if APP_URL is set.
    pub fn run_mode(&self, arg: Option<&str>) -> Result<RunMode> {
        if let Some(arg) = arg {
            return arg.parse();
        }
        if let Some(mode) = self.mode {
            return Ok(mode);
        }
        Ok(if self.server.app_url.is_some() {
            RunMode::Webhook
        } else {
            RunMode::Poll
        })
    }
}
