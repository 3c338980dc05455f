use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use crate::llm::PersonaQuery;
use crate::platform::{IncomingMessage, ReplySender};
use crate::weather::WeatherLookup;

pub const DEFAULT_CITY: &str = "Cape Town";

/// Joins city words for embedding in the weather query string.
const CITY_SEPARATOR: &str = "+";

pub const HELP_TEXT: &str = "Welcome to my Bot!\n\n\
     It can help you get the current temperature for any city or else you can ask Goku a question.\n\n\
     Available commands:\n\
     /temperature [city] - Get the current temperature for a city (defaults to Cape Town)\n\
     /askGoku [question] - Ask a question and see what Goku has to say!";

pub const ASK_USAGE_TEXT: &str = "Please provide a question. Usage: /askGoku [question]";

pub const ASK_FAILED_TEXT: &str = "Sorry, I couldn't process your question. Please try again.";

fn temperature_failed_text(city: &str) -> String {
    format!("Sorry, I couldn't fetch the temperature for {}", city)
}

/// What an incoming message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// City already joined with the query separator
    Temperature { city: String },
    /// `None` when no question followed the command
    AskGoku { question: Option<String> },
    Help,
}

impl Command {
    pub fn parse(text: &str) -> Self {
        if text.starts_with("/temperature") {
            let words: Vec<&str> = text.split_whitespace().skip(1).collect();
            let city = if words.is_empty() {
                DEFAULT_CITY.split_whitespace().collect::<Vec<_>>().join(CITY_SEPARATOR)
            } else {
                words.join(CITY_SEPARATOR)
            };
            return Command::Temperature { city };
        }

        if text.starts_with("/askGoku") {
            let question = text
                .split_once(' ')
                .map(|(_, rest)| rest)
                .filter(|rest| !rest.trim().is_empty())
                .map(str::to_string);
            return Command::AskGoku { question };
        }

        Command::Help
    }
}

/// Routes each message to its command and sends exactly one reply.
pub struct CommandDispatcher {
    weather: Arc<dyn WeatherLookup>,
    persona: Arc<dyn PersonaQuery>,
    sender: Arc<dyn ReplySender>,
}

impl CommandDispatcher {
    pub fn new(
        weather: Arc<dyn WeatherLookup>,
        persona: Arc<dyn PersonaQuery>,
        sender: Arc<dyn ReplySender>,
    ) -> Self {
        Self {
            weather,
            persona,
            sender,
        }
    }

    /// Handle one message. Errors only come from sending the reply.
    pub async fn handle(&self, msg: &IncomingMessage) -> Result<()> {
        info!("Message from chat {}: {}", msg.chat_id, msg.text);

        let reply = self.reply_for(&msg.text).await;
        self.sender.send_text(msg.chat_id, &reply).await
    }

    /// Build the reply text. Lookup failures become apologies here.
    pub async fn reply_for(&self, text: &str) -> String {
        match Command::parse(text) {
            Command::Temperature { city } => match self.weather.lookup(&city).await {
                Ok(report) => report,
                Err(e) => {
                    error!("Temperature lookup for {} failed: {:#}", city, e);
                    temperature_failed_text(&city)
                }
            },
            Command::AskGoku { question: None } => ASK_USAGE_TEXT.to_string(),
            Command::AskGoku {
                question: Some(question),
            } => match self.persona.ask(&question).await {
                Ok(answer) => answer,
                Err(e) => {
                    error!("Persona query failed: {:#}", e);
                    ASK_FAILED_TEXT.to_string()
                }
            },
            Command::Help => HELP_TEXT.to_string(),
        }
    }
}
