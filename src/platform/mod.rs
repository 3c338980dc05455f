pub mod telegram;
pub mod webhook;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::bot::CommandDispatcher;

/// A chat message handed to the dispatcher. Lives for one handling pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Chat the reply goes back to
    pub chat_id: i64,
    /// Raw message text; empty for messages without text
    pub text: String,
}

/// Outbound side of the messaging channel.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Inbound side: a transport that feeds messages to the dispatcher until the process stops.
#[async_trait]
pub trait UpdateSource: Send {
    async fn run(self: Box<Self>, dispatcher: Arc<CommandDispatcher>) -> Result<()>;
}
