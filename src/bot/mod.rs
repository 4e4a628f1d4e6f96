// src/bot/mod.rs

pub mod telegram;
pub mod types;

use async_trait::async_trait;

pub use telegram::TelegramBot;
pub use types::WebhookRegistration;

/// Outbound side of the bot platform.
#[async_trait]
pub trait BotApi: Send + Sync {
    async fn set_webhook(&self, registration: &WebhookRegistration) -> anyhow::Result<()>;
    async fn delete_webhook(&self) -> anyhow::Result<()>;
    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;
    /// Releases the underlying HTTP session. Later calls fail.
    async fn close(&self) -> anyhow::Result<()>;
}
