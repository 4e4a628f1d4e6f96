// src/alerts.rs

//! Alert hook invoked for unhandled handler failures.

use crate::bot::BotApi;
use serde_json::{Map, Value};
use std::sync::Arc;

pub type ContextFields = Map<String, Value>;

/// Fire-and-forget failure reporting. Implementations must not block the caller.
pub trait AlertSink: Send + Sync {
    fn notify(&self, event_name: &str, error: &anyhow::Error, context: &ContextFields);
}

impl<F> AlertSink for F
where
    F: Fn(&str, &anyhow::Error, &ContextFields) + Send + Sync,
{
    fn notify(&self, event_name: &str, error: &anyhow::Error, context: &ContextFields) {
        self(event_name, error, context)
    }
}

/// Sends a short report to the admin chat on a background task.
pub struct AdminChatAlert {
    bot: Arc<dyn BotApi>,
    admin_id: i64,
}

impl AdminChatAlert {
    pub fn new(bot: Arc<dyn BotApi>, admin_id: i64) -> Self {
        Self { bot, admin_id }
    }
}

pub fn render_alert(event_name: &str, error: &anyhow::Error, context: &ContextFields) -> String {
    let mut text = format!("⚠️ {event_name}: {error}");
    for (key, value) in context {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        text.push_str(&format!("\n{key}: {value}"));
    }
    text
}

impl AlertSink for AdminChatAlert {
    fn notify(&self, event_name: &str, error: &anyhow::Error, context: &ContextFields) {
        let text = render_alert(event_name, error, context);
        let bot = self.bot.clone();
        let admin_id = self.admin_id;
        tokio::spawn(async move {
            if let Err(err) = bot.send_message(admin_id, &text).await {
                tracing::warn!("alert delivery failed: {:?}", err);
            }
        });
    }
}
