// src/handlers.rs

//! Business routes. Conversation logic lives here and only here; the
//! pipeline around it does not depend on what these handlers do.

use crate::dispatcher::{Dispatcher, Handler, UpdateData, UpdatePattern};
use crate::storage::db::test_connection;
use crate::update::{Update, UpdateKind, UpdateKindTag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

pub fn register_handlers(dp: &mut Dispatcher) {
    dp.route(UpdatePattern::command("start"), StartCommand)
        .route(UpdatePattern::command("ping"), PingCommand)
        .route(UpdatePattern::kind(UpdateKindTag::CallbackQuery), RememberCallback);
}

fn chat_of(update: &Update) -> Option<i64> {
    match &update.kind {
        UpdateKind::Message(msg) | UpdateKind::EditedMessage(msg) => msg.chat.as_ref().map(|c| c.id),
        UpdateKind::CallbackQuery(q) => q
            .message
            .as_ref()
            .and_then(|m| m.chat.as_ref())
            .map(|c| c.id)
            .or_else(|| q.from.as_ref().map(|u| u.id)),
        UpdateKind::Other(_) => None,
    }
}

/// `/start`: resets the conversation and greets.
pub struct StartCommand;

#[async_trait]
impl Handler for StartCommand {
    async fn handle(&self, update: &Update, data: &mut UpdateData) -> Result<()> {
        if let Some(state) = &data.state {
            state.clear().await?;
        }
        let chat_id = chat_of(update).context("/start without a chat")?;
        data.bot.send_message(chat_id, "👋 <b>Hi!</b> The bot is up.").await
    }
}

/// `/ping`: answers after a round trip through the update's database session.
pub struct PingCommand;

#[async_trait]
impl Handler for PingCommand {
    async fn handle(&self, update: &Update, data: &mut UpdateData) -> Result<()> {
        let chat_id = chat_of(update).context("/ping without a chat")?;
        let db_ok = match data.session.as_mut() {
            Some(session) => test_connection(session).await?,
            None => false,
        };
        let text = if db_ok { "pong (db ok)" } else { "pong" };
        data.bot.send_message(chat_id, text).await
    }
}

/// Button presses: keeps the last callback payload in the conversation data.
pub struct RememberCallback;

#[async_trait]
impl Handler for RememberCallback {
    async fn handle(&self, update: &Update, data: &mut UpdateData) -> Result<()> {
        let UpdateKind::CallbackQuery(query) = &update.kind else {
            return Ok(());
        };
        if let Some(state) = &data.state {
            let mut stored = state.get_data().await?;
            if let Some(obj) = stored.as_object_mut() {
                obj.insert("last_callback".into(), json!(query.data));
            }
            state.set_data(&stored).await?;
        }
        Ok(())
    }
}
