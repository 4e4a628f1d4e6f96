// src/bot/telegram.rs

use super::{BotApi, WebhookRegistration};
use crate::config::{BotConfig, ParseMode};
use crate::update::UpdateKindTag;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use teloxide::adaptors::DefaultParseMode;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, ParseMode as TgParseMode};

/// Telegram Bot API client with the configured default parse mode.
pub struct TelegramBot {
    bot: DefaultParseMode<Bot>,
    closed: AtomicBool,
}

impl TelegramBot {
    pub fn new(cfg: &BotConfig) -> Self {
        let mode = match cfg.parse_mode {
            ParseMode::HTML => TgParseMode::Html,
            ParseMode::MarkdownV2 => TgParseMode::MarkdownV2,
        };
        Self {
            bot: Bot::new(&cfg.token).parse_mode(mode),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("bot session is closed");
        }
        Ok(())
    }
}

fn allowed_update(tag: UpdateKindTag) -> AllowedUpdate {
    match tag {
        UpdateKindTag::Message => AllowedUpdate::Message,
        UpdateKindTag::EditedMessage => AllowedUpdate::EditedMessage,
        UpdateKindTag::ChannelPost => AllowedUpdate::ChannelPost,
        UpdateKindTag::EditedChannelPost => AllowedUpdate::EditedChannelPost,
        UpdateKindTag::InlineQuery => AllowedUpdate::InlineQuery,
        UpdateKindTag::ChosenInlineResult => AllowedUpdate::ChosenInlineResult,
        UpdateKindTag::CallbackQuery => AllowedUpdate::CallbackQuery,
        UpdateKindTag::ShippingQuery => AllowedUpdate::ShippingQuery,
        UpdateKindTag::PreCheckoutQuery => AllowedUpdate::PreCheckoutQuery,
        UpdateKindTag::Poll => AllowedUpdate::Poll,
        UpdateKindTag::PollAnswer => AllowedUpdate::PollAnswer,
        UpdateKindTag::MyChatMember => AllowedUpdate::MyChatMember,
        UpdateKindTag::ChatMember => AllowedUpdate::ChatMember,
        UpdateKindTag::ChatJoinRequest => AllowedUpdate::ChatJoinRequest,
    }
}

#[async_trait]
impl BotApi for TelegramBot {
    async fn set_webhook(&self, registration: &WebhookRegistration) -> Result<()> {
        self.ensure_open()?;
        let url = url::Url::parse(&registration.url)
            .with_context(|| format!("invalid webhook url `{}`", registration.url))?;
        let allowed: Vec<AllowedUpdate> = registration
            .allowed_update_kinds
            .iter()
            .copied()
            .map(allowed_update)
            .collect();

        let mut request = self
            .bot
            .set_webhook(url)
            .allowed_updates(allowed)
            .drop_pending_updates(registration.drop_pending_updates);
        if let Some(secret) = &registration.secret_token {
            request = request.secret_token(secret.clone());
        }
        request.await.context("setWebhook failed")?;
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<()> {
        self.ensure_open()?;
        self.bot.delete_webhook().await.context("deleteWebhook failed")?;
        Ok(())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.ensure_open()?;
        self.bot
            .send_message(ChatId(chat_id), text.to_string())
            .await
            .context("sendMessage failed")?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("bot session closed");
        }
        Ok(())
    }
}
