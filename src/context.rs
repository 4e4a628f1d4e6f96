// src/context.rs

//! Per-event correlation context.
//!
//! One [`CorrelationContext`] is created for every inbound event (HTTP request
//! or injected update) and lives exactly as long as that event's pipeline.
//! It is carried in a tokio task-local slot so nested code can read it
//! without threading it through every call; concurrent events never see
//! each other's slot.

use crate::update::{Update, UpdateKind};
use std::future::Future;

/// Identifying fields derived from an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateFields {
    pub chat_id: Option<i64>,
    pub user_id: Option<i64>,
    pub update_kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationContext {
    pub request_id: String,
    pub chat_id: Option<i64>,
    pub user_id: Option<i64>,
    pub update_kind: String,
}

impl CorrelationContext {
    /// Uses `seed` as the request id when it is non-empty, otherwise generates one.
    pub fn new(seed: Option<&str>) -> Self {
        let request_id = match seed.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_request_id(),
        };
        Self {
            request_id,
            chat_id: None,
            user_id: None,
            update_kind: String::new(),
        }
    }

    pub fn with_fields(mut self, fields: UpdateFields) -> Self {
        self.chat_id = fields.chat_id;
        self.user_id = fields.user_id;
        self.update_kind = fields.update_kind;
        self
    }

    /// Key/value view used for log binding and alerting. Absent ids are omitted.
    pub fn fields(&self) -> Vec<(&'static str, serde_json::Value)> {
        let mut out = vec![("request_id", self.request_id.clone().into())];
        if let Some(chat_id) = self.chat_id {
            out.push(("chat_id", chat_id.into()));
        }
        if let Some(user_id) = self.user_id {
            out.push(("user_id", user_id.into()));
        }
        if !self.update_kind.is_empty() {
            out.push(("update_kind", self.update_kind.clone().into()));
        }
        out
    }
}

/// 12 hex characters from a v4 uuid.
pub fn generate_request_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

pub fn extract_fields(update: &Update) -> UpdateFields {
    let (chat_id, user_id) = match &update.kind {
        UpdateKind::Message(msg) | UpdateKind::EditedMessage(msg) => (
            msg.chat.as_ref().map(|c| c.id),
            msg.from.as_ref().map(|u| u.id),
        ),
        UpdateKind::CallbackQuery(q) => (
            q.message.as_ref().and_then(|m| m.chat.as_ref()).map(|c| c.id),
            q.from.as_ref().map(|u| u.id),
        ),
        UpdateKind::Other(_) => (None, None),
    };
    UpdateFields {
        chat_id,
        user_id,
        update_kind: update.tag().as_str().to_string(),
    }
}

tokio::task_local! {
    static CURRENT: CorrelationContext;
}

/// Runs `fut` with `ctx` as the ambient correlation context.
pub async fn scope<F, T>(ctx: CorrelationContext, fut: F) -> T
where
    F: Future<Output = T>,
{
    CURRENT.scope(ctx, fut).await
}

pub fn current() -> Option<CorrelationContext> {
    CURRENT.try_with(|ctx| ctx.clone()).ok()
}

pub fn current_request_id() -> Option<String> {
    CURRENT.try_with(|ctx| ctx.request_id.clone()).ok()
}
