// src/dispatcher.rs

//! Update dispatcher: an ordered chain of outer middlewares wrapped around a
//! router of handlers keyed by update kind.
//!
//! Middlewares run in registration order on the way in and in reverse order
//! on the way out. Each one receives the rest of the chain as an explicit
//! [`Next`] value and decides when (and whether) to call it.

use crate::alerts::AlertSink;
use crate::bot::BotApi;
use crate::context;
use crate::storage::{DbSession, FsmContext, StateStore, StorageKey};
use crate::update::{Update, UpdateKind, UpdateKindTag};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Per-invocation data handed down the chain. Owned by one `feed_update`
/// call and dropped when it returns, together with everything it holds.
pub struct UpdateData {
    pub bot: Arc<dyn BotApi>,
    /// Correlation id supplied by whoever injected the update.
    pub request_id: Option<String>,
    pub alert: Option<Arc<dyn AlertSink>>,
    pub state: Option<FsmContext>,
    pub session: Option<DbSession>,
}

impl UpdateData {
    pub fn new(bot: Arc<dyn BotApi>) -> Self {
        Self {
            bot,
            request_id: None,
            alert: None,
            state: None,
            session: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_alert(mut self, alert: Option<Arc<dyn AlertSink>>) -> Self {
        self.alert = alert;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Handled,
    /// No route matched the update.
    Skipped,
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, update: &Update, data: &mut UpdateData) -> Result<()>;
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn call(&self, update: &Update, data: &mut UpdateData, next: Next<'_>) -> Result<Dispatched>;
}

/// Which updates a handler is registered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePattern {
    pub kind: UpdateKindTag,
    /// Only messages carrying this bot command.
    pub command: Option<String>,
}

impl UpdatePattern {
    pub fn kind(kind: UpdateKindTag) -> Self {
        Self { kind, command: None }
    }

    pub fn command(name: &str) -> Self {
        Self {
            kind: UpdateKindTag::Message,
            command: Some(name.trim_start_matches('/').to_string()),
        }
    }

    pub fn matches(&self, update: &Update) -> bool {
        if update.tag() != self.kind {
            return false;
        }
        match (&self.command, &update.kind) {
            (None, _) => true,
            (Some(cmd), UpdateKind::Message(msg)) => msg.command() == Some(cmd.as_str()),
            (Some(_), _) => false,
        }
    }
}

struct Route {
    pattern: UpdatePattern,
    handler: Arc<dyn Handler>,
}

/// Rest of the chain after the current middleware.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    routes: &'a [Route],
}

impl<'a> Next<'a> {
    pub fn run<'b>(self, update: &'b Update, data: &'b mut UpdateData) -> BoxFuture<'b, Result<Dispatched>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            match self.chain.split_first() {
                Some((first, rest)) => {
                    let next = Next { chain: rest, routes: self.routes };
                    first.call(update, data, next).await
                }
                None => route(self.routes, update, data).await,
            }
        })
    }
}

async fn route(routes: &[Route], update: &Update, data: &mut UpdateData) -> Result<Dispatched> {
    let Some(route) = routes.iter().find(|r| r.pattern.matches(update)) else {
        tracing::debug!("no route for update {} ({})", update.update_id, update.tag());
        return Ok(Dispatched::Skipped);
    };
    route.handler.handle(update, data).await?;
    Ok(Dispatched::Handled)
}

pub struct Dispatcher {
    storage: Arc<dyn StateStore>,
    outer: Vec<Arc<dyn Middleware>>,
    routes: Vec<Route>,
}

impl Dispatcher {
    pub fn new(storage: Arc<dyn StateStore>) -> Self {
        Self {
            storage,
            outer: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Appends a middleware; earlier registrations wrap later ones.
    pub fn outer_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.outer.push(Arc::new(middleware));
        self
    }

    pub fn route<H: Handler + 'static>(&mut self, pattern: UpdatePattern, handler: H) -> &mut Self {
        self.routes.push(Route {
            pattern,
            handler: Arc::new(handler),
        });
        self
    }

    /// Update kinds some registered handler can consume.
    pub fn resolve_used_update_types(&self) -> BTreeSet<UpdateKindTag> {
        self.routes.iter().map(|r| r.pattern.kind).collect()
    }

    /// Runs one update through the middleware chain and the router.
    pub async fn feed_update(&self, update: &Update, mut data: UpdateData) -> Result<Dispatched> {
        if data.state.is_none() {
            data.state = storage_key(update).map(|key| FsmContext::new(self.storage.clone(), key));
        }
        let next = Next {
            chain: &self.outer,
            routes: &self.routes,
        };
        next.run(update, &mut data).await
    }
}

/// Conversation key of an update; callbacks without a message fall back to the user's private chat.
fn storage_key(update: &Update) -> Option<StorageKey> {
    let fields = context::extract_fields(update);
    match (fields.chat_id, fields.user_id) {
        (Some(chat), Some(user)) => Some(StorageKey::new(chat, user)),
        (None, Some(user)) => Some(StorageKey::new(user, user)),
        (Some(chat), None) => Some(StorageKey::new(chat, chat)),
        (None, None) => None,
    }
}
