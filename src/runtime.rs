// src/runtime.rs

//! Owner of the long-lived resources: bot client, dispatcher, conversation
//! state backend and job scheduler.
//!
//! The handle moves through `Unbuilt -> Built -> Closed` exactly once. Nothing
//! it owns is reconfigured after `build`; collaborators only borrow from it
//! while it is built.

use crate::bot::{BotApi, TelegramBot};
use crate::config::{BotConfig, RedisConfig, Settings};
use crate::dispatcher::Dispatcher;
use crate::errors::RuntimeError;
use crate::handlers;
use crate::logger::Logger;
use crate::middlewares::{DbSessionMiddleware, UpdateContextMiddleware};
use crate::scheduler::Scheduler;
use crate::storage::{DEFAULT_STATE_TTL, Database, MemoryStateStore, RedisStateStore, StateStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unbuilt,
    Built,
    Closed,
}

/// Opens connections to the external services the runtime depends on.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn bot(&self, cfg: &BotConfig) -> Result<Arc<dyn BotApi>>;
    async fn state_store(&self, cfg: &RedisConfig, ttl: Duration) -> Result<Arc<dyn StateStore>>;
}

/// Real Telegram client and Redis.
pub struct LiveConnector;

#[async_trait]
impl Connector for LiveConnector {
    async fn bot(&self, cfg: &BotConfig) -> Result<Arc<dyn BotApi>> {
        Ok(Arc::new(TelegramBot::new(cfg)))
    }

    async fn state_store(&self, cfg: &RedisConfig, ttl: Duration) -> Result<Arc<dyn StateStore>> {
        let store = RedisStateStore::connect(&cfg.url(), ttl).await?;
        Ok(Arc::new(store))
    }
}

struct Parts {
    bot: Arc<dyn BotApi>,
    dispatcher: Dispatcher,
    state: Arc<dyn StateStore>,
    /// Set when `state` is a remote connection that must be closed.
    remote_state: bool,
    scheduler: Scheduler,
}

pub struct Runtime {
    settings: Arc<Settings>,
    logger: Logger,
    parts: Option<Parts>,
    closed: AtomicBool,
}

impl Runtime {
    pub fn new(settings: Arc<Settings>, logger: Logger) -> Self {
        Self {
            settings,
            logger,
            parts: None,
            closed: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        if self.closed.load(Ordering::SeqCst) {
            Phase::Closed
        } else if self.parts.is_some() {
            Phase::Built
        } else {
            Phase::Unbuilt
        }
    }

    /// Brings up every resource in order. Any failing step aborts the rest;
    /// whatever was already opened is closed again before the error returns.
    pub async fn build(&mut self, connector: &dyn Connector, db: Database) -> Result<()> {
        match self.phase() {
            Phase::Unbuilt => {}
            Phase::Built => return Err(RuntimeError::AlreadyBuilt.into()),
            Phase::Closed => return Err(RuntimeError::Closed.into()),
        }

        // 1) bot client with its default parse mode
        let bot = connector
            .bot(&self.settings.bot)
            .await
            .context("failed to construct bot client")?;

        // 2) remote TTL store when configured, else in-process
        let (state, remote_state): (Arc<dyn StateStore>, bool) = match &self.settings.redis {
            Some(redis) => match connector.state_store(redis, DEFAULT_STATE_TTL).await {
                Ok(store) => (store, true),
                Err(err) => {
                    let _ = bot.close().await;
                    return Err(err.context("state backend unavailable"));
                }
            },
            None => (Arc::new(MemoryStateStore::new()), false),
        };

        // 3) dispatcher bound to that store; logging context wraps the db session
        let mut dispatcher = Dispatcher::new(state.clone());
        dispatcher
            .outer_middleware(UpdateContextMiddleware::new(self.logger.clone()))
            .outer_middleware(DbSessionMiddleware::new(db));

        // 4) business routes
        handlers::register_handlers(&mut dispatcher);

        // 5) scheduler, not started
        let scheduler = Scheduler::new();

        let kinds: Vec<&str> = dispatcher
            .resolve_used_update_types()
            .into_iter()
            .map(|k| k.as_str())
            .collect();
        self.logger.info(
            "runtime_built",
            &[
                ("state_backend", state.backend_name().into()),
                ("update_kinds", json!(kinds)),
            ],
        );

        self.parts = Some(Parts {
            bot,
            dispatcher,
            state,
            remote_state,
            scheduler,
        });
        Ok(())
    }

    fn parts(&self) -> Result<&Parts, RuntimeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RuntimeError::Closed);
        }
        self.parts.as_ref().ok_or(RuntimeError::NotBuilt)
    }

    pub fn bot(&self) -> Result<&Arc<dyn BotApi>, RuntimeError> {
        self.parts().map(|p| &p.bot)
    }

    pub fn dispatcher(&self) -> Result<&Dispatcher, RuntimeError> {
        self.parts().map(|p| &p.dispatcher)
    }

    pub fn state_store(&self) -> Result<&Arc<dyn StateStore>, RuntimeError> {
        self.parts().map(|p| &p.state)
    }

    /// The remote state connection, if one was opened.
    pub fn remote_state(&self) -> Result<Option<&Arc<dyn StateStore>>, RuntimeError> {
        self.parts().map(|p| p.remote_state.then_some(&p.state))
    }

    pub fn scheduler(&self) -> Result<&Scheduler, RuntimeError> {
        self.parts().map(|p| &p.scheduler)
    }

    /// Tears down in reverse order. Every step runs even if an earlier one
    /// failed; failures are only logged. Later calls are no-ops.
    pub async fn close(&self) {
        let Some(parts) = &self.parts else {
            return;
        };
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if parts.scheduler.is_running() {
            parts.scheduler.shutdown().await;
        }

        if let Err(err) = parts.bot.close().await {
            self.logger.error(
                "shutdown_step_failed",
                &[("step", "bot_session".into()), ("error", format!("{err:#}").into())],
            );
        }

        if parts.remote_state {
            if let Err(err) = parts.state.close().await {
                self.logger.error(
                    "shutdown_step_failed",
                    &[("step", "state_backend".into()), ("error", format!("{err:#}").into())],
                );
            }
        }

        self.logger.info("runtime_closed", &[]);
    }
}
