// src/web/lifespan.rs

//! Process-level startup and shutdown around the runtime.

use super::AppState;
use super::webhook::{register_webhook, revoke_webhook};
use crate::alerts::{AdminChatAlert, AlertSink};
use crate::config::Settings;
use crate::logger::Logger;
use crate::runtime::{Connector, Phase, Runtime};
use crate::storage::Database;
use crate::storage::db::test_connection;
use anyhow::{Context, Result, anyhow};
use std::sync::Arc;

/// Brings the service up. Any failure before the admin notice is fatal and
/// releases what was already opened.
pub async fn startup(settings: Arc<Settings>, logger: Logger, connector: &dyn Connector) -> Result<AppState> {
    // 1) database pool
    let database = Database::connect(&settings.db)
        .await
        .context("database unavailable")?;

    // 2) runtime resources
    let mut runtime = Runtime::new(settings.clone(), logger.clone());
    if let Err(err) = runtime.build(connector, database.clone()).await {
        database.close().await;
        return Err(err);
    }

    // 3..5) checks and webhook
    if let Err(err) = bring_up(&runtime, &database).await {
        runtime.close().await;
        database.close().await;
        return Err(err);
    }

    let bot = runtime.bot()?.clone();
    let admin_id = settings.main.admin_id;
    if let Err(err) = bot.send_message(admin_id, "🤖 Bot started (webhook).").await {
        logger.warn("admin_notify_failed", &[("error", format!("{err:#}").into())]);
    }

    logger.info("startup_complete", &[("webhook_path", settings.web.webhook_path().into())]);
    let alert: Arc<dyn AlertSink> = Arc::new(AdminChatAlert::new(bot, admin_id));
    Ok(AppState {
        runtime: Arc::new(runtime),
        settings,
        logger,
        database,
        alert: Some(alert),
    })
}

/// Startup steps that need a built runtime: state backend ping, webhook
/// registration, database check, scheduler start. A failure after the
/// webhook was registered revokes it again before returning.
pub async fn bring_up(runtime: &Runtime, database: &Database) -> Result<()> {
    if let Some(remote) = runtime.remote_state()? {
        remote.ping().await.context("state backend ping failed")?;
    }

    register_webhook(runtime).await.context("webhook registration failed")?;

    if let Err(err) = check_and_schedule(runtime, database).await {
        if let Err(revoke_err) = revoke_webhook(runtime).await {
            tracing::warn!("webhook revocation after failed startup failed: {:#}", revoke_err);
        }
        return Err(err);
    }
    Ok(())
}

async fn check_and_schedule(runtime: &Runtime, database: &Database) -> Result<()> {
    let mut session = database.acquire_session().await?;
    if !test_connection(&mut session).await? {
        return Err(anyhow!("database check returned an unexpected value"));
    }
    drop(session);

    runtime.scheduler()?.start()?;
    Ok(())
}

/// Best-effort teardown; each step runs regardless of the previous one.
/// Later calls are no-ops.
pub async fn shutdown(state: &AppState) {
    let logger = &state.logger;
    let runtime = &state.runtime;
    if runtime.phase() == Phase::Closed {
        return;
    }

    if let Ok(bot) = runtime.bot() {
        if let Err(err) = bot.send_message(state.settings.main.admin_id, "🛑 Bot stopped.").await {
            logger.warn("admin_notify_failed", &[("error", format!("{err:#}").into())]);
        }
    }

    if let Err(err) = revoke_webhook(runtime).await {
        logger.error(
            "shutdown_step_failed",
            &[("step", "webhook".into()), ("error", format!("{err:#}").into())],
        );
    }

    runtime.close().await;
    state.database.close().await;
    logger.info("shutdown_complete", &[]);
}
