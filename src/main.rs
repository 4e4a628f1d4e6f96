// src/main.rs

use anyhow::{Context, Result};
use business_bot::config::Settings;
use business_bot::runtime::LiveConnector;
use business_bot::{logger, web};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // 1) config and logger
    let settings = Arc::new(Settings::load()?);
    let log = logger::init(&settings)?;

    // 2) database, bot, state backend, webhook, scheduler
    let state = web::startup(settings.clone(), log.clone(), &LiveConnector).await?;

    // 3) HTTP until a stop signal
    let addr = (settings.web.host.as_str(), settings.web.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}:{}", addr.0, addr.1))?;
    log.info(
        "http_listening",
        &[("host", addr.0.into()), ("port", addr.1.into())],
    );

    let served = axum::serve(listener, web::router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // 4) teardown runs even when the server failed
    web::shutdown(&state).await;
    served.context("http server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("ctrl-c handler failed: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("SIGTERM handler failed: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("stop signal received");
}
