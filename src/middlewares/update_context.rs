// src/middlewares/update_context.rs

use crate::alerts::{AlertSink, ContextFields};
use crate::context::{self, CorrelationContext};
use crate::dispatcher::{Dispatched, Middleware, Next, UpdateData};
use crate::logger::{Logger, elapsed_ms};
use crate::update::Update;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Outermost dispatcher layer: binds correlation fields, times the handler
/// chain and records its outcome. Failures and panics are logged and
/// reported to the alert hook if one is present, then propagated unchanged.
pub struct UpdateContextMiddleware {
    logger: Logger,
}

impl UpdateContextMiddleware {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn report_failure(
    log: &Logger,
    ctx: &CorrelationContext,
    alert: Option<&Arc<dyn AlertSink>>,
    duration_ms: f64,
    err: &anyhow::Error,
    traceback: String,
) {
    log.error(
        "handler_error",
        &[
            ("duration_ms", duration_ms.into()),
            ("error", err.to_string().into()),
            ("traceback", traceback.into()),
        ],
    );
    if let Some(alert) = alert {
        let fields: ContextFields = ctx
            .fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        alert.notify("handler_error", err, &fields);
    }
}

#[async_trait]
impl Middleware for UpdateContextMiddleware {
    async fn call(&self, update: &Update, data: &mut UpdateData, next: Next<'_>) -> Result<Dispatched> {
        let start = Instant::now();

        // inbound id, then the ambient one, then a fresh one
        let seed = data
            .request_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(context::current_request_id);
        let ctx = CorrelationContext::new(seed.as_deref()).with_fields(context::extract_fields(update));

        let log = self.logger.bind(&ctx.fields());

        let inner = &mut *data;
        let chain = async {
            log.info("handler_start", &[]);
            next.run(update, inner).await
        };
        let outcome = context::scope(ctx.clone(), AssertUnwindSafe(chain).catch_unwind()).await;

        let duration_ms = elapsed_ms(start);
        match outcome {
            Ok(Ok(dispatched)) => {
                log.info("handler_done", &[("duration_ms", duration_ms.into())]);
                Ok(dispatched)
            }
            Ok(Err(err)) => {
                report_failure(&log, &ctx, data.alert.as_ref(), duration_ms, &err, format!("{err:?}"));
                Err(err)
            }
            Err(payload) => {
                let err = anyhow!("handler panicked: {}", panic_message(payload.as_ref()));
                report_failure(&log, &ctx, data.alert.as_ref(), duration_ms, &err, "panic".to_string());
                panic::resume_unwind(payload)
            }
        }
    }
}
