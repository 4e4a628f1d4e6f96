// tests/pipeline_test.rs

mod common;

use anyhow::Result;
use async_trait::async_trait;
use business_bot::alerts::{AlertSink, ContextFields};
use business_bot::context::{self, CorrelationContext};
use business_bot::dispatcher::{Dispatcher, Handler, UpdateData, UpdatePattern};
use business_bot::logger::{Logger, MASK, MemorySink};
use business_bot::middlewares::{DbSessionMiddleware, UpdateContextMiddleware};
use business_bot::storage::{Database, MemoryStateStore};
use business_bot::update::{Update, UpdateKindTag};
use common::{FakeBot, memory_db, message};
use futures::FutureExt;
use serde_json::json;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
#[error("insufficient funds for order {0}")]
struct InsufficientFunds(u32);

struct Failing;

#[async_trait]
impl Handler for Failing {
    async fn handle(&self, _update: &Update, data: &mut UpdateData) -> Result<()> {
        assert!(data.session.is_some());
        Err(InsufficientFunds(42).into())
    }
}

/// Records the ambient request id seen inside the handler.
struct SeesRequestId(Arc<Mutex<Vec<String>>>);

#[async_trait]
impl Handler for SeesRequestId {
    async fn handle(&self, _update: &Update, _data: &mut UpdateData) -> Result<()> {
        tokio::task::yield_now().await;
        if let Some(id) = context::current_request_id() {
            self.0.lock().unwrap().push(id);
        }
        Ok(())
    }
}

/// Looks up a key that was never stored.
struct MissingKey;

#[async_trait]
impl Handler for MissingKey {
    async fn handle(&self, _update: &Update, _data: &mut UpdateData) -> Result<()> {
        let prices: HashMap<&str, u32> = HashMap::new();
        if prices["missing"] > 0 {
            return Ok(());
        }
        Ok(())
    }
}

struct Noop;

#[async_trait]
impl Handler for Noop {
    async fn handle(&self, _update: &Update, _data: &mut UpdateData) -> Result<()> {
        Ok(())
    }
}

fn pipeline(logger: Logger, db: Database) -> Dispatcher {
    let mut dp = Dispatcher::new(Arc::new(MemoryStateStore::new()));
    dp.outer_middleware(UpdateContextMiddleware::new(logger))
        .outer_middleware(DbSessionMiddleware::new(db));
    dp
}

#[tokio::test]
async fn test_failing_handler_is_logged_once_and_propagated_unchanged() {
    let sink = MemorySink::new();
    let db = memory_db().await;
    let mut dp = pipeline(Logger::new(sink.clone()), db.clone());
    dp.route(UpdatePattern::kind(UpdateKindTag::Message), Failing);

    let alerts = Arc::new(AtomicUsize::new(0));
    let seen = alerts.clone();
    let alert: Arc<dyn AlertSink> = Arc::new(move |name: &str, err: &anyhow::Error, ctx: &ContextFields| {
        assert_eq!(name, "handler_error");
        assert!(err.downcast_ref::<InsufficientFunds>().is_some());
        assert_eq!(ctx.get("request_id"), Some(&json!("rid-1")));
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let data = UpdateData::new(FakeBot::new())
        .with_request_id(Some("rid-1".into()))
        .with_alert(Some(alert));
    let err = dp.feed_update(&message(1, 5, 6, "hello"), data).await.unwrap_err();

    assert_eq!(err.downcast_ref::<InsufficientFunds>().map(|e| e.0), Some(42));
    assert_eq!(alerts.load(Ordering::SeqCst), 1);
    assert_eq!(db.active_sessions(), 0);

    let errors = sink.named("handler_error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].str_field("request_id"), Some("rid-1"));
    assert_eq!(errors[0].field("chat_id"), Some(&json!(5)));
    assert_eq!(errors[0].field("user_id"), Some(&json!(6)));
    assert_eq!(errors[0].str_field("update_kind"), Some("message"));
    assert!(errors[0].field("duration_ms").is_some());
    assert!(errors[0].str_field("error").unwrap().contains("order 42"));
    assert!(sink.named("handler_done").is_empty());
}

#[tokio::test]
async fn test_panicking_handler_is_logged_and_alerted_before_unwinding() {
    let sink = MemorySink::new();
    let db = memory_db().await;
    let mut dp = pipeline(Logger::new(sink.clone()), db.clone());
    dp.route(UpdatePattern::kind(UpdateKindTag::Message), MissingKey);

    let alerts = Arc::new(AtomicUsize::new(0));
    let seen = alerts.clone();
    let alert: Arc<dyn AlertSink> = Arc::new(move |name: &str, err: &anyhow::Error, _: &ContextFields| {
        assert_eq!(name, "handler_error");
        assert!(err.to_string().contains("handler panicked"));
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let data = UpdateData::new(FakeBot::new())
        .with_request_id(Some("rid-panic".into()))
        .with_alert(Some(alert));
    let outcome = AssertUnwindSafe(dp.feed_update(&message(1, 5, 6, "x"), data))
        .catch_unwind()
        .await;

    assert!(outcome.is_err());
    assert_eq!(sink.named("handler_start").len(), 1);
    let errors = sink.named("handler_error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].str_field("request_id"), Some("rid-panic"));
    assert!(errors[0].field("duration_ms").is_some());
    assert_eq!(alerts.load(Ordering::SeqCst), 1);
    assert_eq!(db.active_sessions(), 0);
}

#[tokio::test]
async fn test_request_id_falls_back_to_ambient_context() {
    let sink = MemorySink::new();
    let mut dp = pipeline(Logger::new(sink.clone()), memory_db().await);
    dp.route(UpdatePattern::kind(UpdateKindTag::Message), Noop);

    let data = UpdateData::new(FakeBot::new()).with_request_id(None);
    context::scope(
        CorrelationContext::new(Some("outer")),
        dp.feed_update(&message(1, 5, 6, "x"), data),
    )
    .await
    .unwrap();

    let start = sink.named("handler_start");
    assert_eq!(start.len(), 1);
    assert_eq!(start[0].str_field("request_id"), Some("outer"));
    assert_eq!(sink.named("handler_done")[0].str_field("request_id"), Some("outer"));
}

#[tokio::test]
async fn test_request_id_is_generated_without_inbound_or_ambient_id() {
    let sink = MemorySink::new();
    let mut dp = pipeline(Logger::new(sink.clone()), memory_db().await);
    dp.route(UpdatePattern::kind(UpdateKindTag::Message), Noop);

    let data = UpdateData::new(FakeBot::new()).with_request_id(Some("   ".into()));
    dp.feed_update(&message(1, 5, 6, "x"), data).await.unwrap();

    let start = sink.named("handler_start");
    let rid = start[0].str_field("request_id").unwrap();
    assert_eq!(rid.len(), 12);
    assert!(rid.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn test_repeated_failures_do_not_leak_sessions() {
    let sink = MemorySink::new();
    let db = memory_db().await;
    let mut dp = pipeline(Logger::new(sink.clone()), db.clone());
    dp.route(UpdatePattern::kind(UpdateKindTag::Message), Failing);

    let alerts = Arc::new(AtomicUsize::new(0));
    let seen = alerts.clone();
    let alert: Arc<dyn AlertSink> = Arc::new(move |_: &str, _: &anyhow::Error, _: &ContextFields| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let bot = FakeBot::new();

    for i in 0..1000 {
        let data = UpdateData::new(bot.clone()).with_alert(Some(alert.clone()));
        assert!(dp.feed_update(&message(i, 5, 6, "x"), data).await.is_err());
    }

    assert_eq!(db.active_sessions(), 0);
    assert_eq!(alerts.load(Ordering::SeqCst), 1000);
    assert_eq!(sink.named("handler_error").len(), 1000);
}

#[tokio::test]
async fn test_concurrent_updates_keep_their_own_request_ids() {
    let db = memory_db().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut dp = pipeline(Logger::new(MemorySink::new()), db);
    dp.route(UpdatePattern::kind(UpdateKindTag::Message), SeesRequestId(seen.clone()));
    let dp = Arc::new(dp);

    let mut tasks = Vec::new();
    for rid in ["a-1", "b-2", "c-3"] {
        let dp = dp.clone();
        tasks.push(tokio::spawn(async move {
            let data = UpdateData::new(FakeBot::new()).with_request_id(Some(rid.to_string()));
            dp.feed_update(&message(1, 5, 6, "x"), data).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut ids = seen.lock().unwrap().clone();
    ids.sort();
    assert_eq!(ids, vec!["a-1", "b-2", "c-3"]);
    assert_eq!(context::current_request_id(), None);
}

#[test]
fn test_sensitive_fields_are_masked() {
    let sink = MemorySink::new();
    let logger = Logger::new(sink.clone()).bind(&[("Authorization", json!("Bearer abcdefghijk"))]);
    logger.info(
        "outbound_call",
        &[("token", json!("short")), ("api_key", json!("sk-1234567890")), ("user", json!("bob"))],
    );

    let event = &sink.events()[0];
    assert_eq!(event.str_field("token"), Some(MASK));
    assert_eq!(event.str_field("api_key"), Some(format!("sk-1{MASK}90").as_str()));
    assert_eq!(event.str_field("Authorization"), Some(format!("Bear{MASK}jk").as_str()));
    assert_eq!(event.str_field("user"), Some("bob"));
}
