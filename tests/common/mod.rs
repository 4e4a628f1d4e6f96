// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use business_bot::bot::{BotApi, WebhookRegistration};
use business_bot::config::{BotConfig, RedisConfig, Settings};
use business_bot::runtime::Connector;
use business_bot::storage::{Database, MemoryStateStore, StateStore};
use business_bot::update::Update;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeBot {
    pub webhooks: Mutex<Vec<WebhookRegistration>>,
    pub deleted: AtomicUsize,
    pub messages: Mutex<Vec<(i64, String)>>,
    pub closed: AtomicUsize,
}

impl FakeBot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BotApi for FakeBot {
    async fn set_webhook(&self, registration: &WebhookRegistration) -> Result<()> {
        self.webhooks.lock().unwrap().push(registration.clone());
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<()> {
        self.deleted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.messages.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeState {
    inner: MemoryStateStore,
    pub pings: AtomicUsize,
    pub closed: AtomicUsize,
}

#[async_trait]
impl StateStore for FakeState {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.inner.clear(key).await
    }

    async fn ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "fake-remote"
    }
}

pub struct FakeConnector {
    pub bot: Arc<FakeBot>,
    pub state: Arc<FakeState>,
    fail_state: bool,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            bot: FakeBot::new(),
            state: Arc::new(FakeState::default()),
            fail_state: false,
        }
    }

    /// Connector whose state backend refuses connections.
    pub fn failing_state() -> Self {
        Self { fail_state: true, ..Self::new() }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn bot(&self, _cfg: &BotConfig) -> Result<Arc<dyn BotApi>> {
        Ok(self.bot.clone())
    }

    async fn state_store(&self, _cfg: &RedisConfig, _ttl: Duration) -> Result<Arc<dyn StateStore>> {
        if self.fail_state {
            bail!("connection refused");
        }
        Ok(self.state.clone())
    }
}

pub fn settings(secret: Option<&str>, with_redis: bool) -> Settings {
    let secret = secret.map(|s| format!("secret = \"{s}\"")).unwrap_or_default();
    let redis = if with_redis { "[redis]\nhost = \"localhost\"" } else { "" };
    Settings::from_toml(&format!(
        r#"
        [main]
        admin_id = 1

        [bot]
        token = "123456:TEST-TOKEN"

        [db]
        url = "sqlite::memory:"
        max_connections = 1

        [web]
        base_url = "bot.example.com"
        {secret}

        {redis}
        "#
    ))
    .unwrap()
}

pub async fn memory_db() -> Database {
    Database::connect(&settings(None, false).db).await.unwrap()
}

pub fn message(update_id: i64, chat_id: i64, user_id: i64, text: &str) -> Update {
    Update::from_value(json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "chat": {"id": chat_id, "type": "private"},
            "from": {"id": user_id, "is_bot": false, "first_name": "Test"},
            "text": text
        }
    }))
    .unwrap()
}
