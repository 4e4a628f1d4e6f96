// src/storage/state.rs

//! Conversation-state backends.
//!
//! Both backends satisfy [`StateStore`], so the dispatcher never knows which
//! one it got: the Redis one survives restarts and expires keys after a TTL,
//! the in-process one is lost with the process.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// TTL applied to both state and data keys in the remote backend (48h).
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(172_800);

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;
    async fn clear(&self, key: &str) -> Result<()>;

    /// TTL applied by [`FsmContext`] when writing through this store.
    fn default_ttl(&self) -> Option<Duration> {
        None
    }

    /// Reachability check used at startup.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str;
}

/// Conversation key: one per (chat, user) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub chat_id: i64,
    pub user_id: i64,
}

impl StorageKey {
    pub fn new(chat_id: i64, user_id: i64) -> Self {
        Self { chat_id, user_id }
    }

    pub fn render(&self, part: &str) -> String {
        format!("fsm:{}:{}:{}", self.chat_id, self.user_id, part)
    }
}

/// State/data accessor for one conversation.
#[derive(Clone)]
pub struct FsmContext {
    store: Arc<dyn StateStore>,
    key: StorageKey,
}

impl FsmContext {
    pub fn new(store: Arc<dyn StateStore>, key: StorageKey) -> Self {
        Self { store, key }
    }

    pub fn key(&self) -> StorageKey {
        self.key
    }

    pub async fn get_state(&self) -> Result<Option<String>> {
        let raw = self.store.get(&self.key.render("state")).await?;
        raw.map(|bytes| String::from_utf8(bytes).context("state is not valid utf-8"))
            .transpose()
    }

    pub async fn set_state(&self, state: &str) -> Result<()> {
        let ttl = self.store.default_ttl();
        self.store.set(&self.key.render("state"), state.as_bytes(), ttl).await
    }

    pub async fn get_data(&self) -> Result<serde_json::Value> {
        match self.store.get(&self.key.render("data")).await? {
            Some(bytes) => serde_json::from_slice(&bytes).context("state data is not valid json"),
            None => Ok(serde_json::Value::Object(Default::default())),
        }
    }

    pub async fn set_data(&self, data: &serde_json::Value) -> Result<()> {
        let ttl = self.store.default_ttl();
        let bytes = serde_json::to_vec(data)?;
        self.store.set(&self.key.render("data"), &bytes, ttl).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear(&self.key.render("state")).await?;
        self.store.clear(&self.key.render("data")).await
    }
}

/// Volatile in-process store.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: RwLock<HashMap<String, (Vec<u8>, Option<Instant>)>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| anyhow!("state lock poisoned"))?;
        Ok(entries.get(key).and_then(|(value, expires)| match expires {
            Some(at) if *at <= Instant::now() => None,
            _ => Some(value.clone()),
        }))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let expires = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.write().map_err(|_| anyhow!("state lock poisoned"))?;
        entries.insert(key.to_string(), (value.to_vec(), expires));
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| anyhow!("state lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Redis-backed store; every write carries the TTL.
pub struct RedisStateStore {
    conn: Mutex<Option<ConnectionManager>>,
    ttl: Duration,
}

impl RedisStateStore {
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            ttl,
        })
    }

    fn conn(&self) -> Result<ConnectionManager> {
        let guard = self.conn.lock().map_err(|_| anyhow!("redis lock poisoned"))?;
        guard.clone().ok_or_else(|| anyhow!("redis connection is closed"))
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn()?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn()?;
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    fn default_ttl(&self) -> Option<Duration> {
        Some(self.ttl)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn()?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::info!("Redis PING: {}", pong);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().map_err(|_| anyhow!("redis lock poisoned"))?;
        guard.take();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
