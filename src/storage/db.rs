// src/storage/db.rs
use crate::config::DbConfig;
use anyhow::{Context, Result};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Connection pool plus a count of sessions currently checked out.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    active: Arc<AtomicUsize>,
}

impl Database {
    /// Opens the pool described by `cfg`. File databases get their parent
    /// directory created and WAL journaling.
    pub async fn connect(cfg: &DbConfig) -> Result<Self> {
        let mut opts = SqliteConnectOptions::from_str(&cfg.url)
            .with_context(|| format!("invalid database url {:?}", cfg.url))?
            .create_if_missing(true);

        let filename: PathBuf = opts.get_filename().to_path_buf();
        let in_memory = cfg.url.contains(":memory:") || cfg.url.contains("mode=memory");
        if !in_memory {
            if let Some(dir) = filename.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create directory {:?}", dir))?;
            }
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(cfg.max_connections.max(1))
            .min_connections(cfg.min_connections)
            .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
            .connect_with(opts)
            .await
            .context("failed to open database pool")?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Checks a connection out of the pool for one unit of work.
    pub async fn acquire_session(&self) -> Result<DbSession> {
        let conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire database session")?;
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(DbSession {
            conn,
            active: self.active.clone(),
        })
    }

    /// Sessions acquired and not yet released.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// `SELECT 1` through the session.
pub async fn test_connection(session: &mut DbSession) -> Result<bool> {
    let one: i64 = sqlx::query_scalar("SELECT 1")
        .fetch_one(&mut **session)
        .await
        .context("database check failed")?;
    Ok(one == 1)
}

/// A pooled connection owned by exactly one operation. Dropping it returns
/// the connection to the pool, so release happens on every exit path.
#[derive(Debug)]
pub struct DbSession {
    conn: PoolConnection<Sqlite>,
    active: Arc<AtomicUsize>,
}

impl Deref for DbSession {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for DbSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for DbSession {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_cfg() -> DbConfig {
        DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_session_check_and_release() {
        let db = Database::connect(&memory_cfg()).await.unwrap();
        {
            let mut session = db.acquire_session().await.unwrap();
            assert_eq!(db.active_sessions(), 1);
            assert!(test_connection(&mut session).await.unwrap());
        }
        assert_eq!(db.active_sessions(), 0);
        // single-connection pool: a second acquire only succeeds after release
        let again = db.acquire_session().await.unwrap();
        drop(again);
        assert_eq!(db.active_sessions(), 0);
        db.close().await;
    }
}
