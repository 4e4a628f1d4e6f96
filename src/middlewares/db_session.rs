// src/middlewares/db_session.rs

use crate::dispatcher::{Dispatched, Middleware, Next, UpdateData};
use crate::storage::Database;
use crate::update::Update;
use anyhow::Result;
use async_trait::async_trait;

/// Gives every update its own database session for the length of the inner
/// chain. The session is taken back before returning on every path; if the
/// invocation is dropped mid-flight, dropping `UpdateData` releases it.
pub struct DbSessionMiddleware {
    db: Database,
}

impl DbSessionMiddleware {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Middleware for DbSessionMiddleware {
    async fn call(&self, update: &Update, data: &mut UpdateData, next: Next<'_>) -> Result<Dispatched> {
        data.session = Some(self.db.acquire_session().await?);
        let outcome = next.run(update, data).await;
        data.session.take();
        outcome
    }
}
