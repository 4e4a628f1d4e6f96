// src/storage/mod.rs

pub mod db;
pub mod state;

pub use db::{Database, DbSession};
pub use state::{FsmContext, MemoryStateStore, RedisStateStore, StateStore, StorageKey, DEFAULT_STATE_TTL};
