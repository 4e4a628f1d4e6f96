// src/lib.rs

pub mod alerts;
pub mod bot;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod errors;
pub mod handlers;
pub mod logger;
pub mod middlewares;
pub mod runtime;
pub mod scheduler;
pub mod storage;
pub mod update;
pub mod web;
