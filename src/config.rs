// src/config.rs
use anyhow::{Result, bail};
use config::{Config as Loader, Environment, File};
use serde::Deserialize;
use std::env;

/// Parse mode the bot client applies to every outgoing message by default.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    #[default]
    #[serde(alias = "html")]
    HTML,
    #[serde(alias = "markdownv2", alias = "MarkdownV2")]
    MarkdownV2,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AdminConfig {
    pub admin_id: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    #[serde(default)]
    pub parse_mode: ParseMode,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub db: i64,
    pub password: Option<String>,
}

impl RedisConfig {
    /// `redis://[:password@]host:port/db`
    pub fn url(&self) -> String {
        let auth = match &self.password {
            Some(pwd) if !pwd.is_empty() => format!(":{pwd}@"),
            _ => String::new(),
        };
        format!("redis://{auth}{}:{}/{}", self.host, self.port, self.db)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    pub base_url: String,
    #[serde(default = "default_main_path")]
    pub main_path: String,
    pub secret: Option<String>,
}

impl WebConfig {
    /// Public callback URL the platform pushes updates to.
    pub fn webhook_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}{}", self.webhook_path())
    }

    /// Route path of the webhook, always with a leading slash.
    pub fn webhook_path(&self) -> String {
        if self.main_path.starts_with('/') {
            self.main_path.clone()
        } else {
            format!("/{}", self.main_path)
        }
    }

    /// Configured secret, treating an empty string as "not configured".
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `None` means: JSON unless `APP_ENV=dev`.
    pub json: Option<bool>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: None }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    pub main: AdminConfig,
    pub bot: BotConfig,
    pub db: DbConfig,
    pub redis: Option<RedisConfig>,
    pub web: WebConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_max_connections() -> u32 { 20 }
fn default_acquire_timeout_secs() -> u64 { 10 }
fn default_redis_host() -> String { "localhost".into() }
fn default_redis_port() -> u16 { 6379 }
fn default_web_host() -> String { "0.0.0.0".into() }
fn default_web_port() -> u16 { 8080 }
fn default_main_path() -> String { "/telegram/webhook".into() }
fn default_log_level() -> String { "info".into() }

impl Settings {
    /// File first (optional), then `BOT_CONFIG__SECTION__KEY` variables on top.
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();
        let file = env::var("BOT_CONFIG_FILE").unwrap_or_else(|_| "Config.toml".into());
        let loader = Loader::builder()
            .add_source(File::with_name(&file).required(false))
            .add_source(Environment::with_prefix("BOT_CONFIG").prefix_separator("__").separator("__"))
            .build()?;
        let settings: Settings = loader.try_deserialize()?;
        settings.normalized()
    }

    /// Parses settings from a TOML document; used by tests and tooling.
    pub fn from_toml(source: &str) -> Result<Self> {
        let loader = Loader::builder()
            .add_source(File::from_str(source, config::FileFormat::Toml))
            .build()?;
        let settings: Settings = loader.try_deserialize()?;
        settings.normalized()
    }

    fn normalized(mut self) -> Result<Self> {
        if self.bot.token.trim().is_empty() {
            bail!("bot.token must not be empty");
        }
        if self.web.base_url.trim().is_empty() {
            bail!("web.base_url must not be empty");
        }
        if !(self.web.base_url.starts_with("http://") || self.web.base_url.starts_with("https://")) {
            self.web.base_url = format!("https://{}", self.web.base_url);
        }
        Ok(self)
    }

    /// `APP_ENV`, defaulting to `prod`.
    pub fn app_env() -> String {
        env::var("APP_ENV").unwrap_or_else(|_| "prod".into())
    }
}
