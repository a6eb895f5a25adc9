//! Application Configuration
//!
//! Environment-driven configuration, loaded after `.env` files via
//! `dotenvy`. Missing `DATABASE_URL` / `REDIS_URL` are not errors: the
//! server degrades to the in-memory store and skips the Redis event mirror.

use serde::Deserialize;

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_url: None,
            redis_url: None,
            log_level: default_log_level(),
        }
    }
}
