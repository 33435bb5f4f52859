use crate::config::{parse_bool_env, parse_env};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::env;
use std::time::Duration;

/// Pool settings for the preference database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub sqlx_logging: bool,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            sqlx_logging: false,
        }
    }

    /// `DATABASE_URL` is required; `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS`,
    /// `DB_CONNECT_TIMEOUT_SECS`, `DB_IDLE_TIMEOUT_SECS` and `DB_SQLX_LOGGING`
    /// override the defaults.
    pub fn from_env() -> Result<Self, DbErr> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| DbErr::Custom("DATABASE_URL must be set".to_string()))?;
        let defaults = Self::new(url);

        let config = Self {
            max_connections: parse_env("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: parse_env("DB_MIN_CONNECTIONS", defaults.min_connections),
            connect_timeout: Duration::from_secs(parse_env(
                "DB_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )),
            idle_timeout: Duration::from_secs(parse_env(
                "DB_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )),
            sqlx_logging: parse_bool_env("DB_SQLX_LOGGING", defaults.sqlx_logging),
            ..defaults
        };
        Ok(config.clamped())
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self.clamped()
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self.clamped()
    }

    fn clamped(mut self) -> Self {
        self.max_connections = self.max_connections.max(1);
        if self.min_connections > self.max_connections {
            tracing::warn!(
                "DB min connections {} exceeds max {}, lowering",
                self.min_connections,
                self.max_connections
            );
            self.min_connections = self.max_connections;
        }
        self
    }

    pub fn connect_options(&self) -> ConnectOptions {
        let mut opt = ConnectOptions::new(self.url.clone());
        opt.max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout)
            .sqlx_logging(self.sqlx_logging);
        opt
    }

    pub async fn connect(&self) -> Result<DatabaseConnection, DbErr> {
        Database::connect(self.connect_options()).await
    }
}

pub async fn get_database() -> Result<DatabaseConnection, DbErr> {
    let config = DatabaseConfig::from_env()?;
    tracing::debug!(
        "Connecting with pool {}..{}",
        config.min_connections,
        config.max_connections
    );
    config.connect().await
}
