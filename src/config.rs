use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

/// Settings of the tracking agent.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub collector_url: String,
    pub session_id: String,
    /// Empty disables the offline queue.
    pub queue_database_url: String,
    pub throttle_ms: u64,
    pub position_timeout_ms: u64,
    pub recovery_interval_secs: u64,
    pub probe_interval_secs: u64,
    /// `-` reads fixes from stdin.
    pub fix_source: String,
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let collector_url =
            env::var("COLLECTOR_URL").unwrap_or_else(|_| "http://localhost:3000/api".to_string());
        let session_id = env::var("SESSION_ID").unwrap_or_default();
        let queue_database_url = env::var("QUEUE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://wimt-offline-storage.db".to_string());
        let throttle_ms = env::var("THROTTLE_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .unwrap_or(30000);
        let position_timeout_ms = env::var("POSITION_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .unwrap_or(30000);
        let recovery_interval_secs = env::var("RECOVERY_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);
        let probe_interval_secs = env::var("PROBE_INTERVAL_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let fix_source = env::var("FIX_SOURCE").unwrap_or_else(|_| "-".to_string());

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            collector_url,
            session_id,
            queue_database_url,
            throttle_ms,
            position_timeout_ms,
            recovery_interval_secs,
            probe_interval_secs,
            fix_source,
            log_level,
        })
    }
}

/// Settings of the collector service.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub log_level: String,
}

impl CollectorConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
        let db_name = env::var("DB_DATABASE").unwrap_or_else(|_| "wimt".to_string());
        let db_user = env::var("DB_USER").unwrap_or_else(|_| "wimt".to_string());
        let db_pwd = env::var("DB_PWD").unwrap_or_else(|_| "wimt".to_string());

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            log_level,
        })
    }
}
