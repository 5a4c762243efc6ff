//! Configuration management

use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub server: ServerConfig,
    pub ai: AiConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

/// Calendar sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Cron expression for the periodic sync job.
    pub cron_expression: String,
    /// Days before now covered by a token-less (initial) sync.
    pub lookback_days: i64,
    /// Days after now covered by a token-less (initial) sync.
    pub lookahead_days: i64,
    pub enabled: bool,
    /// User ids the periodic job syncs.
    pub users: Vec<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// Task suggestion (LLM) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig { path: "dayplan.db".to_string(), pool_size: 8 },
            sync: SyncConfig {
                // Every 2 hours, matching the background sync cadence.
                cron_expression: "0 0 */2 * * *".to_string(),
                lookback_days: 1,
                lookahead_days: 60,
                enabled: true,
                users: Vec::new(),
            },
            server: ServerConfig { bind_addr: "127.0.0.1:4280".to_string() },
            ai: AiConfig { api_key: None, model: "claude-sonnet-4-5".to_string() },
        }
    }
}
