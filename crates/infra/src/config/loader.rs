//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If the required variables are missing, falls back to a config file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `DAYPLAN_DB_PATH`: Database file path (required for env loading)
//! - `DAYPLAN_DB_POOL_SIZE`: Connection pool size
//! - `DAYPLAN_SYNC_CRON`: Cron expression for the periodic sync job
//! - `DAYPLAN_SYNC_LOOKBACK_DAYS` / `DAYPLAN_SYNC_LOOKAHEAD_DAYS`: Window
//!   bounds for token-less syncs
//! - `DAYPLAN_SYNC_ENABLED`: Whether the periodic job runs (true/false)
//! - `DAYPLAN_SYNC_USERS`: Comma-separated user ids the periodic job syncs
//! - `DAYPLAN_BIND_ADDR`: HTTP server bind address
//! - `DAYPLAN_AI_API_KEY`: Suggestion API key (`ANTHROPIC_API_KEY` also read)
//! - `DAYPLAN_AI_MODEL`: Suggestion model name
//!
//! ## File Locations
//! The loader probes `config.{json,toml}` and `dayplan.{json,toml}` in the
//! working directory, up to two parent directories, and next to the
//! executable.

use std::path::{Path, PathBuf};

use dayplan_domain::{Config, DayplanError, Result};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the required
/// variables are missing, falls back to loading from a config file.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "environment incomplete, trying config file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// `DAYPLAN_DB_PATH` must be set; every other variable falls back to its
/// default.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.database.path = env_var("DAYPLAN_DB_PATH")?;
    if let Some(pool_size) = env_parse::<u32>("DAYPLAN_DB_POOL_SIZE")? {
        config.database.pool_size = pool_size;
    }

    if let Ok(cron) = std::env::var("DAYPLAN_SYNC_CRON") {
        config.sync.cron_expression = cron;
    }
    if let Some(lookback) = env_parse::<i64>("DAYPLAN_SYNC_LOOKBACK_DAYS")? {
        config.sync.lookback_days = lookback;
    }
    if let Some(lookahead) = env_parse::<i64>("DAYPLAN_SYNC_LOOKAHEAD_DAYS")? {
        config.sync.lookahead_days = lookahead;
    }
    config.sync.enabled = env_bool("DAYPLAN_SYNC_ENABLED", config.sync.enabled);
    if let Ok(users) = std::env::var("DAYPLAN_SYNC_USERS") {
        config.sync.users =
            users.split(',').map(str::trim).filter(|u| !u.is_empty()).map(String::from).collect();
    }

    if let Ok(bind_addr) = std::env::var("DAYPLAN_BIND_ADDR") {
        config.server.bind_addr = bind_addr;
    }

    config.ai.api_key = std::env::var("DAYPLAN_AI_API_KEY")
        .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
        .ok();
    if let Ok(model) = std::env::var("DAYPLAN_AI_MODEL") {
        config.ai.model = model;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(DayplanError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            DayplanError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| DayplanError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| DayplanError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| DayplanError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(DayplanError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files, returning the first that
/// exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("dayplan.json"),
            cwd.join("dayplan.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
            cwd.join("../../config.json"),
            cwd.join("../../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("dayplan.json"),
                exe_dir.join("dayplan.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| DayplanError::Config(format!("Missing required environment variable: {key}")))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| DayplanError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
