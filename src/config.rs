//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Per-service credentials live next to their clients and are loaded only
//! by the subcommands that need them; this module holds the shared core.

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Config {
    /// Path of the SQLite database file.
    pub database_path: String,
    /// Project-key prefixes recognized by the ticket parser (e.g. IOS, WEB).
    pub project_keys: Vec<String>,
    /// Refresh stored issue metadata on every sync that references them.
    pub issue_autoupdate: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let project_keys = required_var("JIRA_PROJECT_KEYS")?
            .split(',')
            .map(|k| k.trim().to_uppercase())
            .filter(|k| !k.is_empty())
            .collect();

        Ok(Self {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "hoursync.db".to_string()),
            project_keys,
            issue_autoupdate: flag_var("ISSUE_AUTOUPDATE", true),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

pub(crate) fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

/// Read a boolean flag from the environment ("1"/"true" = on).
pub fn flag_var(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => v == "1" || v.eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}
