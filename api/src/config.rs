//! Application configuration

use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => bail!("unknown log format '{}'", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL URL; the in-memory store is used when unset
    pub database_url: Option<String>,
    /// Pool size for the PostgreSQL store
    pub database_max_connections: u32,
    /// Apply schema migrations on startup
    pub run_migrations: bool,
    /// Upload directory path
    pub upload_dir: String,
    /// Largest accepted workbook upload, from `MAX_UPLOAD_MB`
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let max_upload_mb: usize = var("MAX_UPLOAD_MB", "512")
            .parse()
            .context("Invalid MAX_UPLOAD_MB")?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .with_context(|| format!("MAX_UPLOAD_MB {} is too large", max_upload_mb))?;

        Ok(Self {
            host: var("HOST", "0.0.0.0"),
            port: var("PORT", "8080").parse().context("Invalid PORT")?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: var("DATABASE_MAX_CONNECTIONS", "5")
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            run_migrations: var("RUN_MIGRATIONS", "true")
                .parse()
                .context("Invalid RUN_MIGRATIONS")?,
            upload_dir: var("UPLOAD_DIR", "/data/uploads"),
            max_upload_bytes,
            log_format: var("LOG_FORMAT", "text")
                .parse()
                .context("Invalid LOG_FORMAT")?,
        })
    }
}
