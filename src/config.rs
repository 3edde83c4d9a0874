use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub token: Option<String>,
    pub secret: Option<String>,
    pub device_id: Option<String>,
    /// Storage backend name: "csv" or "sqlite"
    pub storage_backend: String,
    pub csv_path: PathBuf,
    pub database_path: PathBuf,
    /// Days of history kept by the retention sweep
    pub retention_days: i64,
    /// Maximum attempts for the status fetch
    pub max_retries: u32,
    /// Sensor polling interval in seconds (serve mode)
    pub poll_interval_secs: u64,
    /// Retention sweep interval in seconds (serve mode)
    pub cleanup_interval_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub sheets: Option<SheetsConfig>,
}

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub access_token: String,
}

/// Credentials required by every API-facing command. Kept separate from
/// `Config` so storage-only commands (e.g. `cleanup`) run without them.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub token: String,
    pub secret: String,
    pub device_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let sheets = match (
            std::env::var("GOOGLE_SHEETS_SPREADSHEET_ID"),
            std::env::var("GOOGLE_SHEETS_ACCESS_TOKEN"),
        ) {
            (Ok(spreadsheet_id), Ok(access_token)) => Some(SheetsConfig {
                spreadsheet_id,
                access_token,
            }),
            _ => None,
        };

        Ok(Self {
            api_base_url: optional("SWITCHBOT_BASE_URL", "https://api.switch-bot.com/v1.1"),
            token: non_empty("SWITCHBOT_TOKEN"),
            secret: non_empty("SWITCHBOT_SECRET"),
            device_id: non_empty("SWITCHBOT_DEVICE_ID"),
            storage_backend: optional("DATABASE_TYPE", "sqlite"),
            csv_path: optional("CSV_PATH", "data/temperature.csv").into(),
            database_path: optional("DATABASE_PATH", "data/temperature.db").into(),
            retention_days: optional("DATA_RETENTION_DAYS", "30")
                .parse()
                .context("DATA_RETENTION_DAYS must be an integer")?,
            max_retries: optional("SWITCHBOT_MAX_RETRIES", "3")
                .parse()
                .context("SWITCHBOT_MAX_RETRIES must be a positive integer")?,
            poll_interval_secs: optional("POLL_INTERVAL_SECS", "1800")
                .parse()
                .context("POLL_INTERVAL_SECS must be a positive integer")?,
            cleanup_interval_secs: optional("CLEANUP_INTERVAL_SECS", "86400")
                .parse()
                .context("CLEANUP_INTERVAL_SECS must be a positive integer")?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            sheets,
        })
    }

    /// Fails fast when any API credential is missing. This is the one error
    /// class allowed to abort an invocation before any I/O happens.
    pub fn api_credentials(&self) -> Result<ApiCredentials> {
        match (&self.token, &self.secret, &self.device_id) {
            (Some(token), Some(secret), Some(device_id)) => Ok(ApiCredentials {
                token: token.clone(),
                secret: secret.clone(),
                device_id: device_id.clone(),
            }),
            _ => {
                let mut missing = Vec::new();
                if self.token.is_none() {
                    missing.push("SWITCHBOT_TOKEN");
                }
                if self.secret.is_none() {
                    missing.push("SWITCHBOT_SECRET");
                }
                if self.device_id.is_none() {
                    missing.push("SWITCHBOT_DEVICE_ID");
                }
                bail!("missing required env vars: {}", missing.join(", "));
            }
        }
    }

    /// Path the configured backend persists to.
    pub fn storage_location(&self) -> &Path {
        if self.storage_backend.eq_ignore_ascii_case("csv") {
            &self.csv_path
        } else {
            &self.database_path
        }
    }
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
