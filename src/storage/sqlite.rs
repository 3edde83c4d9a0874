use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{error, info, warn};

use super::models::{cutoff_days, cutoff_hours, format_timestamp, parse_created_at, parse_timestamp};
use super::{Reading, StorageBackend, StoredReading};

/// Single-table indexed store. Timestamps are persisted as fixed-format
/// ISO-8601 text so the secondary index supports lexicographic range scans
/// for `query_recent` and `cleanup`.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating directory {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("opening SQLite database {}", path.display()))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Idempotent; runs on every construction.
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                device_id TEXT NOT NULL,
                temperature REAL,
                humidity REAL,
                light_level INTEGER,
                device_type TEXT,
                version TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON readings(timestamp)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert(&self, reading: &Reading) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO readings
                (timestamp, device_id, temperature, humidity, light_level, device_type, version)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(format_timestamp(&reading.timestamp))
        .bind(&reading.device_id)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.light_level)
        .bind(&reading.device_type)
        .bind(&reading.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn select_recent(&self, window_hours: i64) -> Result<Vec<StoredReading>> {
        let cutoff = format_timestamp(&cutoff_hours(window_hours));
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, device_id, temperature, humidity,
                   light_level, device_type, version, created_at
            FROM readings
            WHERE timestamp >= ?1
            ORDER BY timestamp DESC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let raw_ts: String = row.try_get("timestamp")?;
            let Some(timestamp) = parse_timestamp(&raw_ts) else {
                warn!(id, timestamp = %raw_ts, "Skipping row with malformed timestamp");
                continue;
            };
            let created_at: Option<String> = row.try_get("created_at")?;
            out.push(StoredReading {
                id: Some(id),
                created_at: created_at.as_deref().and_then(parse_created_at),
                reading: Reading {
                    timestamp,
                    device_id: row.try_get("device_id")?,
                    temperature: row.try_get("temperature")?,
                    humidity: row.try_get("humidity")?,
                    light_level: row.try_get("light_level")?,
                    device_type: row
                        .try_get::<Option<String>, _>("device_type")?
                        .unwrap_or_else(|| "Unknown".to_owned()),
                    version: row
                        .try_get::<Option<String>, _>("version")?
                        .unwrap_or_else(|| "Unknown".to_owned()),
                },
            });
        }
        Ok(out)
    }

    async fn delete_expired(&self, retention_days: i64) -> Result<u64> {
        let cutoff = format_timestamp(&cutoff_days(retention_days));
        let result = sqlx::query("DELETE FROM readings WHERE timestamp < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn save(&self, reading: &Reading) -> bool {
        match self.insert(reading).await {
            Ok(()) => {
                info!(timestamp = %reading.timestamp, "Reading inserted into SQLite");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to insert reading into SQLite");
                false
            }
        }
    }

    async fn query_recent(&self, window_hours: i64) -> Vec<StoredReading> {
        match self.select_recent(window_hours).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Failed to read readings from SQLite");
                Vec::new()
            }
        }
    }

    async fn cleanup(&self, retention_days: i64) -> u64 {
        match self.delete_expired(retention_days).await {
            Ok(deleted) => {
                info!(deleted, "SQLite cleanup complete");
                deleted
            }
            Err(e) => {
                error!(error = %e, "SQLite cleanup failed");
                0
            }
        }
    }
}
