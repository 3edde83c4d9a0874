use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tokio::task;
use tracing::{debug, error, info, warn};

use super::models::{cutoff_days, cutoff_hours, parse_timestamp};
use super::{Reading, StorageBackend, StoredReading};

/// Fixed column header written on first use. `save` appends rows in exactly
/// this order.
const HEADER: [&str; 7] = [
    "timestamp",
    "device_id",
    "temperature",
    "humidity",
    "light_level",
    "device_type",
    "version",
];

/// Append-only flat-file store. Cleanup rewrites the whole file to a
/// temporary sibling and atomically renames it into place, so a partial
/// file is never visible.
pub struct CsvStorage {
    path: PathBuf,
}

impl CsvStorage {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        store.ensure_file_exists()?;
        Ok(store)
    }

    /// Creates the backing file with its header row if absent, including
    /// parent directories. Idempotent; runs on every construction.
    fn ensure_file_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating directory {}", parent.display()))?;
            }
        }
        let mut writer = WriterBuilder::new()
            .from_path(&self.path)
            .with_context(|| format!("creating {}", self.path.display()))?;
        writer.write_record(HEADER)?;
        writer.flush()?;
        debug!(path = %self.path.display(), "Created CSV store");
        Ok(())
    }

    // The helpers below do blocking file I/O; the trait methods run them on
    // the blocking pool so a long rewrite never stalls a runtime worker.

    fn append(path: &Path, reading: &Reading) -> Result<()> {
        let file = OpenOptions::new().append(true).open(path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(reading)?;
        writer.flush()?;
        Ok(())
    }

    fn read_recent(path: &Path, window_hours: i64) -> Result<Vec<StoredReading>> {
        let cutoff = cutoff_hours(window_hours);
        let mut reader = ReaderBuilder::new().from_path(path)?;
        let mut out = Vec::new();
        for (idx, row) in reader.deserialize::<Reading>().enumerate() {
            match row {
                Ok(reading) if reading.timestamp >= cutoff => out.push(StoredReading {
                    id: None,
                    created_at: None,
                    reading,
                }),
                Ok(_) => {}
                // Row 1 is the header, so data rows start at 2.
                Err(e) => warn!(row = idx + 2, error = %e, "Skipping malformed CSV row"),
            }
        }
        Ok(out)
    }

    /// Rewrites the file keeping only rows at or past the cutoff, then
    /// replaces the original via rename. Rows whose timestamp cannot be
    /// parsed are retained verbatim rather than silently dropped.
    fn rewrite_without_expired(path: &Path, retention_days: i64) -> Result<u64> {
        let cutoff = cutoff_days(retention_days);
        let temp_path = path.with_extension("tmp");
        let mut deleted = 0u64;

        {
            let mut reader = ReaderBuilder::new().from_path(path)?;
            let headers = reader.headers()?.clone();
            let mut writer = WriterBuilder::new()
                .from_path(&temp_path)
                .with_context(|| format!("creating {}", temp_path.display()))?;
            writer.write_record(&headers)?;

            let mut record = StringRecord::new();
            while reader.read_record(&mut record)? {
                let keep = match record.get(0).and_then(parse_timestamp) {
                    Some(ts) => ts >= cutoff,
                    None => {
                        warn!(row = ?record, "Retaining row with unparseable timestamp");
                        true
                    }
                };
                if keep {
                    writer.write_record(&record)?;
                } else {
                    deleted += 1;
                }
            }
            writer.flush()?;
        }

        fs::rename(&temp_path, path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(deleted)
    }
}

#[async_trait]
impl StorageBackend for CsvStorage {
    async fn save(&self, reading: &Reading) -> bool {
        let path = self.path.clone();
        let row = reading.clone();
        let result = task::spawn_blocking(move || Self::append(&path, &row))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r);
        match result {
            Ok(()) => {
                info!(timestamp = %reading.timestamp, "Reading appended to CSV");
                true
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to append reading to CSV");
                false
            }
        }
    }

    async fn query_recent(&self, window_hours: i64) -> Vec<StoredReading> {
        let path = self.path.clone();
        let result = task::spawn_blocking(move || Self::read_recent(&path, window_hours))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r);
        match result {
            Ok(rows) => rows,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to read readings from CSV");
                Vec::new()
            }
        }
    }

    async fn cleanup(&self, retention_days: i64) -> u64 {
        let path = self.path.clone();
        let result =
            task::spawn_blocking(move || Self::rewrite_without_expired(&path, retention_days))
                .await
                .map_err(anyhow::Error::from)
                .and_then(|r| r);
        match result {
            Ok(deleted) => {
                info!(deleted, "CSV cleanup complete");
                deleted
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "CSV cleanup failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, NaiveDateTime, Timelike};
    use tempfile::TempDir;

    use super::*;

    fn store(dir: &TempDir) -> CsvStorage {
        CsvStorage::new(dir.path().join("temperature.csv")).unwrap()
    }

    fn reading(timestamp: NaiveDateTime) -> Reading {
        Reading {
            timestamp,
            device_id: "D1".to_owned(),
            temperature: Some(25.0),
            humidity: Some(50.0),
            light_level: Some(100),
            device_type: "Hub2".to_owned(),
            version: "1.0".to_owned(),
        }
    }

    fn now() -> NaiveDateTime {
        // Truncate to the microsecond precision the store persists.
        let ts = Local::now().naive_local();
        ts.with_nanosecond(ts.nanosecond() / 1_000 * 1_000).unwrap()
    }

    #[test]
    fn creates_file_with_header_and_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/data/temperature.csv");
        CsvStorage::new(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents.lines().next().unwrap(),
            "timestamp,device_id,temperature,humidity,light_level,device_type,version"
        );
    }

    #[tokio::test]
    async fn reconstruction_does_not_touch_existing_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("temperature.csv");
        let first = CsvStorage::new(&path).unwrap();
        assert!(first.save(&reading(now())).await);

        let second = CsvStorage::new(&path).unwrap();
        assert_eq!(second.query_recent(24).await.len(), 1);
    }

    #[tokio::test]
    async fn roundtrip_preserves_all_fields_including_nulls() {
        let dir = TempDir::new().unwrap();
        let storage = store(&dir);

        let mut sparse = reading(now());
        sparse.temperature = None;
        sparse.humidity = None;
        sparse.light_level = None;
        assert!(storage.save(&sparse).await);

        let rows = storage.query_recent(24).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reading, sparse);
        assert_eq!(rows[0].id, None);
        assert_eq!(rows[0].created_at, None);
    }

    #[tokio::test]
    async fn query_recent_filters_by_window() {
        let dir = TempDir::new().unwrap();
        let storage = store(&dir);

        storage.save(&reading(now() - Duration::hours(1))).await;
        storage.save(&reading(now() - Duration::hours(48))).await;

        assert_eq!(storage.query_recent(24).await.len(), 1);
        assert_eq!(storage.query_recent(72).await.len(), 2);
    }

    #[tokio::test]
    async fn cleanup_removes_exactly_the_expired_rows_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = store(&dir);

        storage.save(&reading(now())).await;
        storage.save(&reading(now() - Duration::days(10))).await;
        storage.save(&reading(now() - Duration::days(20))).await;

        assert_eq!(storage.cleanup(7).await, 2);
        assert_eq!(storage.cleanup(7).await, 0);

        let rows = storage.query_recent(24 * 30).await;
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn save_query_cleanup_scenario() {
        let dir = TempDir::new().unwrap();
        let storage = store(&dir);

        let fixed = reading("2024-06-01T00:00:00".parse().unwrap());
        assert!(storage.save(&fixed).await);

        let rows = storage.query_recent(24 * 365 * 100).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reading, fixed);

        assert_eq!(storage.cleanup(0).await, 1);
        assert!(storage.query_recent(24 * 365 * 100).await.is_empty());
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped_on_read_and_kept_on_cleanup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("temperature.csv");
        let storage = CsvStorage::new(&path).unwrap();

        storage.save(&reading(now() - Duration::days(10))).await;

        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("not-a-date,D1,x,y,z,Hub2,1.0\n");
        fs::write(&path, raw).unwrap();

        // Unparseable row is invisible to queries but survives cleanup.
        assert_eq!(storage.query_recent(24 * 30).await.len(), 1);
        assert_eq!(storage.cleanup(7).await, 1);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("not-a-date"));
    }

    #[tokio::test]
    async fn cleanup_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("temperature.csv");
        let storage = CsvStorage::new(&path).unwrap();

        storage.save(&reading(now())).await;
        storage.cleanup(7).await;

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
