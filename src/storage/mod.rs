pub mod csv;
mod models;
pub mod sqlite;

pub use models::{Reading, StoredReading};

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;

use self::csv::CsvStorage;
use self::sqlite::SqliteStorage;

/// Persistence contract shared by both backends. None of the three
/// operations propagates I/O errors to the caller: failures are logged at
/// the backend boundary and downgraded to `false` / empty / `0`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist one reading.
    async fn save(&self, reading: &Reading) -> bool;

    /// All records with `timestamp >= now - window_hours`. Most-recent-first
    /// for the SQLite backend; file order for CSV.
    async fn query_recent(&self, window_hours: i64) -> Vec<StoredReading>;

    /// Delete records with `timestamp < now - retention_days`, returning the
    /// number removed.
    async fn cleanup(&self, retention_days: i64) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Csv,
    Sqlite,
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported storage backend: {0:?} (expected \"csv\" or \"sqlite\")")]
pub struct UnsupportedBackend(String);

impl FromStr for StorageKind {
    type Err = UnsupportedBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(UnsupportedBackend(s.to_owned())),
        }
    }
}

/// Select and initialise a backend by configuration name (case-insensitive).
///
/// The kind is validated before any filesystem access, so an unrecognised
/// name fails without creating files or tables.
pub async fn create_storage(kind: &str, path: &Path) -> Result<Box<dyn StorageBackend>> {
    match kind.parse::<StorageKind>()? {
        StorageKind::Csv => Ok(Box::new(CsvStorage::new(path)?)),
        StorageKind::Sqlite => Ok(Box::new(SqliteStorage::new(path).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("csv".parse::<StorageKind>().unwrap(), StorageKind::Csv);
        assert_eq!("CSV".parse::<StorageKind>().unwrap(), StorageKind::Csv);
        assert_eq!("SQLite".parse::<StorageKind>().unwrap(), StorageKind::Sqlite);
        assert_eq!("sqlite".parse::<StorageKind>().unwrap(), StorageKind::Sqlite);
        assert!("postgres".parse::<StorageKind>().is_err());
    }

    #[tokio::test]
    async fn unknown_kind_is_a_configuration_error_with_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let Err(err) = create_storage("bogus", &path).await else {
            panic!("expected a configuration error");
        };
        assert!(err.downcast_ref::<UnsupportedBackend>().is_some());
        assert!(!path.exists(), "factory must not create files for bad kinds");
    }

    #[tokio::test]
    async fn factory_builds_both_backends() {
        let dir = tempfile::tempdir().unwrap();

        let csv = create_storage("csv", &dir.path().join("t.csv")).await;
        assert!(csv.is_ok());

        let sqlite = create_storage("sqlite", &dir.path().join("t.db")).await;
        assert!(sqlite.is_ok());
    }
}
