use tracing::info;

use crate::storage::StorageBackend;

/// Thin orchestration around `StorageBackend::cleanup`: run the sweep for a
/// retention window and report the count.
pub struct RetentionSweeper {
    retention_days: i64,
}

impl RetentionSweeper {
    pub fn new(retention_days: i64) -> Self {
        Self { retention_days }
    }

    /// Returns the number of records removed. A backend failure reports 0;
    /// the backend logs its own cause.
    pub async fn sweep(&self, storage: &dyn StorageBackend) -> u64 {
        let deleted = storage.cleanup(self.retention_days).await;
        info!(
            retention_days = self.retention_days,
            deleted, "Retention sweep complete"
        );
        deleted
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::storage::{Reading, StoredReading};

    struct FakeBackend {
        last_retention: AtomicI64,
        deleted: u64,
    }

    #[async_trait]
    impl StorageBackend for FakeBackend {
        async fn save(&self, _reading: &Reading) -> bool {
            true
        }

        async fn query_recent(&self, _window_hours: i64) -> Vec<StoredReading> {
            Vec::new()
        }

        async fn cleanup(&self, retention_days: i64) -> u64 {
            self.last_retention.store(retention_days, Ordering::SeqCst);
            self.deleted
        }
    }

    #[tokio::test]
    async fn sweep_delegates_the_window_and_reports_the_count() {
        let backend = FakeBackend {
            last_retention: AtomicI64::new(-1),
            deleted: 7,
        };

        let sweeper = RetentionSweeper::new(30);
        assert_eq!(sweeper.sweep(&backend).await, 7);
        assert_eq!(backend.last_retention.load(Ordering::SeqCst), 30);
    }
}
