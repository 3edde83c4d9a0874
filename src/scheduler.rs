use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::info;

use crate::mirror::MirrorSink;
use crate::retention::RetentionSweeper;
use crate::sensors::SensorService;
use crate::storage::StorageBackend;

/// Standalone loop mode: collection on every poll tick, retention sweep on
/// its own cadence, strictly sequential: never more than one job at a time.
///
/// The shutdown signal is only checked between ticks, so an in-flight job
/// (including its full retry sequence) always runs to completion.
pub struct Scheduler {
    service: Arc<SensorService>,
    storage: Arc<dyn StorageBackend>,
    mirror: Option<Arc<dyn MirrorSink>>,
    sweeper: RetentionSweeper,
    device_id: String,
    poll_interval: Duration,
    cleanup_interval: Duration,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service: Arc<SensorService>,
        storage: Arc<dyn StorageBackend>,
        mirror: Option<Arc<dyn MirrorSink>>,
        sweeper: RetentionSweeper,
        device_id: String,
        poll_interval: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            service,
            storage,
            mirror,
            sweeper,
            device_id,
            poll_interval,
            cleanup_interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut poll = time::interval(self.poll_interval);
        // The poll ticker fires immediately; the sweep waits a full period.
        let mut sweep = time::interval_at(
            time::Instant::now() + self.cleanup_interval,
            self.cleanup_interval,
        );

        info!(
            poll_secs = self.poll_interval.as_secs(),
            cleanup_secs = self.cleanup_interval.as_secs(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.service
                        .fetch_and_persist(
                            &self.device_id,
                            self.storage.as_ref(),
                            self.mirror.as_deref(),
                        )
                        .await;
                }
                _ = sweep.tick() => {
                    self.sweeper.sweep(self.storage.as_ref()).await;
                }
                _ = shutdown.changed() => {
                    info!("Shutdown requested; scheduler stopping");
                    break;
                }
            }
        }
    }
}
