use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use tracing::{error, info, warn};

use crate::mirror::MirrorSink;
use crate::storage::{Reading, StorageBackend};
use crate::switchbot::models::DeviceStatus;
use crate::switchbot::SwitchBotClient;

pub struct SensorService {
    client: SwitchBotClient,
}

impl SensorService {
    pub fn new(client: SwitchBotClient) -> Self {
        Self { client }
    }

    /// Fetches the current hub status and normalises it into a `Reading`
    /// stamped with the fetch time (the protocol carries no device-side
    /// timestamp).
    ///
    /// `Ok(None)` is a legitimate no-data outcome (device registered but not
    /// reporting), distinct from `Err`, which is an operational failure the
    /// caller should log loudly.
    pub async fn get_temperature_data(&self, device_id: &str) -> Result<Option<Reading>> {
        let Some(status) = self.client.get_device_status(device_id).await? else {
            return Ok(None);
        };
        Ok(Some(normalize(device_id, status, Local::now().naive_local())))
    }

    /// Diagnostic check: true iff a full fetch succeeds and returns data.
    /// Any failure downgrades to `false` rather than propagating.
    pub async fn test_connection(&self, device_id: &str) -> bool {
        match self.get_temperature_data(device_id).await {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                error!(device_id, error = %e, "Connection test failed");
                false
            }
        }
    }

    /// One full collection pass: fetch, persist, then best-effort mirror.
    /// Fetch and save failures are logged but never abort the caller; mirror
    /// failures never affect the primary outcome.
    pub async fn fetch_and_persist(
        &self,
        device_id: &str,
        storage: &dyn StorageBackend,
        mirror: Option<&dyn MirrorSink>,
    ) {
        let reading = match self.get_temperature_data(device_id).await {
            Ok(Some(reading)) => reading,
            Ok(None) => {
                error!(device_id, "No temperature data returned by device");
                return;
            }
            Err(e) => {
                error!(device_id, error = %e, "Failed to fetch temperature data");
                return;
            }
        };

        if !storage.save(&reading).await {
            error!(device_id, "Failed to persist reading");
            return;
        }

        info!(
            temperature = ?reading.temperature,
            humidity = ?reading.humidity,
            light_level = ?reading.light_level,
            "Reading persisted"
        );

        if let Some(mirror) = mirror {
            match mirror.append(&reading).await {
                Ok(()) => info!("Reading mirrored to spreadsheet"),
                Err(e) => warn!(error = %e, "Spreadsheet mirror failed (ignored)"),
            }
        }
    }
}

fn normalize(device_id: &str, status: DeviceStatus, timestamp: NaiveDateTime) -> Reading {
    Reading {
        timestamp,
        device_id: device_id.to_owned(),
        temperature: status.temperature,
        humidity: status.humidity,
        light_level: status.light_level,
        device_type: status.device_type.unwrap_or_else(|| "Unknown".to_owned()),
        version: status.version.unwrap_or_else(|| "Unknown".to_owned()),
    }
}
