use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

use crate::storage::StoredReading;

#[derive(Debug, Serialize, ToSchema)]
pub struct StoredReadingDto {
    /// Backend row id (absent for the CSV backend)
    pub id: Option<i64>,
    pub timestamp: NaiveDateTime,
    pub device_id: String,
    /// Degrees Celsius
    pub temperature: Option<f64>,
    /// Relative humidity percentage
    pub humidity: Option<f64>,
    pub light_level: Option<i64>,
    pub device_type: String,
    pub version: String,
    pub created_at: Option<NaiveDateTime>,
}

impl From<StoredReading> for StoredReadingDto {
    fn from(r: StoredReading) -> Self {
        Self {
            id: r.id,
            timestamp: r.reading.timestamp,
            device_id: r.reading.device_id,
            temperature: r.reading.temperature,
            humidity: r.reading.humidity,
            light_level: r.reading.light_level,
            device_type: r.reading.device_type,
            version: r.reading.version,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TriggerResponse {
    pub status: String,
    pub message: String,
}

impl TriggerResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_owned(),
            message: message.into(),
        }
    }
}
