use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};

use super::{
    dto::{StoredReadingDto, TriggerResponse},
    errors::AppError,
};
use crate::mirror::MirrorSink;
use crate::retention::RetentionSweeper;
use crate::sensors::SensorService;
use crate::storage::StorageBackend;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SensorService>,
    pub storage: Arc<dyn StorageBackend>,
    pub mirror: Option<Arc<dyn MirrorSink>>,
    pub device_id: String,
    pub retention_days: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RecentParams {
    /// Query window in hours (default 24)
    pub hours: Option<i64>,
}

/// All readings recorded within the requested window.
#[utoipa::path(
    get,
    path = "/readings/recent",
    params(RecentParams),
    responses(
        (status = 200, description = "Recent readings", body = Vec<StoredReadingDto>),
    ),
    tag = "readings"
)]
pub async fn get_recent_readings(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Json<Vec<StoredReadingDto>> {
    let rows = state.storage.query_recent(params.hours.unwrap_or(24)).await;
    Json(rows.into_iter().map(Into::into).collect())
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TriggerParams {
    /// One of `collect` (default), `cleanup`, `test`
    pub action: Option<String>,
}

/// Request-triggered entry point for external schedulers, dispatching on the
/// `action` parameter.
#[utoipa::path(
    post,
    path = "/trigger",
    params(TriggerParams),
    responses(
        (status = 200, description = "Action completed", body = TriggerResponse),
        (status = 400, description = "Unknown action"),
        (status = 500, description = "Action failed"),
    ),
    tag = "trigger"
)]
pub async fn trigger(
    State(state): State<AppState>,
    Query(params): Query<TriggerParams>,
) -> Result<Json<TriggerResponse>, AppError> {
    match params.action.as_deref().unwrap_or("collect") {
        "collect" => {
            state
                .service
                .fetch_and_persist(
                    &state.device_id,
                    state.storage.as_ref(),
                    state.mirror.as_deref(),
                )
                .await;
            Ok(Json(TriggerResponse::ok("temperature collection completed")))
        }
        "cleanup" => {
            let deleted = RetentionSweeper::new(state.retention_days)
                .sweep(state.storage.as_ref())
                .await;
            Ok(Json(TriggerResponse::ok(format!(
                "cleanup removed {deleted} records"
            ))))
        }
        "test" => {
            if state.service.test_connection(&state.device_id).await {
                Ok(Json(TriggerResponse::ok("API connection test succeeded")))
            } else {
                Err(AppError::failed("API connection test failed"))
            }
        }
        other => Err(AppError::bad_request(format!("unknown action: {other}"))),
    }
}

// ---------------------------------------------------------------------------
// OpenAPI doc struct (used in api/mod.rs)
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(get_recent_readings, trigger),
    components(schemas(StoredReadingDto, TriggerResponse)),
    tags(
        (name = "readings", description = "Stored sensor readings"),
        (name = "trigger", description = "Scheduler-triggered actions"),
    ),
    info(
        title = "SwitchBot Temperature Logger API",
        version = "0.1.0",
        description = "Trigger endpoint and reading queries for the temperature logger"
    )
)]
pub struct ApiDoc;
