//! Per-sensor degree-day endpoints.
//!
//! - GET /api/v1/sensors/:serial/gdd?from=YYYY-MM-DD&to=YYYY-MM-DD
//! - GET /api/v1/sensors/:serial/gdd/series?from=YYYY-MM-DD
//! - GET /api/v1/sensors/:serial/cutting-date
//! - PUT /api/v1/sensors/:sensor_id/reset

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::AppState;
use crate::db::models::SensorWithReset;
use crate::db::queries;
use crate::errors::{AppError, ErrorResponse};
use crate::services::accumulation::{CumulativePoint, DisplayWindow};
use crate::services::projector::{CuttingTarget, ProjectionMode};

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct GddTotalQuery {
    /// First day included (defaults to the sensor's reset date)
    pub from: Option<NaiveDate>,
    /// Last day included (defaults to today)
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GddSeriesQuery {
    /// Accumulation start (defaults to the sensor's reset date)
    pub from: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct GddTotalResponse {
    pub serial_no: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Sum of degree-day units, measured values preferred over forecast
    pub total_gdd: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GddSeriesResponse {
    pub serial_no: String,
    pub from: NaiveDate,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub points: Vec<CumulativePoint>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CuttingDateResponse {
    pub serial_no: String,
    pub optimal_gdd: f64,
    pub reset_date: DateTime<Utc>,
    /// Crossing date from measured data only
    pub historical: Option<NaiveDate>,
    /// Crossing date with forecast filling unmeasured days
    pub forward: Option<NaiveDate>,
    /// Whether the target was already reached on measured data
    pub crossed: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetRequest {
    /// New accumulation start (defaults to now)
    pub reset_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResetResponse {
    pub sensor_id: Uuid,
    pub reset_at: DateTime<Utc>,
}

async fn sensor_or_404(state: &AppState, serial: &str) -> Result<SensorWithReset, AppError> {
    queries::get_sensor_by_serial(&state.pool, serial)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sensor {} not found", serial)))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Total degree days of a sensor over a date range.
///
/// An empty range (`to` before `from`) totals 0.
#[utoipa::path(
    get,
    path = "/api/v1/sensors/{serial}/gdd",
    tag = "Sensors",
    params(
        ("serial" = String, Path, description = "Sensor serial number"),
        GddTotalQuery,
    ),
    responses(
        (status = 200, description = "Accumulated degree days", body = GddTotalResponse),
        (status = 404, description = "Sensor not found", body = ErrorResponse),
        (status = 503, description = "Degree-day store unavailable", body = ErrorResponse),
    )
)]
pub async fn get_gdd_total(
    State(state): State<AppState>,
    Path(serial): Path<String>,
    Query(query): Query<GddTotalQuery>,
) -> Result<Json<GddTotalResponse>, AppError> {
    let sensor = sensor_or_404(&state, &serial).await?;
    let from = query.from.unwrap_or_else(|| sensor.reset_at.date_naive());
    let to = query.to.unwrap_or_else(|| Utc::now().date_naive());

    let total_gdd = state
        .engine
        .accumulation
        .total_since(&sensor.serial_no, from, to)
        .await?;

    Ok(Json(GddTotalResponse {
        serial_no: sensor.serial_no,
        from,
        to,
        total_gdd,
    }))
}

/// Cumulative degree-day series for the display window starting today.
#[utoipa::path(
    get,
    path = "/api/v1/sensors/{serial}/gdd/series",
    tag = "Sensors",
    params(
        ("serial" = String, Path, description = "Sensor serial number"),
        GddSeriesQuery,
    ),
    responses(
        (status = 200, description = "Cumulative series", body = GddSeriesResponse),
        (status = 404, description = "Sensor not found", body = ErrorResponse),
        (status = 503, description = "Degree-day store unavailable", body = ErrorResponse),
    )
)]
pub async fn get_gdd_series(
    State(state): State<AppState>,
    Path(serial): Path<String>,
    Query(query): Query<GddSeriesQuery>,
) -> Result<Json<GddSeriesResponse>, AppError> {
    let sensor = sensor_or_404(&state, &serial).await?;
    let from = query.from.unwrap_or_else(|| sensor.reset_at.date_naive());
    let window = DisplayWindow::starting(Utc::now().date_naive(), state.engine.horizon_days);

    let points = state
        .engine
        .accumulation
        .cumulative_series(&sensor.serial_no, from, window)
        .await?;

    Ok(Json(GddSeriesResponse {
        serial_no: sensor.serial_no,
        from,
        window_start: window.start,
        window_end: window.end,
        points,
    }))
}

/// Historical and forward cutting-date projections of a sensor.
#[utoipa::path(
    get,
    path = "/api/v1/sensors/{serial}/cutting-date",
    tag = "Sensors",
    params(
        ("serial" = String, Path, description = "Sensor serial number"),
    ),
    responses(
        (status = 200, description = "Projected cutting dates", body = CuttingDateResponse),
        (status = 404, description = "Sensor not found", body = ErrorResponse),
        (status = 503, description = "Degree-day store unavailable", body = ErrorResponse),
    )
)]
pub async fn get_cutting_date(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> Result<Json<CuttingDateResponse>, AppError> {
    let sensor = sensor_or_404(&state, &serial).await?;
    let target = CuttingTarget::from(&sensor);

    let historical = state
        .engine
        .projector
        .project(&target, ProjectionMode::Historical)
        .await?;
    let forward = state
        .engine
        .projector
        .project(&target, ProjectionMode::Forward)
        .await?;

    Ok(Json(CuttingDateResponse {
        serial_no: sensor.serial_no,
        optimal_gdd: sensor.optimal_gdd,
        reset_date: sensor.reset_at,
        crossed: historical.is_crossed(),
        historical: historical.date,
        forward: forward.date,
    }))
}

/// Set a sensor's reset date, starting a new accumulation cycle.
///
/// Stored projections refresh on the next poller cycle.
#[utoipa::path(
    put,
    path = "/api/v1/sensors/{sensor_id}/reset",
    tag = "Sensors",
    params(
        ("sensor_id" = Uuid, Path, description = "Sensor UUID"),
    ),
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Reset date stored", body = ResetResponse),
        (status = 404, description = "Sensor not found", body = ErrorResponse),
    )
)]
pub async fn reset_sensor(
    State(state): State<AppState>,
    Path(sensor_id): Path<Uuid>,
    Json(req): Json<ResetRequest>,
) -> Result<Json<ResetResponse>, AppError> {
    let reset_at = req.reset_at.unwrap_or_else(Utc::now);

    if !queries::record_sensor_reset(&state.pool, sensor_id, reset_at).await? {
        return Err(AppError::NotFound(format!("Sensor {} not found", sensor_id)));
    }

    tracing::info!("Sensor {} reset to {}", sensor_id, reset_at);
    Ok(Json(ResetResponse {
        sensor_id,
        reset_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_request_defaults() {
        let req: ResetRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(req.reset_at.is_none());

        let req: ResetRequest =
            serde_json::from_value(serde_json::json!({ "reset_at": "2024-06-10T00:00:00Z" }))
                .unwrap();
        assert_eq!(
            req.reset_at,
            Some("2024-06-10T00:00:00Z".parse::<DateTime<Utc>>().unwrap())
        );
    }

    #[test]
    fn test_cutting_date_response_serialization() {
        let resp = CuttingDateResponse {
            serial_no: "SN-001".to_string(),
            optimal_gdd: 500.0,
            reset_date: "2024-05-01T00:00:00Z".parse().unwrap(),
            historical: None,
            forward: NaiveDate::from_ymd_opt(2024, 6, 18),
            crossed: false,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["historical"], serde_json::Value::Null);
        assert_eq!(json["forward"], "2024-06-18");
        assert_eq!(json["crossed"], false);
    }
}
