//! Field and sensor registration endpoints, plus the field dashboard.
//!
//! - GET  /api/v1/fields
//! - POST /api/v1/fields
//! - POST /api/v1/fields/:field_id/sensors
//! - GET  /api/v1/fields/:field_id/dashboard

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::AppState;
use crate::db::queries::{self, InsertSensorParams};
use crate::db::models;
use crate::errors::{AppError, ErrorResponse};
use crate::helpers::{dec_to_f64, f64_to_decimal_full};
use crate::services::dashboard::{build_field_dashboard, FieldDashboard};

/// Response type for a field.
#[derive(Debug, Serialize, ToSchema)]
pub struct FieldResponse {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub name: String,
    /// Altitude in metres above sea level
    pub altitude_m: f64,
    /// Field outline (GeoJSON or WKT, stored as given)
    pub polygon: Option<String>,
}

impl From<models::Field> for FieldResponse {
    fn from(f: models::Field) -> Self {
        Self {
            id: f.id,
            farm_id: f.farm_id,
            name: f.name,
            altitude_m: dec_to_f64(f.altitude_m),
            polygon: f.polygon,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFieldRequest {
    /// Farm the field belongs to
    pub farm_id: Uuid,
    pub name: String,
    pub altitude_m: f64,
    pub polygon: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSensorRequest {
    /// Serial number the sensor reports readings under
    pub serial_no: String,
    /// Degree days to accumulate before cutting
    pub optimal_gdd: f64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Response type for a registered sensor.
#[derive(Debug, Serialize, ToSchema)]
pub struct SensorResponse {
    pub id: Uuid,
    pub field_id: Uuid,
    pub serial_no: String,
    pub optimal_gdd: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub state: String,
}

impl From<models::Sensor> for SensorResponse {
    fn from(s: models::Sensor) -> Self {
        Self {
            id: s.id,
            field_id: s.field_id,
            serial_no: s.serial_no,
            optimal_gdd: s.optimal_gdd,
            latitude: dec_to_f64(s.latitude),
            longitude: dec_to_f64(s.longitude),
            state: s.state,
        }
    }
}

fn validate_field(req: &CreateFieldRequest) -> Result<(), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("Field name must not be empty".to_string()));
    }
    if !req.altitude_m.is_finite() {
        return Err(AppError::BadRequest("altitude_m must be a finite number".to_string()));
    }
    Ok(())
}

fn validate_sensor(req: &CreateSensorRequest) -> Result<(), AppError> {
    if req.serial_no.trim().is_empty() {
        return Err(AppError::BadRequest("serial_no must not be empty".to_string()));
    }
    if !req.optimal_gdd.is_finite() || req.optimal_gdd <= 0.0 {
        return Err(AppError::BadRequest(format!(
            "optimal_gdd must be a positive number, got {}",
            req.optimal_gdd
        )));
    }
    if !(-90.0..=90.0).contains(&req.latitude) || !(-180.0..=180.0).contains(&req.longitude) {
        return Err(AppError::BadRequest(format!(
            "Coordinates out of range: ({}, {})",
            req.latitude, req.longitude
        )));
    }
    Ok(())
}

/// List all fields.
#[utoipa::path(
    get,
    path = "/api/v1/fields",
    tag = "Fields",
    responses(
        (status = 200, description = "List of all fields", body = Vec<FieldResponse>),
    )
)]
pub async fn list_fields(State(state): State<AppState>) -> Result<Json<Vec<FieldResponse>>, AppError> {
    let fields = queries::list_fields(&state.pool).await?;
    Ok(Json(fields.into_iter().map(FieldResponse::from).collect()))
}

/// Create a field.
#[utoipa::path(
    post,
    path = "/api/v1/fields",
    tag = "Fields",
    request_body = CreateFieldRequest,
    responses(
        (status = 201, description = "Field created", body = FieldResponse),
        (status = 400, description = "Invalid field", body = ErrorResponse),
        (status = 404, description = "Farm not found", body = ErrorResponse),
    )
)]
pub async fn create_field(
    State(state): State<AppState>,
    Json(req): Json<CreateFieldRequest>,
) -> Result<(StatusCode, Json<FieldResponse>), AppError> {
    validate_field(&req)?;
    if !queries::farm_exists(&state.pool, req.farm_id).await? {
        return Err(AppError::NotFound(format!("Farm {} not found", req.farm_id)));
    }
    let field = queries::insert_field(
        &state.pool,
        req.farm_id,
        req.name.trim(),
        f64_to_decimal_full(req.altitude_m),
        req.polygon.as_deref(),
    )
    .await?;
    tracing::info!(
        "Created field '{}' ({}) on farm {}",
        field.name,
        field.id,
        field.farm_id
    );
    Ok((StatusCode::CREATED, Json(FieldResponse::from(field))))
}

/// Register a sensor in a field.
#[utoipa::path(
    post,
    path = "/api/v1/fields/{field_id}/sensors",
    tag = "Fields",
    params(
        ("field_id" = Uuid, Path, description = "Field UUID"),
    ),
    request_body = CreateSensorRequest,
    responses(
        (status = 201, description = "Sensor registered", body = SensorResponse),
        (status = 400, description = "Invalid sensor or serial already registered", body = ErrorResponse),
        (status = 404, description = "Field not found", body = ErrorResponse),
    )
)]
pub async fn create_sensor(
    State(state): State<AppState>,
    Path(field_id): Path<Uuid>,
    Json(req): Json<CreateSensorRequest>,
) -> Result<(StatusCode, Json<SensorResponse>), AppError> {
    validate_sensor(&req)?;
    queries::get_field(&state.pool, field_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Field {} not found", field_id)))?;

    let params = InsertSensorParams {
        field_id,
        serial_no: req.serial_no.trim().to_string(),
        optimal_gdd: req.optimal_gdd,
        latitude: f64_to_decimal_full(req.latitude),
        longitude: f64_to_decimal_full(req.longitude),
    };

    let sensor = match queries::insert_sensor(&state.pool, params).await {
        Ok(s) => s,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::BadRequest(format!(
                "Sensor serial '{}' is already registered",
                req.serial_no.trim()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        "Registered sensor {} in field {} (optimal GDD {})",
        sensor.serial_no,
        field_id,
        sensor.optimal_gdd
    );
    Ok((StatusCode::CREATED, Json(SensorResponse::from(sensor))))
}

/// Field dashboard: current GDD, cutting dates, sensors and seven-day charts.
#[utoipa::path(
    get,
    path = "/api/v1/fields/{field_id}/dashboard",
    tag = "Fields",
    params(
        ("field_id" = Uuid, Path, description = "Field UUID"),
    ),
    responses(
        (status = 200, description = "Field dashboard", body = FieldDashboard),
        (status = 404, description = "Field not found", body = ErrorResponse),
        (status = 503, description = "Degree-day store unavailable", body = ErrorResponse),
    )
)]
pub async fn get_field_dashboard(
    State(state): State<AppState>,
    Path(field_id): Path<Uuid>,
) -> Result<Json<FieldDashboard>, AppError> {
    let field = queries::get_field(&state.pool, field_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Field {} not found", field_id)))?;
    let sensors = queries::get_sensors_for_field(&state.pool, field_id).await?;

    let today = Utc::now().date_naive();
    let dashboard = build_field_dashboard(&state.engine, &field, &sensors, today).await?;
    Ok(Json(dashboard))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor_req(serial: &str, optimal_gdd: f64, lat: f64, lon: f64) -> CreateSensorRequest {
        CreateSensorRequest {
            serial_no: serial.to_string(),
            optimal_gdd,
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn test_validate_field() {
        let ok = CreateFieldRequest {
            farm_id: Uuid::new_v4(),
            name: "North meadow".to_string(),
            altitude_m: 450.0,
            polygon: None,
        };
        assert!(validate_field(&ok).is_ok());

        let blank = CreateFieldRequest {
            farm_id: Uuid::new_v4(),
            name: "  ".to_string(),
            altitude_m: 450.0,
            polygon: None,
        };
        assert!(matches!(validate_field(&blank), Err(AppError::BadRequest(_))));

        let nan = CreateFieldRequest {
            farm_id: Uuid::new_v4(),
            name: "x".to_string(),
            altitude_m: f64::NAN,
            polygon: None,
        };
        assert!(matches!(validate_field(&nan), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_validate_sensor() {
        assert!(validate_sensor(&sensor_req("SN-001", 500.0, 59.9, 10.7)).is_ok());
        assert!(validate_sensor(&sensor_req("", 500.0, 59.9, 10.7)).is_err());
        assert!(validate_sensor(&sensor_req("SN-001", 0.0, 59.9, 10.7)).is_err());
        assert!(validate_sensor(&sensor_req("SN-001", f64::INFINITY, 59.9, 10.7)).is_err());
        assert!(validate_sensor(&sensor_req("SN-001", 500.0, 91.0, 10.7)).is_err());
        assert!(validate_sensor(&sensor_req("SN-001", 500.0, 59.9, -181.0)).is_err());
    }

    #[test]
    fn test_field_response_from_model() {
        let farm_id = Uuid::new_v4();
        let field = models::Field {
            id: Uuid::new_v4(),
            farm_id,
            name: "South slope".to_string(),
            altitude_m: rust_decimal::Decimal::new(12345, 1),
            polygon: Some("POLYGON((0 0,1 0,1 1,0 0))".to_string()),
        };
        let resp = FieldResponse::from(field);
        assert_eq!(resp.farm_id, farm_id);
        assert_eq!(resp.altitude_m, 1234.5);
        assert!(resp.polygon.is_some());
    }
}
