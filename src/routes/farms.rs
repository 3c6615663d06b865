//! Farm endpoints.
//!
//! - GET  /api/v1/farms
//! - POST /api/v1/farms
//! - GET  /api/v1/farms/dashboard

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::AppState;
use crate::db::models;
use crate::db::queries::{self, InsertFarmParams};
use crate::errors::{AppError, ErrorResponse};
use crate::services::dashboard::{build_farm_dashboards, FarmDashboard};

/// Response type for a farm.
#[derive(Debug, Serialize, ToSchema)]
pub struct FarmResponse {
    pub id: Uuid,
    pub name: String,
    pub postcode: String,
    pub city: String,
    pub country: String,
}

impl From<models::Farm> for FarmResponse {
    fn from(f: models::Farm) -> Self {
        Self {
            id: f.id,
            name: f.name,
            postcode: f.postcode,
            city: f.city,
            country: f.country,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFarmRequest {
    pub name: String,
    pub postcode: String,
    pub city: String,
    pub country: String,
}

fn validate_farm(req: &CreateFarmRequest) -> Result<(), AppError> {
    for (name, value) in [
        ("name", &req.name),
        ("postcode", &req.postcode),
        ("city", &req.city),
        ("country", &req.country),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("Farm {} must not be empty", name)));
        }
    }
    Ok(())
}

/// List all farms.
#[utoipa::path(
    get,
    path = "/api/v1/farms",
    tag = "Farms",
    responses(
        (status = 200, description = "List of all farms", body = Vec<FarmResponse>),
    )
)]
pub async fn list_farms(State(state): State<AppState>) -> Result<Json<Vec<FarmResponse>>, AppError> {
    let farms = queries::list_farms(&state.pool).await?;
    Ok(Json(farms.into_iter().map(FarmResponse::from).collect()))
}

/// Create a farm.
#[utoipa::path(
    post,
    path = "/api/v1/farms",
    tag = "Farms",
    request_body = CreateFarmRequest,
    responses(
        (status = 201, description = "Farm created", body = FarmResponse),
        (status = 400, description = "Invalid farm", body = ErrorResponse),
    )
)]
pub async fn create_farm(
    State(state): State<AppState>,
    Json(req): Json<CreateFarmRequest>,
) -> Result<(StatusCode, Json<FarmResponse>), AppError> {
    validate_farm(&req)?;
    let params = InsertFarmParams {
        name: req.name.trim().to_string(),
        postcode: req.postcode.trim().to_string(),
        city: req.city.trim().to_string(),
        country: req.country.trim().to_string(),
    };
    let farm = queries::insert_farm(&state.pool, params).await?;
    tracing::info!("Created farm '{}' ({})", farm.name, farm.id);
    Ok((StatusCode::CREATED, Json(FarmResponse::from(farm))))
}

/// Farm dashboard: per field, the mean current GDD of its sensors and the
/// earliest stored cutting date.
#[utoipa::path(
    get,
    path = "/api/v1/farms/dashboard",
    tag = "Farms",
    responses(
        (status = 200, description = "One dashboard per farm", body = Vec<FarmDashboard>),
        (status = 503, description = "Degree-day store unavailable", body = ErrorResponse),
    )
)]
pub async fn get_farm_dashboard(
    State(state): State<AppState>,
) -> Result<Json<Vec<FarmDashboard>>, AppError> {
    let farms = queries::list_farms(&state.pool).await?;
    let fields = queries::list_fields(&state.pool).await?;
    let sensors = queries::list_sensors(&state.pool).await?;

    let today = Utc::now().date_naive();
    let dashboards = build_farm_dashboards(&state.engine, &farms, &fields, &sensors, today).await?;
    Ok(Json(dashboards))
}
