use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", or "degraded" when Postgres (and with it the degree-day store) is unreachable
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: bool,
}

fn health_response(db_ok: bool) -> HealthResponse {
    HealthResponse {
        status: if db_ok { "ok" } else { "degraded" }.to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_ok,
    }
}

/// Health check endpoint.
///
/// Always 200; a failed `SELECT 1` reports "degraded".
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service status", body = HealthResponse),
    )
)]
pub async fn health_check(State(pool): State<PgPool>) -> Json<HealthResponse> {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&pool)
        .await
        .is_ok();
    if !db_ok {
        tracing::warn!("Health check: database unreachable");
    }
    Json(health_response(db_ok))
}
