pub mod farms;
pub mod fields;
pub mod health;
pub mod poller;
pub mod readings;
pub mod sensors;

use sqlx::PgPool;

use crate::services::GddEngine;

/// Shared application state for farm, field, sensor and ingestion endpoints.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) pool: PgPool,
    pub(crate) engine: GddEngine,
}
