//! Poller status HTTP endpoint.
//!
//! GET /api/v1/poller/status returns the state of the background forecast
//! poller as JSON.

use axum::extract::State;
use axum::Json;

use crate::services::poller::{PollerState, SharedPollerState};

/// Get the current poller status.
///
/// Returns per-sensor results of the last cycle (forecast fetch outcome,
/// degree days written, projected cutting date, recompute error) and global
/// info (next_wakeup_at, last_poll_completed_at, total_polls).
#[utoipa::path(
    get,
    path = "/api/v1/poller/status",
    tag = "Poller",
    responses(
        (status = 200, description = "Current poller status", body = PollerState),
    )
)]
pub async fn get_poller_status(State(state): State<SharedPollerState>) -> Json<PollerState> {
    let s = state.read().await;
    Json(s.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn test_get_poller_status_snapshot() {
        let state: SharedPollerState = Arc::new(RwLock::new(PollerState::new()));
        state.write().await.total_polls = 3;

        let Json(status) = get_poller_status(State(state)).await;
        assert_eq!(status.total_polls, 3);
        assert!(status.active);
    }
}
