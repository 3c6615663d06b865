//! Sensor reading ingestion.
//!
//! POST /api/v1/readings with a `text/plain` body of
//! `serial,YYYY-MM-DD HH:MM:SS,temperature` lines.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

use super::AppState;
use crate::db::queries;
use crate::errors::{AppError, ErrorResponse};
use crate::services::aggregator::TemperatureSample;
use crate::services::ingest::{decode_payload, store_readings, RejectedLine};

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    /// Samples written to the store
    pub accepted: usize,
    pub rejected: usize,
    pub rejected_lines: Vec<RejectedLine>,
}

/// Latest reading time per sensor serial.
fn latest_by_sensor(samples: &[TemperatureSample]) -> HashMap<&str, DateTime<Utc>> {
    let mut latest: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for s in samples {
        latest
            .entry(s.sensor_id.as_str())
            .and_modify(|t| *t = (*t).max(s.timestamp))
            .or_insert(s.timestamp);
    }
    latest
}

/// Ingest sensor readings.
///
/// Malformed lines are skipped and reported; the rest are stored as measured
/// air temperature. Degree days are recomputed by the poller.
#[utoipa::path(
    post,
    path = "/api/v1/readings",
    tag = "Readings",
    request_body(content = String, content_type = "text/plain",
        description = "One reading per line: serial,YYYY-MM-DD HH:MM:SS,temperature"),
    responses(
        (status = 200, description = "Readings ingested", body = IngestResponse),
        (status = 503, description = "Degree-day store unavailable", body = ErrorResponse),
    )
)]
pub async fn ingest_readings(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IngestResponse>, AppError> {
    let batch = decode_payload(&body);
    let accepted = store_readings(state.engine.store.as_ref(), &batch.samples).await?;

    for (serial, at) in latest_by_sensor(&batch.samples) {
        let updated = queries::touch_sensor_communication(&state.pool, serial, at).await?;
        if updated == 0 {
            tracing::debug!("Readings stored for unregistered sensor {}", serial);
        }
    }

    Ok(Json(IngestResponse {
        accepted,
        rejected: batch.rejected.len(),
        rejected_lines: batch.rejected,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_by_sensor() {
        let batch = decode_payload(
            b"SN-001,2024-06-01 18:00:00,14.0\n\
              SN-001,2024-06-01 06:00:00,10.0\n\
              SN-002,2024-06-02 00:30:00,8.5\n",
        );
        let latest = latest_by_sensor(&batch.samples);
        assert_eq!(latest.len(), 2);
        assert_eq!(
            latest["SN-001"],
            "2024-06-01T18:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            latest["SN-002"],
            "2024-06-02T00:30:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }
}
