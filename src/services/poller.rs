//! Background poller for forecast ingestion and cutting-date projection.
//!
//! Every cycle, for each active sensor:
//! - fetches the api.met.no compact forecast for the sensor's coordinates
//!   (conditional on the previous `Last-Modified`)
//! - stores air-temperature and relative-humidity forecast samples
//! - recomputes actual and forecast degree days since the sensor's reset date
//! - projects the forward cutting date and persists it on the sensor row
//!
//! A failed forecast fetch still recomputes degree days from what is stored,
//! so newly ingested readings are picked up. State is in-memory
//! (`Arc<RwLock<PollerState>>`); conditional-request headers are lost on restart.

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::SensorWithReset;
use crate::db::queries;
use crate::helpers::dec_to_f64;
use crate::services::aggregator::{Measurement, SampleSource};
use crate::services::met::{forecast_samples, parse_forecast_points, MetClient, MetFetchResult};
use crate::services::projector::{CuttingTarget, ProjectionMode};
use crate::services::GddEngine;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Sleep after a failed sensor listing before trying again (seconds).
const POLLER_ERROR_SLEEP_SECS: u64 = 60;

/// Lower bound on the configured interval (seconds).
const POLLER_MIN_SLEEP_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Poller state (in-memory, shared via Arc<RwLock<>>)
// ---------------------------------------------------------------------------

/// Status of a single sensor's last poll.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SensorPollStatus {
    pub sensor_id: Uuid,
    pub serial_no: String,
    pub last_polled_at: DateTime<Utc>,
    /// "new_data", "not_modified", or "error: ..." for the forecast fetch
    pub last_poll_result: String,
    pub forecast_samples_stored: usize,
    pub degree_days_written: usize,
    /// Forward projection after this poll (None while below target)
    pub cutting_date: Option<chrono::NaiveDate>,
    /// Set when the recompute or projection failed
    pub error: Option<String>,
}

/// Global poller state, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollerState {
    pub active: bool,
    pub next_wakeup_at: Option<DateTime<Utc>>,
    pub last_poll_completed_at: Option<DateTime<Utc>>,
    pub last_poll_duration_ms: Option<u64>,
    pub total_polls: u64,
    pub sensors: Vec<SensorPollStatus>,
}

impl PollerState {
    pub fn new() -> Self {
        Self {
            active: true,
            next_wakeup_at: None,
            last_poll_completed_at: None,
            last_poll_duration_ms: None,
            total_polls: 0,
            sensors: Vec::new(),
        }
    }
}

/// Shared poller state handle.
pub type SharedPollerState = Arc<RwLock<PollerState>>;

/// Everything a poll cycle needs.
#[derive(Clone)]
pub struct PollerContext {
    pub pool: PgPool,
    pub met_client: MetClient,
    pub engine: GddEngine,
    pub state: SharedPollerState,
    pub interval_secs: u64,
    /// Sensors polled in parallel
    pub concurrency: usize,
}

// ---------------------------------------------------------------------------
// Main poller loop
// ---------------------------------------------------------------------------

/// Run the background poller. This function never returns (runs until process exit).
///
/// Should be spawned via `tokio::spawn(run_poller(...))`.
pub async fn run_poller(ctx: PollerContext) {
    tracing::info!(
        "Background poller started (interval {}s, concurrency {})",
        ctx.interval_secs,
        ctx.concurrency
    );

    let mut last_modified: HashMap<Uuid, String> = HashMap::new();
    let interval = ctx.interval_secs.max(POLLER_MIN_SLEEP_SECS);

    loop {
        let poll_start = Utc::now();

        let sensors = match queries::list_active_sensors(&ctx.pool).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Poller: failed to list active sensors: {}", e);
                sleep_secs(POLLER_ERROR_SLEEP_SECS).await;
                continue;
            }
        };

        if sensors.is_empty() {
            tracing::debug!("Poller: no active sensors, sleeping {} seconds", interval);
        }

        // Owned per-sensor futures keep the spawned poller future `Send`.
        let mut polls = Vec::with_capacity(sensors.len());
        for sensor in sensors {
            let if_modified_since = last_modified.get(&sensor.id).cloned();
            let ctx = ctx.clone();
            polls.push(async move {
                poll_single_sensor(&ctx, &sensor, if_modified_since, Utc::now()).await
            });
        }

        let outcomes: Vec<(SensorPollStatus, Option<String>)> = stream::iter(polls)
            .buffer_unordered(ctx.concurrency.max(1))
            .collect()
            .await;

        let mut statuses = Vec::with_capacity(outcomes.len());
        for (status, new_last_modified) in outcomes {
            if let Some(lm) = new_last_modified {
                last_modified.insert(status.sensor_id, lm);
            }
            statuses.push(status);
        }
        statuses.sort_by(|a, b| a.serial_no.cmp(&b.serial_no));

        finalize_poll_cycle(&ctx.state, statuses, poll_start, interval).await;
        sleep_secs(interval).await;
    }
}

/// Update the shared state at the end of a cycle.
async fn finalize_poll_cycle(
    state: &SharedPollerState,
    statuses: Vec<SensorPollStatus>,
    poll_start: DateTime<Utc>,
    sleep_duration: u64,
) {
    let poll_duration_ms = (Utc::now() - poll_start).num_milliseconds().max(0) as u64;
    let errors = statuses.iter().filter(|s| s.error.is_some()).count();

    {
        let mut s = state.write().await;
        s.sensors = statuses;
        s.next_wakeup_at = Some(Utc::now() + Duration::seconds(sleep_duration as i64));
        s.last_poll_completed_at = Some(Utc::now());
        s.last_poll_duration_ms = Some(poll_duration_ms);
        s.total_polls += 1;
    }

    tracing::info!(
        "Poller: cycle complete in {}ms ({} sensor errors), sleeping {}s",
        poll_duration_ms,
        errors,
        sleep_duration,
    );
}

// ---------------------------------------------------------------------------
// Single-sensor poll
// ---------------------------------------------------------------------------

/// Outcome of the forecast fetch step.
enum FetchOutcome {
    NewData {
        samples_stored: usize,
        last_modified: Option<String>,
    },
    NotModified,
    Error(String),
}

/// Poll one sensor. Returns its status and the `Last-Modified` value to
/// send next time, if a new one was received.
async fn poll_single_sensor(
    ctx: &PollerContext,
    sensor: &SensorWithReset,
    if_modified_since: Option<String>,
    now: DateTime<Utc>,
) -> (SensorPollStatus, Option<String>) {
    let outcome = fetch_and_store_forecast(ctx, sensor, if_modified_since.as_deref()).await;

    let (samples_stored, new_last_modified) = match &outcome {
        FetchOutcome::NewData {
            samples_stored,
            last_modified,
        } => (*samples_stored, last_modified.clone()),
        _ => (0, None),
    };

    let recompute = recompute_sensor(ctx, sensor, now).await;
    let status = build_poll_status(sensor, &outcome, samples_stored, recompute, now);
    (status, new_last_modified)
}

/// Fetch the forecast for a sensor and store its samples.
async fn fetch_and_store_forecast(
    ctx: &PollerContext,
    sensor: &SensorWithReset,
    if_modified_since: Option<&str>,
) -> FetchOutcome {
    let lat = dec_to_f64(sensor.latitude);
    let lon = dec_to_f64(sensor.longitude);

    let (raw_json, last_modified) = match ctx
        .met_client
        .fetch_compact(lat, lon, if_modified_since)
        .await
    {
        Ok(MetFetchResult::NewData {
            raw_json,
            last_modified,
        }) => (raw_json, last_modified),
        Ok(MetFetchResult::NotModified) => return FetchOutcome::NotModified,
        Err(e) => {
            tracing::warn!(
                "Poller: forecast fetch failed for sensor {}: {}",
                sensor.serial_no,
                e
            );
            return FetchOutcome::Error(e.to_string());
        }
    };

    let points = match parse_forecast_points(&raw_json) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(
                "Poller: bad forecast for sensor {}: {}",
                sensor.serial_no,
                e
            );
            return FetchOutcome::Error(e.to_string());
        }
    };

    let mut samples_stored = 0;
    for measurement in [Measurement::AirTemperature, Measurement::RelativeHumidity] {
        let samples = forecast_samples(&sensor.serial_no, &points, measurement);
        match ctx.engine.store.store_samples(measurement, &samples).await {
            Ok(n) => samples_stored += n,
            Err(e) => {
                tracing::warn!(
                    "Poller: failed to store {} forecast for sensor {}: {}",
                    measurement.as_str(),
                    sensor.serial_no,
                    e
                );
                return FetchOutcome::Error(e.to_string());
            }
        }
    }

    tracing::debug!(
        "Poller: sensor {}: {} forecast points, {} samples stored",
        sensor.serial_no,
        points.len(),
        samples_stored
    );

    FetchOutcome::NewData {
        samples_stored,
        last_modified,
    }
}

/// Result of the degree-day recompute and projection for one sensor.
struct RecomputeResult {
    degree_days_written: usize,
    cutting_date: Option<chrono::NaiveDate>,
}

/// Recompute degree days since the reset date, project forward, and persist
/// the projected cutting date.
async fn recompute_sensor(
    ctx: &PollerContext,
    sensor: &SensorWithReset,
    now: DateTime<Utc>,
) -> Result<RecomputeResult, String> {
    let since = Some(sensor.reset_at.date_naive());
    let calculator = &ctx.engine.calculator;

    let mut written = 0;
    for source in [SampleSource::Actual, SampleSource::Forecast] {
        written += calculator
            .refresh(&sensor.serial_no, source, since)
            .await
            .map_err(|e| e.to_string())?;
    }

    let projection = ctx
        .engine
        .projector
        .project(&CuttingTarget::from(sensor), ProjectionMode::Forward)
        .await
        .map_err(|e| e.to_string())?;

    queries::update_sensor_cutting_date(&ctx.pool, sensor.id, projection.date, now)
        .await
        .map_err(|e| format!("Failed to store cutting date: {}", e))?;

    Ok(RecomputeResult {
        degree_days_written: written,
        cutting_date: projection.date,
    })
}

/// Combine the fetch outcome and recompute result into a status entry.
fn build_poll_status(
    sensor: &SensorWithReset,
    outcome: &FetchOutcome,
    samples_stored: usize,
    recompute: Result<RecomputeResult, String>,
    now: DateTime<Utc>,
) -> SensorPollStatus {
    let last_poll_result = match outcome {
        FetchOutcome::NewData { .. } => "new_data".to_string(),
        FetchOutcome::NotModified => "not_modified".to_string(),
        FetchOutcome::Error(msg) => format!("error: {}", msg),
    };

    let (degree_days_written, cutting_date, error) = match recompute {
        Ok(r) => (r.degree_days_written, r.cutting_date, None),
        Err(e) => {
            tracing::warn!(
                "Poller: recompute failed for sensor {}: {}",
                sensor.serial_no,
                e
            );
            (0, sensor.cutting_date_calculated, Some(e))
        }
    };

    SensorPollStatus {
        sensor_id: sensor.id,
        serial_no: sensor.serial_no.clone(),
        last_polled_at: now,
        last_poll_result,
        forecast_samples_stored: samples_stored,
        degree_days_written,
        cutting_date,
        error,
    }
}

/// Async sleep helper.
async fn sleep_secs(secs: u64) {
    tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
