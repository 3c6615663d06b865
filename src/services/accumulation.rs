//! Degree-day accumulation over stored per-day rows.
//!
//! Every accumulation path resolves a row's contribution through
//! [`resolve_units`], so the "actual wins, forecast is a fallback, missing
//! is skipped" rule lives in exactly one place.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::db::models::DegreeDayRecord;
use crate::db::store::TimeSeriesStore;
use crate::errors::StorageError;

/// Which stored values may contribute to an accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePolicy {
    /// Measured values only; forecast values are ignored even as a fallback.
    ActualOnly,
    /// Measured value when present, otherwise the forecast value.
    ActualThenForecast,
}

/// Degree-day units a row contributes under `policy`.
///
/// `None` means the row has no usable value: it is excluded from sums and
/// from threshold iteration, and is never treated as zero.
pub fn resolve_units(record: &DegreeDayRecord, policy: SourcePolicy) -> Option<f64> {
    match policy {
        SourcePolicy::ActualOnly => record.actual_value,
        SourcePolicy::ActualThenForecast => record.actual_value.or(record.forecast_value),
    }
}

/// One point of a cumulative degree-day series.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CumulativePoint {
    pub date: NaiveDate,
    pub cumulative_value: f64,
}

/// Inclusive range of dates emitted by [`cumulative_series`](AccumulationEngine::cumulative_series).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DisplayWindow {
    /// `[today, today + horizon_days]`.
    pub fn starting(today: NaiveDate, horizon_days: u32) -> Self {
        let end = today
            .checked_add_days(Days::new(u64::from(horizon_days)))
            .unwrap_or(NaiveDate::MAX);
        Self { start: today, end }
    }

    fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

/// Sort by day and drop duplicate days (first occurrence wins).
fn normalize(records: &[DegreeDayRecord]) -> Vec<&DegreeDayRecord> {
    let mut sorted: Vec<&DegreeDayRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.day);
    sorted.dedup_by_key(|r| r.day);
    sorted
}

/// Sum of resolved units. Empty input sums to `0.0`.
pub fn sum_units(records: &[DegreeDayRecord], policy: SourcePolicy) -> f64 {
    normalize(records)
        .into_iter()
        .filter_map(|r| resolve_units(r, policy))
        .sum()
}

/// Running total from `from` onwards, emitting only days inside `window`.
///
/// Days before the window still contribute to the total carried into it.
pub fn running_totals(
    records: &[DegreeDayRecord],
    from: NaiveDate,
    window: DisplayWindow,
    policy: SourcePolicy,
) -> Vec<CumulativePoint> {
    let mut total = 0.0;
    let mut points = Vec::new();
    for record in normalize(records).into_iter().filter(|r| r.day >= from) {
        if let Some(units) = resolve_units(record, policy) {
            total += units;
        }
        if window.contains(record.day) {
            points.push(CumulativePoint {
                date: record.day,
                cumulative_value: total,
            });
        }
    }
    points
}

/// First day (ascending) on which the running total reaches `threshold`.
pub fn first_crossing(
    records: &[DegreeDayRecord],
    threshold: f64,
    policy: SourcePolicy,
) -> Option<NaiveDate> {
    let mut total = 0.0;
    for record in normalize(records) {
        let Some(units) = resolve_units(record, policy) else {
            continue;
        };
        total += units;
        if total >= threshold {
            return Some(record.day);
        }
    }
    None
}

/// Store-backed accumulation queries for a single sensor at a time.
#[derive(Clone)]
pub struct AccumulationEngine {
    store: Arc<dyn TimeSeriesStore>,
}

impl AccumulationEngine {
    pub fn new(store: Arc<dyn TimeSeriesStore>) -> Self {
        Self { store }
    }

    /// Total units for days in `[from, to]`, actual preferred over forecast.
    pub async fn total_since(
        &self,
        sensor_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<f64, StorageError> {
        if to < from {
            return Ok(0.0);
        }
        let records = self.store.query_range(sensor_id, from, Some(to)).await?;
        let total = sum_units(&records, SourcePolicy::ActualThenForecast);
        tracing::debug!(
            "Total GDD for sensor {} over {}..={}: {} ({} rows)",
            sensor_id,
            from,
            to,
            total,
            records.len()
        );
        Ok(total)
    }

    /// Cumulative units from `from`, emitted for days inside `window` only.
    pub async fn cumulative_series(
        &self,
        sensor_id: &str,
        from: NaiveDate,
        window: DisplayWindow,
    ) -> Result<Vec<CumulativePoint>, StorageError> {
        if window.end < from {
            return Ok(Vec::new());
        }
        let records = self
            .store
            .query_range(sensor_id, from, Some(window.end))
            .await?;
        Ok(running_totals(
            &records,
            from,
            window,
            SourcePolicy::ActualThenForecast,
        ))
    }

    /// Day on which accumulation since `from` first reaches `threshold`, with
    /// forecast fallback. `None` means "not reached in the available data".
    pub async fn find_threshold_crossing(
        &self,
        sensor_id: &str,
        from: NaiveDate,
        threshold: f64,
    ) -> Result<Option<NaiveDate>, StorageError> {
        self.find_threshold_crossing_with(
            sensor_id,
            from,
            threshold,
            SourcePolicy::ActualThenForecast,
        )
        .await
    }

    /// Threshold search with an explicit source policy. No upper date bound.
    pub async fn find_threshold_crossing_with(
        &self,
        sensor_id: &str,
        from: NaiveDate,
        threshold: f64,
        policy: SourcePolicy,
    ) -> Result<Option<NaiveDate>, StorageError> {
        let records = self.store.query_range(sensor_id, from, None).await?;
        Ok(first_crossing(&records, threshold, policy))
    }
}
