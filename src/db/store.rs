//! Time-series store for raw samples and per-day degree-day rows.
//!
//! The degree-day engine only talks to the `TimeSeriesStore` trait. The
//! Postgres implementation is constructed once at startup and shared via
//! `Arc<dyn TimeSeriesStore>`; tests use the in-memory store below.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;

use super::models::{DegreeDayField, DegreeDayRecord};
use crate::errors::StorageError;
use crate::services::aggregator::{Measurement, SampleSource, TemperatureSample};

/// Rows per multi-row INSERT (keeps well below Postgres' bind parameter limit).
const SAMPLE_INSERT_CHUNK: usize = 1000;

/// Inclusive calendar-day bounds for sample queries. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from.map_or(true, |f| day >= f) && self.to.map_or(true, |t| day <= t)
    }
}

#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Upsert samples under `measurement`. Returns the number of distinct samples written.
    async fn store_samples(
        &self,
        measurement: Measurement,
        samples: &[TemperatureSample],
    ) -> Result<usize, StorageError>;

    /// Samples of one sensor, measurement and source whose calendar day is in `range`.
    async fn load_samples(
        &self,
        sensor_id: &str,
        measurement: Measurement,
        source: SampleSource,
        range: DateRange,
    ) -> Result<Vec<TemperatureSample>, StorageError>;

    /// Write one column of the degree-day row `(sensor_id, day)`, creating the
    /// row if needed and leaving the other column untouched.
    async fn upsert_degree_day(
        &self,
        sensor_id: &str,
        day: NaiveDate,
        field: DegreeDayField,
        value: f64,
    ) -> Result<(), StorageError>;

    /// Degree-day rows with `day >= from` (and `day <= to` when given), sorted by day.
    async fn query_range(
        &self,
        sensor_id: &str,
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DegreeDayRecord>, StorageError>;
}

/// Keep the last sample for each `(sensor, timestamp, source)`; a single
/// Postgres upsert statement cannot touch the same row twice.
fn dedup_samples(samples: &[TemperatureSample]) -> Vec<&TemperatureSample> {
    let mut index: HashMap<(&str, DateTime<Utc>, SampleSource), usize> = HashMap::new();
    let mut out: Vec<&TemperatureSample> = Vec::with_capacity(samples.len());
    for s in samples {
        let key = (s.sensor_id.as_str(), s.timestamp, s.source);
        match index.get(&key) {
            Some(&i) => out[i] = s,
            None => {
                index.insert(key, out.len());
                out.push(s);
            }
        }
    }
    out
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(day.and_time(NaiveTime::MIN), Utc)
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// `TimeSeriesStore` backed by the `weather_samples` and `degree_days` tables.
#[derive(Debug, Clone)]
pub struct PgTimeSeriesStore {
    pool: PgPool,
}

impl PgTimeSeriesStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SampleRow {
    observed_at: DateTime<Utc>,
    value: f64,
}

#[async_trait]
impl TimeSeriesStore for PgTimeSeriesStore {
    async fn store_samples(
        &self,
        measurement: Measurement,
        samples: &[TemperatureSample],
    ) -> Result<usize, StorageError> {
        let unique = dedup_samples(samples);
        if unique.is_empty() {
            return Ok(0);
        }

        for chunk in unique.chunks(SAMPLE_INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO weather_samples (sensor_serial, source, measurement, observed_at, value) ",
            );
            qb.push_values(chunk, |mut b, s| {
                b.push_bind(s.sensor_id.clone())
                    .push_bind(s.source.as_str())
                    .push_bind(measurement.as_str())
                    .push_bind(s.timestamp)
                    .push_bind(s.value);
            });
            qb.push(
                " ON CONFLICT (sensor_serial, source, measurement, observed_at) \
                 DO UPDATE SET value = EXCLUDED.value",
            );
            qb.build().execute(&self.pool).await?;
        }

        Ok(unique.len())
    }

    async fn load_samples(
        &self,
        sensor_id: &str,
        measurement: Measurement,
        source: SampleSource,
        range: DateRange,
    ) -> Result<Vec<TemperatureSample>, StorageError> {
        let lower = range.from.map(start_of_day);
        // Exclusive upper bound: midnight after the last included day.
        let upper = range
            .to
            .and_then(|t| t.checked_add_days(Days::new(1)))
            .map(start_of_day);

        let rows = sqlx::query_as::<_, SampleRow>(
            "SELECT observed_at, value
             FROM weather_samples
             WHERE sensor_serial = $1
               AND source = $2
               AND measurement = $3
               AND ($4::timestamptz IS NULL OR observed_at >= $4)
               AND ($5::timestamptz IS NULL OR observed_at < $5)
             ORDER BY observed_at",
        )
        .bind(sensor_id)
        .bind(source.as_str())
        .bind(measurement.as_str())
        .bind(lower)
        .bind(upper)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TemperatureSample {
                sensor_id: sensor_id.to_string(),
                timestamp: r.observed_at,
                value: r.value,
                source,
            })
            .collect())
    }

    async fn upsert_degree_day(
        &self,
        sensor_id: &str,
        day: NaiveDate,
        field: DegreeDayField,
        value: f64,
    ) -> Result<(), StorageError> {
        let sql = match field {
            DegreeDayField::Actual => {
                "INSERT INTO degree_days (sensor_serial, day, actual_value)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (sensor_serial, day)
                 DO UPDATE SET actual_value = EXCLUDED.actual_value, updated_at = NOW()"
            }
            DegreeDayField::Forecast => {
                "INSERT INTO degree_days (sensor_serial, day, forecast_value)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (sensor_serial, day)
                 DO UPDATE SET forecast_value = EXCLUDED.forecast_value, updated_at = NOW()"
            }
        };

        sqlx::query(sql)
            .bind(sensor_id)
            .bind(day)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query_range(
        &self,
        sensor_id: &str,
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DegreeDayRecord>, StorageError> {
        let rows = sqlx::query_as::<_, DegreeDayRecord>(
            "SELECT sensor_serial, day, actual_value, forecast_value
             FROM degree_days
             WHERE sensor_serial = $1
               AND day >= $2
               AND ($3::date IS NULL OR day <= $3)
             ORDER BY day",
        )
        .bind(sensor_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// In-memory (tests)
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn sample(ts: &str, value: f64) -> TemperatureSample {
        TemperatureSample {
            sensor_id: "S1".to_string(),
            timestamp: ts.parse().unwrap(),
            value,
            source: SampleSource::Actual,
        }
    }

    #[test]
    fn test_date_range_contains() {
        let r = DateRange::between(day("2024-06-01"), day("2024-06-03"));
        assert!(r.contains(day("2024-06-01")));
        assert!(r.contains(day("2024-06-03")));
        assert!(!r.contains(day("2024-06-04")));
        assert!(DateRange::default().contains(day("1999-01-01")));
    }

    #[test]
    fn test_dedup_keeps_last_value() {
        let samples = vec![
            sample("2024-06-01T06:00:00Z", 1.0),
            sample("2024-06-01T07:00:00Z", 2.0),
            sample("2024-06-01T06:00:00Z", 3.0),
        ];
        let unique = dedup_samples(&samples);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].value, 3.0);
    }

    #[test]
    fn test_start_of_day_is_midnight_utc() {
        let dt = start_of_day(day("2024-06-01"));
        assert_eq!(dt, "2024-06-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[tokio::test]
    async fn test_memory_upsert_is_field_level() {
        let store = MemoryStore::new();
        let d = day("2024-06-01");
        store
            .upsert_degree_day("S1", d, DegreeDayField::Forecast, 9.0)
            .await
            .unwrap();
        store
            .upsert_degree_day("S1", d, DegreeDayField::Actual, 5.0)
            .await
            .unwrap();
        store
            .upsert_degree_day("S1", d, DegreeDayField::Actual, 6.0)
            .await
            .unwrap();

        let rec = store.record("S1", d).unwrap();
        assert_eq!(rec.actual_value, Some(6.0));
        assert_eq!(rec.forecast_value, Some(9.0));
        assert_eq!(store.record_count(), 1, "Upserts never duplicate a row");
    }

    #[tokio::test]
    async fn test_memory_load_samples_filters_by_day() {
        let store = MemoryStore::new();
        store
            .store_samples(
                Measurement::AirTemperature,
                &[
                    sample("2024-05-31T23:00:00Z", 1.0),
                    sample("2024-06-01T00:00:00Z", 2.0),
                    sample("2024-06-02T12:00:00Z", 3.0),
                ],
            )
            .await
            .unwrap();

        let loaded = store
            .load_samples(
                "S1",
                Measurement::AirTemperature,
                SampleSource::Actual,
                DateRange::between(day("2024-06-01"), day("2024-06-01")),
            )
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].value, 2.0);

        let humidity = store
            .load_samples(
                "S1",
                Measurement::RelativeHumidity,
                SampleSource::Actual,
                DateRange::default(),
            )
            .await
            .unwrap();
        assert!(humidity.is_empty());
    }
}
