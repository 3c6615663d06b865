//! Conversion of daily mean temperatures into stored degree-day rows.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::db::models::DegreeDayField;
use crate::db::store::{DateRange, TimeSeriesStore};
use crate::errors::StorageError;
use crate::services::aggregator::{aggregate, DailyTemperature, Measurement, SampleSource};

impl From<SampleSource> for DegreeDayField {
    fn from(source: SampleSource) -> Self {
        match source {
            SampleSource::Actual => DegreeDayField::Actual,
            SampleSource::Forecast => DegreeDayField::Forecast,
        }
    }
}

/// Writes degree-day units per `(sensor, day)` into the time-series store.
#[derive(Clone)]
pub struct DegreeDayCalculator {
    store: Arc<dyn TimeSeriesStore>,
    base_temperature_c: f64,
}

impl DegreeDayCalculator {
    pub fn new(store: Arc<dyn TimeSeriesStore>, base_temperature_c: f64) -> Self {
        Self {
            store,
            base_temperature_c,
        }
    }

    /// Degree-day units for a daily mean temperature (not clamped at zero).
    pub fn units_for(&self, mean_temperature_c: f64) -> f64 {
        mean_temperature_c - self.base_temperature_c
    }

    /// Upsert the actual or forecast column (chosen by each entry's source)
    /// for every day in `daily_temps`. Returns the number of rows written.
    ///
    /// Days absent from `daily_temps` are not touched. A store failure aborts
    /// the rest of the batch; rows written before it stay written.
    pub async fn record_daily_averages(
        &self,
        sensor_id: &str,
        daily_temps: &[DailyTemperature],
    ) -> Result<usize, StorageError> {
        let mut written = 0;
        for daily in daily_temps {
            if daily.sensor_id != sensor_id {
                tracing::warn!(
                    "Skipping daily mean for sensor {} in batch for sensor {}",
                    daily.sensor_id,
                    sensor_id
                );
                continue;
            }
            if !daily.mean_value.is_finite() {
                tracing::warn!(
                    "Skipping non-finite daily mean for sensor {} on {}",
                    sensor_id,
                    daily.date
                );
                continue;
            }

            let units = self.units_for(daily.mean_value);
            self.store
                .upsert_degree_day(sensor_id, daily.date, daily.source.into(), units)
                .await?;
            written += 1;
        }

        tracing::debug!(
            "Recorded {} degree-day rows for sensor {}",
            written,
            sensor_id
        );
        Ok(written)
    }

    /// Recompute and store one source's degree days for a sensor from its
    /// stored air-temperature samples (optionally from `since` onwards).
    pub async fn refresh(
        &self,
        sensor_id: &str,
        source: SampleSource,
        since: Option<NaiveDate>,
    ) -> Result<usize, StorageError> {
        let samples = self
            .store
            .load_samples(
                sensor_id,
                Measurement::AirTemperature,
                source,
                DateRange {
                    from: since,
                    to: None,
                },
            )
            .await?;

        if samples.is_empty() {
            tracing::debug!(
                "No {} temperature samples for sensor {}, nothing to refresh",
                source.as_str(),
                sensor_id
            );
            return Ok(0);
        }

        let daily = aggregate(&samples);
        self.record_daily_averages(sensor_id, &daily).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::memory::MemoryStore;
    use crate::services::accumulation::AccumulationEngine;
    use crate::services::aggregator::TemperatureSample;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn daily(d: &str, mean: f64, source: SampleSource) -> DailyTemperature {
        DailyTemperature {
            sensor_id: "S1".to_string(),
            date: day(d),
            mean_value: mean,
            source,
        }
    }

    fn sample(ts: &str, value: f64, source: SampleSource) -> TemperatureSample {
        TemperatureSample {
            sensor_id: "S1".to_string(),
            timestamp: ts.parse().unwrap(),
            value,
            source,
        }
    }

    #[tokio::test]
    async fn test_record_writes_selected_field_only() {
        let store = Arc::new(MemoryStore::new());
        let calc = DegreeDayCalculator::new(store.clone(), 0.0);

        calc.record_daily_averages("S1", &[daily("2024-06-01", 9.0, SampleSource::Forecast)])
            .await
            .unwrap();
        calc.record_daily_averages("S1", &[daily("2024-06-01", 5.0, SampleSource::Actual)])
            .await
            .unwrap();

        let rec = store.record("S1", day("2024-06-01")).unwrap();
        assert_eq!(rec.actual_value, Some(5.0));
        assert_eq!(rec.forecast_value, Some(9.0));
    }

    #[tokio::test]
    async fn test_record_applies_base_temperature() {
        let store = Arc::new(MemoryStore::new());
        let calc = DegreeDayCalculator::new(store.clone(), 5.0);
        calc.record_daily_averages("S1", &[daily("2024-06-01", 12.5, SampleSource::Actual)])
            .await
            .unwrap();
        assert_eq!(
            store.record("S1", day("2024-06-01")).unwrap().actual_value,
            Some(7.5)
        );
    }

    #[tokio::test]
    async fn test_record_skips_other_sensors_and_non_finite() {
        let store = Arc::new(MemoryStore::new());
        let calc = DegreeDayCalculator::new(store.clone(), 0.0);
        let mut other = daily("2024-06-01", 3.0, SampleSource::Actual);
        other.sensor_id = "S2".to_string();
        let written = calc
            .record_daily_averages(
                "S1",
                &[other, daily("2024-06-02", f64::NAN, SampleSource::Actual)],
            )
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_record_aborts_batch_on_storage_error() {
        let store = Arc::new(MemoryStore::new());
        store.fail_after_writes(2);
        let calc = DegreeDayCalculator::new(store.clone(), 0.0);
        let batch = vec![
            daily("2024-06-01", 1.0, SampleSource::Actual),
            daily("2024-06-02", 2.0, SampleSource::Actual),
            daily("2024-06-03", 3.0, SampleSource::Actual),
            daily("2024-06-04", 4.0, SampleSource::Actual),
        ];
        let result = calc.record_daily_averages("S1", &batch).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
        assert_eq!(store.record_count(), 2, "Rows before the failure stay written");
        assert!(store.record("S1", day("2024-06-04")).is_none());
    }

    #[tokio::test]
    async fn test_round_trip_with_total_since() {
        let store = Arc::new(MemoryStore::new());
        let calc = DegreeDayCalculator::new(store.clone(), 0.0);
        let engine = AccumulationEngine::new(store.clone());

        let batch = vec![
            daily("2024-06-01", 5.0, SampleSource::Actual),
            daily("2024-06-01", 9.0, SampleSource::Forecast),
            daily("2024-06-02", 6.5, SampleSource::Forecast),
            daily("2024-06-04", 4.0, SampleSource::Actual),
        ];
        calc.record_daily_averages("S1", &batch).await.unwrap();

        let total = engine
            .total_since("S1", day("2024-06-01"), day("2024-06-04"))
            .await
            .unwrap();
        // Actual 5 beats forecast 9 on the 1st; the 3rd has no data and counts nothing.
        assert_eq!(total, 5.0 + 6.5 + 4.0);
        assert!(store.record("S1", day("2024-06-03")).is_none());
    }

    #[tokio::test]
    async fn test_refresh_from_samples() {
        let store = Arc::new(MemoryStore::new());
        store
            .store_samples(
                Measurement::AirTemperature,
                &[
                    sample("2024-06-01T06:00:00Z", 10.0, SampleSource::Actual),
                    sample("2024-06-01T18:00:00Z", 14.0, SampleSource::Actual),
                    sample("2024-06-02T12:00:00Z", 20.0, SampleSource::Forecast),
                ],
            )
            .await
            .unwrap();
        let calc = DegreeDayCalculator::new(store.clone(), 0.0);

        let written = calc.refresh("S1", SampleSource::Actual, None).await.unwrap();
        assert_eq!(written, 1);
        let rec = store.record("S1", day("2024-06-01")).unwrap();
        assert_eq!(rec.actual_value, Some(12.0));
        assert_eq!(rec.forecast_value, None);
        assert!(store.record("S1", day("2024-06-02")).is_none());

        let written = calc
            .refresh("S1", SampleSource::Forecast, None)
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(
            store.record("S1", day("2024-06-02")).unwrap().forecast_value,
            Some(20.0)
        );
    }

    #[tokio::test]
    async fn test_refresh_since_skips_earlier_days() {
        let store = Arc::new(MemoryStore::new());
        store
            .store_samples(
                Measurement::AirTemperature,
                &[
                    sample("2024-05-31T12:00:00Z", 30.0, SampleSource::Actual),
                    sample("2024-06-01T06:00:00Z", 8.0, SampleSource::Actual),
                    sample("2024-06-01T18:00:00Z", 12.0, SampleSource::Actual),
                ],
            )
            .await
            .unwrap();
        let calc = DegreeDayCalculator::new(store.clone(), 0.0);

        let written = calc
            .refresh("S1", SampleSource::Actual, Some(day("2024-06-01")))
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert!(store.record("S1", day("2024-05-31")).is_none());
        assert_eq!(
            store.record("S1", day("2024-06-01")).unwrap().actual_value,
            Some(10.0)
        );
    }

    #[tokio::test]
    async fn test_refresh_without_samples_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let calc = DegreeDayCalculator::new(store.clone(), 0.0);
        assert_eq!(
            calc.refresh("S1", SampleSource::Actual, None).await.unwrap(),
            0
        );
        assert_eq!(store.record_count(), 0);
    }
}
