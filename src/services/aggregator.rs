//! Daily aggregation of timestamped samples.
//!
//! Reduces raw samples (sensor readings or hourly forecast points) to one
//! arithmetic mean per `(sensor, calendar day, source)`. Days without samples
//! produce no entry at all; they are never zero-filled.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// Where a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// Measured by a physical sensor.
    Actual,
    /// Predicted by the forecast provider.
    Forecast,
}

impl SampleSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleSource::Actual => "actual",
            SampleSource::Forecast => "forecast",
        }
    }
}

/// The physical quantity a stored sample measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurement {
    /// Air temperature in °C. The only measurement that feeds degree days.
    AirTemperature,
    /// Relative humidity in percent (forecast only, dashboard display).
    RelativeHumidity,
}

impl Measurement {
    pub fn as_str(self) -> &'static str {
        match self {
            Measurement::AirTemperature => "air_temperature",
            Measurement::RelativeHumidity => "relative_humidity",
        }
    }
}

/// A single timestamped sample for one sensor. Immutable once recorded.
///
/// `value` is in the unit of the measurement it was stored under
/// (°C for air temperature).
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureSample {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub source: SampleSource,
}

/// Mean of all same-day, same-source samples of a sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyTemperature {
    pub sensor_id: String,
    pub date: NaiveDate,
    pub mean_value: f64,
    pub source: SampleSource,
}

/// Group samples by `(sensor_id, calendar date, source)` and average each group.
///
/// Output order follows the first appearance of each group in the input;
/// callers that need date order sort downstream.
pub fn aggregate(samples: &[TemperatureSample]) -> Vec<DailyTemperature> {
    let mut index: HashMap<(&str, NaiveDate, SampleSource), usize> = HashMap::new();
    let mut groups: Vec<(&TemperatureSample, NaiveDate, f64, u32)> = Vec::new();

    for sample in samples {
        let date = sample.timestamp.date_naive();
        let key = (sample.sensor_id.as_str(), date, sample.source);
        match index.get(&key) {
            Some(&i) => {
                groups[i].2 += sample.value;
                groups[i].3 += 1;
            }
            None => {
                index.insert(key, groups.len());
                groups.push((sample, date, sample.value, 1));
            }
        }
    }

    groups
        .into_iter()
        .map(|(first, date, sum, count)| DailyTemperature {
            sensor_id: first.sensor_id.clone(),
            date,
            mean_value: sum / f64::from(count),
            source: first.source,
        })
        .collect()
}

/// Daily means sorted by date, for chart-style output.
pub fn daily_means_sorted(samples: &[TemperatureSample]) -> Vec<DailyTemperature> {
    let mut days = aggregate(samples);
    days.sort_by_key(|d| d.date);
    days
}
