//! api.met.no Locationforecast 2.0 client.
//!
//! Fetches the compact hourly forecast for a sensor's coordinates and maps
//! the instant details we care about into forecast samples.
//! See: https://api.met.no/weatherapi/locationforecast/2.0/documentation

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, IF_MODIFIED_SINCE, LAST_MODIFIED, USER_AGENT};
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::aggregator::{Measurement, SampleSource, TemperatureSample};

/// Client for the MET Norway Locationforecast API.
#[derive(Debug, Clone)]
pub struct MetClient {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

/// The result of a compact forecast fetch.
#[derive(Debug)]
pub enum MetFetchResult {
    /// New timeseries data received (HTTP 200).
    NewData {
        raw_json: serde_json::Value,
        /// `Last-Modified` header, for the next conditional request.
        last_modified: Option<String>,
    },
    /// Data not modified since the last fetch (HTTP 304).
    NotModified,
}

/// One hourly forecast entry, reduced to the attributes stored as samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    pub time: DateTime<Utc>,
    pub air_temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
}

impl ForecastPoint {
    fn value_of(&self, measurement: Measurement) -> Option<f64> {
        match measurement {
            Measurement::AirTemperature => self.air_temperature,
            Measurement::RelativeHumidity => self.relative_humidity,
        }
    }
}

// --- api.met.no JSON response types ---

#[derive(Debug, Deserialize)]
struct MetResponse {
    properties: MetProperties,
}

#[derive(Debug, Deserialize)]
struct MetProperties {
    timeseries: Vec<MetTimeseries>,
}

#[derive(Debug, Deserialize)]
struct MetTimeseries {
    time: String,
    data: MetData,
}

#[derive(Debug, Deserialize)]
struct MetData {
    instant: MetInstant,
}

#[derive(Debug, Deserialize)]
struct MetInstant {
    details: MetInstantDetails,
}

#[derive(Debug, Deserialize)]
struct MetInstantDetails {
    air_temperature: Option<f64>,
    relative_humidity: Option<f64>,
}

impl MetClient {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
        })
    }

    /// Fetch the compact timeseries for a location.
    pub async fn fetch_compact(
        &self,
        lat: f64,
        lon: f64,
        if_modified_since: Option<&str>,
    ) -> Result<MetFetchResult, AppError> {
        // Limit to 4 decimal places per api.met.no terms of service
        let url = format!("{}/compact?lat={:.4}&lon={:.4}", self.base_url, lat, lon);

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|e| AppError::InternalError(format!("Invalid User-Agent: {}", e)))?,
        );
        if let Some(ims) = if_modified_since {
            if let Ok(val) = HeaderValue::from_str(ims) {
                headers.insert(IF_MODIFIED_SINCE, val);
            }
        }

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalServiceError(format!("api.met.no request failed: {}", e))
            })?;

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(MetFetchResult::NotModified);
        }

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "api.met.no returned HTTP {}",
                response.status()
            )));
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let raw_json: serde_json::Value = response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!("api.met.no JSON parse error: {}", e))
        })?;

        Ok(MetFetchResult::NewData {
            raw_json,
            last_modified,
        })
    }
}

/// Parse every timeseries entry of a compact response.
///
/// Entries with an unparseable timestamp are skipped with a warning.
pub fn parse_forecast_points(raw_json: &serde_json::Value) -> Result<Vec<ForecastPoint>, AppError> {
    let response: MetResponse = serde_json::from_value(raw_json.clone()).map_err(|e| {
        AppError::ExternalServiceError(format!("api.met.no response structure error: {}", e))
    })?;

    let points = response
        .properties
        .timeseries
        .into_iter()
        .filter_map(|entry| match DateTime::parse_from_rfc3339(&entry.time) {
            Ok(time) => Some(ForecastPoint {
                time: time.with_timezone(&Utc),
                air_temperature: entry.data.instant.details.air_temperature,
                relative_humidity: entry.data.instant.details.relative_humidity,
            }),
            Err(e) => {
                tracing::warn!("Skipping forecast entry with time '{}': {}", entry.time, e);
                None
            }
        })
        .collect();

    Ok(points)
}

/// Forecast samples of one measurement for a sensor. Points lacking the
/// attribute (or carrying a non-finite value) produce no sample.
pub fn forecast_samples(
    sensor_id: &str,
    points: &[ForecastPoint],
    measurement: Measurement,
) -> Vec<TemperatureSample> {
    points
        .iter()
        .filter_map(|p| {
            p.value_of(measurement)
                .filter(|v| v.is_finite())
                .map(|value| TemperatureSample {
                    sensor_id: sensor_id.to_string(),
                    timestamp: p.time,
                    value,
                    source: SampleSource::Forecast,
                })
        })
        .collect()
}
