//! Field and farm dashboard assembly.
//!
//! The field dashboard combines relational field/sensor data with degree-day
//! results for the field's primary (oldest) sensor. The farm dashboard
//! summarises every field of a farm over all of its sensors.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::{Farm, Field, SensorWithReset};
use crate::db::store::DateRange;
use crate::errors::StorageError;
use crate::helpers::dec_to_f64;
use crate::services::accumulation::DisplayWindow;
use crate::services::aggregator::{daily_means_sorted, Measurement, SampleSource};
use crate::services::projector::{CuttingTarget, ProjectionMode};
use crate::services::GddEngine;

/// A dated value for chart rendering.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GraphPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// A sensor as listed on the field dashboard.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldSensor {
    pub sensor_id: Uuid,
    pub serial_no: String,
    pub optimal_gdd: f64,
    /// Start of the current accumulation window
    pub reset_date: DateTime<Utc>,
    pub state: String,
}

/// Field dashboard response.
///
/// GDD figures are for the field's primary sensor and are absent when the
/// field has no sensors.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldDashboard {
    pub field_id: Uuid,
    pub field_name: String,
    pub altitude_m: f64,
    /// Accumulated GDD from the reset date to today, rounded up
    pub current_gdd: Option<f64>,
    pub optimal_gdd: Option<f64>,
    /// Forward projection stored by the poller
    pub cutting_date_calculated: Option<NaiveDate>,
    /// Crossing date from measured data only
    pub historical_cutting_date: Option<NaiveDate>,
    pub sensors: Vec<FieldSensor>,
    pub seven_day_temperature_forecast: Vec<GraphPoint>,
    pub seven_day_gdd_forecast: Vec<GraphPoint>,
    pub seven_day_humidity_forecast: Vec<GraphPoint>,
}

/// A field as summarised on the farm dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FarmFieldSummary {
    pub field_id: Uuid,
    pub field_name: String,
    /// Mean accumulated GDD over the field's sensors, rounded up (0 without sensors)
    pub current_gdd: f64,
    /// Earliest stored cutting date among the field's sensors
    pub optimal_cutting_date: Option<NaiveDate>,
}

/// Farm dashboard response: one summary per field.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FarmDashboard {
    pub farm_id: Uuid,
    pub farm_name: String,
    pub city: String,
    pub country: String,
    pub fields: Vec<FarmFieldSummary>,
}

impl From<&SensorWithReset> for FieldSensor {
    fn from(s: &SensorWithReset) -> Self {
        Self {
            sensor_id: s.id,
            serial_no: s.serial_no.clone(),
            optimal_gdd: s.optimal_gdd,
            reset_date: s.reset_at,
            state: s.state.clone(),
        }
    }
}

impl From<&SensorWithReset> for CuttingTarget {
    fn from(s: &SensorWithReset) -> Self {
        Self {
            sensor_id: s.serial_no.clone(),
            optimal_gdd: s.optimal_gdd,
            reset_date: s.reset_at,
        }
    }
}

/// Daily mean of one forecast measurement over the display window.
async fn daily_forecast(
    engine: &GddEngine,
    serial_no: &str,
    measurement: Measurement,
    window: DisplayWindow,
) -> Result<Vec<GraphPoint>, StorageError> {
    let samples = engine
        .store
        .load_samples(
            serial_no,
            measurement,
            SampleSource::Forecast,
            DateRange::between(window.start, window.end),
        )
        .await?;

    Ok(daily_means_sorted(&samples)
        .into_iter()
        .map(|d| GraphPoint {
            date: d.date,
            value: d.mean_value,
        })
        .collect())
}

/// Build the dashboard for `field` as of `today`.
pub async fn build_field_dashboard(
    engine: &GddEngine,
    field: &Field,
    sensors: &[SensorWithReset],
    today: NaiveDate,
) -> Result<FieldDashboard, StorageError> {
    let mut dashboard = FieldDashboard {
        field_id: field.id,
        field_name: field.name.clone(),
        altitude_m: dec_to_f64(field.altitude_m),
        current_gdd: None,
        optimal_gdd: None,
        cutting_date_calculated: None,
        historical_cutting_date: None,
        sensors: sensors.iter().map(FieldSensor::from).collect(),
        seven_day_temperature_forecast: Vec::new(),
        seven_day_gdd_forecast: Vec::new(),
        seven_day_humidity_forecast: Vec::new(),
    };

    let Some(primary) = sensors.first() else {
        return Ok(dashboard);
    };

    let serial = primary.serial_no.as_str();
    let reset_day = primary.reset_at.date_naive();
    let window = DisplayWindow::starting(today, engine.horizon_days);

    let current = engine
        .accumulation
        .total_since(serial, reset_day, today)
        .await?;
    let historical = engine
        .projector
        .project(&CuttingTarget::from(primary), ProjectionMode::Historical)
        .await?;
    let series = engine
        .accumulation
        .cumulative_series(serial, reset_day, window)
        .await?;

    dashboard.current_gdd = Some(current.ceil());
    dashboard.optimal_gdd = Some(primary.optimal_gdd);
    dashboard.cutting_date_calculated = primary.cutting_date_calculated;
    dashboard.historical_cutting_date = historical.date;
    dashboard.seven_day_gdd_forecast = series
        .into_iter()
        .map(|p| GraphPoint {
            date: p.date,
            value: p.cumulative_value,
        })
        .collect();
    dashboard.seven_day_temperature_forecast =
        daily_forecast(engine, serial, Measurement::AirTemperature, window).await?;
    dashboard.seven_day_humidity_forecast =
        daily_forecast(engine, serial, Measurement::RelativeHumidity, window).await?;

    Ok(dashboard)
}

async fn summarise_field(
    engine: &GddEngine,
    field: &Field,
    sensors: &[&SensorWithReset],
    today: NaiveDate,
) -> Result<FarmFieldSummary, StorageError> {
    let mut total = 0.0;
    for sensor in sensors {
        total += engine
            .accumulation
            .total_since(&sensor.serial_no, sensor.reset_at.date_naive(), today)
            .await?;
    }

    let current_gdd = if sensors.is_empty() {
        0.0
    } else {
        (total / sensors.len() as f64).ceil()
    };

    Ok(FarmFieldSummary {
        field_id: field.id,
        field_name: field.name.clone(),
        current_gdd,
        optimal_cutting_date: sensors
            .iter()
            .filter_map(|s| s.cutting_date_calculated)
            .min(),
    })
}

/// Build one dashboard per farm as of `today`.
///
/// Fields are matched to farms by `farm_id` and sensors to fields by
/// `field_id`; rows that match nothing are ignored.
pub async fn build_farm_dashboards(
    engine: &GddEngine,
    farms: &[Farm],
    fields: &[Field],
    sensors: &[SensorWithReset],
    today: NaiveDate,
) -> Result<Vec<FarmDashboard>, StorageError> {
    let mut sensors_by_field: HashMap<Uuid, Vec<&SensorWithReset>> = HashMap::new();
    for sensor in sensors {
        sensors_by_field
            .entry(sensor.field_id)
            .or_default()
            .push(sensor);
    }

    let mut dashboards = Vec::with_capacity(farms.len());
    for farm in farms {
        let mut summaries = Vec::new();
        for field in fields.iter().filter(|f| f.farm_id == farm.id) {
            let field_sensors = sensors_by_field
                .get(&field.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            summaries.push(summarise_field(engine, field, field_sensors, today).await?);
        }

        dashboards.push(FarmDashboard {
            farm_id: farm.id,
            farm_name: farm.name.clone(),
            city: farm.city.clone(),
            country: farm.country.clone(),
            fields: summaries,
        });
    }

    tracing::debug!("Built {} farm dashboards", dashboards.len());
    Ok(dashboards)
}
