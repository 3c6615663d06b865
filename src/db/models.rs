use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

/// A farm owning one or more fields.
#[derive(Debug, Clone, FromRow)]
pub struct Farm {
    pub id: Uuid,
    pub name: String,
    pub postcode: String,
    pub city: String,
    pub country: String,
}

/// A field (plot of land) holding one or more sensors.
#[derive(Debug, Clone, FromRow)]
pub struct Field {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub name: String,
    pub altitude_m: Decimal,
    pub polygon: Option<String>,
}

/// A temperature sensor placed in a field.
#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)] // All fields populated by FromRow; some accessed only via route serialization
pub struct Sensor {
    pub id: Uuid,
    pub field_id: Uuid,
    pub serial_no: String,
    pub optimal_gdd: f64,
    pub latitude: Decimal,
    pub longitude: Decimal,
    /// "active", "inactive" or "maintenance"
    pub state: String,
    pub last_communication: Option<DateTime<Utc>>,
    pub cutting_date_calculated: Option<NaiveDate>,
    pub last_forecast_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A sensor joined with the start of its current accumulation window.
///
/// `reset_at` is the latest recorded reset, or the sensor's creation time
/// when it was never reset.
#[derive(Debug, Clone, FromRow)]
pub struct SensorWithReset {
    pub id: Uuid,
    pub field_id: Uuid,
    pub serial_no: String,
    pub optimal_gdd: f64,
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub state: String,
    pub cutting_date_calculated: Option<NaiveDate>,
    pub reset_at: DateTime<Utc>,
}

/// Per-day degree-day units of a sensor.
///
/// Unique per `(sensor_serial, day)`. The actual and forecast values are
/// written independently and may coexist for the same day.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DegreeDayRecord {
    pub sensor_serial: String,
    pub day: NaiveDate,
    pub actual_value: Option<f64>,
    pub forecast_value: Option<f64>,
}

/// Which column of a `DegreeDayRecord` a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegreeDayField {
    Actual,
    Forecast,
}
