use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{Farm, Field, Sensor, SensorWithReset};

const SENSOR_WITH_RESET_SELECT: &str =
    "SELECT s.id, s.field_id, s.serial_no, s.optimal_gdd, s.latitude, s.longitude, s.state,
            s.cutting_date_calculated, COALESCE(r.reset_at, s.created_at) AS reset_at
     FROM sensors s
     LEFT JOIN LATERAL (
         SELECT reset_at FROM sensor_resets
         WHERE sensor_id = s.id
         ORDER BY reset_at DESC
         LIMIT 1
     ) r ON TRUE";

const RECORD_SENSOR_RESET: &str = "INSERT INTO sensor_resets (sensor_id, reset_at)
     SELECT id, $2 FROM sensors WHERE id = $1
     ON CONFLICT (sensor_id, reset_at)
     DO UPDATE SET recorded_at = NOW()";

const FIELD_COLUMNS: &str = "id, farm_id, name, altitude_m, polygon";

/// Parameters for creating a farm.
pub struct InsertFarmParams {
    pub name: String,
    pub postcode: String,
    pub city: String,
    pub country: String,
}

/// Parameters for registering a new sensor in a field.
pub struct InsertSensorParams {
    pub field_id: Uuid,
    pub serial_no: String,
    pub optimal_gdd: f64,
    pub latitude: Decimal,
    pub longitude: Decimal,
}

/// List all farms.
pub async fn list_farms(pool: &PgPool) -> Result<Vec<Farm>, sqlx::Error> {
    sqlx::query_as::<_, Farm>(
        "SELECT id, name, postcode, city, country FROM farms ORDER BY name",
    )
    .fetch_all(pool)
    .await
}

/// Check whether a farm exists.
pub async fn farm_exists(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM farms WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await
}

/// Create a farm.
pub async fn insert_farm(pool: &PgPool, params: InsertFarmParams) -> Result<Farm, sqlx::Error> {
    sqlx::query_as::<_, Farm>(
        "INSERT INTO farms (id, name, postcode, city, country)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, name, postcode, city, country",
    )
    .bind(Uuid::new_v4())
    .bind(&params.name)
    .bind(&params.postcode)
    .bind(&params.city)
    .bind(&params.country)
    .fetch_one(pool)
    .await
}

/// List all fields.
pub async fn list_fields(pool: &PgPool) -> Result<Vec<Field>, sqlx::Error> {
    sqlx::query_as::<_, Field>(&format!(
        "SELECT {} FROM fields ORDER BY name",
        FIELD_COLUMNS
    ))
    .fetch_all(pool)
    .await
}

/// Get a single field by ID.
pub async fn get_field(pool: &PgPool, id: Uuid) -> Result<Option<Field>, sqlx::Error> {
    sqlx::query_as::<_, Field>(&format!("SELECT {} FROM fields WHERE id = $1", FIELD_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Create a field on a farm.
pub async fn insert_field(
    pool: &PgPool,
    farm_id: Uuid,
    name: &str,
    altitude_m: Decimal,
    polygon: Option<&str>,
) -> Result<Field, sqlx::Error> {
    sqlx::query_as::<_, Field>(&format!(
        "INSERT INTO fields (id, farm_id, name, altitude_m, polygon)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {}",
        FIELD_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(farm_id)
    .bind(name)
    .bind(altitude_m)
    .bind(polygon)
    .fetch_one(pool)
    .await
}

/// Register a sensor. Fails with a unique violation if the serial is taken.
pub async fn insert_sensor(pool: &PgPool, params: InsertSensorParams) -> Result<Sensor, sqlx::Error> {
    sqlx::query_as::<_, Sensor>(
        "INSERT INTO sensors (id, field_id, serial_no, optimal_gdd, latitude, longitude)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id, field_id, serial_no, optimal_gdd, latitude, longitude, state,
                   last_communication, cutting_date_calculated, last_forecast_at, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(params.field_id)
    .bind(&params.serial_no)
    .bind(params.optimal_gdd)
    .bind(params.latitude)
    .bind(params.longitude)
    .fetch_one(pool)
    .await
}

/// Sensors of a field with their accumulation start, oldest first.
pub async fn get_sensors_for_field(
    pool: &PgPool,
    field_id: Uuid,
) -> Result<Vec<SensorWithReset>, sqlx::Error> {
    sqlx::query_as::<_, SensorWithReset>(&format!(
        "{} WHERE s.field_id = $1 ORDER BY s.created_at, s.serial_no",
        SENSOR_WITH_RESET_SELECT
    ))
    .bind(field_id)
    .fetch_all(pool)
    .await
}

/// Look up a sensor by serial number.
pub async fn get_sensor_by_serial(
    pool: &PgPool,
    serial_no: &str,
) -> Result<Option<SensorWithReset>, sqlx::Error> {
    sqlx::query_as::<_, SensorWithReset>(&format!(
        "{} WHERE s.serial_no = $1",
        SENSOR_WITH_RESET_SELECT
    ))
    .bind(serial_no)
    .fetch_optional(pool)
    .await
}

/// All sensors with their accumulation start, for the farm dashboard.
pub async fn list_sensors(pool: &PgPool) -> Result<Vec<SensorWithReset>, sqlx::Error> {
    sqlx::query_as::<_, SensorWithReset>(&format!(
        "{} ORDER BY s.created_at, s.serial_no",
        SENSOR_WITH_RESET_SELECT
    ))
    .fetch_all(pool)
    .await
}

/// All sensors in the "active" state, for the forecast poller.
pub async fn list_active_sensors(pool: &PgPool) -> Result<Vec<SensorWithReset>, sqlx::Error> {
    sqlx::query_as::<_, SensorWithReset>(&format!(
        "{} WHERE s.state = 'active' ORDER BY s.serial_no",
        SENSOR_WITH_RESET_SELECT
    ))
    .fetch_all(pool)
    .await
}

/// Append a reset to a sensor's history. Returns `false` if the sensor does not exist.
///
/// Recording the same reset time twice keeps a single row.
pub async fn record_sensor_reset(
    pool: &PgPool,
    sensor_id: Uuid,
    reset_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(RECORD_SENSOR_RESET)
        .bind(sensor_id)
        .bind(reset_at)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Persist the projected cutting date of a sensor (NULL while below threshold).
pub async fn update_sensor_cutting_date(
    pool: &PgPool,
    sensor_id: Uuid,
    cutting_date: Option<NaiveDate>,
    forecast_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE sensors
         SET cutting_date_calculated = $2, last_forecast_at = $3
         WHERE id = $1",
    )
    .bind(sensor_id)
    .bind(cutting_date)
    .bind(forecast_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record the latest reading time for a sensor. Unknown serials are ignored.
pub async fn touch_sensor_communication(
    pool: &PgPool,
    serial_no: &str,
    at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sensors
         SET last_communication = GREATEST(COALESCE(last_communication, $2), $2)
         WHERE serial_no = $1",
    )
    .bind(serial_no)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_history_uses_latest_reset() {
        let select = SENSOR_WITH_RESET_SELECT.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(select.contains("ORDER BY reset_at DESC LIMIT 1"));
        assert!(select.contains("COALESCE(r.reset_at, s.created_at)"));
    }

    #[test]
    fn test_record_reset_appends_to_history() {
        let insert = RECORD_SENSOR_RESET.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(insert.contains("ON CONFLICT (sensor_id, reset_at)"));
        assert!(!insert.contains("SET reset_at"));
    }
}
