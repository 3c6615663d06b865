//! Decoding of sensor readings at the ingestion boundary.
//!
//! Sensors publish `serial,YYYY-MM-DD HH:MM:SS,temperature` lines. Timestamps
//! carry no offset and are taken as UTC. Malformed lines are logged and
//! reported back to the caller, never passed on to the degree-day engine.

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::store::TimeSeriesStore;
use crate::errors::{IngestError, StorageError};
use crate::services::aggregator::{Measurement, SampleSource, TemperatureSample};

const READING_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A line that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RejectedLine {
    /// 1-based line number in the payload
    pub line: u64,
    pub reason: String,
}

/// Decoded payload: valid samples plus the lines that were rejected.
#[derive(Debug, Default)]
pub struct DecodedBatch {
    pub samples: Vec<TemperatureSample>,
    pub rejected: Vec<RejectedLine>,
}

/// Validate one CSV record as an actual temperature reading.
pub fn parse_record(record: &StringRecord) -> Result<TemperatureSample, IngestError> {
    if record.len() != 3 {
        return Err(IngestError::FieldCount(record.len()));
    }

    let serial = &record[0];
    if serial.is_empty() {
        return Err(IngestError::EmptySerial);
    }

    let naive = NaiveDateTime::parse_from_str(&record[1], READING_TIMESTAMP_FORMAT)
        .map_err(|_| IngestError::Timestamp(record[1].to_string()))?;

    let value: f64 = record[2]
        .parse()
        .map_err(|_| IngestError::Value(record[2].to_string()))?;
    if !value.is_finite() {
        return Err(IngestError::Value(record[2].to_string()));
    }

    Ok(TemperatureSample {
        sensor_id: serial.to_string(),
        timestamp: DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc),
        value,
        source: SampleSource::Actual,
    })
}

/// 1-based line number of the first non-empty line at or after `byte`.
///
/// The reader reports a record's position from before any blank lines it
/// skipped, so those are stepped over here.
fn line_at(payload: &[u8], byte: u64) -> u64 {
    let start = (byte as usize).min(payload.len());
    let blank = payload[start..]
        .iter()
        .take_while(|b| matches!(b, b'\r' | b'\n'))
        .count();
    1 + payload[..start + blank]
        .iter()
        .filter(|&&b| b == b'\n')
        .count() as u64
}

/// Decode a payload of one or more reading lines. Blank lines are ignored;
/// a line that is not valid UTF-8 is rejected on its own.
pub fn decode_payload(payload: &[u8]) -> DecodedBatch {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(payload);

    let mut batch = DecodedBatch::default();
    for (idx, result) in reader.records().enumerate() {
        let position = match &result {
            Ok(record) => record.position(),
            Err(e) => e.position(),
        };
        let line = position
            .map(|p| line_at(payload, p.byte()))
            .unwrap_or(idx as u64 + 1);

        let parsed = result
            .map_err(|e| IngestError::Csv(e.to_string()))
            .and_then(|record| parse_record(&record));

        match parsed {
            Ok(sample) => batch.samples.push(sample),
            Err(e) => {
                tracing::warn!("Rejected reading on line {}: {}", line, e);
                batch.rejected.push(RejectedLine {
                    line,
                    reason: e.to_string(),
                });
            }
        }
    }
    batch
}

/// Store decoded actual samples. Returns the number of samples written.
pub async fn store_readings(
    store: &dyn TimeSeriesStore,
    samples: &[TemperatureSample],
) -> Result<usize, StorageError> {
    if samples.is_empty() {
        return Ok(0);
    }
    let written = store
        .store_samples(Measurement::AirTemperature, samples)
        .await?;
    tracing::info!("Stored {} sensor readings", written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::memory::MemoryStore;
    use crate::db::store::DateRange;

    fn parse_line(line: &str) -> TemperatureSample {
        let mut batch = decode_payload(line.as_bytes());
        assert!(batch.rejected.is_empty(), "unexpected rejection: {:?}", batch.rejected);
        batch.samples.remove(0)
    }

    #[test]
    fn test_parse_line_valid() {
        let s = parse_line("SN-001,2024-06-01 06:00:00,10.5");
        assert_eq!(s.sensor_id, "SN-001");
        assert_eq!(
            s.timestamp,
            "2024-06-01T06:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(s.value, 10.5);
        assert_eq!(s.source, SampleSource::Actual);
    }

    #[test]
    fn test_parse_line_trims_whitespace() {
        let s = parse_line(" SN-001 , 2024-06-01 06:00:00 , -3.25 ");
        assert_eq!(s.sensor_id, "SN-001");
        assert_eq!(s.value, -3.25);
    }

    #[test]
    fn test_parse_record_errors() {
        let rec = |fields: &[&str]| StringRecord::from(fields.to_vec());
        assert_eq!(
            parse_record(&rec(&["SN-001", "2024-06-01 06:00:00"])),
            Err(IngestError::FieldCount(2))
        );
        assert_eq!(
            parse_record(&rec(&["", "2024-06-01 06:00:00", "1.0"])),
            Err(IngestError::EmptySerial)
        );
        assert_eq!(
            parse_record(&rec(&["SN-001", "2024-06-01T06:00:00Z", "1.0"])),
            Err(IngestError::Timestamp("2024-06-01T06:00:00Z".to_string()))
        );
        assert_eq!(
            parse_record(&rec(&["SN-001", "2024-06-01 06:00:00", "warm"])),
            Err(IngestError::Value("warm".to_string()))
        );
        assert_eq!(
            parse_record(&rec(&["SN-001", "2024-06-01 06:00:00", "NaN"])),
            Err(IngestError::Value("NaN".to_string()))
        );
    }

    #[test]
    fn test_decode_payload_mixed() {
        let payload = b"SN-001,2024-06-01 06:00:00,10.0\n\
                        garbage\n\
                        SN-001,2024-06-01 18:00:00,14.0\n";
        let batch = decode_payload(payload);
        assert_eq!(batch.samples.len(), 2);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].line, 2);
    }

    #[test]
    fn test_decode_payload_line_numbers_after_blank_lines() {
        let payload = b"SN-001,2024-06-01 06:00:00,10.0\n\n\ngarbage\n\nSN-001,2024-06-01 18:00:00,14.0\n";
        let batch = decode_payload(payload);
        assert_eq!(batch.samples.len(), 2);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].line, 4);
    }

    #[test]
    fn test_decode_payload_rejects_invalid_utf8_line_only() {
        let mut payload = b"SN-001,2024-06-01 06:00:00,10.0\n\n".to_vec();
        payload.extend_from_slice(b"SN-\xff,2024-06-01 12:00:00,11.0\n");
        payload.extend_from_slice(b"SN-001,2024-06-01 18:00:00,14.0\n");

        let batch = decode_payload(&payload);
        assert_eq!(batch.samples.len(), 2);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].line, 3);
        assert!(batch.rejected[0].reason.starts_with("CSV decode error"));
    }

    #[test]
    fn test_line_at_steps_over_blank_lines() {
        let payload = b"a\n\r\n\nb\n";
        assert_eq!(line_at(payload, 0), 1);
        assert_eq!(line_at(payload, 2), 4);
        assert_eq!(line_at(payload, 99), 5);
    }

    #[test]
    fn test_decode_payload_empty() {
        let batch = decode_payload(b"");
        assert!(batch.samples.is_empty());
        assert!(batch.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_store_readings_as_actual_air_temperature() {
        let store = MemoryStore::new();
        let batch = decode_payload(b"SN-001,2024-06-01 06:00:00,10.0\nSN-001,2024-06-01 18:00:00,14.0");
        let written = store_readings(&store, &batch.samples).await.unwrap();
        assert_eq!(written, 2);

        let loaded = store
            .load_samples(
                "SN-001",
                Measurement::AirTemperature,
                SampleSource::Actual,
                DateRange::default(),
            )
            .await
            .unwrap();
        assert_eq!(loaded.len(), 2);
    }
}
