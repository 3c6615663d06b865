//! Cutting-date projection.
//!
//! A sensor's accumulation cycle starts at its reset date and moves from
//! below-threshold to crossed on the first day cumulative degree days reach
//! the sensor's optimal GDD. Crossed is terminal until a new reset date
//! shifts the window forward.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::StorageError;
use crate::services::accumulation::{AccumulationEngine, SourcePolicy};

/// Accumulation target of one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct CuttingTarget {
    pub sensor_id: String,
    pub optimal_gdd: f64,
    /// Inclusive lower bound of the accumulation window.
    pub reset_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    /// Measured degree days only.
    Historical,
    /// Measured degree days with forecast filling unmeasured days.
    Forward,
}

/// Result of a threshold search. `date` is `None` while below threshold.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ProjectedCuttingDate {
    pub sensor_id: String,
    pub mode: ProjectionMode,
    pub date: Option<NaiveDate>,
}

impl ProjectedCuttingDate {
    pub fn is_crossed(&self) -> bool {
        self.date.is_some()
    }
}

#[derive(Clone)]
pub struct CuttingDateProjector {
    engine: AccumulationEngine,
}

impl CuttingDateProjector {
    pub fn new(engine: AccumulationEngine) -> Self {
        Self { engine }
    }

    pub async fn project(
        &self,
        target: &CuttingTarget,
        mode: ProjectionMode,
    ) -> Result<ProjectedCuttingDate, StorageError> {
        let from = target.reset_date.date_naive();
        let date = match mode {
            ProjectionMode::Forward => {
                self.engine
                    .find_threshold_crossing(&target.sensor_id, from, target.optimal_gdd)
                    .await?
            }
            ProjectionMode::Historical => {
                self.engine
                    .find_threshold_crossing_with(
                        &target.sensor_id,
                        from,
                        target.optimal_gdd,
                        SourcePolicy::ActualOnly,
                    )
                    .await?
            }
        };

        tracing::debug!(
            "Projected {:?} cutting date for sensor {} (target {} since {}): {:?}",
            mode,
            target.sensor_id,
            target.optimal_gdd,
            from,
            date
        );

        Ok(ProjectedCuttingDate {
            sensor_id: target.sensor_id.clone(),
            mode,
            date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::memory::MemoryStore;
    use std::sync::Arc;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn target(optimal_gdd: f64, reset: &str) -> CuttingTarget {
        CuttingTarget {
            sensor_id: "S1".to_string(),
            optimal_gdd,
            reset_date: reset.parse().unwrap(),
        }
    }

    fn projector(store: MemoryStore) -> CuttingDateProjector {
        CuttingDateProjector::new(AccumulationEngine::new(Arc::new(store)))
    }

    fn mixed_store() -> MemoryStore {
        MemoryStore::new()
            .with_record("S1", day("2024-06-01"), Some(5.0), None)
            .with_record("S1", day("2024-06-02"), Some(6.0), Some(1.0))
            .with_record("S1", day("2024-06-03"), None, Some(8.0))
            .with_record("S1", day("2024-06-04"), None, Some(8.0))
            .with_record("S1", day("2024-06-05"), Some(3.0), None)
    }

    #[tokio::test]
    async fn test_historical_ignores_forecast() {
        let p = projector(mixed_store());
        let result = p
            .project(&target(14.0, "2024-06-01T00:00:00Z"), ProjectionMode::Historical)
            .await
            .unwrap();
        // Actual only: 5, 11, 14 on the 5th.
        assert_eq!(result.date, Some(day("2024-06-05")));
        assert!(result.is_crossed());
    }

    #[tokio::test]
    async fn test_forward_uses_forecast_fallback() {
        let p = projector(mixed_store());
        let result = p
            .project(&target(14.0, "2024-06-01T00:00:00Z"), ProjectionMode::Forward)
            .await
            .unwrap();
        // 5, 11 (actual beats forecast 1), 19 on the 3rd.
        assert_eq!(result.date, Some(day("2024-06-03")));
    }

    #[tokio::test]
    async fn test_below_threshold_without_records() {
        let p = projector(MemoryStore::new());
        let result = p
            .project(&target(10.0, "2024-06-01T00:00:00Z"), ProjectionMode::Forward)
            .await
            .unwrap();
        assert_eq!(result.date, None);
        assert!(!result.is_crossed());
    }

    #[tokio::test]
    async fn test_reset_rearms_cycle() {
        let p = projector(mixed_store());
        let first = p
            .project(&target(10.0, "2024-06-01T08:30:00Z"), ProjectionMode::Forward)
            .await
            .unwrap();
        assert_eq!(first.date, Some(day("2024-06-02")));

        // A later reset moves the window: accumulation restarts on the 3rd.
        let second = p
            .project(&target(10.0, "2024-06-03T12:00:00Z"), ProjectionMode::Forward)
            .await
            .unwrap();
        assert_eq!(second.date, Some(day("2024-06-04")));
    }

    #[tokio::test]
    async fn test_storage_error_surfaces() {
        let store = mixed_store();
        store.set_unavailable(true);
        let p = projector(store);
        let result = p
            .project(&target(10.0, "2024-06-01T00:00:00Z"), ProjectionMode::Historical)
            .await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }
}
