pub mod accumulation;
pub mod aggregator;
pub mod dashboard;
pub mod degree_days;
pub mod ingest;
pub mod met;
pub mod poller;
pub mod projector;

use std::sync::Arc;

use crate::db::store::TimeSeriesStore;
use accumulation::AccumulationEngine;
use degree_days::DegreeDayCalculator;
use projector::CuttingDateProjector;

/// The degree-day components, built once at startup around a single store.
#[derive(Clone)]
pub struct GddEngine {
    pub store: Arc<dyn TimeSeriesStore>,
    pub calculator: DegreeDayCalculator,
    pub accumulation: AccumulationEngine,
    pub projector: CuttingDateProjector,
    /// Days after today covered by forecast displays.
    pub horizon_days: u32,
}

impl GddEngine {
    pub fn new(store: Arc<dyn TimeSeriesStore>, base_temperature_c: f64, horizon_days: u32) -> Self {
        let accumulation = AccumulationEngine::new(store.clone());
        Self {
            calculator: DegreeDayCalculator::new(store.clone(), base_temperature_c),
            projector: CuttingDateProjector::new(accumulation.clone()),
            accumulation,
            store,
            horizon_days,
        }
    }
}
