use crate::data::observation::ObservationKey;
use crate::data::run::Run;
use crate::data::sensor::Sensor;
use crate::error::DataError;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// All runs entering a fit
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Dataset {
    runs: Vec<Run>,
}

impl Dataset {
    pub fn new(runs: Vec<Run>) -> Result<Self, DataError> {
        let dataset = Self { runs };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Check the invariants [Dataset::new] enforces, useful after deserialization
    pub fn validate(&self) -> Result<(), DataError> {
        let runs = &self.runs;
        if runs.is_empty() {
            return Err(DataError::NoRuns);
        }
        if let Some(run) = runs
            .iter()
            .find(|run| run.n_sensors() > ObservationKey::COMPOSITE_STRIDE)
        {
            return Err(DataError::TooManySensors {
                run_id: run.id,
                n_sensors: run.n_sensors(),
                max: ObservationKey::COMPOSITE_STRIDE,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    #[inline]
    pub fn n_runs(&self) -> usize {
        self.runs.len()
    }

    pub fn n_sensors(&self) -> usize {
        self.runs.iter().map(Run::n_sensors).sum()
    }

    pub fn run(&self, index: usize) -> Option<&Run> {
        self.runs.get(index)
    }

    pub fn get(&self, key: ObservationKey) -> Result<(&Run, &Sensor), DataError> {
        self.runs
            .get(key.run)
            .and_then(|run| run.sensors.get(key.sensor).map(|sensor| (run, sensor)))
            .ok_or(DataError::MissingSensor(key))
    }

    /// Keys of every sensor of every run, run-major
    pub fn keys(&self) -> impl Iterator<Item = ObservationKey> + '_ {
        self.runs.iter().enumerate().flat_map(|(run_index, run)| {
            (0..run.n_sensors()).map(move |sensor| ObservationKey::new(run_index, sensor))
        })
    }
}
