use crate::error::DataError;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identifies a (run, sensor) pair by the run position in the dataset and the sensor position in
/// the run
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct ObservationKey {
    pub run: usize,
    pub sensor: usize,
}

impl ObservationKey {
    /// Stride of the legacy `run * stride + sensor` integer encoding
    ///
    /// Runs with more sensors than this cannot be encoded, [crate::Dataset::new] rejects them.
    pub const COMPOSITE_STRIDE: usize = 10000;

    pub fn new(run: usize, sensor: usize) -> Self {
        Self { run, sensor }
    }

    /// Legacy integer encoding used by external record stores
    pub fn composite(&self) -> Result<usize, DataError> {
        if self.sensor >= Self::COMPOSITE_STRIDE {
            return Err(DataError::SensorIndexOverflow {
                sensor: self.sensor,
                stride: Self::COMPOSITE_STRIDE,
            });
        }
        Ok(self.run * Self::COMPOSITE_STRIDE + self.sensor)
    }

    pub fn from_composite(composite: usize) -> Self {
        Self {
            run: composite / Self::COMPOSITE_STRIDE,
            sensor: composite % Self::COMPOSITE_STRIDE,
        }
    }
}

/// Single sensor/run measurement entering the fit
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Observation {
    pub key: ObservationKey,
    /// Measured off-axis over central occupancy ratio
    pub ratio: f64,
    pub sigma: f64,
    /// Chi-square contribution from the latest model evaluation
    pub chi_square: f64,
    /// Data minus model from the latest model evaluation
    pub residual: f64,
}

impl Observation {
    pub fn new(key: ObservationKey, ratio: f64, sigma: f64) -> Self {
        Self {
            key,
            ratio,
            sigma,
            chi_square: f64::NAN,
            residual: f64::NAN,
        }
    }

    /// True if every numeric field is finite
    pub fn is_finite(&self) -> bool {
        self.ratio.is_finite()
            && self.sigma.is_finite()
            && self.chi_square.is_finite()
            && self.residual.is_finite()
    }

    #[inline]
    pub fn relative_error(&self) -> f64 {
        self.sigma / self.ratio
    }
}
