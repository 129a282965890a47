use crate::data::{ObservationKey, RunKind};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Invalid fit configuration, reported before any fitting starts
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("number of {what} bins must be positive")]
    ZeroBins { what: &'static str },

    #[error("{what} bin {bin} is out of range, there are {n_bins} bins")]
    BinOutOfRange {
        what: &'static str,
        bin: usize,
        n_bins: usize,
    },

    #[error("fit requires at least one run")]
    NoRuns,

    #[error("{what} has {actual} entries, parameter layout requires {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("observation skip stride must be positive")]
    ZeroSkipStride,

    #[error("{what} range is empty: minimum {min} is larger than maximum {max}")]
    InvalidRange { what: &'static str, min: f64, max: f64 },

    #[error("{what} must be finite, got {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("{what} must be positive, got {value}")]
    NonPositive { what: &'static str, value: f64 },
}

/// Malformed input records
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DataError {
    #[error("dataset contains no runs")]
    NoRuns,

    #[error(
        "run {run_id} has {n_sensors} sensors, composite observation keys support at most {max}"
    )]
    TooManySensors {
        run_id: i32,
        n_sensors: usize,
        max: usize,
    },

    #[error("sensor index {sensor} does not fit the composite key stride {stride}")]
    SensorIndexOverflow { sensor: usize, stride: usize },

    #[error("no sensor for observation {0:?}")]
    MissingSensor(ObservationKey),

    #[error("observation {key:?} has no {kind:?} exposure")]
    MissingExposure { key: ObservationKey, kind: RunKind },
}

/// Singular curvature matrix met by the Gauss-Jordan solver
///
/// The solver always runs to completion, the variant tells which test failed last.
#[derive(
    Clone, Copy, Debug, thiserror::Error, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash,
)]
pub enum SingularMatrix {
    #[error("singular matrix: no unused pivot left")]
    NoPivot,

    #[error("singular matrix: zero pivot element")]
    ZeroPivot,
}

impl SingularMatrix {
    /// Legacy negative return code of the solver
    pub fn code(&self) -> i32 {
        match self {
            Self::NoPivot => -1,
            Self::ZeroPivot => -2,
        }
    }
}

/// Error returned from [crate::OpticsFit]
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("no observations passed the screening cuts")]
    NoObservations,

    #[error("data must be screened before fitting")]
    NotScreened,

    #[error("no parameter is allowed to vary")]
    NoFreeParameters,

    #[error("fit aborted: {0}")]
    Singular(#[from] SingularMatrix),
}
