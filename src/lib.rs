#![doc = include_str!("../README.md")]


pub mod config;
pub use config::{
    BinConfig, CutConfig, FitConfig, MinimizerConfig, ParameterInit, ParametersConfig,
    ProcedureConfig, Range,
};

mod data;
pub use data::{
    Dataset, Medium, Observation, ObservationKey, QualityFlags, Run, RunKind, Sensor,
    SensorGeometry, SourceState,
};

mod efficiency;
pub use efficiency::sensor_efficiencies;

mod error;
pub use error::{ConfigError, DataError, FitError, SingularMatrix};

pub mod indexer;

pub mod model;
pub use model::OpticalModel;

pub mod nl_fit;
pub use nl_fit::{FitStatus, LevenbergMarquardtFit};

pub mod occupancy;

mod optics_fit;
pub use optics_fit::{FitResult, OpticsFit};

mod parameters;
pub use parameters::{GlobalParameter, ParameterGroup, ParameterLayout, ParameterVector};

pub mod screening;
pub use screening::{DataScreen, ScreenedData, ScreeningReport};

pub use ndarray;
