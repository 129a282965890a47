mod dataset;
pub use dataset::Dataset;

mod observation;
pub use observation::{Observation, ObservationKey};

mod run;
pub use run::{Run, RunKind, SourceState};

mod sensor;
pub use sensor::{Medium, QualityFlags, Sensor, SensorGeometry};
