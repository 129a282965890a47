use crate::config::{CutConfig, Range};
use crate::data::{Run, RunKind, Sensor, SensorGeometry};

use enum_dispatch::enum_dispatch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Occupancy ratio statistics over all sensors of a run
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunStats {
    pub mean_ratio: f64,
    /// Population standard deviation
    pub std_ratio: f64,
}

impl RunStats {
    pub fn new(run: &Run) -> Self {
        let (mean_ratio, std_ratio) = run.occupancy_ratio_stats();
        Self {
            mean_ratio,
            std_ratio,
        }
    }
}

/// Validity test of a single sensor
#[enum_dispatch]
pub trait CutTrait: Clone + Debug {
    /// Name used in the screening report
    fn name(&self) -> &'static str;

    /// Whether the sensor survives the cut
    fn passes(&self, sensor: &Sensor, stats: &RunStats) -> bool;
}

/// All validity cuts are available as variants of this enum
#[enum_dispatch(CutTrait)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[non_exhaustive]
pub enum Cut {
    Verified(VerifiedCut),
    QualityFlags(QualityFlagsCut),
    Shadowing(ShadowingCut),
    MinOccupancy(MinOccupancyCut),
    RelativeError(RelativeErrorCut),
    RatioDeviation(RatioDeviationCut),
}

impl Cut {
    /// Cuts in the order they are applied
    pub fn from_config(config: &CutConfig) -> Vec<Self> {
        vec![
            VerifiedCut.into(),
            QualityFlagsCut {
                reject_chs: config.reject_chs,
                reject_css: config.reject_css,
            }
            .into(),
            ShadowingCut {
                kind: Shadowing::AvHoldDown,
                range: config.avhd_shadowing,
            }
            .into(),
            ShadowingCut {
                kind: Shadowing::Geometric,
                range: config.geo_shadowing,
            }
            .into(),
            MinOccupancyCut {
                min_occupancy: config.min_occupancy,
            }
            .into(),
            RelativeErrorCut {
                max_relative_error: config.max_relative_error,
            }
            .into(),
            RatioDeviationCut {
                n_sigma: config.n_sigma,
            }
            .into(),
        ]
    }
}

fn both_geometries(sensor: &Sensor, f: impl Fn(&SensorGeometry) -> bool) -> bool {
    RunKind::FITTED
        .into_iter()
        .filter_map(|kind| sensor.geometry(kind))
        .all(f)
}

/// Sensor must be verified in both runs
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct VerifiedCut;

impl CutTrait for VerifiedCut {
    fn name(&self) -> &'static str {
        "verified"
    }

    fn passes(&self, sensor: &Sensor, _stats: &RunStats) -> bool {
        both_geometries(sensor, |geometry| geometry.is_verified)
    }
}

/// Reject sensors carrying an enabled quality flag in either run
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QualityFlagsCut {
    pub reject_chs: bool,
    pub reject_css: bool,
}

impl CutTrait for QualityFlagsCut {
    fn name(&self) -> &'static str {
        "quality flags"
    }

    fn passes(&self, sensor: &Sensor, _stats: &RunStats) -> bool {
        both_geometries(sensor, |geometry| {
            !(self.reject_chs && geometry.flags.chs) && !(self.reject_css && geometry.flags.css)
        })
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Shadowing {
    AvHoldDown,
    Geometric,
}

/// Shadowing fraction must be inside the range in both runs
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ShadowingCut {
    pub kind: Shadowing,
    pub range: Range,
}

impl CutTrait for ShadowingCut {
    fn name(&self) -> &'static str {
        match self.kind {
            Shadowing::AvHoldDown => "AVHD shadowing",
            Shadowing::Geometric => "geometric shadowing",
        }
    }

    fn passes(&self, sensor: &Sensor, _stats: &RunStats) -> bool {
        both_geometries(sensor, |geometry| {
            let fraction = match self.kind {
                Shadowing::AvHoldDown => geometry.avhd_shadowing,
                Shadowing::Geometric => geometry.geo_shadowing,
            };
            self.range.contains(fraction)
        })
    }
}

/// Occupancy must not be below the minimum in both runs
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct MinOccupancyCut {
    pub min_occupancy: f64,
}

impl CutTrait for MinOccupancyCut {
    fn name(&self) -> &'static str {
        "minimum occupancy"
    }

    fn passes(&self, sensor: &Sensor, _stats: &RunStats) -> bool {
        both_geometries(sensor, |geometry| {
            !(geometry.occupancy < self.min_occupancy)
        })
    }
}

/// Relative uncertainty of the occupancy ratio must not exceed the maximum
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RelativeErrorCut {
    pub max_relative_error: f64,
}

impl CutTrait for RelativeErrorCut {
    fn name(&self) -> &'static str {
        "relative error"
    }

    fn passes(&self, sensor: &Sensor, _stats: &RunStats) -> bool {
        let (ratio, sigma) = sensor.occupancy_ratio();
        !(sigma / ratio > self.max_relative_error)
    }
}

/// Occupancy ratio must be within `n_sigma` standard deviations from the run mean
///
/// Skipped for runs with a zero or undefined standard deviation. Non-finite ratios pass, they
/// are purged later.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RatioDeviationCut {
    pub n_sigma: f64,
}

impl CutTrait for RatioDeviationCut {
    fn name(&self) -> &'static str {
        "ratio deviation"
    }

    fn passes(&self, sensor: &Sensor, stats: &RunStats) -> bool {
        if !(stats.std_ratio > 0.0) || !stats.mean_ratio.is_finite() {
            return true;
        }
        let (ratio, _) = sensor.occupancy_ratio();
        !ratio.is_finite() || !((ratio - stats.mean_ratio).abs() / stats.std_ratio > self.n_sigma)
    }
}
