use crate::data::sensor::Sensor;

use conv::ConvUtil;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which exposure of a run a geometry quantity refers to
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum RunKind {
    /// The exposure being calibrated, source away from the detector centre
    OffAxis,
    /// Reference exposure with the source at the centre
    Central,
    /// Exposure at a different wavelength
    Wavelength,
}

impl RunKind {
    /// Exposures entering the occupancy ratio
    pub const FITTED: [RunKind; 2] = [Self::OffAxis, Self::Central];
}

/// Light source state during an exposure
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SourceState {
    /// Polar orientation of the source axis, radians
    pub theta: f64,
    /// Azimuthal orientation of the source axis, radians
    pub phi: f64,
    pub intensity_norm: f64,
    pub n_pulses: f64,
}

/// Off-axis run paired with its central reference run
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Run {
    pub id: i32,
    pub off_axis: SourceState,
    pub central: SourceState,
    pub wavelength: Option<SourceState>,
    pub sensors: Vec<Sensor>,
}

impl Run {
    pub fn source(&self, kind: RunKind) -> Option<&SourceState> {
        match kind {
            RunKind::OffAxis => Some(&self.off_axis),
            RunKind::Central => Some(&self.central),
            RunKind::Wavelength => self.wavelength.as_ref(),
        }
    }

    #[inline]
    pub fn n_sensors(&self) -> usize {
        self.sensors.len()
    }

    /// Per-pulse, per-sensor source intensity of the off-axis run relative to the central run
    ///
    /// `None` if the central intensity is zero or any of the terms is not finite.
    pub fn intensity_ratio(&self) -> Option<f64> {
        let n_sensors = self.n_sensors().approx_as::<f64>().ok()?;
        let per_sensor =
            |source: &SourceState| source.intensity_norm / source.n_pulses / n_sensors;
        let off_axis = per_sensor(&self.off_axis);
        let central = per_sensor(&self.central);
        let ratio = off_axis / central;
        (central != 0.0 && ratio.is_finite()).then_some(ratio)
    }

    /// Mean and population standard deviation of the finite occupancy ratios of the sensors
    ///
    /// Dead channels give infinite or NaN ratios and are left out. Both values are NaN if no
    /// ratio is finite.
    pub fn occupancy_ratio_stats(&self) -> (f64, f64) {
        let ratios: Vec<f64> = self
            .sensors
            .iter()
            .map(|sensor| sensor.occupancy_ratio().0)
            .filter(|ratio| ratio.is_finite())
            .collect();
        if ratios.is_empty() {
            return (f64::NAN, f64::NAN);
        }
        let n = ratios.len().approx_as::<f64>().unwrap_or(f64::NAN);
        let mean = ratios.iter().sum::<f64>() / n;
        let std = (ratios.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
        (mean, std)
    }
}
