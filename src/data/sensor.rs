use crate::data::run::RunKind;
use crate::occupancy::ratio_with_err;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Optical media crossed by the light on its way from the source to a sensor
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Medium {
    Scintillator,
    Acrylic,
    Water,
}

impl Medium {
    pub const N: usize = 3;

    pub const ALL: [Medium; Self::N] = [Self::Scintillator, Self::Acrylic, Self::Water];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::Scintillator => 0,
            Self::Acrylic => 1,
            Self::Water => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Scintillator => "scintillator",
            Self::Acrylic => "acrylic",
            Self::Water => "water",
        }
    }
}

/// Data-quality flags of a sensor in a single run
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct QualityFlags {
    /// Channel hardware status flag
    pub chs: bool,
    /// Channel software status flag
    pub css: bool,
}

/// Light path and counts of one sensor in one run, as produced by the ray tracer
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SensorGeometry {
    /// MPE-corrected prompt occupancy
    pub occupancy: f64,
    pub occupancy_err: f64,
    /// Path lengths through the media, indexed by [Medium::index]
    pub path_lengths: [f64; Medium::N],
    pub solid_angle: f64,
    /// Fresnel transmission coefficient
    pub fresnel_t_coeff: f64,
    /// Cosine of the light incidence angle at the sensor face
    pub cos_theta: f64,
    /// Polar angle of the emission direction relative to the source frame, radians
    pub rel_theta: f64,
    /// Azimuthal angle of the emission direction relative to the source frame, radians
    pub rel_phi: f64,
    /// Fraction of light shadowed by the AV hold-down ropes
    pub avhd_shadowing: f64,
    /// Fraction of light shadowed by the detector geometry
    pub geo_shadowing: f64,
    pub flags: QualityFlags,
    pub is_verified: bool,
}

impl SensorGeometry {
    #[inline]
    pub fn path_length(&self, medium: Medium) -> f64 {
        self.path_lengths[medium.index()]
    }
}

/// A single sensor seen in the off-axis run and in the matching central run
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Sensor {
    pub id: usize,
    pub off_axis: SensorGeometry,
    pub central: SensorGeometry,
    pub wavelength: Option<SensorGeometry>,
}

impl Sensor {
    pub fn geometry(&self, kind: RunKind) -> Option<&SensorGeometry> {
        match kind {
            RunKind::OffAxis => Some(&self.off_axis),
            RunKind::Central => Some(&self.central),
            RunKind::Wavelength => self.wavelength.as_ref(),
        }
    }

    /// Off-axis over central occupancy ratio and its uncertainty
    pub fn occupancy_ratio(&self) -> (f64, f64) {
        ratio_with_err(
            self.off_axis.occupancy,
            self.off_axis.occupancy_err,
            self.central.occupancy,
            self.central.occupancy_err,
        )
    }

    /// Difference of the off-axis and the central path lengths through `medium`
    #[inline]
    pub fn delta_path_length(&self, medium: Medium) -> f64 {
        self.off_axis.path_length(medium) - self.central.path_length(medium)
    }
}
