//! Fit configuration
//!
//! Everything the fit needs besides the run records: histogram binning, initial values and vary
//! flags of every parameter group, screening thresholds and minimizer settings. All structures
//! are (de)serializable so an outer layer can read them from any serde format.

use crate::error::ConfigError;
use crate::parameters::GlobalParameter;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Initial value of a parameter (or of every bin of a parameter group) and whether it varies
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ParameterInit {
    pub init: f64,
    pub vary: bool,
}

impl ParameterInit {
    pub fn new(init: f64, vary: bool) -> Self {
        Self { init, vary }
    }

    pub fn fixed(init: f64) -> Self {
        Self::new(init, false)
    }

    pub fn varying(init: f64) -> Self {
        Self::new(init, true)
    }
}

/// Histogram binning of the angular response and the source emission profile
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct BinConfig {
    /// Number of angular response bins over the incidence angle range [0, 90] degrees
    pub n_angular_bins: usize,
    /// Number of emission profile bins over cos(theta) in [-1, 1]
    pub n_theta_bins: usize,
    /// Number of emission profile bins over phi in [0, 2pi)
    pub n_phi_bins: usize,
    /// Angular response bins with fewer entries are fixed
    pub min_angular_bin_entries: usize,
    /// Emission profile bins with fewer entries are fixed
    pub min_emission_bin_entries: usize,
}

impl BinConfig {
    #[inline]
    pub fn default_n_angular_bins() -> usize {
        90
    }

    #[inline]
    pub fn default_n_theta_bins() -> usize {
        12
    }

    #[inline]
    pub fn default_n_phi_bins() -> usize {
        36
    }

    #[inline]
    pub fn default_min_bin_entries() -> usize {
        25
    }
}

impl Default for BinConfig {
    fn default() -> Self {
        Self {
            n_angular_bins: Self::default_n_angular_bins(),
            n_theta_bins: Self::default_n_theta_bins(),
            n_phi_bins: Self::default_n_phi_bins(),
            min_angular_bin_entries: Self::default_min_bin_entries(),
            min_emission_bin_entries: Self::default_min_bin_entries(),
        }
    }
}

/// Initial values and vary flags of every parameter group
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ParametersConfig {
    pub scint_attenuation: ParameterInit,
    pub av_attenuation: ParameterInit,
    pub water_attenuation: ParameterInit,
    pub scint_scattering: ParameterInit,
    pub av_scattering: ParameterInit,
    pub water_scattering: ParameterInit,
    /// Every angular response bin starts from this value plus the slope term
    pub angular_response: ParameterInit,
    /// Per-degree slope added to angular response bins centred below
    /// [ParametersConfig::ANGULAR_SLOPE_CUTOFF_DEG]
    pub angular_response_slope: f64,
    pub emission_profile: ParameterInit,
    /// Used for runs without usable source intensity information
    pub run_normalisation: ParameterInit,
    /// Angular response bins kept at their initial value, the overall scale cancels in the ratio
    pub fixed_angular_bins: Vec<usize>,
    /// Emission profile bins kept at their initial value, the overall scale cancels in the ratio
    pub fixed_emission_bins: Vec<usize>,
}

impl ParametersConfig {
    pub const ANGULAR_SLOPE_CUTOFF_DEG: f64 = 36.0;

    pub fn global(&self, parameter: GlobalParameter) -> ParameterInit {
        match parameter {
            GlobalParameter::ScintAttenuation => self.scint_attenuation,
            GlobalParameter::AvAttenuation => self.av_attenuation,
            GlobalParameter::WaterAttenuation => self.water_attenuation,
            GlobalParameter::ScintScattering => self.scint_scattering,
            GlobalParameter::AvScattering => self.av_scattering,
            GlobalParameter::WaterScattering => self.water_scattering,
        }
    }

    #[inline]
    pub fn default_angular_response_slope() -> f64 {
        0.002222
    }

    #[inline]
    pub fn default_run_normalisation() -> f64 {
        0.03
    }
}

impl Default for ParametersConfig {
    fn default() -> Self {
        Self {
            scint_attenuation: ParameterInit::varying(1.0e-4),
            av_attenuation: ParameterInit::varying(1.0e-4),
            water_attenuation: ParameterInit::varying(1.0e-4),
            scint_scattering: ParameterInit::fixed(0.0),
            av_scattering: ParameterInit::fixed(0.0),
            water_scattering: ParameterInit::fixed(0.0),
            angular_response: ParameterInit::varying(1.0),
            angular_response_slope: Self::default_angular_response_slope(),
            emission_profile: ParameterInit::varying(1.0),
            run_normalisation: ParameterInit::varying(Self::default_run_normalisation()),
            fixed_angular_bins: vec![],
            fixed_emission_bins: vec![],
        }
    }
}

/// Closed range used by the shadowing cuts
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn validate(&self, what: &'static str) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::InvalidRange {
                what,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Screening thresholds
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct CutConfig {
    /// Observations with an initial chi-square below this value are dropped
    pub chi_square_min: f64,
    /// Observations with an initial chi-square above `n_chi_square` times the reduced
    /// chi-square are dropped
    pub n_chi_square: f64,
    /// Maximum distance from the run's mean ratio in standard deviations
    pub n_sigma: f64,
    /// Minimum MPE-corrected occupancy for both the off-axis and the central run
    pub min_occupancy: f64,
    /// Maximum relative uncertainty of the occupancy ratio
    pub max_relative_error: f64,
    pub avhd_shadowing: Range,
    pub geo_shadowing: Range,
    /// Reject sensors with the CHS flag set
    pub reject_chs: bool,
    /// Reject sensors with the CSS flag set
    pub reject_css: bool,
}

impl CutConfig {
    #[inline]
    pub fn default_max_relative_error() -> f64 {
        0.25
    }
}

impl Default for CutConfig {
    fn default() -> Self {
        Self {
            chi_square_min: 0.0,
            n_chi_square: 10.0,
            n_sigma: 5.0,
            min_occupancy: 100.0,
            max_relative_error: Self::default_max_relative_error(),
            avhd_shadowing: Range::new(0.0, 0.0),
            geo_shadowing: Range::new(0.0, 0.0),
            reject_chs: true,
            reject_css: true,
        }
    }
}

/// Levenberg-Marquardt settings
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct MinimizerConfig {
    pub max_iterations: usize,
    /// Chi-square must change by more than this to count as progress
    pub chi_square_tolerance: f64,
    /// Number of consecutive iterations without progress needed to stop
    pub n_good_iterations: usize,
    pub initial_lambda: f64,
    /// Only every `skip_stride`-th observation enters the curvature matrix
    pub skip_stride: usize,
    /// Treat a singular curvature matrix as a fit failure
    pub escalate_singular: bool,
}

impl MinimizerConfig {
    #[inline]
    pub fn default_max_iterations() -> usize {
        1000
    }

    #[inline]
    pub fn default_chi_square_tolerance() -> f64 {
        1.0
    }

    #[inline]
    pub fn default_n_good_iterations() -> usize {
        4
    }

    #[inline]
    pub fn default_initial_lambda() -> f64 {
        0.001
    }
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: Self::default_max_iterations(),
            chi_square_tolerance: Self::default_chi_square_tolerance(),
            n_good_iterations: Self::default_n_good_iterations(),
            initial_lambda: Self::default_initial_lambda(),
            skip_stride: 1,
            escalate_singular: false,
        }
    }
}

/// Sequence of refits with tightening chi-square limits
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ProcedureConfig {
    /// Each limit starts a new fit pass over the screened observations with chi-square below it
    pub chi_square_limits: Vec<f64>,
}

/// Full configuration of an optics fit
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct FitConfig {
    pub name: String,
    pub bins: BinConfig,
    pub parameters: ParametersConfig,
    pub cuts: CutConfig,
    pub minimizer: MinimizerConfig,
    pub procedure: ProcedureConfig,
}

fn check_finite(what: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { what, value })
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bins = &self.bins;
        if bins.n_angular_bins == 0 {
            return Err(ConfigError::ZeroBins { what: "angular" });
        }
        if bins.n_theta_bins == 0 {
            return Err(ConfigError::ZeroBins {
                what: "emission theta",
            });
        }
        if bins.n_phi_bins == 0 {
            return Err(ConfigError::ZeroBins {
                what: "emission phi",
            });
        }

        let pars = &self.parameters;
        for parameter in GlobalParameter::ALL {
            check_finite(parameter.name(), pars.global(parameter).init)?;
        }
        check_finite("angular response", pars.angular_response.init)?;
        check_finite("angular response slope", pars.angular_response_slope)?;
        check_finite("emission profile", pars.emission_profile.init)?;
        check_finite("run normalisation", pars.run_normalisation.init)?;
        if let Some(&bin) = pars
            .fixed_angular_bins
            .iter()
            .find(|&&bin| bin >= bins.n_angular_bins)
        {
            return Err(ConfigError::BinOutOfRange {
                what: "angular",
                bin,
                n_bins: bins.n_angular_bins,
            });
        }
        let n_emission_bins = bins.n_theta_bins * bins.n_phi_bins;
        if let Some(&bin) = pars
            .fixed_emission_bins
            .iter()
            .find(|&&bin| bin >= n_emission_bins)
        {
            return Err(ConfigError::BinOutOfRange {
                what: "emission",
                bin,
                n_bins: n_emission_bins,
            });
        }

        let cuts = &self.cuts;
        check_finite("chi-square minimum", cuts.chi_square_min)?;
        check_finite("chi-square multiplier", cuts.n_chi_square)?;
        check_finite("sigma deviation", cuts.n_sigma)?;
        check_finite("minimum occupancy", cuts.min_occupancy)?;
        if !(cuts.max_relative_error > 0.0) {
            return Err(ConfigError::NonPositive {
                what: "maximum relative error",
                value: cuts.max_relative_error,
            });
        }
        cuts.avhd_shadowing.validate("AVHD shadowing")?;
        cuts.geo_shadowing.validate("geometric shadowing")?;

        let minimizer = &self.minimizer;
        if minimizer.skip_stride == 0 {
            return Err(ConfigError::ZeroSkipStride);
        }
        if !(minimizer.initial_lambda > 0.0) {
            return Err(ConfigError::NonPositive {
                what: "initial lambda",
                value: minimizer.initial_lambda,
            });
        }
        check_finite("chi-square tolerance", minimizer.chi_square_tolerance)?;

        for &limit in &self.procedure.chi_square_limits {
            if !(limit > 0.0) {
                return Err(ConfigError::NonPositive {
                    what: "chi-square limit",
                    value: limit,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(FitConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_bins_rejected() {
        let mut config = FitConfig::default();
        config.bins.n_phi_bins = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroBins {
                what: "emission phi"
            })
        );
    }

    #[test]
    fn inverted_shadowing_range_rejected() {
        let mut config = FitConfig::default();
        config.cuts.geo_shadowing = Range::new(0.5, 0.1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRange { .. })
        ));
    }

    #[test]
    fn zero_skip_stride_rejected() {
        let mut config = FitConfig::default();
        config.minimizer.skip_stride = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroSkipStride));
    }

    #[test]
    fn nan_initial_value_rejected() {
        let mut config = FitConfig::default();
        config.parameters.water_attenuation.init = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFinite { .. })
        ));
    }

    #[test]
    fn fixed_bin_out_of_range_rejected() {
        let mut config = FitConfig::default();
        config.parameters.fixed_emission_bins = vec![0, 12 * 36];
        assert_eq!(
            config.validate(),
            Err(ConfigError::BinOutOfRange {
                what: "emission",
                bin: 432,
                n_bins: 432
            })
        );
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{
            "name": "scan",
            "bins": {"n_angular_bins": 3, "n_theta_bins": 2, "n_phi_bins": 2},
            "minimizer": {"skip_stride": 2}
        }"#;
        let config: FitConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.name, "scan");
        assert_eq!(config.bins.n_angular_bins, 3);
        assert_eq!(
            config.bins.min_angular_bin_entries,
            BinConfig::default_min_bin_entries()
        );
        assert_eq!(config.minimizer.skip_stride, 2);
        assert_eq!(
            config.minimizer.max_iterations,
            MinimizerConfig::default_max_iterations()
        );
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn serialization() {
        let config = FitConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: FitConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }
}
