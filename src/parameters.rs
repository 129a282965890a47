//! Flat parameter vector of the optics model
//!
//! The vector has a fixed layout: the six global optical constants, the angular response
//! histogram, the emission profile histogram and one normalisation per run:
//!
//! ```text
//! | attenuation x3 | scattering x3 | angular response x A | emission profile x T*P | norm x R |
//! 0                3               6                      6+A                      6+A+T*P   N
//! ```
//!
//! Offsets are computed once by [ParameterLayout] and never change during a fit. A parallel vary
//! flag array tells which parameters the minimizer may move.

use crate::config::{FitConfig, ParametersConfig};
use crate::data::{Dataset, Medium};
use crate::error::ConfigError;

use ndarray::Array1;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Global optical constants, one attenuation and one scattering coefficient per medium
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum GlobalParameter {
    ScintAttenuation,
    AvAttenuation,
    WaterAttenuation,
    ScintScattering,
    AvScattering,
    WaterScattering,
}

impl GlobalParameter {
    pub const N: usize = 6;

    pub const ALL: [GlobalParameter; Self::N] = [
        Self::ScintAttenuation,
        Self::AvAttenuation,
        Self::WaterAttenuation,
        Self::ScintScattering,
        Self::AvScattering,
        Self::WaterScattering,
    ];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::ScintAttenuation => 0,
            Self::AvAttenuation => 1,
            Self::WaterAttenuation => 2,
            Self::ScintScattering => 3,
            Self::AvScattering => 4,
            Self::WaterScattering => 5,
        }
    }

    pub fn attenuation(medium: Medium) -> Self {
        match medium {
            Medium::Scintillator => Self::ScintAttenuation,
            Medium::Acrylic => Self::AvAttenuation,
            Medium::Water => Self::WaterAttenuation,
        }
    }

    pub fn scattering(medium: Medium) -> Self {
        match medium {
            Medium::Scintillator => Self::ScintScattering,
            Medium::Acrylic => Self::AvScattering,
            Medium::Water => Self::WaterScattering,
        }
    }

    /// Medium the coefficient describes
    pub fn medium(self) -> Medium {
        Medium::ALL[self.index() % Medium::N]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ScintAttenuation => "scintillator attenuation",
            Self::AvAttenuation => "acrylic attenuation",
            Self::WaterAttenuation => "water attenuation",
            Self::ScintScattering => "scintillator scattering",
            Self::AvScattering => "acrylic scattering",
            Self::WaterScattering => "water scattering",
        }
    }
}

/// Parameter group a flat index belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterGroup {
    Global(GlobalParameter),
    /// Angular response bin
    AngularResponse(usize),
    /// Emission profile bin, row-major `i_theta * n_phi + i_phi`
    EmissionProfile(usize),
    /// Run normalisation, run position in the dataset
    RunNormalisation(usize),
}

/// Offsets of the parameter groups in the flat vector
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct ParameterLayout {
    n_angular: usize,
    n_theta: usize,
    n_phi: usize,
    n_runs: usize,
}

impl ParameterLayout {
    pub fn new(
        n_angular: usize,
        n_theta: usize,
        n_phi: usize,
        n_runs: usize,
    ) -> Result<Self, ConfigError> {
        if n_angular == 0 {
            return Err(ConfigError::ZeroBins { what: "angular" });
        }
        if n_theta == 0 {
            return Err(ConfigError::ZeroBins {
                what: "emission theta",
            });
        }
        if n_phi == 0 {
            return Err(ConfigError::ZeroBins {
                what: "emission phi",
            });
        }
        if n_runs == 0 {
            return Err(ConfigError::NoRuns);
        }
        Ok(Self {
            n_angular,
            n_theta,
            n_phi,
            n_runs,
        })
    }

    #[inline]
    pub fn n_angular(&self) -> usize {
        self.n_angular
    }

    #[inline]
    pub fn n_theta(&self) -> usize {
        self.n_theta
    }

    #[inline]
    pub fn n_phi(&self) -> usize {
        self.n_phi
    }

    #[inline]
    pub fn n_emission(&self) -> usize {
        self.n_theta * self.n_phi
    }

    #[inline]
    pub fn n_runs(&self) -> usize {
        self.n_runs
    }

    /// Total number of parameters
    #[inline]
    pub fn len(&self) -> usize {
        self.normalisation_offset() + self.n_runs
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    pub fn global_index(&self, parameter: GlobalParameter) -> usize {
        parameter.index()
    }

    #[inline]
    pub fn angular_offset(&self) -> usize {
        GlobalParameter::N
    }

    #[inline]
    pub fn emission_offset(&self) -> usize {
        self.angular_offset() + self.n_angular
    }

    #[inline]
    pub fn normalisation_offset(&self) -> usize {
        self.emission_offset() + self.n_emission()
    }

    #[inline]
    pub fn angular_index(&self, bin: usize) -> usize {
        debug_assert!(bin < self.n_angular);
        self.angular_offset() + bin
    }

    #[inline]
    pub fn emission_index(&self, bin: usize) -> usize {
        debug_assert!(bin < self.n_emission());
        self.emission_offset() + bin
    }

    #[inline]
    pub fn emission_bin_index(&self, i_theta: usize, i_phi: usize) -> usize {
        self.emission_index(i_theta * self.n_phi + i_phi)
    }

    #[inline]
    pub fn normalisation_index(&self, run: usize) -> usize {
        debug_assert!(run < self.n_runs);
        self.normalisation_offset() + run
    }

    pub fn group(&self, index: usize) -> Option<ParameterGroup> {
        if index < self.angular_offset() {
            Some(ParameterGroup::Global(GlobalParameter::ALL[index]))
        } else if index < self.emission_offset() {
            Some(ParameterGroup::AngularResponse(index - self.angular_offset()))
        } else if index < self.normalisation_offset() {
            Some(ParameterGroup::EmissionProfile(index - self.emission_offset()))
        } else if index < self.len() {
            Some(ParameterGroup::RunNormalisation(
                index - self.normalisation_offset(),
            ))
        } else {
            None
        }
    }
}

/// Parameter values, vary flags and the initial values fixed parameters are reset to
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(into = "ParameterVectorSerde", try_from = "ParameterVectorSerde")]
pub struct ParameterVector {
    layout: ParameterLayout,
    values: Array1<f64>,
    vary: Vec<bool>,
    initial: Array1<f64>,
}

impl ParameterVector {
    /// All parameters set to zero and fixed
    pub fn new(layout: ParameterLayout) -> Self {
        Self {
            layout,
            values: Array1::zeros(layout.len()),
            vary: vec![false; layout.len()],
            initial: Array1::zeros(layout.len()),
        }
    }

    /// Initial values and vary flags from the configuration
    ///
    /// Run normalisations start from the run's source intensity ratio when it is available.
    pub fn from_config(config: &FitConfig, dataset: &Dataset) -> Result<Self, ConfigError> {
        config.validate()?;
        let bins = &config.bins;
        let layout = ParameterLayout::new(
            bins.n_angular_bins,
            bins.n_theta_bins,
            bins.n_phi_bins,
            dataset.n_runs(),
        )?;
        let pars = &config.parameters;
        let mut params = Self::new(layout);

        for parameter in GlobalParameter::ALL {
            let init = pars.global(parameter);
            params.init(layout.global_index(parameter), init.init, init.vary);
        }

        let bin_width = 90.0 / bins.n_angular_bins as f64;
        for bin in 0..layout.n_angular() {
            let centre = (bin as f64 + 0.5) * bin_width;
            let value = if centre < ParametersConfig::ANGULAR_SLOPE_CUTOFF_DEG {
                pars.angular_response.init + pars.angular_response_slope * centre
            } else {
                pars.angular_response.init
            };
            params.init(
                layout.angular_index(bin),
                value,
                pars.angular_response.vary,
            );
        }

        for bin in 0..layout.n_emission() {
            params.init(
                layout.emission_index(bin),
                pars.emission_profile.init,
                pars.emission_profile.vary,
            );
        }
        for &bin in &pars.fixed_angular_bins {
            params.set_vary(layout.angular_index(bin), false);
        }
        for &bin in &pars.fixed_emission_bins {
            params.set_vary(layout.emission_index(bin), false);
        }

        for (index, run) in dataset.runs().iter().enumerate() {
            let value = run
                .intensity_ratio()
                .unwrap_or(pars.run_normalisation.init);
            params.init(
                layout.normalisation_index(index),
                value,
                pars.run_normalisation.vary,
            );
        }

        Ok(params)
    }

    fn init(&mut self, index: usize, value: f64, vary: bool) {
        self.values[index] = value;
        self.initial[index] = value;
        self.vary[index] = vary;
    }

    #[inline]
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    #[inline]
    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    #[inline]
    pub fn initial_value(&self, index: usize) -> f64 {
        self.initial[index]
    }

    #[inline]
    pub fn vary_flags(&self) -> &[bool] {
        &self.vary
    }

    #[inline]
    pub fn is_varying(&self, index: usize) -> bool {
        self.vary[index]
    }

    pub fn set_value(&mut self, index: usize, value: f64) {
        self.values[index] = value;
    }

    pub fn set_vary(&mut self, index: usize, vary: bool) {
        self.vary[index] = vary;
    }

    /// Replace all values, e.g. by the minimizer's accepted trial point
    pub fn set_values(&mut self, values: Array1<f64>) {
        assert_eq!(values.len(), self.len(), "parameter vector length mismatch");
        self.values = values;
    }

    /// Fix the parameter and reset it to its initial value
    pub fn fix(&mut self, index: usize) {
        self.vary[index] = false;
        self.values[index] = self.initial[index];
    }

    pub fn global(&self, parameter: GlobalParameter) -> f64 {
        self.values[self.layout.global_index(parameter)]
    }

    pub fn set_global(&mut self, parameter: GlobalParameter, value: f64) {
        let index = self.layout.global_index(parameter);
        self.values[index] = value;
    }

    pub fn angular_response(&self, bin: usize) -> f64 {
        self.values[self.layout.angular_index(bin)]
    }

    pub fn set_angular_response(&mut self, bin: usize, value: f64) {
        let index = self.layout.angular_index(bin);
        self.values[index] = value;
    }

    pub fn emission_profile(&self, bin: usize) -> f64 {
        self.values[self.layout.emission_index(bin)]
    }

    pub fn set_emission_profile(&mut self, bin: usize, value: f64) {
        let index = self.layout.emission_index(bin);
        self.values[index] = value;
    }

    pub fn run_normalisation(&self, run: usize) -> f64 {
        self.values[self.layout.normalisation_index(run)]
    }

    pub fn set_run_normalisation(&mut self, run: usize, value: f64) {
        let index = self.layout.normalisation_index(run);
        self.values[index] = value;
    }

    pub fn n_varying(&self) -> usize {
        self.vary.iter().filter(|&&vary| vary).count()
    }

    /// Flat indices of the varying parameters, ascending
    pub fn varying_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.vary
            .iter()
            .enumerate()
            .filter_map(|(index, &vary)| vary.then_some(index))
    }
}

impl JsonSchema for ParameterVector {
    fn is_referenceable() -> bool {
        false
    }

    fn schema_name() -> String {
        ParameterVectorSerde::schema_name()
    }

    fn json_schema(r#gen: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        ParameterVectorSerde::json_schema(r#gen)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename = "ParameterVector")]
struct ParameterVectorSerde {
    layout: ParameterLayout,
    values: Vec<f64>,
    vary: Vec<bool>,
    initial: Vec<f64>,
}

impl From<ParameterVector> for ParameterVectorSerde {
    fn from(params: ParameterVector) -> Self {
        Self {
            layout: params.layout,
            values: params.values.to_vec(),
            vary: params.vary,
            initial: params.initial.to_vec(),
        }
    }
}

impl TryFrom<ParameterVectorSerde> for ParameterVector {
    type Error = ConfigError;

    fn try_from(serde: ParameterVectorSerde) -> Result<Self, Self::Error> {
        let ParameterLayout {
            n_angular,
            n_theta,
            n_phi,
            n_runs,
        } = serde.layout;
        let layout = ParameterLayout::new(n_angular, n_theta, n_phi, n_runs)?;
        let expected = layout.len();
        for (what, actual) in [
            ("values", serde.values.len()),
            ("vary flags", serde.vary.len()),
            ("initial values", serde.initial.len()),
        ] {
            if actual != expected {
                return Err(ConfigError::LengthMismatch {
                    what,
                    expected,
                    actual,
                });
            }
        }
        Ok(Self {
            layout,
            values: serde.values.into(),
            vary: serde.vary,
            initial: serde.initial.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    use approx::assert_relative_eq;

    #[test]
    fn group_offsets_increase() {
        for n_angular in [1, 3, 90] {
            for n_theta in [1, 2, 12] {
                for n_phi in [1, 2, 36] {
                    for n_runs in [1, 2, 40] {
                        let layout =
                            ParameterLayout::new(n_angular, n_theta, n_phi, n_runs).unwrap();
                        let scattering = layout.global_index(GlobalParameter::ScintScattering);
                        let offsets = [
                            layout.global_index(GlobalParameter::ScintAttenuation),
                            scattering,
                            layout.angular_offset(),
                            layout.emission_offset(),
                            layout.normalisation_offset(),
                            layout.len(),
                        ];
                        assert!(offsets.windows(2).all(|w| w[0] < w[1]), "{offsets:?}");
                        assert_eq!(scattering, 3);
                        assert_eq!(layout.angular_offset(), 6);
                        assert_eq!(
                            layout.len(),
                            6 + n_angular + n_theta * n_phi + n_runs
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn group_covers_every_index_once() {
        let layout = ParameterLayout::new(3, 2, 2, 2).unwrap();
        let groups: Vec<_> = (0..layout.len())
            .map(|i| layout.group(i).unwrap())
            .collect();
        assert_eq!(
            groups[0],
            ParameterGroup::Global(GlobalParameter::ScintAttenuation)
        );
        assert_eq!(
            groups[5],
            ParameterGroup::Global(GlobalParameter::WaterScattering)
        );
        assert_eq!(groups[6], ParameterGroup::AngularResponse(0));
        assert_eq!(groups[8], ParameterGroup::AngularResponse(2));
        assert_eq!(groups[9], ParameterGroup::EmissionProfile(0));
        assert_eq!(groups[12], ParameterGroup::EmissionProfile(3));
        assert_eq!(groups[13], ParameterGroup::RunNormalisation(0));
        assert_eq!(groups[14], ParameterGroup::RunNormalisation(1));
        assert_eq!(layout.group(15), None);
        assert_eq!(layout.emission_bin_index(1, 1), 12);
    }

    #[test]
    fn zero_bins_rejected() {
        assert_eq!(
            ParameterLayout::new(0, 1, 1, 1),
            Err(ConfigError::ZeroBins { what: "angular" })
        );
        assert_eq!(ParameterLayout::new(1, 1, 1, 0), Err(ConfigError::NoRuns));
    }

    #[test]
    fn global_media() {
        for medium in Medium::ALL {
            assert_eq!(GlobalParameter::attenuation(medium).medium(), medium);
            assert_eq!(GlobalParameter::scattering(medium).medium(), medium);
        }
    }

    #[test]
    fn from_config() {
        let dataset = tiny_dataset();
        let mut config = tiny_config();
        config.parameters.angular_response_slope = 0.01;
        config.parameters.fixed_emission_bins = vec![0];
        let params = ParameterVector::from_config(&config, &dataset).unwrap();
        let layout = params.layout();

        assert_eq!(params.len(), 6 + 3 + 4 + 2);
        // Bin centres are 15, 45 and 75 degrees, only the first one is below the slope cutoff
        assert_relative_eq!(params.angular_response(0), 1.0 + 0.01 * 15.0);
        assert_relative_eq!(params.angular_response(1), 1.0);
        assert_relative_eq!(params.angular_response(2), 1.0);
        assert!(params.is_varying(layout.angular_index(0)));
        assert!(!params.is_varying(layout.global_index(GlobalParameter::ScintScattering)));
        assert!(!params.is_varying(layout.emission_index(0)));
        assert!(params.is_varying(layout.emission_index(1)));

        // The first run has source intensity information, the second one doesn't
        assert_relative_eq!(params.run_normalisation(0), 2.0);
        assert_relative_eq!(
            params.run_normalisation(1),
            config.parameters.run_normalisation.init
        );
    }

    #[test]
    fn fix_resets_to_initial() {
        let dataset = tiny_dataset();
        let mut params = ParameterVector::from_config(&tiny_config(), &dataset).unwrap();
        let index = params.layout().emission_index(2);
        let n_varying = params.n_varying();
        params.set_emission_profile(2, 5.0);
        params.fix(index);
        assert_eq!(params.emission_profile(2), params.initial_value(index));
        assert!(!params.is_varying(index));
        assert_eq!(params.n_varying(), n_varying - 1);
        assert!(params.varying_indices().all(|i| i != index));
    }

    #[test]
    fn serialization() {
        let dataset = tiny_dataset();
        let params = ParameterVector::from_config(&tiny_config(), &dataset).unwrap();
        let json = serde_json::to_string(&params).unwrap();
        let restored: ParameterVector = serde_json::from_str(&json).unwrap();
        assert_eq!(params, restored);

        let mut value = serde_json::to_value(&params).unwrap();
        value["vary"] = serde_json::json!([true]);
        let err = serde_json::from_value::<ParameterVector>(value).unwrap_err();
        assert!(err.to_string().contains("vary flags"), "{err}");
    }
}
