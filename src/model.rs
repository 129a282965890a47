//! Optical model of the occupancy ratio
//!
//! The predicted ratio of the off-axis over the central occupancy of a sensor is
//!
//! $$
//! \mathrm{norm} \frac{A(\theta) E(\theta_e, \phi_e)}{A(\theta_\mathrm{ref}) E(\theta_{e,\mathrm{ref}}, \phi_{e,\mathrm{ref}})}
//! \frac{\Omega}{\Omega_\mathrm{ref}} \frac{T}{T_\mathrm{ref}}
//! \exp\left(-\sum_m \Delta d_m (\alpha_m + \sigma_m)\right),
//! $$
//!
//! where $A$ is the angular response histogram indexed by the incidence angle, $E$ is the source
//! emission profile histogram indexed by the emission direction, $\Omega$ is the solid angle, $T$
//! is the Fresnel transmission coefficient and $\Delta d_m$ is the difference of the path lengths
//! through medium $m$ with attenuation $\alpha_m$ and scattering $\sigma_m$ coefficients.

use crate::data::{Dataset, Medium, ObservationKey, Run, RunKind, Sensor, SourceState};
use crate::error::DataError;
use crate::indexer::ActiveParameters;
use crate::parameters::{GlobalParameter, ParameterLayout};

use ndarray::Array1;
use std::f64::consts::{PI, TAU};

/// Angular response bin of the incidence angle with cosine `cos_theta`
///
/// Bins are uniform in the angle over [0, 90] degrees, out-of-range angles go to the edge bins.
pub fn angular_bin(cos_theta: f64, n_bins: usize) -> usize {
    let angle = cos_theta.clamp(-1.0, 1.0).acos().to_degrees();
    let bin = (angle * n_bins as f64 / 90.0).floor();
    clamp_bin(bin, n_bins)
}

/// Cosine of the polar angle and the azimuthal angle of the emission direction in the source
/// frame
///
/// A rotated source (non-zero polar orientation) has no azimuthal dependence, only the angle
/// between its axis and the sensor direction is used.
pub fn emission_direction(source: &SourceState, rel_theta: f64, rel_phi: f64) -> (f64, f64) {
    let (cos_theta, phi) = if source.theta != 0.0 {
        let axis = unit_vector(source.theta, source.phi);
        let direction = unit_vector(rel_theta, rel_phi);
        let dot = axis
            .iter()
            .zip(direction.iter())
            .map(|(a, b)| a * b)
            .sum::<f64>();
        (dot, 0.0)
    } else {
        (rel_theta.cos(), (source.phi + rel_phi) % TAU)
    };
    let phi = if phi < 0.0 { phi + TAU } else { phi };
    (cos_theta.clamp(-1.0, 1.0), phi)
}

fn unit_vector(theta: f64, phi: f64) -> [f64; 3] {
    let (sin_theta, cos_theta) = theta.sin_cos();
    let (sin_phi, cos_phi) = phi.sin_cos();
    [sin_theta * cos_phi, sin_theta * sin_phi, cos_theta]
}

/// Row-major emission profile bin `i_theta * n_phi + i_phi`
///
/// Theta bins are uniform in the cosine over [-1, 1], phi bins are uniform over [0, 2pi).
/// Out-of-range values go to the edge bins, so `cos_theta = 1` is in the last theta bin.
pub fn emission_bin(cos_theta: f64, phi: f64, n_theta: usize, n_phi: usize) -> usize {
    let i_theta = clamp_bin(((1.0 + cos_theta) / 2.0 * n_theta as f64).floor(), n_theta);
    let i_phi = clamp_bin((phi / (2.0 * PI) * n_phi as f64).floor(), n_phi);
    i_theta * n_phi + i_phi
}

fn clamp_bin(bin: f64, n_bins: usize) -> usize {
    if bin.is_nan() || bin < 0.0 {
        0
    } else if bin >= n_bins as f64 {
        n_bins - 1
    } else {
        bin as usize
    }
}

/// Histogram bins an observation depends on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelBins {
    /// Angular response bin of the off-axis run
    pub angular: usize,
    /// Angular response bin of the central run
    pub angular_ref: usize,
    /// Emission profile bin of the off-axis run
    pub emission: usize,
    /// Emission profile bin of the central run
    pub emission_ref: usize,
    /// Run position in the dataset
    pub run: usize,
}

/// Parameter-independent inputs of the model for a single observation
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationTerms {
    pub key: ObservationKey,
    pub bins: ModelBins,
    /// Off-axis minus central path lengths, indexed by [Medium::index]
    pub delta_path_lengths: [f64; Medium::N],
    /// Off-axis over central solid angle
    pub solid_angle_ratio: f64,
    /// Off-axis over central Fresnel transmission coefficient
    pub fresnel_ratio: f64,
}

/// Evaluates the model for a fixed parameter layout
#[derive(Clone, Copy, Debug)]
pub struct OpticalModel {
    layout: ParameterLayout,
}

impl OpticalModel {
    pub fn new(layout: ParameterLayout) -> Self {
        Self { layout }
    }

    #[inline]
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// Angular response and emission profile bins of a sensor in one exposure of a run
    ///
    /// `None` if the run or the sensor has no data for the exposure.
    pub fn exposure_bins(
        &self,
        run: &Run,
        sensor: &Sensor,
        kind: RunKind,
    ) -> Option<(usize, usize)> {
        let source = run.source(kind)?;
        let geometry = sensor.geometry(kind)?;
        let layout = &self.layout;
        let angular = angular_bin(geometry.cos_theta, layout.n_angular());
        let (cos_theta_e, phi_e) = emission_direction(source, geometry.rel_theta, geometry.rel_phi);
        let emission = emission_bin(cos_theta_e, phi_e, layout.n_theta(), layout.n_phi());
        Some((angular, emission))
    }

    /// Bins and geometry ratios of the observation, computed once before the fit
    pub fn terms(
        &self,
        dataset: &Dataset,
        key: ObservationKey,
    ) -> Result<ObservationTerms, DataError> {
        let (run, sensor) = dataset.get(key)?;
        let bins_of = |kind: RunKind| {
            self.exposure_bins(run, sensor, kind)
                .ok_or(DataError::MissingExposure { key, kind })
        };
        let (angular, emission) = bins_of(RunKind::OffAxis)?;
        let (angular_ref, emission_ref) = bins_of(RunKind::Central)?;

        Ok(ObservationTerms {
            key,
            bins: ModelBins {
                angular,
                angular_ref,
                emission,
                emission_ref,
                run: key.run,
            },
            delta_path_lengths: Medium::ALL.map(|medium| sensor.delta_path_length(medium)),
            solid_angle_ratio: sensor.off_axis.solid_angle / sensor.central.solid_angle,
            fresnel_ratio: sensor.off_axis.fresnel_t_coeff / sensor.central.fresnel_t_coeff,
        })
    }

    fn extinction(&self, terms: &ObservationTerms, values: &Array1<f64>) -> f64 {
        Medium::ALL
            .iter()
            .map(|&medium| {
                let attenuation = values[GlobalParameter::attenuation(medium).index()];
                let scattering = values[GlobalParameter::scattering(medium).index()];
                terms.delta_path_lengths[medium.index()] * (attenuation + scattering)
            })
            .sum()
    }

    /// Predicted occupancy ratio
    pub fn predict(&self, terms: &ObservationTerms, values: &Array1<f64>) -> f64 {
        let layout = &self.layout;
        let bins = &terms.bins;
        let norm = values[layout.normalisation_index(bins.run)];
        let angular = values[layout.angular_index(bins.angular)];
        let angular_ref = values[layout.angular_index(bins.angular_ref)];
        let emission = values[layout.emission_index(bins.emission)];
        let emission_ref = values[layout.emission_index(bins.emission_ref)];
        norm * angular * emission * terms.solid_angle_ratio * terms.fresnel_ratio
            * f64::exp(-self.extinction(terms, values))
            / (angular_ref * emission_ref)
    }

    /// Predicted occupancy ratio and its derivatives over the active parameters
    ///
    /// `derivatives[l]` is set to the derivative over the parameter `active[l]`, the rest of the
    /// slice is untouched.
    pub fn predict_with_derivatives(
        &self,
        terms: &ObservationTerms,
        values: &Array1<f64>,
        active: &ActiveParameters,
        derivatives: &mut [f64],
    ) -> f64 {
        let predicted = self.predict(terms, values);
        let layout = &self.layout;
        let bins = &terms.bins;

        let angular_index = layout.angular_index(bins.angular);
        let angular_ref_index = layout.angular_index(bins.angular_ref);
        let emission_index = layout.emission_index(bins.emission);
        let emission_ref_index = layout.emission_index(bins.emission_ref);
        let norm_index = layout.normalisation_index(bins.run);

        // Log-derivative of a histogram ratio h[i] / h[ref] over the bin `index`
        let ratio_log_derivative = |index: usize, numerator: usize, denominator: usize| {
            let mut d = 0.0;
            if index == numerator {
                d += 1.0 / values[numerator];
            }
            if index == denominator {
                d -= 1.0 / values[denominator];
            }
            d
        };

        for (d, &index) in derivatives.iter_mut().zip(active.iter()) {
            let log_derivative = if index < layout.angular_offset() {
                let medium = GlobalParameter::ALL[index].medium();
                -terms.delta_path_lengths[medium.index()]
            } else if index < layout.emission_offset() {
                ratio_log_derivative(index, angular_index, angular_ref_index)
            } else if index < layout.normalisation_offset() {
                ratio_log_derivative(index, emission_index, emission_ref_index)
            } else if index == norm_index {
                1.0 / values[norm_index]
            } else {
                0.0
            };
            *d = log_derivative * predicted;
        }
        predicted
    }

    /// Chi-square contribution and the data minus model residual of a measured ratio
    pub fn chi_square(
        &self,
        terms: &ObservationTerms,
        values: &Array1<f64>,
        ratio: f64,
        sigma: f64,
    ) -> (f64, f64) {
        let residual = ratio - self.predict(terms, values);
        (residual.powi(2) / sigma.powi(2), residual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::SparseIndexer;
    use crate::parameters::ParameterVector;
    use crate::tests::*;

    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn angular_bins() {
        assert_eq!(angular_bin(1.0, 90), 0);
        assert_eq!(angular_bin(0.0, 90), 89);
        assert_eq!(angular_bin(-0.5, 90), 89);
        assert_eq!(angular_bin(f64::to_radians(45.0).cos(), 3), 1);
        assert_eq!(angular_bin(f64::to_radians(29.0).cos(), 3), 0);
        assert_eq!(angular_bin(f64::to_radians(31.0).cos(), 3), 1);
    }

    #[test]
    fn emission_bin_forward_direction_is_last_theta_bin() {
        for n_theta in [1, 2, 12] {
            for n_phi in [1, 3, 36] {
                let bin = emission_bin(1.0, 0.0, n_theta, n_phi);
                assert_eq!(bin / n_phi, n_theta - 1);
                assert_eq!(bin % n_phi, 0);
            }
        }
    }

    #[test]
    fn emission_bin_edges() {
        assert_eq!(emission_bin(-1.0, 0.0, 12, 36), 0);
        assert_eq!(emission_bin(-1.0, TAU, 12, 36), 35);
        assert_eq!(emission_bin(0.1, PI, 2, 2), 3);
        assert_eq!(emission_bin(-0.1, 0.5 * PI, 2, 2), 0);
    }

    #[test]
    fn emission_direction_untilted_source() {
        let source = source_state(0.0, 1.5);
        let (cos_theta, phi) = emission_direction(&source, 0.3, 5.5);
        assert_relative_eq!(cos_theta, 0.3_f64.cos());
        assert_relative_eq!(phi, 7.0 - TAU, epsilon = 1e-12);
    }

    #[test]
    fn emission_direction_tilted_source() {
        let source = source_state(0.5 * PI, 0.0);
        // Sensor direction along the tilted source axis
        let (cos_theta, phi) = emission_direction(&source, 0.5 * PI, 0.0);
        assert_relative_eq!(cos_theta, 1.0, epsilon = 1e-12);
        assert_eq!(phi, 0.0);
        // Sensor direction perpendicular to the axis
        let (cos_theta, _) = emission_direction(&source, 0.0, 0.0);
        assert_abs_diff_eq!(cos_theta, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn prediction_matches_synthetic_truth() {
        let truth = SyntheticTruth::default();
        let dataset = synthetic_dataset(&truth);
        let config = synthetic_config();
        let mut params = ParameterVector::from_config(&config, &dataset).unwrap();
        truth.apply(&mut params);
        let model = OpticalModel::new(*params.layout());
        for key in dataset.keys() {
            let terms = model.terms(&dataset, key).unwrap();
            let (_, sensor) = dataset.get(key).unwrap();
            let (ratio, _) = sensor.occupancy_ratio();
            assert_relative_eq!(model.predict(&terms, params.values()), ratio, max_relative = 1e-12);
        }
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let truth = SyntheticTruth::default();
        let dataset = synthetic_dataset(&truth);
        let mut config = synthetic_config();
        config.parameters.scint_scattering.vary = true;
        config.parameters.av_scattering.vary = true;
        config.parameters.water_scattering.vary = true;
        let mut params = ParameterVector::from_config(&config, &dataset).unwrap();
        truth.apply(&mut params);
        let model = OpticalModel::new(*params.layout());
        let indexer = SparseIndexer::new(&params);

        for key in dataset.keys() {
            let terms = model.terms(&dataset, key).unwrap();
            let active = indexer.active_parameters(&terms.bins);
            let mut derivatives = [0.0; ActiveParameters::CAPACITY];
            let predicted = model.predict_with_derivatives(
                &terms,
                params.values(),
                &active,
                &mut derivatives,
            );
            assert_relative_eq!(predicted, model.predict(&terms, params.values()));

            for (&d, &index) in derivatives.iter().zip(active.iter()) {
                let h = 1e-6 * params.value(index).abs().max(1e-3);
                let mut plus = params.values().clone();
                plus[index] += h;
                let mut minus = params.values().clone();
                minus[index] -= h;
                let numeric =
                    (model.predict(&terms, &plus) - model.predict(&terms, &minus)) / (2.0 * h);
                assert_abs_diff_eq!(d, numeric, epsilon = 1e-6 * predicted.abs().max(1.0));
            }
        }
    }

    #[test]
    fn chi_square_and_residual() {
        let truth = SyntheticTruth::default();
        let dataset = synthetic_dataset(&truth);
        let mut params = ParameterVector::from_config(&synthetic_config(), &dataset).unwrap();
        truth.apply(&mut params);
        let model = OpticalModel::new(*params.layout());
        let key = ObservationKey::new(0, 0);
        let terms = model.terms(&dataset, key).unwrap();
        let predicted = model.predict(&terms, params.values());
        let (chi2, residual) = model.chi_square(&terms, params.values(), predicted + 0.2, 0.1);
        assert_relative_eq!(residual, 0.2, epsilon = 1e-12);
        assert_relative_eq!(chi2, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn wavelength_exposure() {
        let dataset = tiny_dataset();
        let params = ParameterVector::from_config(&tiny_config(), &dataset).unwrap();
        let model = OpticalModel::new(*params.layout());
        let mut run = dataset.runs()[0].clone();
        let mut sensor = run.sensors[0].clone();

        let terms = model.terms(&dataset, ObservationKey::new(0, 0)).unwrap();
        assert_eq!(
            model.exposure_bins(&run, &sensor, RunKind::OffAxis),
            Some((terms.bins.angular, terms.bins.emission))
        );
        assert_eq!(model.exposure_bins(&run, &sensor, RunKind::Wavelength), None);

        run.wavelength = Some(source_state(0.0, 0.0));
        assert_eq!(model.exposure_bins(&run, &sensor, RunKind::Wavelength), None);
        let mut wavelength = geometry(500.0, 22.4);
        wavelength.cos_theta = 0.0;
        sensor.wavelength = Some(wavelength);
        // Grazing incidence, emission along the source axis
        assert_eq!(
            model.exposure_bins(&run, &sensor, RunKind::Wavelength),
            Some((2, 2))
        );
    }

    #[test]
    fn missing_sensor() {
        let dataset = tiny_dataset();
        let params = ParameterVector::from_config(&tiny_config(), &dataset).unwrap();
        let model = OpticalModel::new(*params.layout());
        let key = ObservationKey::new(0, 1000);
        assert_eq!(model.terms(&dataset, key), Err(DataError::MissingSensor(key)));
    }
}
