//! Observation screening
//!
//! Runs once before the fit and selects the observations entering it. Sensors failing any
//! validity [Cut] are rejected first, then observations with a non-finite ratio, uncertainty or
//! initial chi-square are purged. The remaining ones are compared against the reduced chi-square
//! at the initial parameters, and finally histogram bins with too few entries are frozen together
//! with the observations falling into them.

mod cuts;
pub use cuts::{
    Cut, CutTrait, MinOccupancyCut, QualityFlagsCut, RatioDeviationCut, RelativeErrorCut,
    RunStats, Shadowing, ShadowingCut, VerifiedCut,
};

use crate::config::{BinConfig, CutConfig};
use crate::data::{Dataset, Observation, ObservationKey};
use crate::error::{DataError, FitError};
use crate::indexer::SparseIndexer;
use crate::model::{ModelBins, OpticalModel};
use crate::parameters::ParameterVector;

use conv::ConvUtil;
use itertools::Itertools;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Histogram bins fixed by the bin-population cut
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct FrozenBins {
    pub angular: Vec<usize>,
    pub emission: Vec<usize>,
}

/// Number of observations surviving each screening stage
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ScreeningReport {
    /// Every sensor of every run
    pub n_candidates: usize,
    /// Sensors rejected by each validity cut, a sensor is attributed to the first failing cut
    pub rejected: BTreeMap<String, usize>,
    pub n_valid: usize,
    pub n_finite: usize,
    /// Mean chi-square of the finite observations at the initial parameters
    pub reduced_chi_square: f64,
    pub n_after_chi_square: usize,
    pub n_populated: usize,
    pub frozen_bins: FrozenBins,
    /// Parameters fixed because no surviving observation depends on them
    pub unconstrained: Vec<usize>,
}

/// Output of [DataScreen::screen]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ScreenedData {
    /// Surviving observations with chi-square and residual at the initial parameters
    pub observations: Vec<Observation>,
    pub report: ScreeningReport,
}

/// Screening pipeline
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct DataScreen {
    pub cuts: Vec<Cut>,
    pub chi_square_min: f64,
    pub n_chi_square: f64,
    pub min_angular_bin_entries: usize,
    pub min_emission_bin_entries: usize,
}

impl DataScreen {
    pub fn new(cuts: &CutConfig, bins: &BinConfig) -> Self {
        Self {
            cuts: Cut::from_config(cuts),
            chi_square_min: cuts.chi_square_min,
            n_chi_square: cuts.n_chi_square,
            min_angular_bin_entries: bins.min_angular_bin_entries,
            min_emission_bin_entries: bins.min_emission_bin_entries,
        }
    }

    /// Select the observations entering the fit
    ///
    /// Under-populated bins are fixed in `params` and reset to their initial values.
    pub fn screen(
        &self,
        dataset: &Dataset,
        params: &mut ParameterVector,
    ) -> Result<ScreenedData, FitError> {
        let model = OpticalModel::new(*params.layout());
        let mut report = ScreeningReport {
            n_candidates: dataset.n_sensors(),
            ..Default::default()
        };

        let mut observations = self.validity_cuts(dataset, &mut report.rejected);
        report.n_valid = observations.len();
        tracing::info!(
            n_candidates = report.n_candidates,
            n_valid = report.n_valid,
            "validity cuts applied"
        );

        for obs in observations.iter_mut() {
            let terms = model.terms(dataset, obs.key)?;
            (obs.chi_square, obs.residual) =
                model.chi_square(&terms, params.values(), obs.ratio, obs.sigma);
        }
        observations.retain(Observation::is_finite);
        report.n_finite = observations.len();
        tracing::info!(n_finite = report.n_finite, "non-finite observations purged");

        report.reduced_chi_square = observations.iter().map(|obs| obs.chi_square).sum::<f64>()
            / observations.len().approx_as::<f64>().unwrap_or(f64::NAN);
        let max_chi_square = report.reduced_chi_square * self.n_chi_square;
        observations.retain(|obs| {
            !(obs.chi_square > max_chi_square) && !(obs.chi_square < self.chi_square_min)
        });
        report.n_after_chi_square = observations.len();
        tracing::info!(
            reduced_chi_square = report.reduced_chi_square,
            n_after_chi_square = report.n_after_chi_square,
            "initial chi-square cut applied"
        );

        let (observations, frozen_bins) =
            self.bin_population_cut(dataset, observations, params)?;
        report.n_populated = observations.len();
        tracing::info!(
            n_populated = report.n_populated,
            n_frozen_angular = frozen_bins.angular.len(),
            n_frozen_emission = frozen_bins.emission.len(),
            "bin population cut applied"
        );
        report.frozen_bins = frozen_bins;

        if observations.is_empty() {
            tracing::warn!("no observations survived screening");
            return Err(FitError::NoObservations);
        }

        report.unconstrained = self.fix_unconstrained(dataset, &observations, params)?;
        if !report.unconstrained.is_empty() {
            tracing::info!(
                unconstrained = ?report.unconstrained,
                "parameters without observations fixed"
            );
        }
        Ok(ScreenedData {
            observations,
            report,
        })
    }

    fn validity_cuts(
        &self,
        dataset: &Dataset,
        rejected: &mut BTreeMap<String, usize>,
    ) -> Vec<Observation> {
        let mut observations = vec![];
        for (run_index, run) in dataset.runs().iter().enumerate() {
            let stats = RunStats::new(run);
            for (sensor_index, sensor) in run.sensors.iter().enumerate() {
                match self.cuts.iter().find(|cut| !cut.passes(sensor, &stats)) {
                    Some(cut) => *rejected.entry(cut.name().to_owned()).or_default() += 1,
                    None => {
                        let (ratio, sigma) = sensor.occupancy_ratio();
                        let key = ObservationKey::new(run_index, sensor_index);
                        observations.push(Observation::new(key, ratio, sigma));
                    }
                }
            }
        }
        observations
    }

    /// Freeze under-populated bins and drop the observations falling into them
    ///
    /// Populations are counted over the off-axis bins of the given observations. An observation
    /// is dropped if its off-axis angular or emission bin is under-populated, which may make other
    /// bins under-populated, so the cut is repeated until nothing changes. Under-populated
    /// reference bins are frozen but keep their observations: a centred source lights every
    /// sensor at normal incidence. Applying the cut to its own output is a no-op.
    pub fn bin_population_cut(
        &self,
        dataset: &Dataset,
        observations: Vec<Observation>,
        params: &mut ParameterVector,
    ) -> Result<(Vec<Observation>, FrozenBins), DataError> {
        let model = OpticalModel::new(*params.layout());
        let layout = *params.layout();
        let mut entries = observations
            .into_iter()
            .map(|obs| Ok((model.terms(dataset, obs.key)?.bins, obs)))
            .collect::<Result<Vec<(ModelBins, Observation)>, DataError>>()?;

        let sparse = |counts: &HashMap<usize, usize>, n_bins: usize, min_entries: usize| {
            (0..n_bins)
                .map(|bin| counts.get(&bin).copied().unwrap_or(0) < min_entries)
                .collect::<Vec<_>>()
        };
        // Populations only decrease, so the final sparse sets include all previous ones
        let (sparse_angular, sparse_emission) = loop {
            let angular_counts = entries.iter().map(|(bins, _)| bins.angular).counts();
            let emission_counts = entries.iter().map(|(bins, _)| bins.emission).counts();
            let sparse_angular = sparse(
                &angular_counts,
                layout.n_angular(),
                self.min_angular_bin_entries,
            );
            let sparse_emission = sparse(
                &emission_counts,
                layout.n_emission(),
                self.min_emission_bin_entries,
            );

            let n_before = entries.len();
            entries.retain(|(bins, _)| {
                !sparse_angular[bins.angular] && !sparse_emission[bins.emission]
            });
            if entries.len() == n_before {
                break (sparse_angular, sparse_emission);
            }
        };

        let frozen = FrozenBins {
            angular: sparse_angular.iter().positions(|&is_sparse| is_sparse).collect(),
            emission: sparse_emission
                .iter()
                .positions(|&is_sparse| is_sparse)
                .collect(),
        };
        for &bin in &frozen.angular {
            params.fix(layout.angular_index(bin));
        }
        for &bin in &frozen.emission {
            params.fix(layout.emission_index(bin));
        }

        Ok((entries.into_iter().map(|(_, obs)| obs).collect(), frozen))
    }

    /// Fix and reset the varying parameters none of the observations depends on
    ///
    /// Returns their indices in ascending order. A run losing all of its sensors leaves its
    /// normalisation unconstrained, and so does a bin reached by no observation.
    pub fn fix_unconstrained(
        &self,
        dataset: &Dataset,
        observations: &[Observation],
        params: &mut ParameterVector,
    ) -> Result<Vec<usize>, DataError> {
        let model = OpticalModel::new(*params.layout());
        let bins = observations
            .iter()
            .map(|obs| Ok(model.terms(dataset, obs.key)?.bins))
            .collect::<Result<Vec<_>, DataError>>()?;
        let unconstrained = SparseIndexer::new(params).unconstrained(&bins);
        for &index in &unconstrained {
            params.fix(index);
        }
        Ok(unconstrained)
    }
}
