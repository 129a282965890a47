use crate::config::MinimizerConfig;
use crate::error::SingularMatrix;
use crate::indexer::SparseIndexer;
use crate::model::OpticalModel;
use crate::nl_fit::data::{Diagnostics, FitData};
use crate::nl_fit::lm::LmState;

use ndarray::{Array1, Array2};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How the minimization ended
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum FitStatus {
    /// Chi-square stopped changing
    Converged,
    /// Iteration limit reached before the chi-square settled
    MaxIterations,
    /// Damped or final curvature matrix is singular, parameters are the best found so far
    Singular(SingularMatrix),
}

impl FitStatus {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Converged)
    }

    pub fn reason(&self) -> String {
        match self {
            Self::Converged => "fit converged".to_owned(),
            Self::MaxIterations => "maximum number of iterations reached".to_owned(),
            Self::Singular(singular) => singular.to_string(),
        }
    }
}

/// Output of [LevenbergMarquardtFit::curve_fit]
#[derive(Clone, Debug)]
pub struct CurveFitResult {
    /// Full-order parameter vector
    pub values: Array1<f64>,
    pub chi_square: f64,
    /// Full-order covariance matrix, fixed parameters have zero rows and columns
    pub covariance: Array2<f64>,
    pub diagnostics: Diagnostics,
    pub n_iterations: usize,
    pub status: FitStatus,
}

/// Levenberg-Marquardt driver
///
/// Steps are repeated until the chi-square changes by less than `chi_square_tolerance` for
/// `n_good_iterations` consecutive steps, `max_iterations` is reached or the damped curvature
/// matrix turns out to be singular. The covariance is then estimated from the undamped curvature
/// matrix.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LevenbergMarquardtFit {
    pub max_iterations: usize,
    pub chi_square_tolerance: f64,
    pub n_good_iterations: usize,
    pub initial_lambda: f64,
}

impl LevenbergMarquardtFit {
    pub fn new(
        max_iterations: usize,
        chi_square_tolerance: f64,
        n_good_iterations: usize,
        initial_lambda: f64,
    ) -> Self {
        Self {
            max_iterations,
            chi_square_tolerance,
            n_good_iterations,
            initial_lambda,
        }
    }

    pub fn curve_fit(
        &self,
        data: &FitData,
        model: &OpticalModel,
        indexer: &SparseIndexer,
        values: Array1<f64>,
    ) -> CurveFitResult {
        let mut state = LmState::new(data, model, indexer, values, self.initial_lambda);
        tracing::debug!(
            chi_square = state.chi_square(),
            n_fit = indexer.n_fit(),
            "starting Levenberg-Marquardt minimization"
        );

        let mut n_iterations = 0;
        let mut n_good = 0;
        let mut singular = None;
        while n_good < self.n_good_iterations && n_iterations < self.max_iterations {
            let old_chi_square = state.chi_square();
            let outcome = state.step();
            n_iterations += 1;
            tracing::debug!(
                iteration = n_iterations,
                chi_square = outcome.chi_square,
                lambda = outcome.lambda,
                accepted = outcome.accepted,
                "Levenberg-Marquardt step"
            );
            if let Some(err) = outcome.singular {
                tracing::warn!(iteration = n_iterations, "{err}");
                singular = Some(err);
                break;
            }
            if (old_chi_square - outcome.chi_square).abs() < self.chi_square_tolerance {
                n_good += 1;
            } else {
                n_good = 0;
            }
        }

        let solution = state.finish();
        if let (None, Some(err)) = (singular, solution.singular) {
            tracing::warn!("covariance is not available: {err}");
        }
        let status = match singular.or(solution.singular) {
            Some(err) => FitStatus::Singular(err),
            None if n_good < self.n_good_iterations => FitStatus::MaxIterations,
            None => FitStatus::Converged,
        };
        CurveFitResult {
            values: solution.values,
            chi_square: solution.chi_square,
            covariance: solution.covariance,
            diagnostics: solution.diagnostics,
            n_iterations,
            status,
        }
    }
}

impl From<&MinimizerConfig> for LevenbergMarquardtFit {
    fn from(config: &MinimizerConfig) -> Self {
        Self::new(
            config.max_iterations,
            config.chi_square_tolerance,
            config.n_good_iterations,
            config.initial_lambda,
        )
    }
}

impl Default for LevenbergMarquardtFit {
    fn default() -> Self {
        (&MinimizerConfig::default()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    use approx::assert_relative_eq;

    #[test]
    fn default_matches_config() {
        let fitter = LevenbergMarquardtFit::default();
        assert_eq!(fitter.max_iterations, 1000);
        assert_eq!(fitter.n_good_iterations, 4);
        assert_eq!(fitter.initial_lambda, 1e-3);
    }

    #[test]
    fn max_iterations() {
        let dataset = synthetic_dataset(&SyntheticTruth::default());
        let (params, observations) = synthetic_observations(&dataset);
        let model = OpticalModel::new(*params.layout());
        let indexer = SparseIndexer::new(&params);
        let data = FitData::new(&dataset, &model, &observations, 1).unwrap();
        let fitter = LevenbergMarquardtFit::new(2, 0.0, 4, 1e-3);
        let result = fitter.curve_fit(&data, &model, &indexer, params.values().clone());
        assert_eq!(result.n_iterations, 2);
        assert_eq!(result.status, FitStatus::MaxIterations);
        assert!(!result.status.is_success());
    }

    #[test]
    fn converges_to_zero_chi_square() {
        let truth = SyntheticTruth::default();
        let dataset = synthetic_dataset(&truth);
        let (params, observations) = synthetic_observations(&dataset);
        let model = OpticalModel::new(*params.layout());
        let indexer = SparseIndexer::new(&params);
        let data = FitData::new(&dataset, &model, &observations, 1).unwrap();
        let fitter = LevenbergMarquardtFit::new(1000, 1e-12, 10, 1e-3);
        let result = fitter.curve_fit(&data, &model, &indexer, params.values().clone());

        assert_eq!(result.status, FitStatus::Converged, "{}", result.status.reason());
        assert!(result.chi_square < 1e-12, "chi2 = {}", result.chi_square);
        let mut expected = params.clone();
        truth.apply(&mut expected);
        for &index in indexer.varying() {
            assert_relative_eq!(
                result.values[index],
                expected.value(index),
                max_relative = 1e-4,
                epsilon = 1e-8
            );
        }
        for &index in indexer.varying() {
            assert!(result.covariance[(index, index)] > 0.0);
        }
    }
}
