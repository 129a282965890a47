use crate::config::FitConfig;
use crate::data::{Dataset, Observation};
use crate::error::{ConfigError, FitError};
use crate::indexer::SparseIndexer;
use crate::model::OpticalModel;
use crate::nl_fit::{CurveFitResult, FitData, FitStatus, LevenbergMarquardtFit};
use crate::parameters::ParameterVector;
use crate::screening::{DataScreen, ScreenedData};

use conv::ConvUtil;
use ndarray::Array2;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Optics calibration fit of a set of runs
///
/// The fit goes through three stages: [OpticsFit::new] validates the inputs and initialises the
/// parameters, [OpticsFit::screen] selects the observations and [OpticsFit::perform_fit] runs
/// the minimizer over them. Parameters may be adjusted with [OpticsFit::parameters_mut] between
/// the stages.
#[derive(Clone, Debug)]
pub struct OpticsFit {
    config: FitConfig,
    dataset: Dataset,
    params: ParameterVector,
    screened: Option<ScreenedData>,
}

impl OpticsFit {
    pub fn new(config: FitConfig, dataset: Dataset) -> Result<Self, FitError> {
        config.validate()?;
        dataset.validate()?;
        let params = ParameterVector::from_config(&config, &dataset)?;
        tracing::info!(
            name = %config.name,
            n_runs = dataset.n_runs(),
            n_sensors = dataset.n_sensors(),
            n_parameters = params.len(),
            n_varying = params.n_varying(),
            "optics fit parameters initialised"
        );
        Ok(Self {
            config,
            dataset,
            params,
            screened: None,
        })
    }

    #[inline]
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    #[inline]
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    #[inline]
    pub fn parameters(&self) -> &ParameterVector {
        &self.params
    }

    #[inline]
    pub fn parameters_mut(&mut self) -> &mut ParameterVector {
        &mut self.params
    }

    /// Output of the latest [OpticsFit::screen] call
    #[inline]
    pub fn screened(&self) -> Option<&ScreenedData> {
        self.screened.as_ref()
    }

    /// Run the screening pipeline at the current parameters
    pub fn screen(&mut self) -> Result<&ScreenedData, FitError> {
        let screen = DataScreen::new(&self.config.cuts, &self.config.bins);
        let screened = screen.screen(&self.dataset, &mut self.params)?;
        Ok(self.screened.insert(screened))
    }

    /// Fit the screened observations
    ///
    /// The first pass uses every screened observation. Each of the configured chi-square limits
    /// then starts another pass over the screened observations having a chi-square below the
    /// limit at the current parameters. Every pass starts where the previous one stopped, the
    /// result of the last pass is returned.
    pub fn perform_fit(&mut self) -> Result<FitResult, FitError> {
        let screened = self
            .screened
            .as_ref()
            .ok_or(FitError::NotScreened)?
            .observations
            .clone();
        if self.params.n_varying() == 0 {
            return Err(FitError::NoFreeParameters);
        }

        let model = OpticalModel::new(*self.params.layout());
        let fitter = LevenbergMarquardtFit::from(&self.config.minimizer);

        let mut observations = screened.clone();
        let mut curve_fit = self.fit_pass(&model, &fitter, &observations)?;
        let limits = self.config.procedure.chi_square_limits.clone();
        for limit in limits {
            observations = vec![];
            for obs in &screened {
                let terms = model.terms(&self.dataset, obs.key)?;
                let (chi_square, residual) =
                    model.chi_square(&terms, self.params.values(), obs.ratio, obs.sigma);
                if chi_square < limit {
                    observations.push(Observation {
                        chi_square,
                        residual,
                        ..obs.clone()
                    });
                }
            }
            tracing::info!(
                limit,
                n_observations = observations.len(),
                "observations selected for the next pass"
            );
            if observations.is_empty() {
                tracing::warn!(limit, "no observations below the chi-square limit");
                return Err(FitError::NoObservations);
            }
            curve_fit = self.fit_pass(&model, &fitter, &observations)?;
        }

        for (obs, (&chi_square, &residual)) in observations.iter_mut().zip(
            curve_fit
                .diagnostics
                .chi_square
                .iter()
                .zip(curve_fit.diagnostics.residual.iter()),
        ) {
            obs.chi_square = chi_square;
            obs.residual = residual;
        }
        Ok(FitResult {
            parameters: self.params.clone(),
            covariance: curve_fit.covariance,
            chi_square: curve_fit.chi_square,
            observations,
            n_iterations: curve_fit.n_iterations,
            status: curve_fit.status,
        })
    }

    /// Single minimizer run from the current parameters
    ///
    /// Varying parameters the selected observations do not depend on are held at their current
    /// values for this pass only.
    fn fit_pass(
        &mut self,
        model: &OpticalModel,
        fitter: &LevenbergMarquardtFit,
        observations: &[Observation],
    ) -> Result<CurveFitResult, FitError> {
        let data = FitData::new(
            &self.dataset,
            model,
            observations,
            self.config.minimizer.skip_stride,
        )?;
        let held = SparseIndexer::new(&self.params)
            .unconstrained(data.used_indices().map(|i| &data.terms[i].bins));
        if !held.is_empty() {
            tracing::warn!(held = ?held, "parameters without observations held for this pass");
        }
        for &index in &held {
            self.params.set_vary(index, false);
        }
        let indexer = SparseIndexer::new(&self.params);
        let result = if indexer.n_fit() == 0 {
            Err(FitError::NoFreeParameters)
        } else {
            Ok(fitter.curve_fit(&data, model, &indexer, self.params.values().clone()))
        };
        for &index in &held {
            self.params.set_vary(index, true);
        }
        let result = result?;
        self.params.set_values(result.values.clone());
        tracing::info!(
            chi_square = result.chi_square,
            n_observations = observations.len(),
            n_iterations = result.n_iterations,
            status = ?result.status,
            "fit pass finished"
        );
        if let FitStatus::Singular(err) = result.status {
            if self.config.minimizer.escalate_singular {
                return Err(err.into());
            }
        }
        Ok(result)
    }
}

/// Output of [OpticsFit::perform_fit]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(into = "FitResultSerde", try_from = "FitResultSerde")]
pub struct FitResult {
    /// Best-fit parameters, including the frozen ones
    pub parameters: ParameterVector,
    /// Full-order covariance
    ///
    /// Fixed parameters and parameters the last pass did not reach have zero rows and columns.
    pub covariance: Array2<f64>,
    pub chi_square: f64,
    /// Observations of the last pass, chi-square and residual are at the best-fit parameters
    ///
    /// Observations skipped by the minimizer's stride have NaN chi-square and residual.
    pub observations: Vec<Observation>,
    pub n_iterations: usize,
    pub status: FitStatus,
}

impl FitResult {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn reason(&self) -> String {
        self.status.reason()
    }

    /// Square root of the covariance diagonal element
    pub fn error(&self, index: usize) -> f64 {
        self.covariance[(index, index)].sqrt()
    }

    /// Number of fitted observations minus the number of varying parameters
    pub fn degrees_of_freedom(&self) -> isize {
        let n_observations = self.observations.len().approx_as::<isize>().unwrap_or(isize::MAX);
        let n_varying = self.parameters.n_varying().approx_as::<isize>().unwrap_or(isize::MAX);
        n_observations - n_varying
    }

    pub fn reduced_chi_square(&self) -> f64 {
        self.chi_square / self.degrees_of_freedom().approx_as::<f64>().unwrap_or(f64::NAN)
    }
}

impl JsonSchema for FitResult {
    fn is_referenceable() -> bool {
        false
    }

    fn schema_name() -> String {
        FitResultSerde::schema_name()
    }

    fn json_schema(r#gen: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        FitResultSerde::json_schema(r#gen)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename = "FitResult")]
struct FitResultSerde {
    parameters: ParameterVector,
    /// Row-major
    covariance: Vec<Vec<f64>>,
    chi_square: f64,
    observations: Vec<Observation>,
    n_iterations: usize,
    status: FitStatus,
}

impl From<FitResult> for FitResultSerde {
    fn from(result: FitResult) -> Self {
        Self {
            parameters: result.parameters,
            covariance: result.covariance.rows().into_iter().map(|row| row.to_vec()).collect(),
            chi_square: result.chi_square,
            observations: result.observations,
            n_iterations: result.n_iterations,
            status: result.status,
        }
    }
}

impl TryFrom<FitResultSerde> for FitResult {
    type Error = ConfigError;

    fn try_from(serde: FitResultSerde) -> Result<Self, Self::Error> {
        let n = serde.parameters.len();
        let is_square =
            serde.covariance.len() == n && serde.covariance.iter().all(|row| row.len() == n);
        let n_elements = serde.covariance.iter().map(Vec::len).sum();
        let mismatch = ConfigError::LengthMismatch {
            what: "covariance",
            expected: n * n,
            actual: n_elements,
        };
        if !is_square {
            return Err(mismatch);
        }
        let covariance =
            Array2::from_shape_vec((n, n), serde.covariance.concat()).map_err(|_| mismatch)?;
        Ok(Self {
            parameters: serde.parameters,
            covariance,
            chi_square: serde.chi_square,
            observations: serde.observations,
            n_iterations: serde.n_iterations,
            status: serde.status,
        })
    }
}
