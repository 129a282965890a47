use crate::error::SingularMatrix;
use crate::indexer::SparseIndexer;
use crate::model::OpticalModel;
use crate::nl_fit::covariance::expand_covariance;
use crate::nl_fit::curvature::{Curvature, accumulate_curvature};
use crate::nl_fit::data::{Diagnostics, FitData};
use crate::nl_fit::gauss_jordan::gauss_jordan;

use ndarray::{Array1, Array2, Axis};

/// Result of a single [LmState::step]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepOutcome {
    /// The trial point lowered the chi-square and was adopted
    pub accepted: bool,
    /// Chi-square at the current parameters after the step
    pub chi_square: f64,
    /// Damping factor for the next step
    pub lambda: f64,
    /// The damped system could not be solved, nothing was changed
    pub singular: Option<SingularMatrix>,
}

/// Parameters, chi-square and covariance at the end of the minimization
#[derive(Clone, Debug)]
pub struct LmSolution {
    pub values: Array1<f64>,
    pub chi_square: f64,
    /// Full-order covariance, zero for fixed parameters
    pub covariance: Array2<f64>,
    /// Undamped curvature matrix over the varying parameters
    pub curvature: Array2<f64>,
    pub diagnostics: Diagnostics,
    /// Set if the curvature matrix couldn't be inverted, the covariance is meaningless then
    pub singular: Option<SingularMatrix>,
}

/// Levenberg-Marquardt minimizer state
///
/// Holds the current parameters with their curvature matrix and gradient, and the damping
/// factor. The parameter vector is full-order, only the varying parameters are ever changed.
pub struct LmState<'a> {
    data: &'a FitData,
    model: &'a OpticalModel,
    indexer: &'a SparseIndexer,
    values: Array1<f64>,
    curvature: Curvature,
    diagnostics: Diagnostics,
    lambda: f64,
}

impl<'a> LmState<'a> {
    pub fn new(
        data: &'a FitData,
        model: &'a OpticalModel,
        indexer: &'a SparseIndexer,
        values: Array1<f64>,
        lambda: f64,
    ) -> Self {
        assert_eq!(values.len(), indexer.layout().len());
        let mut diagnostics = Diagnostics::new(data.len());
        let curvature = accumulate_curvature(data, model, indexer, &values, &mut diagnostics);
        Self {
            data,
            model,
            indexer,
            values,
            curvature,
            diagnostics,
            lambda,
        }
    }

    #[inline]
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    #[inline]
    pub fn chi_square(&self) -> f64 {
        self.curvature.chi_square
    }

    #[inline]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    #[inline]
    pub fn curvature(&self) -> &Curvature {
        &self.curvature
    }

    /// Try a single damped Gauss-Newton step
    pub fn step(&mut self) -> StepOutcome {
        let mut covar = self.curvature.alpha.clone();
        covar
            .diag_mut()
            .mapv_inplace(|x| x * (1.0 + self.lambda));
        let mut delta = self.curvature.beta.clone().insert_axis(Axis(1));
        if let Err(singular) = gauss_jordan(&mut covar, &mut delta) {
            return StepOutcome {
                accepted: false,
                chi_square: self.chi_square(),
                lambda: self.lambda,
                singular: Some(singular),
            };
        }

        let mut trial = self.values.clone();
        for (&index, &d) in self.indexer.varying().iter().zip(delta.column(0)) {
            trial[index] += d;
        }
        let mut trial_diagnostics = self.diagnostics.clone();
        let trial_curvature = accumulate_curvature(
            self.data,
            self.model,
            self.indexer,
            &trial,
            &mut trial_diagnostics,
        );

        let accepted = trial_curvature.chi_square < self.curvature.chi_square;
        if accepted {
            self.lambda *= 0.1;
            self.values = trial;
            self.curvature = trial_curvature;
            self.diagnostics = trial_diagnostics;
        } else {
            self.lambda *= 10.0;
        }
        StepOutcome {
            accepted,
            chi_square: self.chi_square(),
            lambda: self.lambda,
            singular: None,
        }
    }

    /// Invert the undamped curvature matrix and release the solver
    pub fn finish(self) -> LmSolution {
        let mut covar = self.curvature.alpha.clone();
        let mut rhs = Array2::zeros((covar.nrows(), 0));
        let singular = gauss_jordan(&mut covar, &mut rhs).err();
        let covariance =
            expand_covariance(&covar, self.indexer.varying(), self.indexer.layout().len());
        LmSolution {
            values: self.values,
            chi_square: self.curvature.chi_square,
            covariance,
            curvature: self.curvature.alpha,
            diagnostics: self.diagnostics,
            singular,
        }
    }
}
