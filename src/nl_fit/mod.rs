//! Levenberg-Marquardt least-squares fitting of the optics model
//!
//! # Overview
//!
//! The fit minimises
//!
//! ```text
//! chi2 = sum_i ((ratio_i - model_i(p)) / sigma_i)^2
//! ```
//!
//! over the varying subset of the parameter vector `p`. Every observation depends on at most
//! [ActiveParameters::CAPACITY](crate::indexer::ActiveParameters::CAPACITY) parameters, so the
//! curvature matrix is accumulated sparsely: for each observation only the rows and columns of
//! its active parameters are touched.
//!
//! # Parameter Spaces
//!
//! Two index spaces are used:
//!
//! - **Full** indices address the flat [ParameterVector](crate::ParameterVector), fixed and
//!   varying parameters alike. The model and its derivatives work here.
//! - **Compact** indices `0..mfit` address the varying parameters only, in ascending full order.
//!   The curvature matrix, the gradient and the Gauss-Jordan solver work here.
//!
//! [SparseIndexer](crate::indexer::SparseIndexer) maps between the two, and
//! [expand_covariance] scatters the compact covariance back into full order with zero rows and
//! columns for the fixed parameters.
//!
//! # Fitting Workflow
//!
//! 1. **Prepare data**: [FitData] computes the parameter-independent
//!    [ObservationTerms](crate::model::ObservationTerms) of every observation once.
//!
//! 2. **Initialise**: [LmState::new] accumulates the curvature matrix `alpha`, the gradient
//!    `beta` and the chi-square at the starting point.
//!
//! 3. **Iterate**: [LmState::step] solves the damped system
//!    `(alpha + lambda * diag(alpha)) * delta = beta` with [gauss_jordan]. A trial point with a
//!    lower chi-square is adopted and `lambda` shrinks tenfold, otherwise `lambda` grows tenfold
//!    and nothing else changes.
//!
//! 4. **Stop**: [LevenbergMarquardtFit] repeats the steps until the chi-square change stays
//!    below the tolerance for several consecutive iterations, the iteration limit is reached or
//!    the damped matrix is singular.
//!
//! 5. **Finalise**: [LmState::finish] inverts the undamped curvature matrix to get the
//!    covariance.
//!
//! Singular matrices are not errors at this level: they are reported through [FitStatus] along
//! with the best parameters found so far.

mod covariance;
pub use covariance::expand_covariance;

mod curvature;
pub use curvature::{Curvature, accumulate_curvature};

mod curve_fit;
pub use curve_fit::{CurveFitResult, FitStatus, LevenbergMarquardtFit};

mod data;
pub use data::{Diagnostics, FitData};

mod gauss_jordan;
pub use gauss_jordan::gauss_jordan;

mod lm;
pub use lm::{LmSolution, LmState, StepOutcome};
