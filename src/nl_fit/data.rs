use crate::data::{Dataset, Observation};
use crate::error::{ConfigError, FitError};
use crate::model::{ObservationTerms, OpticalModel};

use ndarray::Array1;

/// Observations entering the least-squares problem
#[derive(Clone, Debug)]
pub struct FitData {
    pub terms: Vec<ObservationTerms>,
    pub ratio: Array1<f64>,
    pub inv_err: Array1<f64>,
    /// Only every `skip_stride`-th observation enters the curvature matrix
    pub skip_stride: usize,
}

impl FitData {
    pub fn new(
        dataset: &Dataset,
        model: &OpticalModel,
        observations: &[Observation],
        skip_stride: usize,
    ) -> Result<Self, FitError> {
        if skip_stride == 0 {
            return Err(ConfigError::ZeroSkipStride.into());
        }
        let terms = observations
            .iter()
            .map(|obs| model.terms(dataset, obs.key))
            .collect::<Result<Vec<_>, _>>()?;
        let ratio = observations.iter().map(|obs| obs.ratio).collect();
        let inv_err = observations.iter().map(|obs| obs.sigma.recip()).collect();
        Ok(Self {
            terms,
            ratio,
            inv_err,
            skip_stride,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Positions of the observations entering the curvature matrix
    pub fn used_indices(&self) -> impl Iterator<Item = usize> {
        (0..self.len()).step_by(self.skip_stride)
    }
}

/// Per-observation chi-square and residual from the latest model evaluation
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostics {
    pub chi_square: Array1<f64>,
    pub residual: Array1<f64>,
}

impl Diagnostics {
    /// NaN-filled slots, skipped observations keep them
    pub fn new(len: usize) -> Self {
        Self {
            chi_square: Array1::from_elem(len, f64::NAN),
            residual: Array1::from_elem(len, f64::NAN),
        }
    }
}
