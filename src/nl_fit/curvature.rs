use crate::indexer::{ActiveParameters, SparseIndexer};
use crate::model::OpticalModel;
use crate::nl_fit::data::{Diagnostics, FitData};

use ndarray::{Array1, Array2};

/// Chi-square with its curvature matrix and gradient over the varying parameters
///
/// `alpha` is half the Hessian of the chi-square in the Gauss-Newton approximation, `beta` is
/// minus half its gradient. Rows follow [SparseIndexer::varying].
#[derive(Clone, Debug, PartialEq)]
pub struct Curvature {
    pub alpha: Array2<f64>,
    pub beta: Array1<f64>,
    pub chi_square: f64,
}

/// Accumulate [Curvature] at `values`
///
/// Each observation contributes the outer product of its model derivatives over its active
/// parameters only. The lower triangle is accumulated and mirrored at the end. Chi-square and
/// residual of every used observation are written to `diagnostics`.
pub fn accumulate_curvature(
    data: &FitData,
    model: &OpticalModel,
    indexer: &SparseIndexer,
    values: &Array1<f64>,
    diagnostics: &mut Diagnostics,
) -> Curvature {
    let n_fit = indexer.n_fit();
    let mut alpha = Array2::zeros((n_fit, n_fit));
    let mut beta = Array1::zeros(n_fit);
    let mut chi_square = 0.0;
    let mut derivatives = [0.0; ActiveParameters::CAPACITY];

    for i in data.used_indices() {
        let terms = &data.terms[i];
        let active = indexer.active_parameters(&terms.bins);
        let predicted = model.predict_with_derivatives(terms, values, &active, &mut derivatives);
        let sig2i = data.inv_err[i].powi(2);
        let dy = data.ratio[i] - predicted;

        // Active indices are ascending, so are their curvature rows
        let mut slots = [(0, 0.0); ActiveParameters::CAPACITY];
        let mut n_slots = 0;
        for (&index, &d) in active.iter().zip(derivatives.iter()) {
            if let Some(row) = indexer.compact(index) {
                slots[n_slots] = (row, d);
                n_slots += 1;
            }
        }
        let slots = &slots[..n_slots];
        for (l, &(row, d_row)) in slots.iter().enumerate() {
            let wt = d_row * sig2i;
            for &(col, d_col) in &slots[..=l] {
                alpha[(row, col)] += wt * d_col;
            }
            beta[row] += dy * wt;
        }

        let chi2 = dy * dy * sig2i;
        chi_square += chi2;
        diagnostics.chi_square[i] = chi2;
        diagnostics.residual[i] = dy;
    }

    for j in 1..n_fit {
        for k in 0..j {
            alpha[(k, j)] = alpha[(j, k)];
        }
    }

    Curvature {
        alpha,
        beta,
        chi_square,
    }
}
