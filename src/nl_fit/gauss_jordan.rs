use crate::error::SingularMatrix;

use ndarray::Array2;

/// Solve `a x = b` by Gauss-Jordan elimination with full pivoting
///
/// On return `a` holds its inverse and `b` holds the solution, one column per right-hand side.
/// A singular matrix doesn't stop the elimination early: zero pivots are skipped and the last
/// failed test is reported once the loop is over, leaving both matrices in a defined but
/// meaningless state.
pub fn gauss_jordan(a: &mut Array2<f64>, b: &mut Array2<f64>) -> Result<(), SingularMatrix> {
    let n = a.nrows();
    assert_eq!(a.ncols(), n, "matrix must be square");
    assert_eq!(b.nrows(), n, "right-hand side must have as many rows as the matrix");
    let m = b.ncols();

    let mut pivoted = vec![false; n];
    let mut index_row = vec![0; n];
    let mut index_col = vec![0; n];
    let mut status = Ok(());

    for i in 0..n {
        let candidate = (0..n)
            .filter(|&j| !pivoted[j])
            .flat_map(|j| (0..n).filter(|&k| !pivoted[k]).map(move |k| (j, k)))
            .max_by(|&x, &y| a[x].abs().total_cmp(&a[y].abs()));
        let Some((row, col)) = candidate else {
            status = Err(SingularMatrix::NoPivot);
            break;
        };
        pivoted[col] = true;

        // Move the pivot to the diagonal
        if row != col {
            for k in 0..n {
                a.swap((row, k), (col, k));
            }
            for k in 0..m {
                b.swap((row, k), (col, k));
            }
        }
        index_row[i] = row;
        index_col[i] = col;

        let pivot = a[(col, col)];
        if pivot == 0.0 || !pivot.is_finite() {
            status = Err(SingularMatrix::ZeroPivot);
            continue;
        }
        let pivot_inv = pivot.recip();
        a[(col, col)] = 1.0;
        a.row_mut(col).mapv_inplace(|x| x * pivot_inv);
        b.row_mut(col).mapv_inplace(|x| x * pivot_inv);

        for r in (0..n).filter(|&r| r != col) {
            let factor = a[(r, col)];
            if factor == 0.0 {
                continue;
            }
            a[(r, col)] = 0.0;
            for k in 0..n {
                let delta = a[(col, k)] * factor;
                a[(r, k)] -= delta;
            }
            for k in 0..m {
                let delta = b[(col, k)] * factor;
                b[(r, k)] -= delta;
            }
        }
    }

    // Undo the column interchanges in reverse order
    for i in (0..n).rev() {
        if index_row[i] != index_col[i] {
            for k in 0..n {
                a.swap((k, index_row[i]), (k, index_col[i]));
            }
        }
    }

    status
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};
    use rand::prelude::*;
    use rand_distr::StandardNormal;

    #[test]
    fn random_inverse() {
        let mut rng = StdRng::seed_from_u64(0);
        for n in [1, 2, 5, 11, 30] {
            // Diagonally dominant, hence well-conditioned
            let matrix = Array2::from_shape_fn((n, n), |(i, j)| {
                let x: f64 = rng.sample(StandardNormal);
                if i == j { x + 2.0 * n as f64 } else { x }
            });
            let rhs = Array2::from_shape_fn((n, 2), |_| rng.sample::<f64, _>(StandardNormal));
            let mut a = matrix.clone();
            let mut b = rhs.clone();
            gauss_jordan(&mut a, &mut b).unwrap();

            assert_abs_diff_eq!(matrix.dot(&a), Array2::<f64>::eye(n), epsilon = 1e-10);
            assert_abs_diff_eq!(a.dot(&matrix), Array2::<f64>::eye(n), epsilon = 1e-10);
            assert_abs_diff_eq!(matrix.dot(&b), rhs, epsilon = 1e-10);
        }
    }

    #[test]
    fn off_diagonal_pivot() {
        let matrix = array![[0.0, 2.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 4.0]];
        let mut a = matrix.clone();
        let mut b = array![[2.0], [3.0], [8.0]];
        gauss_jordan(&mut a, &mut b).unwrap();
        assert_abs_diff_eq!(
            a,
            array![[0.0, 1.0, 0.0], [0.5, 0.0, 0.0], [0.0, 0.0, 0.25]],
            epsilon = 1e-15
        );
        assert_abs_diff_eq!(b, array![[3.0], [1.0], [2.0]], epsilon = 1e-15);
    }

    #[test]
    fn singular_matrix() {
        let mut a = array![[1.0, 2.0], [2.0, 4.0]];
        let mut b = array![[1.0], [1.0]];
        let err = gauss_jordan(&mut a, &mut b).unwrap_err();
        assert_eq!(err, SingularMatrix::ZeroPivot);
        assert_eq!(err.code(), -2);
    }

    #[test]
    fn zero_matrix() {
        let mut a = Array2::zeros((3, 3));
        let mut b = Array2::zeros((3, 1));
        assert_eq!(gauss_jordan(&mut a, &mut b), Err(SingularMatrix::ZeroPivot));
    }
}
