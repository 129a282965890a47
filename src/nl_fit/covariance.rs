use ndarray::Array2;

/// Scatter the covariance of the varying parameters into the full parameter order
///
/// `varying[j]` is the full index of row `j` of `compact`. Rows and columns of fixed parameters
/// are zero.
pub fn expand_covariance(compact: &Array2<f64>, varying: &[usize], n_params: usize) -> Array2<f64> {
    assert_eq!(compact.nrows(), varying.len());
    assert_eq!(compact.ncols(), varying.len());
    let mut full = Array2::zeros((n_params, n_params));
    for (j, &row) in varying.iter().enumerate() {
        for (k, &col) in varying.iter().enumerate() {
            full[(row, col)] = compact[(j, k)];
        }
    }
    full
}
