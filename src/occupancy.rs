//! Occupancy arithmetic shared by the data records and the screening cuts

/// Correct prompt counts for multiple photo-electron hits
///
/// With `n_prompt` hits over `n_pulses` source pulses the Poisson estimate of the mean number of
/// photo-electrons per pulse is `-ln(1 - n_prompt / n_pulses)`, scaled back to the number of
/// pulses. Returns NaN for an occupancy of unity or more, which the screening drops.
pub fn mpe_corrected_counts(n_prompt: f64, n_pulses: f64) -> f64 {
    let occupancy = n_prompt / n_pulses;
    -f64::ln_1p(-occupancy) * n_pulses
}

/// Statistical error of [mpe_corrected_counts]
pub fn mpe_corrected_counts_err(n_prompt: f64, n_pulses: f64) -> f64 {
    let occupancy = n_prompt / n_pulses;
    n_prompt.sqrt() / (1.0 - occupancy)
}

/// Ratio of two occupancies and its propagated uncertainty
///
/// Errors of the numerator and the denominator are treated as independent.
pub fn ratio_with_err(
    numerator: f64,
    numerator_err: f64,
    denominator: f64,
    denominator_err: f64,
) -> (f64, f64) {
    let ratio = numerator / denominator;
    let rel_err = f64::hypot(numerator_err / numerator, denominator_err / denominator);
    (ratio, ratio.abs() * rel_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn mpe_correction_small_occupancy() {
        // For low occupancy the correction is negligible
        let corrected = mpe_corrected_counts(10.0, 1.0e6);
        assert_relative_eq!(corrected, 10.0, max_relative = 1e-5);
        assert_relative_eq!(
            mpe_corrected_counts_err(10.0, 1.0e6),
            f64::sqrt(10.0),
            max_relative = 1e-5
        );
    }

    #[test]
    fn mpe_correction_large_occupancy() {
        let corrected = mpe_corrected_counts(5000.0, 10000.0);
        assert_relative_eq!(corrected, 10000.0 * f64::ln(2.0), max_relative = 1e-12);
        assert!(corrected > 5000.0);
    }

    #[test]
    fn mpe_correction_saturated() {
        assert!(!mpe_corrected_counts(10.0, 10.0).is_finite());
    }

    #[test]
    fn ratio_error_propagation() {
        let (ratio, err) = ratio_with_err(200.0, 6.0, 100.0, 4.0);
        assert_relative_eq!(ratio, 2.0);
        assert_relative_eq!(err, 2.0 * f64::hypot(0.03, 0.04), max_relative = 1e-12);
        assert_relative_eq!(err, 0.1, max_relative = 1e-12);
    }
}
