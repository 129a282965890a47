use pmt_optics_fit::{FitConfig, GlobalParameter, Medium, OpticsFit};
use pmt_optics_fit_test_util::{scan_dataset, scan_records};

fn scan_config() -> FitConfig {
    let mut config = FitConfig::default();
    config.name = "scan_a".to_owned();
    config.bins.n_angular_bins = 9;
    config.bins.n_theta_bins = 3;
    config.bins.n_phi_bins = 4;
    // AV path differences are too short to constrain its attenuation
    config.parameters.av_attenuation.vary = false;
    config.parameters.av_attenuation.init = 1.2e-3;
    config.parameters.fixed_angular_bins = vec![0];
    config
}

#[test]
fn attenuation_recovered() {
    let dataset = scan_dataset(&scan_records("scan_a.csv"));
    let mut fit = OpticsFit::new(scan_config(), dataset).unwrap();
    let screened = fit.screen().unwrap();
    let report = screened.report.clone();
    assert_eq!(report.n_candidates, 900);
    assert!(report.rejected["verified"] > 0);
    assert!(report.rejected["AVHD shadowing"] > 0);
    assert!(report.n_populated > 500, "{report:?}");
    // Only the first angular bins are reachable
    assert!(report.frozen_bins.angular.contains(&8));
    assert!(report.unconstrained.is_empty(), "{report:?}");

    // The emission profile scale cancels out, pin the first populated bin
    let layout = *fit.parameters().layout();
    let pinned = (0..layout.n_emission())
        .find(|bin| !report.frozen_bins.emission.contains(bin))
        .unwrap();
    fit.parameters_mut().fix(layout.emission_index(pinned));

    let result = fit.perform_fit().unwrap();
    assert!(result.is_success(), "{}", result.reason());
    let reduced_chi_square = result.reduced_chi_square();
    assert!(
        (0.5..2.0).contains(&reduced_chi_square),
        "reduced chi2 = {reduced_chi_square}"
    );
    for (medium, expected) in [(Medium::Scintillator, 2.5e-4), (Medium::Water, 1.0e-4)] {
        let index = GlobalParameter::attenuation(medium).index();
        let value = result.parameters.value(index);
        let error = result.error(index);
        assert!(error > 0.0);
        assert!(
            (value - expected).abs() < 5.0 * error,
            "{medium:?}: {value} +- {error}, expected {expected}"
        );
    }
}
