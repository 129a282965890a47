use criterion::Criterion;
use pmt_optics_fit::indexer::SparseIndexer;
use pmt_optics_fit::nl_fit::{Diagnostics, FitData, accumulate_curvature};
use pmt_optics_fit::{FitConfig, OpticalModel, OpticsFit};
use pmt_optics_fit_test_util::{scan_dataset, scan_records};
use std::hint::black_box;

fn scan_config() -> FitConfig {
    let mut config = FitConfig::default();
    config.name = "scan_a".to_owned();
    config.bins.n_angular_bins = 9;
    config.bins.n_theta_bins = 3;
    config.bins.n_phi_bins = 4;
    config.parameters.av_attenuation.vary = false;
    config.parameters.av_attenuation.init = 1.2e-3;
    config.parameters.fixed_angular_bins = vec![0];
    config.parameters.fixed_emission_bins = vec![0];
    config
}

fn screened_fit() -> OpticsFit {
    let dataset = scan_dataset(&scan_records("scan_a.csv"));
    let mut fit = OpticsFit::new(scan_config(), dataset).unwrap();
    fit.screen().unwrap();
    fit
}

pub fn bench_curvature(c: &mut Criterion) {
    let fit = screened_fit();
    let observations = &fit.screened().unwrap().observations;
    let params = fit.parameters();
    let model = OpticalModel::new(*params.layout());
    let indexer = SparseIndexer::new(params);

    for skip_stride in [1, 4] {
        let data = FitData::new(fit.dataset(), &model, observations, skip_stride).unwrap();
        c.bench_function(
            format!("Curvature accumulation: scan_a, skip stride {skip_stride}").as_str(),
            |b| {
                let mut diagnostics = Diagnostics::new(data.len());
                b.iter(|| {
                    accumulate_curvature(
                        black_box(&data),
                        &model,
                        &indexer,
                        black_box(params.values()),
                        &mut diagnostics,
                    )
                });
            },
        );
    }
}

pub fn bench_optics_fit(c: &mut Criterion) {
    let fit = screened_fit();
    c.bench_function("Optics fit: scan_a", |b| {
        b.iter(|| {
            let mut fit = black_box(&fit).clone();
            fit.perform_fit().unwrap()
        });
    });
}
