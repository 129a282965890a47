use crate::scan_data::ScanRecord;

use pmt_optics_fit::occupancy::{mpe_corrected_counts, mpe_corrected_counts_err};
use pmt_optics_fit::{Dataset, QualityFlags, Run, Sensor, SensorGeometry, SourceState};

fn geometry(record: &ScanRecord, central: bool) -> SensorGeometry {
    let pick = |off_axis: f64, ctr: f64| if central { ctr } else { off_axis };
    let prompt = pick(record.prompt_counts, record.ctr_prompt_counts);
    let n_pulses = pick(record.n_pulses, record.ctr_n_pulses);
    SensorGeometry {
        occupancy: mpe_corrected_counts(prompt, n_pulses),
        occupancy_err: mpe_corrected_counts_err(prompt, n_pulses),
        path_lengths: [
            pick(record.dist_scint, record.ctr_dist_scint),
            pick(record.dist_av, record.ctr_dist_av),
            pick(record.dist_water, record.ctr_dist_water),
        ],
        solid_angle: pick(record.solid_angle, record.ctr_solid_angle),
        fresnel_t_coeff: pick(record.fresnel_t_coeff, record.ctr_fresnel_t_coeff),
        cos_theta: pick(record.cos_theta, record.ctr_cos_theta),
        rel_theta: pick(record.rel_lb_theta, record.ctr_rel_lb_theta),
        rel_phi: pick(record.rel_lb_phi, record.ctr_rel_lb_phi),
        avhd_shadowing: pick(record.avhd_shadowing, record.ctr_avhd_shadowing),
        geo_shadowing: pick(record.geo_shadowing, record.ctr_geo_shadowing),
        flags: QualityFlags {
            chs: if central { record.ctr_chs } else { record.chs },
            css: if central { record.ctr_css } else { record.css },
        },
        is_verified: record.is_verified,
    }
}

fn run(record: &ScanRecord) -> Run {
    Run {
        id: record.run_id,
        off_axis: SourceState {
            theta: record.lb_theta,
            phi: record.lb_phi,
            intensity_norm: record.intensity_norm,
            n_pulses: record.n_pulses,
        },
        central: SourceState {
            theta: record.ctr_lb_theta,
            phi: record.ctr_lb_phi,
            intensity_norm: record.ctr_intensity_norm,
            n_pulses: record.ctr_n_pulses,
        },
        wavelength: None,
        sensors: vec![],
    }
}

/// Dataset of the records, one run per distinct run ID in order of appearance
pub fn scan_dataset(records: &[ScanRecord]) -> Dataset {
    let mut runs: Vec<Run> = vec![];
    for record in records {
        if runs.last().is_none_or(|run| run.id != record.run_id) {
            runs.push(run(record));
        }
        if let Some(run) = runs.last_mut() {
            run.sensors.push(Sensor {
                id: record.sensor_id,
                off_axis: geometry(record, false),
                central: geometry(record, true),
                wavelength: None,
            });
        }
    }
    Dataset::new(runs).unwrap()
}
