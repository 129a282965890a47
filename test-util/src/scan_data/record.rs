use serde::Deserialize;

/// One sensor in one off-axis run and the matching central run
///
/// Fields prefixed with `ctr_` refer to the central run. Counts are raw prompt hits, without the
/// multiple photo-electron correction.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ScanRecord {
    pub run_id: i32,
    pub sensor_id: usize,

    pub lb_theta: f64,
    pub lb_phi: f64,
    pub intensity_norm: f64,
    pub n_pulses: f64,
    pub ctr_lb_theta: f64,
    pub ctr_lb_phi: f64,
    pub ctr_intensity_norm: f64,
    pub ctr_n_pulses: f64,

    pub prompt_counts: f64,
    pub ctr_prompt_counts: f64,

    pub dist_scint: f64,
    pub dist_av: f64,
    pub dist_water: f64,
    pub ctr_dist_scint: f64,
    pub ctr_dist_av: f64,
    pub ctr_dist_water: f64,

    pub solid_angle: f64,
    pub ctr_solid_angle: f64,
    pub fresnel_t_coeff: f64,
    pub ctr_fresnel_t_coeff: f64,
    pub cos_theta: f64,
    pub ctr_cos_theta: f64,
    pub rel_lb_theta: f64,
    pub rel_lb_phi: f64,
    pub ctr_rel_lb_theta: f64,
    pub ctr_rel_lb_phi: f64,

    pub avhd_shadowing: f64,
    pub ctr_avhd_shadowing: f64,
    pub geo_shadowing: f64,
    pub ctr_geo_shadowing: f64,
    pub chs: bool,
    pub ctr_chs: bool,
    pub css: bool,
    pub ctr_css: bool,
    pub is_verified: bool,
}

#[cfg(test)]
mod tests {
    use crate::{ALL_SCANS, scan_records, scan_run_ids};

    #[test]
    fn scan_a() {
        let records = scan_records("scan_a.csv");
        assert_eq!(records.len(), 900);
        assert_eq!(scan_run_ids(&records), vec![236001, 236002, 236003]);
        assert!(records.iter().all(|record| record.ctr_cos_theta == 1.0));
    }

    #[test]
    fn all_scans_loaded() {
        assert!(ALL_SCANS.iter().any(|(name, _)| name == "scan_a.csv"));
    }
}
