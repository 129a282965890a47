//! Relative sensor efficiencies from fit residuals

use crate::data::Dataset;
use crate::error::DataError;
use crate::model::OpticalModel;
use crate::optics_fit::FitResult;

use conv::ConvUtil;
use std::collections::BTreeMap;

/// Measured over predicted occupancy ratio of every fitted sensor, keyed by sensor ID
///
/// Each sensor's estimate is averaged over the runs it was fitted in, and all estimates are
/// normalised by their mean. Non-positive and non-finite estimates are skipped.
pub fn sensor_efficiencies(
    dataset: &Dataset,
    model: &OpticalModel,
    result: &FitResult,
) -> Result<BTreeMap<usize, f64>, DataError> {
    let mut sums: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
    for obs in &result.observations {
        let (_, sensor) = dataset.get(obs.key)?;
        let terms = model.terms(dataset, obs.key)?;
        let estimate = obs.ratio / model.predict(&terms, result.parameters.values());
        if !(estimate.is_finite() && estimate > 0.0) {
            continue;
        }
        let (sum, n) = sums.entry(sensor.id).or_insert((0.0, 0));
        *sum += estimate;
        *n += 1;
    }

    let mut efficiencies: BTreeMap<usize, f64> = sums
        .into_iter()
        .map(|(id, (sum, n))| (id, sum / n.approx_as::<f64>().unwrap_or(f64::NAN)))
        .collect();
    let n_sensors = efficiencies.len().approx_as::<f64>().unwrap_or(f64::NAN);
    let mean = efficiencies.values().sum::<f64>() / n_sensors;
    for efficiency in efficiencies.values_mut() {
        *efficiency /= mean;
    }
    Ok(efficiencies)
}
