//! Sparse dependency structure of the model
//!
//! Every observation depends on at most eleven parameters: the free global constants, two angular
//! response bins, two emission profile bins and its run normalisation. [SparseIndexer] lists these
//! parameters for an observation so the curvature matrix is accumulated only over them.

use crate::model::ModelBins;
use crate::parameters::{GlobalParameter, ParameterLayout, ParameterVector};

use ndarray::Array2;
use std::ops::Deref;

/// Ordered, de-duplicated pair of histogram bins
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BinPair {
    pub first: usize,
    pub second: Option<usize>,
}

impl BinPair {
    pub fn new(a: usize, b: usize) -> Self {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Self {
                first: a,
                second: Some(b),
            },
            std::cmp::Ordering::Equal => Self {
                first: a,
                second: None,
            },
            std::cmp::Ordering::Greater => Self {
                first: b,
                second: Some(a),
            },
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> {
        std::iter::once(self.first).chain(self.second)
    }
}

/// Ascending list of the parameters a single observation depends on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveParameters {
    indices: [usize; Self::CAPACITY],
    len: usize,
}

impl ActiveParameters {
    /// Six globals, two angular bins, two emission bins and a run normalisation
    pub const CAPACITY: usize = GlobalParameter::N + 5;

    fn new() -> Self {
        Self {
            indices: [0; Self::CAPACITY],
            len: 0,
        }
    }

    fn push(&mut self, index: usize) {
        debug_assert!(self.len < Self::CAPACITY);
        debug_assert!(self.len == 0 || self.indices[self.len - 1] < index);
        self.indices[self.len] = index;
        self.len += 1;
    }
}

impl Deref for ActiveParameters {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.indices[..self.len]
    }
}

/// Maps observations to their active parameters and full parameter indices to compact ones
///
/// Built from the vary flags once screening has frozen the under-populated bins, the flags must
/// not change while the indexer is in use.
#[derive(Clone, Debug)]
pub struct SparseIndexer {
    layout: ParameterLayout,
    vary: Vec<bool>,
    base: Vec<usize>,
    compact: Vec<Option<usize>>,
    varying: Vec<usize>,
    angular_pairs: Array2<BinPair>,
}

impl SparseIndexer {
    pub fn new(params: &ParameterVector) -> Self {
        let layout = *params.layout();
        let vary = params.vary_flags().to_vec();
        let varying: Vec<usize> = params.varying_indices().collect();
        let mut compact = vec![None; layout.len()];
        for (i, &index) in varying.iter().enumerate() {
            compact[index] = Some(i);
        }
        let base = GlobalParameter::ALL
            .iter()
            .map(|&parameter| layout.global_index(parameter))
            .filter(|&index| vary[index])
            .collect();
        let n_angular = layout.n_angular();
        let angular_pairs =
            Array2::from_shape_fn((n_angular, n_angular), |(a, b)| BinPair::new(a, b));
        Self {
            layout,
            vary,
            base,
            compact,
            varying,
            angular_pairs,
        }
    }

    /// Number of varying parameters, the size of the curvature matrix
    #[inline]
    pub fn n_fit(&self) -> usize {
        self.varying.len()
    }

    /// Row of a full parameter index in the curvature matrix, `None` for fixed parameters
    #[inline]
    pub fn compact(&self, index: usize) -> Option<usize> {
        self.compact[index]
    }

    /// Full parameter indices of the curvature matrix rows
    #[inline]
    pub fn varying(&self) -> &[usize] {
        &self.varying
    }

    #[inline]
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    pub fn active_parameters(&self, bins: &ModelBins) -> ActiveParameters {
        let layout = &self.layout;
        let mut active = ActiveParameters::new();
        for &index in &self.base {
            active.push(index);
        }

        let angular = self.angular_pairs[[bins.angular, bins.angular_ref]];
        let emission = BinPair::new(bins.emission, bins.emission_ref);
        let candidates = angular
            .iter()
            .map(|bin| layout.angular_index(bin))
            .chain(emission.iter().map(|bin| layout.emission_index(bin)))
            .chain(std::iter::once(layout.normalisation_index(bins.run)));
        for index in candidates {
            if self.vary[index] {
                active.push(index);
            }
        }
        active
    }

    /// Varying parameters that are active for none of the given observations
    ///
    /// Their curvature matrix rows would be empty.
    pub fn unconstrained<'a>(&self, bins: impl IntoIterator<Item = &'a ModelBins>) -> Vec<usize> {
        let mut constrained = vec![false; self.layout.len()];
        for bins in bins {
            for &index in self.active_parameters(bins).iter() {
                constrained[index] = true;
            }
        }
        self.varying
            .iter()
            .copied()
            .filter(|&index| !constrained[index])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    use rand::prelude::*;

    #[test]
    fn bin_pair_is_ordered() {
        assert_eq!(
            BinPair::new(5, 2),
            BinPair {
                first: 2,
                second: Some(5)
            }
        );
        assert_eq!(BinPair::new(3, 3).iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn active_parameters_are_ascending_and_unique() {
        let mut rng = StdRng::seed_from_u64(0);
        let dataset = tiny_dataset();
        let mut config = tiny_config();
        config.bins.n_angular_bins = 7;
        config.bins.n_theta_bins = 3;
        config.bins.n_phi_bins = 4;
        config.parameters.scint_scattering.vary = true;
        config.parameters.av_scattering.vary = true;
        config.parameters.water_scattering.vary = true;
        let params = ParameterVector::from_config(&config, &dataset).unwrap();
        let indexer = SparseIndexer::new(&params);
        let layout = params.layout();

        for _ in 0..1000 {
            let bins = ModelBins {
                angular: rng.random_range(0..layout.n_angular()),
                angular_ref: rng.random_range(0..layout.n_angular()),
                emission: rng.random_range(0..layout.n_emission()),
                emission_ref: rng.random_range(0..layout.n_emission()),
                run: rng.random_range(0..layout.n_runs()),
            };
            let active = indexer.active_parameters(&bins);
            assert!(active.len() <= ActiveParameters::CAPACITY);
            assert!(active.windows(2).all(|w| w[0] < w[1]), "{:?}", &*active);
            let expected_len = 6
                + 1
                + usize::from(bins.angular != bins.angular_ref)
                + 1
                + usize::from(bins.emission != bins.emission_ref)
                + 1;
            assert_eq!(active.len(), expected_len);
        }
    }

    #[test]
    fn fixed_parameters_are_not_active() {
        let dataset = tiny_dataset();
        let mut params = ParameterVector::from_config(&tiny_config(), &dataset).unwrap();
        let layout = *params.layout();
        params.fix(layout.angular_index(0));
        params.fix(layout.emission_index(3));
        params.fix(layout.normalisation_index(1));
        let indexer = SparseIndexer::new(&params);

        let bins = ModelBins {
            angular: 2,
            angular_ref: 0,
            emission: 3,
            emission_ref: 1,
            run: 1,
        };
        let active = indexer.active_parameters(&bins);
        let water = layout.global_index(GlobalParameter::WaterAttenuation);
        assert_eq!(
            &*active,
            &[0, 1, water, layout.angular_index(2), layout.emission_index(1)]
        );
        assert_eq!(indexer.compact(layout.angular_index(0)), None);
        assert_eq!(indexer.n_fit(), params.n_varying());
        for (i, &index) in indexer.varying().iter().enumerate() {
            assert_eq!(indexer.compact(index), Some(i));
        }
    }

    #[test]
    fn unconstrained_parameters() {
        let dataset = tiny_dataset();
        let params = ParameterVector::from_config(&tiny_config(), &dataset).unwrap();
        let layout = *params.layout();
        let indexer = SparseIndexer::new(&params);

        let bins = ModelBins {
            angular: 1,
            angular_ref: 0,
            emission: 2,
            emission_ref: 2,
            run: 0,
        };
        assert_eq!(
            indexer.unconstrained([&bins]),
            vec![
                layout.angular_index(2),
                layout.emission_index(0),
                layout.emission_index(1),
                layout.emission_index(3),
                layout.normalisation_index(1),
            ]
        );
        assert_eq!(indexer.unconstrained([]), indexer.varying().to_vec());
    }
}
