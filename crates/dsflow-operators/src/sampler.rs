//! Samplers: which source rows an epoch reads, and in what order.
//!
//! A sampler is pure data; `indices` materializes one epoch's index list.
//! Random samplers derive their RNG from `(seed, epoch)`, so every epoch gets
//! a fresh order while a seeded run stays reproducible.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::traits::OpError;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sampler {
    /// Rows `start..` in order; `num_samples` caps the count.
    Sequential {
        #[serde(default)]
        start: usize,
        #[serde(default)]
        num_samples: Option<usize>,
    },
    /// Uniform random order (or draws with replacement).
    Random {
        #[serde(default)]
        replacement: bool,
        #[serde(default)]
        num_samples: Option<usize>,
    },
    /// Every `num_shards`-th row starting at `shard_id`.
    Distributed {
        num_shards: usize,
        shard_id: usize,
        #[serde(default)]
        shuffle: bool,
    },
    /// Up to `num_val` rows of every class label.
    Pk {
        num_val: usize,
        #[serde(default)]
        shuffle: bool,
    },
    /// A fixed index subset, shuffled every epoch.
    SubsetRandom { indices: Vec<usize> },
    /// Index `i` drawn with probability proportional to `weights[i]`.
    WeightedRandom {
        weights: Vec<f64>,
        num_samples: usize,
        #[serde(default = "default_true")]
        replacement: bool,
    },
}

impl Default for Sampler {
    fn default() -> Self {
        Sampler::Sequential {
            start: 0,
            num_samples: None,
        }
    }
}

impl Sampler {
    pub fn sequential(start: usize, num_samples: Option<usize>) -> Self {
        Sampler::Sequential { start, num_samples }
    }

    pub fn random(replacement: bool, num_samples: Option<usize>) -> Result<Self, OpError> {
        let s = Sampler::Random {
            replacement,
            num_samples,
        };
        s.validate()?;
        Ok(s)
    }

    pub fn distributed(num_shards: usize, shard_id: usize, shuffle: bool) -> Result<Self, OpError> {
        let s = Sampler::Distributed {
            num_shards,
            shard_id,
            shuffle,
        };
        s.validate()?;
        Ok(s)
    }

    pub fn pk(num_val: usize, shuffle: bool) -> Result<Self, OpError> {
        let s = Sampler::Pk { num_val, shuffle };
        s.validate()?;
        Ok(s)
    }

    pub fn subset_random(indices: Vec<usize>) -> Result<Self, OpError> {
        let s = Sampler::SubsetRandom { indices };
        s.validate()?;
        Ok(s)
    }

    pub fn weighted_random(
        weights: Vec<f64>,
        num_samples: usize,
        replacement: bool,
    ) -> Result<Self, OpError> {
        let s = Sampler::WeightedRandom {
            weights,
            num_samples,
            replacement,
        };
        s.validate()?;
        Ok(s)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Sampler::Sequential { .. } => "sequential",
            Sampler::Random { .. } => "random",
            Sampler::Distributed { .. } => "distributed",
            Sampler::Pk { .. } => "pk",
            Sampler::SubsetRandom { .. } => "subset_random",
            Sampler::WeightedRandom { .. } => "weighted_random",
        }
    }

    /// Parameter checks that do not depend on the dataset.
    pub fn validate(&self) -> Result<(), OpError> {
        match self {
            Sampler::Sequential { num_samples, .. } | Sampler::Random { num_samples, .. } => {
                if *num_samples == Some(0) {
                    return Err(OpError::Sampler(format!(
                        "{}: num_samples must be positive",
                        self.name()
                    )));
                }
            }
            Sampler::Distributed {
                num_shards,
                shard_id,
                ..
            } => {
                if *num_shards == 0 {
                    return Err(OpError::Sampler("distributed: num_shards must be positive".into()));
                }
                if shard_id >= num_shards {
                    return Err(OpError::Sampler(format!(
                        "distributed: shard_id {} out of range for {} shards",
                        shard_id, num_shards
                    )));
                }
            }
            Sampler::Pk { num_val, .. } => {
                if *num_val == 0 {
                    return Err(OpError::Sampler("pk: num_val must be positive".into()));
                }
            }
            Sampler::SubsetRandom { indices } => {
                if indices.is_empty() {
                    return Err(OpError::Sampler("subset_random: indices must not be empty".into()));
                }
            }
            Sampler::WeightedRandom {
                weights,
                num_samples,
                replacement,
            } => {
                if weights.is_empty() {
                    return Err(OpError::Sampler("weighted_random: weights must not be empty".into()));
                }
                if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                    return Err(OpError::Sampler(
                        "weighted_random: weights must be finite and non-negative".into(),
                    ));
                }
                let positive = weights.iter().filter(|w| **w > 0.0).count();
                if positive == 0 {
                    return Err(OpError::Sampler("weighted_random: all weights are zero".into()));
                }
                if *num_samples == 0 {
                    return Err(OpError::Sampler(
                        "weighted_random: num_samples must be positive".into(),
                    ));
                }
                if !replacement && *num_samples > positive {
                    return Err(OpError::Sampler(format!(
                        "weighted_random: {} samples without replacement but only {} non-zero weights",
                        num_samples, positive
                    )));
                }
            }
        }
        Ok(())
    }

    /// Rows per epoch over a dataset of `len` rows whose class labels are
    /// `labels` (only consulted by the per-class sampler).
    pub fn num_samples(&self, len: usize, labels: &[i32]) -> usize {
        match self {
            Sampler::Sequential { start, num_samples } => {
                let remaining = len.saturating_sub(*start);
                num_samples.map_or(remaining, |n| n.min(remaining))
            }
            Sampler::Random {
                replacement,
                num_samples,
            } => match (replacement, num_samples) {
                (true, Some(n)) => if len == 0 { 0 } else { *n },
                (_, Some(n)) => (*n).min(len),
                (_, None) => len,
            },
            Sampler::Distributed {
                num_shards,
                shard_id,
                ..
            } => {
                let base = len / num_shards;
                base + usize::from(*shard_id < len % num_shards)
            }
            Sampler::Pk { num_val, .. } => class_counts(labels)
                .values()
                .map(|c| (*c).min(*num_val))
                .sum(),
            Sampler::SubsetRandom { indices } => indices.len(),
            Sampler::WeightedRandom { num_samples, .. } => *num_samples,
        }
    }

    /// Materialize the index list for `epoch`.
    pub fn indices(
        &self,
        len: usize,
        labels: &[i32],
        seed: Option<u64>,
        epoch: u64,
    ) -> Result<Vec<usize>, OpError> {
        self.validate()?;
        let mut rng = epoch_rng(seed, epoch);
        let out = match self {
            Sampler::Sequential { start, .. } => {
                let n = self.num_samples(len, labels);
                (*start..*start + n).collect()
            }
            Sampler::Random {
                replacement: true, ..
            } => {
                let n = self.num_samples(len, labels);
                (0..n).map(|_| rng.random_range(0..len)).collect()
            }
            Sampler::Random { .. } => {
                let mut all: Vec<usize> = (0..len).collect();
                all.shuffle(&mut rng);
                all.truncate(self.num_samples(len, labels));
                all
            }
            Sampler::Distributed {
                num_shards,
                shard_id,
                shuffle,
            } => {
                // Every shard must permute identically, so the shuffle ignores
                // the shard id.
                let mut all: Vec<usize> = (0..len).collect();
                if *shuffle {
                    all.shuffle(&mut rng);
                }
                all.into_iter()
                    .skip(*shard_id)
                    .step_by(*num_shards)
                    .collect()
            }
            Sampler::Pk { num_val, shuffle } => {
                if labels.len() != len {
                    return Err(OpError::Sampler(format!(
                        "pk: {} labels for {} rows",
                        labels.len(),
                        len
                    )));
                }
                let mut by_class: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
                for (i, label) in labels.iter().enumerate() {
                    by_class.entry(*label).or_default().push(i);
                }
                let mut out = Vec::new();
                for (_, mut rows) in by_class {
                    if *shuffle {
                        rows.shuffle(&mut rng);
                    }
                    out.extend(rows.into_iter().take(*num_val));
                }
                if *shuffle {
                    out.shuffle(&mut rng);
                }
                out
            }
            Sampler::SubsetRandom { indices } => {
                if let Some(bad) = indices.iter().find(|i| **i >= len) {
                    return Err(OpError::Sampler(format!(
                        "subset_random: index {} out of range for {} rows",
                        bad, len
                    )));
                }
                let mut out = indices.clone();
                out.shuffle(&mut rng);
                out
            }
            Sampler::WeightedRandom {
                weights,
                num_samples,
                replacement,
            } => {
                if weights.len() > len {
                    return Err(OpError::Sampler(format!(
                        "weighted_random: {} weights for {} rows",
                        weights.len(),
                        len
                    )));
                }
                weighted_draw(weights, *num_samples, *replacement, &mut rng)
            }
        };
        Ok(out)
    }
}

fn epoch_rng(seed: Option<u64>, epoch: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

fn class_counts(labels: &[i32]) -> BTreeMap<i32, usize> {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(*label).or_insert(0) += 1;
    }
    counts
}

fn weighted_draw(weights: &[f64], n: usize, replacement: bool, rng: &mut StdRng) -> Vec<usize> {
    let mut weights = weights.to_vec();
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            break;
        }
        let mut target = rng.random_range(0.0..total);
        let mut pick = weights.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if *w > 0.0 && target < *w {
                pick = i;
                break;
            }
            target -= w;
        }
        // Rounding can leave `target` just past the last bucket.
        while weights[pick] <= 0.0 && pick > 0 {
            pick -= 1;
        }
        out.push(pick);
        if !replacement {
            weights[pick] = 0.0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_honours_start_and_cap() {
        let s = Sampler::sequential(2, Some(3));
        assert_eq!(s.indices(10, &[], None, 0).unwrap(), vec![2, 3, 4]);
        assert_eq!(Sampler::sequential(8, Some(5)).num_samples(10, &[]), 2);
    }

    #[test]
    fn random_without_replacement_is_a_permutation_prefix() {
        let s = Sampler::random(false, Some(10)).unwrap();
        let idx = s.indices(60, &[], Some(7), 0).unwrap();
        assert_eq!(idx.len(), 10);
        let mut dedup = idx.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), 10);
    }

    #[test]
    fn random_reshuffles_per_epoch_but_is_seeded() {
        let s = Sampler::random(false, None).unwrap();
        let e0 = s.indices(50, &[], Some(1), 0).unwrap();
        let e1 = s.indices(50, &[], Some(1), 1).unwrap();
        assert_ne!(e0, e1);
        assert_eq!(e0, s.indices(50, &[], Some(1), 0).unwrap());
    }

    #[test]
    fn distributed_shards_partition_rows() {
        let a = Sampler::distributed(2, 0, false).unwrap();
        let b = Sampler::distributed(2, 1, false).unwrap();
        assert_eq!(a.indices(5, &[], None, 0).unwrap(), vec![0, 2, 4]);
        assert_eq!(b.indices(5, &[], None, 0).unwrap(), vec![1, 3]);
        assert_eq!(b.num_samples(5, &[]), 2);
        assert!(Sampler::distributed(2, 2, false).is_err());
    }

    #[test]
    fn pk_takes_k_per_class() {
        let labels = vec![0, 1, 0, 1, 0, 2];
        let s = Sampler::pk(2, false).unwrap();
        assert_eq!(s.indices(6, &labels, None, 0).unwrap(), vec![0, 2, 1, 3, 5]);
        assert_eq!(s.num_samples(6, &labels), 5);
    }

    #[test]
    fn subset_random_checks_range() {
        let s = Sampler::subset_random(vec![0, 5, 9]).unwrap();
        let mut idx = s.indices(10, &[], Some(3), 0).unwrap();
        idx.sort_unstable();
        assert_eq!(idx, vec![0, 5, 9]);
        assert!(s.indices(6, &[], None, 0).is_err());
        assert!(Sampler::subset_random(vec![]).is_err());
    }

    #[test]
    fn weighted_random_skips_zero_weights() {
        let s = Sampler::weighted_random(vec![0.0, 1.0, 0.0, 2.0], 20, true).unwrap();
        let idx = s.indices(4, &[], Some(9), 0).unwrap();
        assert_eq!(idx.len(), 20);
        assert!(idx.iter().all(|i| *i == 1 || *i == 3));

        let once = Sampler::weighted_random(vec![1.0, 1.0, 1.0], 3, false).unwrap();
        let mut idx = once.indices(3, &[], Some(2), 0).unwrap();
        idx.sort_unstable();
        assert_eq!(idx, vec![0, 1, 2]);
    }

    #[test]
    fn weighted_random_validation() {
        assert!(Sampler::weighted_random(vec![], 1, true).is_err());
        assert!(Sampler::weighted_random(vec![0.0], 1, true).is_err());
        assert!(Sampler::weighted_random(vec![-1.0, 1.0], 1, true).is_err());
        assert!(Sampler::weighted_random(vec![1.0, 0.0], 2, false).is_err());
    }
}
