//! Row-count estimation for `Dataset::dataset_size`.
//!
//! Exact for the operators we have: sources report what their sampler will
//! produce, and every other operator transforms that count deterministically.
//! `None` means the pipeline never ends.

use dsflow_operators::Sampler;

use crate::logical::LogicalPlan;

pub fn estimate_rows(plan: &LogicalPlan) -> Option<u64> {
    use LogicalPlan::*;
    match plan {
        Source { spec, sampler } => {
            let labels = match sampler {
                Sampler::Pk { .. } => spec.labels(),
                _ => Vec::new(),
            };
            Some(sampler.num_samples(spec.len(), &labels) as u64)
        }
        Map { input, .. }
        | Shuffle { input, .. }
        | Project { input, .. }
        | Rename { input, .. } => estimate_rows(input),
        Batch {
            input,
            batch_size,
            drop_remainder,
        } => {
            let n = estimate_rows(input)?;
            let b = *batch_size as u64;
            Some(if *drop_remainder { n / b } else { n.div_ceil(b) })
        }
        Repeat { input, count } => {
            let n = estimate_rows(input)?;
            match count {
                Some(c) => Some(n.saturating_mul(u64::from(*c))),
                // Repeating nothing forever is still nothing.
                None if n == 0 => Some(0),
                None => None,
            }
        }
        Take { input, count } => Some(match estimate_rows(input) {
            Some(n) => n.min(*count as u64),
            None => *count as u64,
        }),
        Skip { input, count } => estimate_rows(input).map(|n| n.saturating_sub(*count as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::Dataset;
    use dsflow_operators::SourceSpec;

    fn mnist(n: usize, sampler: Sampler) -> Dataset {
        Dataset::source(SourceSpec::synthetic_mnist(n), sampler).unwrap()
    }

    #[test]
    fn batch_and_repeat() {
        let ds = mnist(10, Sampler::default())
            .repeat(2)
            .unwrap()
            .batch(2)
            .unwrap();
        assert_eq!(ds.dataset_size(), Some(10));
        let ds = mnist(7, Sampler::default()).batch_with(2, true).unwrap();
        assert_eq!(ds.dataset_size(), Some(3));
        let ds = mnist(7, Sampler::default()).batch(2).unwrap();
        assert_eq!(ds.dataset_size(), Some(4));
    }

    #[test]
    fn sampler_counts_flow_through() {
        let ds = mnist(60, Sampler::random(false, Some(10)).unwrap());
        assert_eq!(ds.dataset_size(), Some(10));
        let ds = mnist(30, Sampler::pk(2, false).unwrap());
        assert_eq!(ds.dataset_size(), Some(20));
    }

    #[test]
    fn infinite_repeat_unless_capped() {
        let ds = mnist(3, Sampler::default()).repeat_forever().unwrap();
        assert_eq!(ds.dataset_size(), None);
        let ds = ds.take(5).unwrap();
        assert_eq!(ds.dataset_size(), Some(5));
        let empty = mnist(0, Sampler::default()).repeat_forever().unwrap();
        assert_eq!(empty.dataset_size(), Some(0));
    }

    #[test]
    fn take_and_skip() {
        let ds = mnist(10, Sampler::default()).skip(3).unwrap().take(4).unwrap();
        assert_eq!(ds.dataset_size(), Some(4));
        let ds = mnist(10, Sampler::default()).skip(30).unwrap();
        assert_eq!(ds.dataset_size(), Some(0));
    }
}
