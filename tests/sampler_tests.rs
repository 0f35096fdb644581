//! Sampler-driven sources through the full pipeline.

use std::collections::BTreeMap;

use dsflow::prelude::*;
use dsflow_operators::source::LABEL_COLUMN;

fn labels_for(sampler: Sampler, rows: usize, cfg: &PipelineConfig) -> Vec<i32> {
    Dataset::source(SourceSpec::synthetic_mnist(rows), sampler)
        .unwrap()
        .create_iterator_with(cfg)
        .unwrap()
        .map(|r| r.unwrap()[LABEL_COLUMN].get_f64(0).unwrap() as i32)
        .collect()
}

fn seeded() -> PipelineConfig {
    PipelineConfig {
        seed: Some(99),
        ..Default::default()
    }
}

#[test]
fn test_sampler_counts_match_dataset_size() {
    let cases = vec![
        Sampler::sequential(5, None),
        Sampler::sequential(0, Some(7)),
        Sampler::random(false, Some(12)).unwrap(),
        Sampler::random(true, Some(50)).unwrap(),
        Sampler::distributed(4, 1, false).unwrap(),
        Sampler::distributed(4, 3, true).unwrap(),
        Sampler::pk(2, true).unwrap(),
        Sampler::subset_random(vec![1, 3, 5, 7]).unwrap(),
        Sampler::weighted_random(vec![1.0, 0.0, 2.0, 0.5], 9, true).unwrap(),
    ];
    for sampler in cases {
        let ds = Dataset::source(SourceSpec::synthetic_mnist(30), sampler.clone()).unwrap();
        let expected = ds.dataset_size().unwrap() as usize;
        let got = labels_for(sampler.clone(), 30, &seeded());
        assert_eq!(got.len(), expected, "sampler {}", sampler.name());
    }
}

#[test]
fn test_distributed_shards_partition_the_dataset() {
    let mut all = Vec::new();
    for shard in 0..3 {
        let sampler = Sampler::distributed(3, shard, false).unwrap();
        let ds = Dataset::source(SourceSpec::synthetic_mnist(10), sampler).unwrap();
        let rows: Vec<Row> = ds
            .create_iterator_with(&PipelineConfig::default())
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        all.extend(rows.into_iter().map(|r| r["image"].clone()));
    }
    assert_eq!(all.len(), 10);
    // Synthetic images are unique per source row, so no row was read twice.
    for (i, a) in all.iter().enumerate() {
        assert!(all[i + 1..].iter().all(|b| a != b));
    }
}

#[test]
fn test_pk_sampler_caps_each_class() {
    let labels = labels_for(Sampler::pk(2, false).unwrap(), 50, &seeded());
    let mut per_class: BTreeMap<i32, usize> = BTreeMap::new();
    for l in &labels {
        *per_class.entry(*l).or_default() += 1;
    }
    assert_eq!(per_class.len(), 10);
    assert!(per_class.values().all(|c| *c == 2));
    // Unshuffled classes come out in ascending label order.
    assert_eq!(&labels[..4], &[0, 0, 1, 1]);
}

#[test]
fn test_weighted_sampler_skips_zero_weights() {
    let sampler = Sampler::weighted_random(vec![0.0, 1.0, 0.0, 1.0], 40, true).unwrap();
    let labels = labels_for(sampler, 4, &seeded());
    assert_eq!(labels.len(), 40);
    assert!(labels.iter().all(|l| *l == 1 || *l == 3));
}

#[test]
fn test_invalid_samplers_rejected_at_construction() {
    assert!(Sampler::distributed(0, 0, false).is_err());
    assert!(Sampler::distributed(2, 2, false).is_err());
    assert!(Sampler::pk(0, false).is_err());
    assert!(Sampler::weighted_random(vec![], 3, true).is_err());
    assert!(Sampler::weighted_random(vec![-1.0], 3, true).is_err());
}

#[test]
fn test_seeded_random_sampler_is_reproducible() {
    let sampler = Sampler::random(false, None).unwrap();
    let a = labels_for(sampler.clone(), 20, &seeded());
    let b = labels_for(sampler, 20, &seeded());
    assert_eq!(a, b);
}
