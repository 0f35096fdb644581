//! Iterator lifecycle: stop semantics, error propagation, manifests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dsflow::prelude::*;

fn mnist(rows: usize) -> Dataset {
    Dataset::source(SourceSpec::synthetic_mnist(rows), Sampler::default()).unwrap()
}

/// Fails on one label value, passes everything else through.
struct FailOnLabel {
    bad: i32,
    seen: Arc<AtomicUsize>,
}

impl TransformStep for FailOnLabel {
    fn name(&self) -> &'static str {
        "fail_on_label"
    }

    fn fusable(&self) -> bool {
        true
    }

    fn apply(&self, input: TensorRow) -> std::result::Result<TensorRow, OpError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        let label = input[0].get_f64(0).unwrap_or(-1.0) as i32;
        if label == self.bad {
            return Err(OpError::Exec(format!("label {} is poisoned", label)));
        }
        Ok(input)
    }
}

#[test]
fn test_stop_is_idempotent() {
    let mut it = mnist(5)
        .repeat_forever()
        .unwrap()
        .create_iterator_with(&PipelineConfig::default())
        .unwrap();
    for _ in 0..7 {
        assert!(!it.get_next_row().unwrap().is_empty());
    }
    it.stop();
    it.stop();
    assert!(matches!(it.get_next_row(), Err(ExecError::Stopped)));
    it.stop();
    assert!(matches!(it.get_next_row(), Err(ExecError::Stopped)));
    assert_eq!(it.manifest().rows_yielded, 7);
}

#[test]
fn test_stop_from_another_thread() {
    let mut it = mnist(4)
        .repeat_forever()
        .unwrap()
        .create_iterator_with(&PipelineConfig {
            prefetch_size: 2,
            ..Default::default()
        })
        .unwrap();
    let handle = it.stop_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.stop();
        handle.stop();
    });

    let mut rows = 0u64;
    loop {
        match it.get_next_row() {
            Ok(row) => {
                assert!(!row.is_empty(), "an unbounded pipeline never ends on its own");
                rows += 1;
            }
            Err(ExecError::Stopped) => break,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    stopper.join().unwrap();
    assert!(it.is_stopped());
    assert_eq!(it.rows_yielded(), rows);
    it.stop();
}

#[test]
fn test_drop_without_draining_shuts_down() {
    let it = mnist(3)
        .repeat_forever()
        .unwrap()
        .create_iterator_with(&PipelineConfig {
            prefetch_size: 1,
            ..Default::default()
        })
        .unwrap();
    drop(it);
}

#[test]
fn test_runtime_error_reported_once() {
    for workers in [1usize, 4] {
        let seen = Arc::new(AtomicUsize::new(0));
        let step = FailOnLabel {
            bad: 3,
            seen: Arc::clone(&seen),
        };
        let ds = mnist(20)
            .map_with(
                MapOptions::new(vec![Transform::custom(step)])
                    .input_columns(&["label"])
                    .num_parallel_workers(workers),
            )
            .unwrap();
        let mut it = ds.create_iterator_with(&PipelineConfig::default()).unwrap();

        let err = loop {
            match it.get_next_row() {
                Ok(row) => assert!(!row.is_empty(), "stream ended without the error"),
                Err(e) => break e,
            }
        };
        match err {
            ExecError::Operator(msg) => assert!(msg.contains("poisoned"), "{}", msg),
            other => panic!("unexpected error: {}", other),
        }
        assert!(it.get_next_row().unwrap().is_empty());
        assert!(it.get_next_row().unwrap().is_empty());
        assert!(seen.load(Ordering::SeqCst) >= 4);
    }
}

#[test]
fn test_iterator_trait_surfaces_errors() {
    let ds = mnist(5)
        .map(vec![TransformSpec::center_crop(100, 100).into()])
        .unwrap();
    let results: Vec<_> = ds
        .create_iterator_with(&PipelineConfig::default())
        .unwrap()
        .collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
}

#[test]
fn test_inline_and_prefetch_agree() {
    let ds = mnist(30).shuffle(10).unwrap().batch(4).unwrap();
    let cfg = |prefetch| PipelineConfig {
        seed: Some(77),
        prefetch_size: prefetch,
        ..Default::default()
    };
    let inline: Vec<Row> = ds
        .create_iterator_with(&cfg(0))
        .unwrap()
        .collect::<std::result::Result<_, _>>()
        .unwrap();
    let prefetched: Vec<Row> = ds
        .create_iterator_with(&cfg(3))
        .unwrap()
        .collect::<std::result::Result<_, _>>()
        .unwrap();
    assert_eq!(inline.len(), 8);
    assert_eq!(inline, prefetched);
}

#[test]
fn test_manifest_after_run() {
    let cfg = PipelineConfig {
        seed: Some(5),
        ..Default::default()
    };
    let mut it = mnist(6).batch(4).unwrap().create_iterator_with(&cfg).unwrap();
    while !it.get_next_row().unwrap().is_empty() {}
    let manifest = it.manifest();
    assert_eq!(manifest.rows_yielded, 2);
    assert_eq!(manifest.seed, Some(5));
    assert!(manifest.finished_ms >= manifest.started_ms);
    assert_eq!(manifest.engine_version, dsflow_core::VERSION);

    let json = serde_json::to_string(&manifest).unwrap();
    assert!(json.contains("plan_hash"));
}
