use criterion::{criterion_group, criterion_main, Criterion};
use dsflow::prelude::*;

fn pipeline() -> Dataset {
    Dataset::source(SourceSpec::synthetic_mnist(256), Sampler::default())
        .unwrap()
        .map(vec![
            TransformSpec::resize(32, 32).into(),
            TransformSpec::center_crop(24, 24).into(),
            TransformSpec::TypeCast {
                dtype: DataType::Float32,
            }
            .into(),
            TransformSpec::Rescale {
                rescale: 1.0 / 255.0,
                shift: 0.0,
            }
            .into(),
            TransformSpec::HwcToChw.into(),
        ])
        .unwrap()
        .batch(32)
        .unwrap()
}

fn drain(ds: &Dataset, fusion: bool) -> usize {
    let cfg = PipelineConfig {
        enable_op_fusion: fusion,
        num_parallel_workers: 1,
        prefetch_size: 0,
        ..Default::default()
    };
    ds.create_iterator_with(&cfg).unwrap().count()
}

fn bench_map_fusion(c: &mut Criterion) {
    let ds = pipeline();
    c.bench_function("map_unfused", |b| b.iter(|| drain(&ds, false)));
    c.bench_function("map_fused", |b| b.iter(|| drain(&ds, true)));
}

criterion_group!(benches, bench_map_fusion);
criterion_main!(benches);
