//! Benchmarks for the PCATransformer kernel

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use featurizer_core::{ElementType, PcaTransformer};
use featurizer_ops::{ExecutionFrame, OpKernel, PcaKernelConfig, PcaTransformerKernel, Tensor};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const INPUT_DIMS: usize = 64;
const OUTPUT_DIMS: usize = 8;

fn archive(rng: &mut StdRng) -> Vec<u8> {
    let eigenvectors = Array2::from_shape_fn((OUTPUT_DIMS, INPUT_DIMS), |_| rng.gen_range(-1.0..1.0));
    let mean = Array1::from_shape_fn(INPUT_DIMS, |_| rng.gen_range(-0.5..0.5));
    PcaTransformer::<f64>::new(eigenvectors, Some(mean))
        .and_then(|t| t.to_bytes(ElementType::Float32))
        .expect("valid transform")
}

fn batch(rng: &mut StdRng, rows: usize) -> Tensor {
    let values: Vec<f32> = (0..rows * INPUT_DIMS).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Tensor::from_vec([rows, INPUT_DIMS], values).expect("length matches shape")
}

fn bench_transform(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let archive = archive(&mut rng);

    let cached = PcaTransformerKernel::new();
    let uncached = PcaTransformerKernel::with_config(PcaKernelConfig::default().with_cache(false));

    let mut group = c.benchmark_group("pca_transformer");
    for rows in [1usize, 100, 1000, 10000] {
        let mut frame = ExecutionFrame::new(
            vec![Tensor::from_bytes(archive.clone()), batch(&mut rng, rows)],
            1,
        );
        group.throughput(Throughput::Elements((rows * INPUT_DIMS) as u64));

        for (label, kernel) in [("cached", &cached), ("uncached", &uncached)] {
            group.bench_with_input(BenchmarkId::new(label, rows), &rows, |b, _| {
                b.iter(|| {
                    frame
                        .run(black_box(kernel as &dyn OpKernel))
                        .expect("compute succeeds");
                    black_box(frame.fetch(0));
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_transform);
criterion_main!(benches);
