use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::{Array2, Array3};
use pprof::criterion::{Output, PProfProfiler};
use spaneval::{iou_f1, iou_f1_tags, RationaleConfigBuilder};

/// Deterministic batch of `n_examples` sequences of `width` tags. Runs of positive tags have
/// different lengths on both sides so that spans partially overlap.
fn build_tags(n_examples: usize, width: usize) -> (Vec<Vec<u8>>, Vec<Vec<u8>>, Vec<usize>) {
    let tags = |i: usize, j: usize, period: usize| u8::from((i * 7 + j * 3) % period < 2);
    let y_pred = (0..n_examples)
        .map(|i| (0..width).map(|j| tags(i, j, 5)).collect())
        .collect();
    let y_true = (0..n_examples)
        .map(|i| (0..width).map(|j| tags(i, j, 6)).collect())
        .collect();
    let lens = (0..n_examples).map(|i| width - 1 - i % 8).collect();
    (y_pred, y_true, lens)
}

fn to_arrays(y_pred: &[Vec<u8>], y_true: &[Vec<u8>]) -> (Array3<f32>, Array2<usize>) {
    let width = y_pred[0].len();
    let mut scores = Array3::zeros((y_pred.len(), width, 2));
    let mut labels = Array2::zeros((y_true.len(), width));
    for (i, (pred, truth)) in y_pred.iter().zip(y_true).enumerate() {
        for j in 0..width {
            scores[[i, j, pred[j] as usize]] = 0.9;
            labels[[i, j]] = truth[j] as usize;
        }
    }
    (scores, labels)
}

fn benchmark_tags(c: &mut Criterion) {
    let (y_pred, y_true, lens) = build_tags(10_000, 128);
    for parallel in [false, true] {
        let config = RationaleConfigBuilder::default().parallel(parallel).build();
        c.bench_function(&format!("iou_f1_tags_parallel_{}", parallel), |b| {
            b.iter(|| iou_f1_tags(black_box(&y_pred), black_box(&y_true), &lens, config).unwrap())
        });
    }
}

fn benchmark_scores(c: &mut Criterion) {
    let (y_pred, y_true, lens) = build_tags(2_000, 128);
    let (scores, labels) = to_arrays(&y_pred, &y_true);
    let config = RationaleConfigBuilder::default().build();
    c.bench_function("iou_f1_scores", |b| {
        b.iter(|| iou_f1(black_box(scores.view()), labels.view(), &lens, config).unwrap())
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = benchmark_tags, benchmark_scores
);
criterion_main!(benches);
