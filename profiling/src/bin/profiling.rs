use clap::Parser;
use serde::Deserialize;
use serde_jsonlines::json_lines;
use spaneval::{iou_f1_tags, RationaleConfigBuilder, SpanBoundary};
use std::error::Error;
use std::ops::Range;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Deserialize)]
struct Example {
    predicted_tags: Vec<u8>,
    true_tags: Vec<u8>,
    len: usize,
}

type Batch = (Vec<Vec<u8>>, Vec<Vec<u8>>, Vec<usize>);

/// Reads the dataset and repeats it `repeat` times.
fn build_batch<P: AsRef<Path>>(path: P, repeat: usize) -> Result<Batch, Box<dyn Error>> {
    let examples = json_lines::<Example, P>(path)?.collect::<Result<Vec<_>, _>>()?;
    let capacity = examples.len() * repeat;
    let mut y_pred = Vec::with_capacity(capacity);
    let mut y_true = Vec::with_capacity(capacity);
    let mut lens = Vec::with_capacity(capacity);
    for _ in 0..repeat {
        for ex in examples.iter() {
            y_pred.push(ex.predicted_tags.clone());
            y_true.push(ex.true_tags.clone());
            lens.push(ex.len);
        }
    }
    Ok((y_pred, y_true, lens))
}

#[derive(Debug, Parser)]
struct Args {
    #[arg(short, long, default_value_t = 1)]
    n_samples: u32,
    #[arg(short, long, default_value_t = String::from("./tests/fixtures/rationales.jsonl"))]
    dataset: String,
    /// Number of copies of the dataset in the batch
    #[arg(short, long, default_value_t = 10_000)]
    repeat: usize,
    #[arg(short, long, default_value_t = SpanBoundary::Exclusive)]
    boundary: SpanBoundary,
    #[arg(short, long)]
    parallel: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let n_samples = args.n_samples;
    let iter = Range {
        start: 0,
        end: n_samples,
    };
    let config = RationaleConfigBuilder::default()
        .boundary(args.boundary)
        .parallel(args.parallel)
        .build();
    let (y_pred, y_true, lens) = build_batch(&args.dataset, args.repeat)?;
    let mut total_duration = Duration::ZERO;
    let mut score = 0.0;
    for _ in iter {
        let now = Instant::now();
        score = iou_f1_tags(&y_pred, &y_true, &lens, config)?;
        total_duration += now.elapsed();
    }
    println!(
        "Total duration: {} with {n_samples} samples of {} examples (mean IoU F1: {score})",
        total_duration.as_secs_f64(),
        lens.len()
    );
    Ok(())
}
