//! Benchmark command implementation.

use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tracing::info;

use runtime::{BenchStats, SynthesisPipeline, bench};
use vc_core::SpeechOptions;

/// Options for the bench command.
#[derive(Debug, Clone)]
pub struct BenchOptions {
    pub n: usize,
    pub text: String,
    pub voice: String,
    pub model: String,
    pub format: String,
    pub json: bool,
}

/// Run the benchmark command.
pub fn run(
    pipeline: &SynthesisPipeline,
    options: BenchOptions,
    default_rate: u32,
) -> Result<BenchStats> {
    let template = SpeechOptions::new(&options.model, &options.text, &options.voice)
        .with_format(&options.format)
        .validate(default_rate)?;

    if !options.json {
        println!("Running benchmark with {} iterations", options.n);
        println!("Text:  \"{}\"", options.text);
        println!("Model: {}", template.model());
        println!();
    }

    let stats = bench::run(pipeline, options.n, &options.text, &template)?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&stats_json(&stats))?);
    } else {
        print_stats(&stats);
    }

    info!("Benchmark complete");
    Ok(stats)
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn stats_json(stats: &BenchStats) -> serde_json::Value {
    json!({
        "voice": stats.voice,
        "conversion_applied": stats.conversion_applied,
        "count": stats.count(),
        "avg_ms": ms(stats.avg),
        "min_ms": ms(stats.min),
        "max_ms": ms(stats.max),
        "p50_ms": ms(stats.p50),
        "p95_ms": ms(stats.p95),
        "samples_ms": stats.samples.iter().copied().map(ms).collect::<Vec<_>>(),
    })
}

fn print_stats(stats: &BenchStats) {
    println!("Voice:      {}", stats.voice);
    println!("Conversion: {}", if stats.conversion_applied { "applied" } else { "not applied" });
    println!();
    for (i, sample) in stats.samples.iter().enumerate() {
        println!("  run {:>3}: {:.1} ms", i + 1, ms(*sample));
    }
    println!();
    println!("Runs: {}", stats.count());
    println!("  Avg: {:.1} ms", ms(stats.avg));
    println!("  Min: {:.1} ms", ms(stats.min));
    println!("  Max: {:.1} ms", ms(stats.max));
    println!("  P50: {:.1} ms", ms(stats.p50));
    println!("  P95: {:.1} ms", ms(stats.p95));
}
