//! Benchmark harness: one discarded warmup run, then `n` timed pipeline runs.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};
use vc_core::{SynthesisRequest, VcError, VcResult, VoiceRef};

use crate::pipeline::SynthesisPipeline;

/// Timing statistics over the timed runs.
#[derive(Debug, Clone, Serialize)]
pub struct BenchStats {
    /// Wall-clock time of each timed run, in run order.
    pub samples: Vec<Duration>,
    pub avg: Duration,
    pub min: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
    /// Voice every run was pinned to.
    pub voice: String,
    /// Whether the last run applied conversion.
    pub conversion_applied: bool,
}

impl BenchStats {
    fn from_samples(
        samples: Vec<Duration>,
        voice: String,
        conversion_applied: bool,
    ) -> VcResult<Self> {
        if samples.is_empty() {
            return Err(VcError::internal("no benchmark samples"));
        }

        let total: Duration = samples.iter().sum();
        let avg = total / samples.len() as u32;
        let min = samples.iter().min().copied().unwrap_or_default();
        let max = samples.iter().max().copied().unwrap_or_default();

        Ok(Self {
            avg,
            min,
            max,
            p50: percentile(&samples, 50),
            p95: percentile(&samples, 95),
            samples,
            voice,
            conversion_applied,
        })
    }

    /// Number of timed runs.
    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

/// Run the benchmark.
///
/// `template` supplies model, voice, format and knobs; its text is replaced
/// by `text`. A `random` voice is resolved once so every run hits the same
/// engines. Only the pipeline call is timed.
pub fn run(
    pipeline: &SynthesisPipeline,
    n: usize,
    text: &str,
    template: &SynthesisRequest,
) -> VcResult<BenchStats> {
    if n < 1 {
        return Err(VcError::validation("benchmark needs at least one timed run"));
    }

    let voice = pipeline.registry().resolve(template.voice())?;
    let request = template
        .with_text(text)?
        .with_voice(VoiceRef::ByName(voice.name().to_string()));

    info!(n, voice = voice.name(), model = %request.model(), "benchmark warmup");
    if let Err(e) = pipeline.synthesize(&request) {
        warn!("Warmup run failed: {}", e);
    }

    let mut samples = Vec::with_capacity(n);
    let mut conversion_applied = false;
    for i in 1..=n {
        let start = Instant::now();
        let result = pipeline.synthesize(&request)?;
        let elapsed = start.elapsed();

        conversion_applied = result.conversion_applied;
        samples.push(elapsed);
        info!(
            run = i,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            bytes = result.bytes.len(),
            "benchmark run"
        );
    }

    BenchStats::from_samples(samples, voice.name().to_string(), conversion_applied)
}

/// Calculate the p-th percentile of a non-empty slice.
fn percentile(values: &[Duration], p: usize) -> Duration {
    let mut sorted = values.to_vec();
    sorted.sort();

    let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
