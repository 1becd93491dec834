//! # runtime
//!
//! Request-serving core of ChatterVC.
//!
//! This crate provides:
//! - Voice discovery and reference resolution ([`voices`])
//! - Lazily constructed, per-key guarded engines ([`cache`])
//! - The two-stage pipeline with conversion fallback ([`pipeline`])
//! - The benchmark harness ([`bench`]) and engine preloading ([`warm`])
//! - Reference engines that need no model weights ([`engines`])
//! - Structured logging and metrics

pub mod bench;
pub mod cache;
pub mod engines;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod voices;
pub mod warm;

pub use bench::BenchStats;
pub use cache::{LoadedResource, ResourceCache};
pub use engines::ReferenceFactory;
pub use metrics::VcMetrics;
pub use pipeline::{ConversionOutcome, SynthesisPipeline};
pub use voices::VoiceRegistry;
pub use warm::WarmReport;
