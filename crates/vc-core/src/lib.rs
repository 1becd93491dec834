//! # vc-core
//!
//! Core types, traits, and error definitions for the ChatterVC synthesis service.
//!
//! This crate provides the foundational abstractions shared by the runtime,
//! the audio post-processor and the HTTP server:
//!
//! - The data model (`VoiceRecord`, `ModelKind`, `AudioBuffer`, `SynthesisRequest`, ...)
//! - Request validation (`SpeechOptions` → `SynthesisRequest`)
//! - The call contract of the opaque compute engines (`SynthesisEngine`, `ConversionEngine`)
//! - Unified error handling via `VcError`
//! - Configuration structures

pub mod config;
pub mod error;
pub mod request;
pub mod traits;
pub mod types;

pub use config::{DeviceType, LoggingConfig, MetricsConfig, ModelFlavor, RuntimeConfig, ServerConfig};
pub use error::{VcError, VcResult};
pub use request::{SpeechOptions, SynthesisRequest};
pub use traits::{ConversionEngine, EngineFactory, SynthesisEngine};
pub use types::{
    AudioBuffer, ConversionParams, F0Method, ModelKind, OutputFormat, SynthesisParams,
    SynthesisResult, VoiceRecord, VoiceRef,
};
