//! Built-in engine implementations.

pub mod dsp;
pub mod reference;

pub use reference::{REFERENCE_SAMPLE_RATE, ReferenceConverter, ReferenceFactory, ReferenceSynthesizer};
