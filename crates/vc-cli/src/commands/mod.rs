//! CLI command implementations.

pub mod bench;
pub mod info;
pub mod synth;
pub mod voices;
