//! Engine preloading, so the first requests do not pay for model loading.

use tracing::{info, warn};
use vc_core::VcResult;

use crate::pipeline::SynthesisPipeline;

/// What a preload pass managed to construct.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WarmReport {
    pub synthesis_loaded: bool,
    /// Voices whose conversion engine is now cached.
    pub conversion_loaded: Vec<String>,
    /// Voices whose conversion engine failed to construct.
    pub conversion_failed: Vec<String>,
}

/// Construct the synthesis engine and the conversion engine of every voice
/// that has a conversion model.
///
/// Construction failures are logged and reported, never returned: a voice
/// with a broken model must not keep the service from starting. Only a failed
/// voice scan is an error.
pub fn warm_engine_cache(pipeline: &SynthesisPipeline) -> VcResult<WarmReport> {
    info!("Preloading engines...");
    let mut report = WarmReport::default();

    match pipeline.cache().synthesis_engine() {
        Ok(_) => report.synthesis_loaded = true,
        Err(e) => warn!("Synthesis engine preload failed: {}", e),
    }

    let voices = pipeline.registry().rescan()?;
    for voice in voices.iter().filter(|v| v.has_conversion()) {
        match pipeline.cache().conversion_engine(voice) {
            Ok(_) => report.conversion_loaded.push(voice.name().to_string()),
            Err(e) => {
                warn!(voice = voice.name(), "Conversion engine preload failed: {}", e);
                report.conversion_failed.push(voice.name().to_string());
            }
        }
    }

    info!(
        synthesis = report.synthesis_loaded,
        conversion = report.conversion_loaded.len(),
        failed = report.conversion_failed.len(),
        "Engine preload complete"
    );
    Ok(report)
}
