//! # audio-post
//!
//! Turns a raw engine waveform into the bytes a client asked for: resampling
//! to the requested rate (only when it differs from the native one) and
//! encoding into WAV, FLAC or Ogg Vorbis. Also decodes prompt assets.

pub mod decode;
pub mod encode;
pub mod resample;

pub use decode::{decode_bytes, decode_file};
pub use encode::encode;
pub use resample::resample;

use vc_core::{AudioBuffer, OutputFormat, VcResult};

/// Resample `buffer` to `target_rate` if needed, then encode it as `format`.
pub fn process(buffer: &AudioBuffer, target_rate: u32, format: OutputFormat) -> VcResult<Vec<u8>> {
    if target_rate == buffer.sample_rate {
        return encode(&buffer.samples, target_rate, format);
    }

    let resampled = resample(&buffer.samples, buffer.sample_rate, target_rate)?;
    tracing::debug!(
        from = buffer.sample_rate,
        to = target_rate,
        frames_in = buffer.len(),
        frames_out = resampled.len(),
        "resampled"
    );
    encode(&resampled, target_rate, format)
}
