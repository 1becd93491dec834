//! Container encoding.

use std::io::Cursor;
use std::num::{NonZeroU32, NonZeroU8};
use std::ops::Range;

use flacenc::component::{BitRepr, Stream};
use flacenc::constant::MIN_BLOCK_SIZE;
use flacenc::error::{Verified, Verify};
use flacenc::source::{Fill, FrameBuf};
use hound::{SampleFormat, WavSpec, WavWriter};
use vc_core::{OutputFormat, VcError, VcResult};
use vorbis_rs::VorbisEncoderBuilder;

/// Bit depth of PCM containers.
const BITS_PER_SAMPLE: u16 = 16;

/// Byte range of the min/max block size fields after `fLaC` and the
/// STREAMINFO block header.
const STREAMINFO_BLOCK_SIZES: Range<usize> = 8..12;

/// Frames handed to the Vorbis encoder per call.
const VORBIS_BLOCK: usize = 4096;

/// Encode mono samples at `sample_rate` into `format`.
pub fn encode(samples: &[f32], sample_rate: u32, format: OutputFormat) -> VcResult<Vec<u8>> {
    if sample_rate == 0 {
        return Err(VcError::encode("sample rate must be positive"));
    }
    match format {
        OutputFormat::Wav => encode_wav(samples, sample_rate),
        OutputFormat::Flac => encode_flac(samples, sample_rate),
        OutputFormat::Ogg => encode_ogg(samples, sample_rate),
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn encode_wav(samples: &[f32], sample_rate: u32) -> VcResult<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| VcError::encode(format!("wav: {e}")))?;
        for &sample in samples {
            writer
                .write_sample(to_i16(sample))
                .map_err(|e| VcError::encode(format!("wav: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| VcError::encode(format!("wav: {e}")))?;
    }

    Ok(cursor.into_inner())
}

fn flac_config(predictive: bool) -> VcResult<Verified<flacenc::config::Encoder>> {
    let mut config = flacenc::config::Encoder::default();
    config.multithread = false;
    if !predictive {
        config.subframe_coding.use_fixed = false;
        config.subframe_coding.use_lpc = false;
    }
    config
        .into_verified()
        .map_err(|(_, e)| VcError::encode(format!("flac config: {e}")))
}

/// Fixed-blocksize FLAC whose last frame carries only the remaining samples.
fn encode_flac(samples: &[f32], sample_rate: u32) -> VcResult<Vec<u8>> {
    let pcm: Vec<i32> = samples.iter().map(|&s| i32::from(to_i16(s))).collect();

    let config = flac_config(true)?;
    let verbatim = flac_config(false)?;
    let block_size = config.block_size;
    let mut stream = Stream::new(sample_rate as usize, 1, BITS_PER_SAMPLE as usize)
        .map_err(|e| VcError::encode(format!("flac: {e}")))?;
    let mut framebuf = FrameBuf::with_size(1, block_size)
        .map_err(|e| VcError::encode(format!("flac: {e}")))?;

    for (number, block) in pcm.chunks(block_size).enumerate() {
        if block.len() != framebuf.size() {
            framebuf.resize(block.len());
        }
        framebuf
            .fill_interleaved(block)
            .map_err(|e| VcError::encode(format!("flac: {e}")))?;

        // Predictors need more warmup samples than a short tail may hold.
        let frame_config = if block.len() < MIN_BLOCK_SIZE {
            &verbatim
        } else {
            &config
        };
        let frame = flacenc::encode_fixed_size_frame(
            frame_config,
            &framebuf,
            number,
            stream.stream_info(),
        )
        .map_err(|e| VcError::encode(format!("flac: {e:?}")))?;
        stream.add_frame(frame);
    }

    let mut sink = flacenc::bitsink::ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|e| VcError::encode(format!("flac write: {e}")))?;
    let mut bytes = sink.as_slice().to_vec();

    // STREAMINFO min/max block size (bytes 8..12) must name the nominal size
    // so decoders treat the shorter last frame as the end of a fixed stream.
    let nominal = (block_size as u16).to_be_bytes();
    if bytes.len() >= STREAMINFO_BLOCK_SIZES.end {
        bytes[STREAMINFO_BLOCK_SIZES.start..STREAMINFO_BLOCK_SIZES.start + 2]
            .copy_from_slice(&nominal);
        bytes[STREAMINFO_BLOCK_SIZES.start + 2..STREAMINFO_BLOCK_SIZES.end]
            .copy_from_slice(&nominal);
    }

    Ok(bytes)
}

fn encode_ogg(samples: &[f32], sample_rate: u32) -> VcResult<Vec<u8>> {
    let rate = NonZeroU32::new(sample_rate)
        .ok_or_else(|| VcError::encode("sample rate must be positive"))?;
    let channels = NonZeroU8::MIN;

    let mut out = Vec::new();
    let mut encoder = VorbisEncoderBuilder::new(rate, channels, &mut out)
        .map_err(|e| VcError::encode(format!("ogg: {e}")))?
        .build()
        .map_err(|e| VcError::encode(format!("ogg: {e}")))?;

    let clamped: Vec<f32> = samples.iter().map(|s| s.clamp(-1.0, 1.0)).collect();
    for block in clamped.chunks(VORBIS_BLOCK) {
        encoder
            .encode_audio_block([block])
            .map_err(|e| VcError::encode(format!("ogg: {e}")))?;
    }
    encoder
        .finish()
        .map_err(|e| VcError::encode(format!("ogg: {e}")))?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| (i as f32 / n as f32) * 2.0 - 1.0).collect()
    }

    #[test]
    fn test_wav_header_and_size() {
        let bytes = encode(&ramp(1000), 24000, OutputFormat::Wav).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), 44 + 2000);
    }

    #[test]
    fn test_flac_magic() {
        let bytes = encode(&ramp(5000), 24000, OutputFormat::Flac).unwrap();
        assert_eq!(&bytes[0..4], b"fLaC");
    }

    #[test]
    fn test_flac_streaminfo_declares_exact_length() {
        let bytes = encode(&ramp(1000), 24000, OutputFormat::Flac).unwrap();
        let min_block = u16::from_be_bytes([bytes[8], bytes[9]]);
        let max_block = u16::from_be_bytes([bytes[10], bytes[11]]);
        assert_eq!(min_block, 4096);
        assert_eq!(max_block, 4096);
        // Low 32 of the 36-bit total sample count.
        let total = u32::from_be_bytes([bytes[22], bytes[23], bytes[24], bytes[25]]);
        assert_eq!(total, 1000);
    }

    #[test]
    fn test_ogg_magic() {
        let bytes = encode(&ramp(5000), 24000, OutputFormat::Ogg).unwrap();
        assert_eq!(&bytes[0..4], b"OggS");
    }

    #[test]
    fn test_wav_is_deterministic() {
        let a = encode(&ramp(777), 16000, OutputFormat::Wav).unwrap();
        let b = encode(&ramp(777), 16000, OutputFormat::Wav).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_out_of_range_samples_clamped() {
        let bytes = encode(&[2.0, -2.0], 8000, OutputFormat::Wav).unwrap();
        let max = i16::from_le_bytes([bytes[44], bytes[45]]);
        let min = i16::from_le_bytes([bytes[46], bytes[47]]);
        assert_eq!(max, i16::MAX);
        assert_eq!(min, -i16::MAX);
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(encode(&[0.0], 0, OutputFormat::Flac).is_err());
    }
}
