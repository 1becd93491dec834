//! Decoding of prompt assets and encoded responses into mono PCM.

use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use vc_core::{AudioBuffer, VcError, VcResult};

/// Decode an audio file (wav, mp3, flac, ogg, m4a, aac) to mono.
pub fn decode_file(path: impl AsRef<Path>) -> VcResult<AudioBuffer> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let ext = path.extension().and_then(|e| e.to_str());
    decode_bytes(bytes, ext).map_err(|e| match e {
        VcError::Encode(msg) => VcError::encode(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Decode an in-memory container to mono. `extension` is a probing hint.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> VcResult<AudioBuffer> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| VcError::encode(format!("unrecognised audio: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| VcError::encode("no audio track"))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let n_frames = track
        .codec_params
        .n_frames
        .and_then(|n| usize::try_from(n).ok());
    let delay = track.codec_params.delay.unwrap_or(0) as usize;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VcError::encode(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(VcError::encode(format!("demux failed: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!(error = %e, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(VcError::encode(format!("decode failed: {e}"))),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        let channels = spec.channels.count().max(1);

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);

        if channels == 1 {
            samples.extend_from_slice(buf.samples());
        } else {
            samples.extend(
                buf.samples()
                    .chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }
    }

    if sample_rate == 0 {
        return Err(VcError::encode("unknown sample rate"));
    }

    if let Some(expected) = n_frames {
        trim_to_stream_length(&mut samples, expected, delay);
    }

    Ok(AudioBuffer::new(samples, sample_rate))
}

/// Drop encoder priming frames and trailing padding the demuxer left in.
///
/// Only output longer than the declared frame count is touched, so streams
/// already trimmed by the decoder pass through unchanged.
fn trim_to_stream_length(samples: &mut Vec<f32>, expected: usize, delay: usize) {
    if samples.len() <= expected {
        return;
    }
    let lead = delay.min(samples.len() - expected);
    samples.drain(..lead);
    samples.truncate(expected);
}
