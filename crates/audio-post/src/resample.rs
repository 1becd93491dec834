//! Sample rate conversion.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use vc_core::{VcError, VcResult};

/// Input frames fed to the resampler per call.
const CHUNK_SIZE: usize = 1024;

/// Resample mono `samples` from `from` Hz to `to` Hz.
///
/// The output holds exactly `round(len * to / from)` frames: the resampler's
/// delay is trimmed from the front and the tail is flushed. Equal rates return
/// the input untouched.
pub fn resample(samples: &[f32], from: u32, to: u32) -> VcResult<Vec<f32>> {
    if from == 0 || to == 0 {
        return Err(VcError::encode(format!(
            "cannot resample between {from} Hz and {to} Hz"
        )));
    }
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to as f64 / from as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_SIZE, 1)
        .map_err(|e| VcError::encode(format!("resampler init failed: {e}")))?;

    let delay = resampler.output_delay();
    let mut output: Vec<f32> = Vec::with_capacity(expected + delay + CHUNK_SIZE);

    let mut chunks = samples.chunks_exact(CHUNK_SIZE);
    for chunk in &mut chunks {
        let block = [chunk];
        let frames = resampler
            .process(&block[..], None)
            .map_err(|e| VcError::encode(format!("resampling failed: {e}")))?;
        output.extend_from_slice(&frames[0]);
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        let block = [rest];
        let frames = resampler
            .process_partial(Some(&block[..]), None)
            .map_err(|e| VcError::encode(format!("resampling failed: {e}")))?;
        output.extend_from_slice(&frames[0]);
    }

    // Flush the filter tail.
    while output.len() < delay + expected {
        let frames = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| VcError::encode(format!("resampling failed: {e}")))?;
        if frames[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames[0]);
    }

    let mut output = if output.len() > delay {
        output.split_off(delay)
    } else {
        Vec::new()
    };
    output.resize(expected, 0.0);
    Ok(output)
}
