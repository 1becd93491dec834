//! Small signal-processing helpers used by the reference engines.

use std::f32::consts::PI;

/// Calculate RMS (Root Mean Square) of audio samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Periodic Hann window of length `n`.
pub fn hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos()))
        .collect()
}

/// Apply a Hann fade-in and fade-out of `fade_samples` each.
pub fn apply_fades(samples: &mut [f32], fade_samples: usize) {
    let fade = fade_samples.min(samples.len() / 2);
    let len = samples.len();
    for i in 0..fade {
        let t = i as f32 / fade.max(1) as f32;
        let gain = 0.5 * (1.0 - (PI * t).cos());
        samples[i] *= gain;
        samples[len - 1 - i] *= gain;
    }
}

/// Scale down so the absolute peak does not exceed `ceiling`.
pub fn limit_peak(samples: &mut [f32], ceiling: f32) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > ceiling {
        let gain = ceiling / peak;
        samples.iter_mut().for_each(|s| *s *= gain);
    }
}

/// Estimate the fundamental frequency by autocorrelation, searching `min_hz..=max_hz`.
///
/// Looks at the loudest second of audio. Returns `None` for silence or
/// unvoiced material.
pub fn estimate_pitch(samples: &[f32], sample_rate: u32, min_hz: f32, max_hz: f32) -> Option<f32> {
    let rate = sample_rate as f32;
    let min_lag = (rate / max_hz).floor() as usize;
    let max_lag = (rate / min_hz).ceil() as usize;
    if min_lag == 0 || samples.len() < max_lag * 2 {
        return None;
    }

    let window = (sample_rate as usize).min(samples.len());
    let start = loudest_window(samples, window);
    let frame = &samples[start..start + window];

    let energy: f32 = frame.iter().map(|s| s * s).sum();
    if energy < 1e-6 {
        return None;
    }

    let mut best_lag = 0;
    let mut best_corr = 0.0f32;
    for lag in min_lag..=max_lag.min(frame.len() - 1) {
        let corr: f32 = frame[..frame.len() - lag]
            .iter()
            .zip(&frame[lag..])
            .map(|(a, b)| a * b)
            .sum::<f32>()
            / energy;
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    (best_corr > 0.3 && best_lag > 0).then(|| rate / best_lag as f32)
}

fn loudest_window(samples: &[f32], window: usize) -> usize {
    if samples.len() <= window {
        return 0;
    }
    let hop = (window / 4).max(1);
    (0..=samples.len() - window)
        .step_by(hop)
        .map(|start| (start, rms(&samples[start..start + window])))
        .fold((0, 0.0f32), |best, cur| if cur.1 > best.1 { cur } else { best })
        .0
}

/// Shift pitch by `semitones` while keeping the duration, using windowed
/// overlap-add of resampled grains.
pub fn pitch_shift(samples: &[f32], semitones: f32, grain: usize) -> Vec<f32> {
    if samples.is_empty() || semitones.abs() < 1e-3 {
        return samples.to_vec();
    }

    let ratio = 2f32.powf(semitones / 12.0);
    let grain = grain.max(16);
    let hop = grain / 4;
    let window = hann(grain);

    let mut out = vec![0.0f32; samples.len()];
    let mut norm = vec![0.0f32; samples.len()];

    let mut start = 0usize;
    while start < samples.len() {
        for (i, w) in window.iter().enumerate() {
            let pos = start + i;
            if pos >= out.len() {
                break;
            }
            let read = start as f32 + i as f32 * ratio;
            let idx = read.floor() as usize;
            let frac = read - idx as f32;
            let a = samples.get(idx).copied().unwrap_or(0.0);
            let b = samples.get(idx + 1).copied().unwrap_or(0.0);
            out[pos] += (a + (b - a) * frac) * w;
            norm[pos] += w;
        }
        start += hop;
    }

    for (s, n) in out.iter_mut().zip(&norm) {
        if *n > 1e-3 {
            *s /= n;
        }
    }
    out
}

/// One-pole lowpass: `y[n] = y[n-1] + a * (x[n] - y[n-1])`, `a` in (0, 1].
pub fn one_pole_lowpass(samples: &[f32], a: f32) -> Vec<f32> {
    let a = a.clamp(1e-3, 1.0);
    let mut y = 0.0f32;
    samples
        .iter()
        .map(|&x| {
            y += a * (x - y);
            y
        })
        .collect()
}

/// Move the loudness envelope of `target` toward that of `reference`.
///
/// `amount` 0 leaves `target` alone, 1 matches the reference per window.
pub fn match_envelope(target: &mut [f32], reference: &[f32], window: usize, amount: f32) {
    let window = window.max(1);
    let amount = amount.clamp(0.0, 1.0);
    if amount == 0.0 {
        return;
    }

    for (t, r) in target.chunks_mut(window).zip(reference.chunks(window)) {
        let t_rms = rms(t);
        let r_rms = rms(r);
        if t_rms < 1e-5 {
            continue;
        }
        let gain = (r_rms / t_rms).clamp(0.0, 4.0).powf(amount);
        t.iter_mut().for_each(|s| *s *= gain);
    }
}

/// Silence windows whose RMS is below `threshold`.
pub fn noise_gate(samples: &mut [f32], window: usize, threshold: f32) {
    for chunk in samples.chunks_mut(window.max(1)) {
        if rms(chunk) < threshold {
            chunk.iter_mut().for_each(|s| *s = 0.0);
        }
    }
}
