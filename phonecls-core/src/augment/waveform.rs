//! Waveform effects: tempo change, pitch shift, and rate conversion.

use crate::audio::hann_window;
use crate::error::{AudioError, Result};
use rubato::{FftFixedInOut, Resampler};

/// Overlap-add analysis/synthesis window
const OLA_FRAME: usize = 512;

/// Synthesis hop (75% overlap)
const OLA_HOP: usize = 128;

/// Similarity search radius in samples
const SEARCH: usize = 64;

/// Change tempo by `rate` without changing pitch (WSOLA).
///
/// Output length is `round(len / rate)`: `rate > 1` speeds up. Each frame is
/// taken near its nominal input position, at the offset that best continues
/// the previous frame.
pub fn time_stretch(samples: &[f32], rate: f32) -> Vec<f32> {
    let out_len = (samples.len() as f32 / rate).round() as usize;
    if samples.is_empty() || out_len == 0 {
        return Vec::new();
    }

    let window = hann_window(OLA_FRAME);
    let mut out = vec![0.0f32; out_len + OLA_FRAME];
    let mut norm = vec![0.0f32; out_len + OLA_FRAME];

    let mut out_pos = 0;
    let mut prev_in: Option<usize> = None;
    while out_pos < out_len {
        let nominal = (out_pos as f32 * rate).round() as usize;
        let in_pos = match prev_in {
            Some(prev) => best_offset(samples, prev + OLA_HOP, nominal),
            None => nominal,
        };

        for (i, &w) in window.iter().enumerate() {
            let x = samples.get(in_pos + i).copied().unwrap_or(0.0);
            out[out_pos + i] += x * w;
            norm[out_pos + i] += w;
        }

        prev_in = Some(in_pos);
        out_pos += OLA_HOP;
    }

    out.truncate(out_len);
    out.iter()
        .zip(&norm)
        .map(|(&v, &n)| if n > 1e-3 { v / n } else { 0.0 })
        .collect()
}

/// Input position within `SEARCH` of `nominal` most similar to `samples[target..]`.
fn best_offset(samples: &[f32], target: usize, nominal: usize) -> usize {
    let overlap = OLA_FRAME - OLA_HOP;
    let at = |pos: usize| samples.get(pos).copied().unwrap_or(0.0);

    (nominal.saturating_sub(SEARCH)..=nominal + SEARCH)
        .map(|candidate| {
            let score: f32 = (0..overlap)
                .map(|i| at(candidate + i) * at(target + i))
                .sum();
            (candidate, score)
        })
        .fold((nominal, f32::MIN), |best, current| {
            if current.1 > best.1 { current } else { best }
        })
        .0
}

/// Shift pitch by `semitones` keeping the length unchanged.
///
/// Stretches by the pitch ratio, then reads the result back at that ratio.
pub fn pitch_shift(samples: &[f32], semitones: f32) -> Vec<f32> {
    let ratio = 2f32.powf(semitones / 12.0);
    let stretched = time_stretch(samples, 1.0 / ratio);
    linear_resample(&stretched, samples.len())
}

/// Linear interpolation of `samples` onto `out_len` evenly spaced points.
fn linear_resample(samples: &[f32], out_len: usize) -> Vec<f32> {
    match samples {
        [] => vec![0.0; out_len],
        [single] => vec![*single; out_len],
        _ => {
            let step = samples.len() as f64 / out_len as f64;
            let last = samples.len() - 1;
            (0..out_len)
                .map(|i| {
                    let pos = i as f64 * step;
                    let idx = (pos.floor() as usize).min(last);
                    let frac = (pos - idx as f64) as f32;
                    let next = samples[(idx + 1).min(last)];
                    samples[idx] + (next - samples[idx]) * frac
                })
                .collect()
        }
    }
}

/// Convert mono audio from `from` Hz to `to` Hz.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedInOut::<f32>::new(from as usize, to as usize, 1024, 1)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    let chunk_size = resampler.input_frames_next();
    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;

    let mut output = Vec::with_capacity(expected + delay + chunk_size);

    // One trailing zero chunk flushes the resampler delay
    let flush = vec![0.0f32; chunk_size];
    for chunk in samples.chunks(chunk_size).chain(std::iter::once(flush.as_slice())) {
        let mut input = chunk.to_vec();
        input.resize(chunk_size, 0.0);

        let processed = resampler
            .process(&[input], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        output.extend_from_slice(&processed[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / 16000.0).sin())
            .collect()
    }

    fn zero_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count()
    }

    #[test]
    fn stretch_changes_length() {
        let samples = sine(440.0, 16000);

        assert_eq!(time_stretch(&samples, 1.25).len(), 12800);
        assert_eq!(time_stretch(&samples, 0.85).len(), 18824);
        assert!(time_stretch(&[], 1.1).is_empty());
    }

    #[test]
    fn stretch_keeps_pitch() {
        let samples = sine(440.0, 16000);

        let stretched = time_stretch(&samples, 1.25);

        // 440Hz over 0.8s: ~704 crossings
        let crossings = zero_crossings(&stretched) as f32;
        assert!((crossings - 704.0).abs() < 704.0 * 0.1, "{crossings}");
    }

    #[test]
    fn pitch_shift_keeps_length_and_raises_frequency() {
        let samples = sine(440.0, 16000);

        let shifted = pitch_shift(&samples, 12.0);

        assert_eq!(shifted.len(), samples.len());
        let ratio = zero_crossings(&shifted) as f32 / zero_crossings(&samples) as f32;
        assert!((ratio - 2.0).abs() < 0.2, "{ratio}");
    }

    #[test]
    fn resample_identity_is_noop() {
        let samples = sine(440.0, 1000);

        assert_eq!(resample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    fn resample_scales_length() {
        let samples = sine(440.0, 8000);

        let output = resample(&samples, 8000, 16000).unwrap();

        assert_eq!(output.len(), 16000);
    }
}
