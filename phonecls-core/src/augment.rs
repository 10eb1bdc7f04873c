//! Stochastic waveform and spectrogram perturbations that keep labels aligned.

pub mod spectrogram;
pub mod waveform;

use crate::audio::{AudioBuffer, Spectrogram};
use crate::dataset::Record;
use crate::error::Result;
use crate::phoneme::PhonemeInterval;
use crate::settings::FrameSettings;
use rand::Rng;
use std::ops::RangeInclusive;

/// Tempo factor range
pub const SPEED_RANGE: RangeInclusive<f32> = 0.85..=1.25;

/// Pitch shift range in semitones
pub const PITCH_RANGE: RangeInclusive<f32> = -4.0..=4.0;

/// Scale of additive unit-variance noise
pub const NOISE_SCALE: f32 = 0.005;

/// Probability of masking a frequency band across the whole spectrogram
pub const FREQ_MASK_PROBABILITY: f64 = 0.2;

/// Per-block probability of a time mask
pub const TIME_MASK_PROBABILITY: f64 = 0.2;

/// Upper bound (exclusive) on masked time rows within a block
pub const TIME_MASK_PARAM: usize = 2;

/// Augmentation settings.
///
/// Waveform augmentation runs before framing, spectrogram augmentation after.
/// Neither changes the spectrogram length seen by the aligner.
#[derive(Clone, Debug)]
pub struct AugmentationPipeline {
    pub sample_rate: u32,
    pub speed: RangeInclusive<f32>,
    pub pitch: RangeInclusive<f32>,
    pub noise_scale: f32,
    pub freq_mask_probability: f64,
    /// Upper bound (exclusive) on masked mel bins
    pub freq_mask_param: usize,
    pub time_mask_probability: f64,
    pub time_mask_param: usize,
    /// Time-masking block size in spectrogram rows
    pub block_length: usize,
}

impl AugmentationPipeline {
    pub fn from_settings(settings: &FrameSettings) -> Self {
        Self {
            sample_rate: settings.sample_rate,
            speed: SPEED_RANGE,
            pitch: PITCH_RANGE,
            noise_scale: NOISE_SCALE,
            freq_mask_probability: FREQ_MASK_PROBABILITY,
            freq_mask_param: settings.n_mels,
            time_mask_probability: TIME_MASK_PROBABILITY,
            time_mask_param: TIME_MASK_PARAM,
            block_length: settings.specgram_frame_length,
        }
    }

    /// Merge channels, change tempo, shift pitch, and return to the canonical rate.
    ///
    /// Phoneme boundaries are divided by the tempo factor and floored.
    pub fn augment_record<R: Rng + ?Sized>(&self, record: Record, rng: &mut R) -> Result<Record> {
        let mono = record.audio.to_mono()?;

        let speed = rng.gen_range(self.speed.clone());
        let semitones = rng.gen_range(self.pitch.clone());

        let stretched = waveform::time_stretch(&mono.samples, speed);
        let shifted = waveform::pitch_shift(&stretched, semitones);
        let samples = waveform::resample(&shifted, mono.sample_rate, self.sample_rate)?;

        let factor = speed * (mono.sample_rate as f32 / self.sample_rate as f32);
        let intervals = rescale_intervals(&record.intervals, factor);

        let degenerate = intervals.iter().filter(|pn| pn.is_empty()).count();
        if degenerate > 0 {
            tracing::warn!(
                degenerate,
                speed,
                "zero-length phoneme intervals after boundary rescaling"
            );
        }

        tracing::trace!(speed, semitones, samples = samples.len(), "augmented record");

        Ok(Record {
            audio: AudioBuffer::mono(samples, self.sample_rate),
            intervals,
        })
    }

    /// Add noise, maybe mask a frequency band, and time-mask fixed-length blocks.
    pub fn augment_spectrogram<R: Rng + ?Sized>(
        &self,
        spec: &Spectrogram,
        rng: &mut R,
    ) -> Result<Spectrogram> {
        let mut spec = spectrogram::add_noise(spec, self.noise_scale, rng);

        if rng.gen_bool(self.freq_mask_probability) {
            spec = spectrogram::frequency_mask(&spec, self.freq_mask_param, rng);
        }

        spectrogram::mask_time_blocks(
            &spec,
            self.block_length,
            self.time_mask_probability,
            self.time_mask_param,
            rng,
        )
    }
}

/// Divide every boundary by `factor` and floor.
///
/// Ordering and `start <= stop` survive because flooring is monotonic.
/// Intervals may collapse to zero length.
pub fn rescale_intervals(intervals: &[PhonemeInterval], factor: f32) -> Vec<PhonemeInterval> {
    let scale = |x: usize| (x as f64 / factor as f64).floor() as usize;
    intervals
        .iter()
        .map(|pn| PhonemeInterval::new(pn.symbol.clone(), scale(pn.start), scale(pn.stop)))
        .collect()
}
