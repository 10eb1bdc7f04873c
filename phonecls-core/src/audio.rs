//! Audio loading and log-mel spectrogram extraction.

use crate::error::{AudioError, Result};
use crate::settings::{FrameSettings, grid_count};
use hound::{SampleFormat, WavReader};
use ndarray::Array2;
use std::f32::consts::PI;
use std::path::Path;

/// Per-frame feature rows, shape `(frames, n_mels)`.
pub type Spectrogram = Array2<f32>;

/// Interleaved audio samples with their format.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Mono buffer at the given rate.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Number of samples per channel.
    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            c => self.samples.len() / c as usize,
        }
    }

    /// Average all channels into one.
    pub fn to_mono(&self) -> Result<Self> {
        match self.channels {
            0 => Err(AudioError::InvalidChannels(0).into()),
            1 => Ok(self.clone()),
            c => {
                let samples = self
                    .samples
                    .chunks_exact(c as usize)
                    .map(|chunk| chunk.iter().sum::<f32>() / c as f32)
                    .collect();
                Ok(Self::mono(samples, self.sample_rate))
            }
        }
    }
}

/// Load audio from a WAV file.
///
/// # Errors
///
/// Returns error if file cannot be read or has unsupported format.
pub fn load_audio<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<hound::Result<_>>()?
        }
    };

    if spec.channels == 0 {
        return Err(AudioError::InvalidChannels(spec.channels).into());
    }

    Ok(AudioBuffer::new(samples, spec.sample_rate, spec.channels))
}

/// Log-mel spectrogram transform.
///
/// Rows follow the same strict grid as frame labeling: row `k` exists iff
/// `k * hop_length + win_length < n_samples`.
#[derive(Clone, Debug)]
pub struct MelSpectrogram {
    pub n_mels: usize,
    pub hop_length: usize,
    pub n_fft: usize,
    pub sample_rate: usize,
    pub win_length: usize,
    window: Vec<f32>,
    filterbank: Array2<f32>,
}

impl MelSpectrogram {
    pub fn new(n_mels: usize, sample_rate: usize, win_length: usize, hop_length: usize) -> Self {
        let n_fft = win_length.next_power_of_two();
        Self {
            n_mels,
            hop_length,
            n_fft,
            sample_rate,
            win_length,
            window: hann_window(win_length),
            filterbank: create_mel_filterbank(n_fft, n_mels, sample_rate),
        }
    }

    /// Transform matching the frame geometry of `settings`.
    pub fn from_settings(settings: &FrameSettings) -> Self {
        Self::new(
            settings.n_mels,
            settings.sample_rate as usize,
            settings.specgram_samples_per_frame(),
            settings.specgram_samples_stride(),
        )
    }

    /// Number of rows produced for `n_samples` of audio.
    pub fn num_frames(&self, n_samples: usize) -> usize {
        grid_count(n_samples, self.win_length, self.hop_length)
    }

    /// Extract dB-scaled mel features, shape `(frames, n_mels)`.
    pub fn apply(&self, audio: &[f32]) -> Spectrogram {
        let power = self.stft(audio);
        let mel = self.filterbank.dot(&power);
        mel.mapv(amplitude_to_db).reversed_axes().as_standard_layout().into_owned()
    }

    /// Power spectrogram, shape `(freq_bins, frames)`.
    fn stft(&self, audio: &[f32]) -> Array2<f32> {
        use rustfft::{FftPlanner, num_complex::Complex};

        let num_frames = self.num_frames(audio.len());
        let freq_bins = self.n_fft / 2 + 1;
        let mut spectrogram = Array2::<f32>::zeros((freq_bins, num_frames));

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(self.n_fft);
        let mut frame = vec![Complex::new(0.0, 0.0); self.n_fft];

        for frame_idx in 0..num_frames {
            let start = frame_idx * self.hop_length;

            frame.fill(Complex::new(0.0, 0.0));
            for (i, (&x, &w)) in audio[start..start + self.win_length]
                .iter()
                .zip(&self.window)
                .enumerate()
            {
                frame[i] = Complex::new(x * w, 0.0);
            }

            fft.process(&mut frame);

            for k in 0..freq_bins {
                spectrogram[[k, frame_idx]] = frame[k].norm_sqr();
            }
        }

        spectrogram
    }
}

/// Power to decibels with a 1e-10 floor.
fn amplitude_to_db(x: f32) -> f32 {
    10.0 * x.max(1e-10).log10()
}

/// Create Hann window.
pub(crate) fn hann_window(window_length: usize) -> Vec<f32> {
    (0..window_length)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / window_length as f32).cos())
        .collect()
}

/// Convert frequency in Hz to mel scale.
fn hz_to_mel(freq: f32) -> f32 {
    2595.0 * (1.0 + freq / 700.0).log10()
}

/// Convert mel scale to frequency in Hz.
fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Create triangular mel filterbank, shape `(n_mels, n_fft / 2 + 1)`.
fn create_mel_filterbank(n_fft: usize, n_mels: usize, sample_rate: usize) -> Array2<f32> {
    let freq_bins = n_fft / 2 + 1;
    let mut filterbank = Array2::<f32>::zeros((n_mels, freq_bins));

    let min_mel = hz_to_mel(0.0);
    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);

    let mel_points: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f32 / (n_mels + 1) as f32))
        .collect();

    let freq_bin_width = sample_rate as f32 / n_fft as f32;

    for mel_idx in 0..n_mels {
        let left = mel_points[mel_idx];
        let center = mel_points[mel_idx + 1];
        let right = mel_points[mel_idx + 2];

        for freq_idx in 0..freq_bins {
            let freq = freq_idx as f32 * freq_bin_width;

            if freq >= left && freq <= center && center > left {
                filterbank[[mel_idx, freq_idx]] = (freq - left) / (center - left);
            } else if freq > center && freq <= right && right > center {
                filterbank[[mel_idx, freq_idx]] = (right - freq) / (right - center);
            }
        }
    }

    filterbank
}
