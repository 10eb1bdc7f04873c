//! Frame geometry and feature settings shared by every pipeline stage.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};

/// Canonical sample rate (16kHz)
pub const SAMPLE_RATE: u32 = 16000;

/// Mel features per spectrogram row
pub const N_MELS: usize = 80;

/// Frame window length in milliseconds
pub const FRAME_LENGTH_MS: usize = 25;

/// Frame stride in milliseconds
pub const STRIDE_MS: usize = 10;

/// Spectrogram rows aggregated per label
pub const FRAME_RESOLUTION: usize = 1;

/// Time-masking block size in spectrogram rows
pub const SPECGRAM_FRAME_LENGTH: usize = 20;

/// Frame and spectrogram geometry.
///
/// Millisecond settings are converted to sample counts with integer
/// arithmetic: `(sample_rate / 1000) * ms`.
#[derive(clap::Args, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    /// Canonical sample rate in Hz
    #[arg(long, default_value_t = SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Mel features per spectrogram row
    #[arg(long, default_value_t = N_MELS)]
    pub n_mels: usize,

    /// Frame window length in milliseconds
    #[arg(long = "frame-length", default_value_t = FRAME_LENGTH_MS)]
    pub frame_length_ms: usize,

    /// Frame stride in milliseconds
    #[arg(long = "stride", default_value_t = STRIDE_MS)]
    pub stride_ms: usize,

    /// Spectrogram rows aggregated per frame label
    #[arg(long, default_value_t = FRAME_RESOLUTION)]
    pub frame_resolution: usize,

    /// Time-masking block size in spectrogram rows
    #[arg(long, default_value_t = SPECGRAM_FRAME_LENGTH)]
    pub specgram_frame_length: usize,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            n_mels: N_MELS,
            frame_length_ms: FRAME_LENGTH_MS,
            stride_ms: STRIDE_MS,
            frame_resolution: FRAME_RESOLUTION,
            specgram_frame_length: SPECGRAM_FRAME_LENGTH,
        }
    }
}

impl FrameSettings {
    fn samples_per_ms(&self) -> usize {
        self.sample_rate as usize / 1000
    }

    /// Samples covered by one frame window (SAMPLES_PER_FRAME).
    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_ms() * self.frame_length_ms
    }

    /// Samples between consecutive frame starts (SAMPLES_PER_STRIDE).
    pub fn samples_per_stride(&self) -> usize {
        self.samples_per_ms() * self.stride_ms
    }

    /// Hop between spectrogram rows (SPECGRAM_SAMPLES_STRIDE).
    pub fn specgram_samples_stride(&self) -> usize {
        self.samples_per_stride() / self.frame_resolution
    }

    /// Window of one spectrogram row.
    ///
    /// Shortened by `(frame_resolution - 1)` row hops so the last row of a
    /// label frame ends where the frame window ends. Label frame `j` then
    /// exists iff its last row `(j + 1) * frame_resolution - 1` does.
    pub fn specgram_samples_per_frame(&self) -> usize {
        let lead = (self.frame_resolution - 1) * self.specgram_samples_stride();
        self.samples_per_frame().saturating_sub(lead)
    }

    /// Number of label frames for a waveform of `n_samples`.
    ///
    /// Frame `k` exists iff `k * stride + frame_length < n_samples`.
    pub fn frame_count(&self, n_samples: usize) -> usize {
        grid_count(n_samples, self.samples_per_frame(), self.samples_per_stride())
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("sample rate (kHz)", self.samples_per_ms()),
            ("n_mels", self.n_mels),
            ("frame length", self.frame_length_ms),
            ("stride", self.stride_ms),
            ("frame resolution", self.frame_resolution),
            ("specgram frame length", self.specgram_frame_length),
        ];

        if let Some((name, _)) = positive.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero { name }.into());
        }

        let stride = self.samples_per_stride();
        let frame = self.samples_per_frame();

        if stride % self.frame_resolution != 0 {
            return Err(ConfigError::IndivisibleStride {
                stride,
                resolution: self.frame_resolution,
            }
            .into());
        }

        if frame < stride {
            return Err(ConfigError::FrameShorterThanStride { frame, stride }.into());
        }

        Ok(())
    }
}

/// Count windows of `window` samples at `hop` that end strictly before `n_samples`.
pub(crate) fn grid_count(n_samples: usize, window: usize, hop: usize) -> usize {
    if n_samples <= window {
        0
    } else {
        (n_samples - window - 1) / hop + 1
    }
}
