//! Labeled records and the framed dataset that turns them into training examples.

use crate::align::FrameLabelAligner;
use crate::audio::{AudioBuffer, MelSpectrogram, Spectrogram};
use crate::augment::AugmentationPipeline;
use crate::error::{AlignmentError, AudioError, ConfigError, DataError, Result};
use crate::phoneme::{PhonemeInterval, PhonemeInventory};
use crate::settings::FrameSettings;
use crate::traits::RecordSource;
use ndarray::s;
use rand::Rng;
use rand::seq::SliceRandom;

/// One utterance with its time-aligned phoneme transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub audio: AudioBuffer,
    pub intervals: Vec<PhonemeInterval>,
}

/// View of a source restricted to a list of indices.
#[derive(Clone, Debug)]
pub struct Subset<S> {
    source: S,
    indices: Vec<usize>,
}

impl<S: RecordSource> Subset<S> {
    pub fn new(source: S, indices: Vec<usize>) -> Self {
        Self { source, indices }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl<S: RecordSource> RecordSource for Subset<S> {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn get(&self, index: usize) -> Result<Record> {
        let inner = *self.indices.get(index).ok_or(DataError::IndexOutOfRange {
            index,
            len: self.indices.len(),
        })?;
        self.source.get(inner)
    }
}

/// Randomly split `source` into `(train, validation)` subsets.
///
/// The validation subset holds `floor(len * fraction)` records.
pub fn random_split<S, R>(source: S, fraction: f32, rng: &mut R) -> Result<(Subset<S>, Subset<S>)>
where
    S: RecordSource + Clone,
    R: Rng + ?Sized,
{
    if !(0.0..1.0).contains(&fraction) {
        return Err(ConfigError::InvalidFraction(fraction).into());
    }

    let mut indices: Vec<usize> = (0..source.len()).collect();
    indices.shuffle(rng);

    let val_len = (source.len() as f64 * fraction as f64).floor() as usize;
    let train = indices.split_off(val_len);

    Ok((Subset::new(source.clone(), train), Subset::new(source, indices)))
}

/// Features and per-frame labels for one record.
///
/// `features.nrows() == labels.len() * frame_resolution`.
#[derive(Clone, Debug)]
pub struct Example {
    pub features: Spectrogram,
    pub labels: Vec<usize>,
}

/// Record source paired with the framing, labeling, and augmentation pipeline.
pub struct FrameDataset<'a, S> {
    source: S,
    settings: FrameSettings,
    mel: MelSpectrogram,
    aligner: FrameLabelAligner<'a>,
    augmentation: Option<AugmentationPipeline>,
}

impl<'a, S: RecordSource> FrameDataset<'a, S> {
    /// Create a dataset without augmentation.
    pub fn new(source: S, settings: FrameSettings, inventory: &'a PhonemeInventory) -> Result<Self> {
        settings.validate()?;

        Ok(Self {
            source,
            settings,
            mel: MelSpectrogram::from_settings(&settings),
            aligner: FrameLabelAligner::new(&settings, inventory),
            augmentation: None,
        })
    }

    /// Enable or disable random waveform and spectrogram augmentation.
    pub fn with_augmentation(mut self, enabled: bool) -> Self {
        self.augmentation = enabled.then(|| AugmentationPipeline::from_settings(&self.settings));
        self
    }

    pub fn settings(&self) -> &FrameSettings {
        &self.settings
    }

    pub fn is_augmented(&self) -> bool {
        self.augmentation.is_some()
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Build the training example for record `index`.
    ///
    /// `n_frames` follows the label grid of the waveform. The spectrogram is
    /// truncated to `n_frames * frame_resolution` rows, so row group `i`
    /// always covers label frame `i`.
    ///
    /// # Errors
    ///
    /// - [`AudioError::InvalidSampleRate`] for unaugmented audio off the canonical rate
    /// - [`DataError::EmptyUtterance`] when no full frame fits
    /// - [`AlignmentError::FrameCountMismatch`] on grid disagreement
    pub fn example<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Example> {
        let mut record = self.source.get(index)?;

        if let Some(augmentation) = &self.augmentation {
            record = augmentation.augment_record(record, rng)?;
        }

        let audio = record.audio.to_mono()?;
        if audio.sample_rate != self.settings.sample_rate {
            return Err(AudioError::InvalidSampleRate {
                expected: self.settings.sample_rate,
                got: audio.sample_rate,
            }
            .into());
        }

        let n_samples = audio.samples.len();
        let spec = self.mel.apply(&audio.samples);

        let resolution = self.settings.frame_resolution;
        let n_frames = self.settings.frame_count(n_samples);
        if n_frames == 0 {
            return Err(DataError::EmptyUtterance { samples: n_samples }.into());
        }
        if spec.nrows() / resolution != n_frames {
            return Err(AlignmentError::FrameCountMismatch {
                expected: spec.nrows() / resolution,
                got: n_frames,
            }
            .into());
        }

        let mut features = spec.slice(s![..n_frames * resolution, ..]).to_owned();
        if let Some(augmentation) = &self.augmentation {
            features = augmentation.augment_spectrogram(&features, rng)?;
        }

        let labels = self
            .aligner
            .frame_labels(&record.intervals, n_frames, n_samples)?;

        tracing::trace!(index, n_samples, n_frames, "built example");

        Ok(Example { features, labels })
    }
}
