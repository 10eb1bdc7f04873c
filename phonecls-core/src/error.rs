//! Error types for phonecls-core organized by processing stage.

use ndarray::ShapeError;
use ndarray_stats::errors::MinMaxError;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline error variants organized by processing stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration stage error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Audio loading and signal processing error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Record or transcript integrity error
    #[error(transparent)]
    Data(#[from] DataError),

    /// Frame/label alignment error
    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    /// Metric computation error
    #[error(transparent)]
    Metric(#[from] MetricError),

    /// Training loop error
    #[error(transparent)]
    Training(#[from] TrainingError),
}

/// Configuration errors (frame settings, training hyperparameters).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting that must be positive was zero
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },

    /// Stride cannot be split evenly into spectrogram hops
    #[error("stride of {stride} samples is not divisible by frame resolution {resolution}")]
    IndivisibleStride { stride: usize, resolution: usize },

    /// Frame window shorter than the stride it is taken at
    #[error("frame length {frame} samples is shorter than stride {stride} samples")]
    FrameShorterThanStride { frame: usize, stride: usize },

    /// Learning rate out of range
    #[error("invalid learning rate: {0}")]
    InvalidLearningRate(f32),

    /// Reduce factor outside (0, 1)
    #[error("invalid learning rate reduce factor: {0} (expected 0 < factor < 1)")]
    InvalidReduceFactor(f32),

    /// Validation fraction outside [0, 1)
    #[error("invalid validation fraction: {0} (expected 0 <= fraction < 1)")]
    InvalidFraction(f32),
}

/// Audio loading and validation errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Sample rate validation failed
    #[error("invalid sample rate: expected {expected}Hz, got {got}Hz")]
    InvalidSampleRate { expected: u32, got: u32 },

    /// Channel count validation failed
    #[error("invalid channel count: {0}")]
    InvalidChannels(u16),

    /// Resampler construction or processing failed
    #[error("resampling failed: {0}")]
    Resample(String),

    /// IO error during audio loading
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),
}

/// Record and transcript integrity errors.
#[derive(Debug, Error)]
pub enum DataError {
    /// Symbol not present in the phoneme inventory
    #[error("unknown phoneme symbol: {0:?}")]
    UnknownSymbol(String),

    /// Record has no phoneme intervals
    #[error("record has no phoneme intervals")]
    EmptyTranscript,

    /// Waveform too short to hold a single frame
    #[error("utterance of {samples} samples is shorter than one frame")]
    EmptyUtterance { samples: usize },

    /// Interval with stop <= start in source data
    #[error("interval {index} is empty or reversed: [{start}, {stop})")]
    InvalidInterval {
        index: usize,
        start: usize,
        stop: usize,
    },

    /// Intervals not ordered by start sample
    #[error("interval {index} starts before its predecessor")]
    UnorderedIntervals { index: usize },

    /// Transcript line could not be parsed
    #[error("{path:?}:{line}: malformed transcript line {content:?}")]
    MalformedTranscript {
        path: PathBuf,
        line: usize,
        content: String,
    },

    /// Record index out of range for the dataset
    #[error("record index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Dataset has no records
    #[error("dataset is empty")]
    EmptyDataset,

    /// Batch built from zero examples
    #[error("cannot collate an empty batch")]
    EmptyBatch,

    /// Transcript file read failed
    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Frame/label alignment errors. These are data-integrity failures and abort the batch.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// Labeling loop visited a different number of frames than the spectrogram holds
    #[error("frame count mismatch: spectrogram has {expected} frames, labeling produced {got}")]
    FrameCountMismatch { expected: usize, got: usize },

    /// Model output rows disagree with label count
    #[error("label count mismatch: {labels} labels for {rows} output rows")]
    LabelCountMismatch { labels: usize, rows: usize },
}

/// Metric computation errors.
#[derive(Debug, Error)]
pub enum MetricError {
    /// No frames to score
    #[error("cannot compute metrics over an empty batch")]
    EmptyBatch,

    /// Class index outside the score matrix
    #[error("label {label} out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },

    /// Per-record scores and lengths disagree
    #[error("record {record}: expected {expected} score rows, got {got}")]
    RowCountMismatch {
        record: usize,
        expected: usize,
        got: usize,
    },

    /// ndarray-stats min/max error
    #[error(transparent)]
    MinMax(#[from] MinMaxError),
}

/// Training loop errors.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// Loss became NaN or infinite
    #[error("non-finite loss {loss} at epoch {epoch}, step {step}")]
    NonFiniteLoss { loss: f32, epoch: usize, step: usize },

    /// Model produced scores of the wrong width
    #[error("model produced {got} classes, expected {expected}")]
    ClassCountMismatch { expected: usize, got: usize },

    /// Worker thread panicked while preparing a batch
    #[error("batch worker panicked")]
    WorkerPanicked,

    /// ndarray shape error
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Result type alias for phonecls-core operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// hound::Error → AudioError → Error
impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Audio(AudioError::Hound(e))
    }
}

// std::io::Error → AudioError → Error
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Audio(AudioError::Io(e))
    }
}

// MinMaxError → MetricError → Error
impl From<MinMaxError> for Error {
    fn from(e: MinMaxError) -> Self {
        Error::Metric(MetricError::MinMax(e))
    }
}

// ShapeError → TrainingError → Error
impl From<ShapeError> for Error {
    fn from(e: ShapeError) -> Self {
        Error::Training(TrainingError::Shape(e))
    }
}
