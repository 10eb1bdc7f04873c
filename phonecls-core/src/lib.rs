//! phonecls-core: frame-level phoneme classification on TIMIT-style corpora.
//!
//! The crate turns `(waveform, phoneme intervals)` records into fixed-stride
//! spectrogram frames with one label per frame, scores predictions after
//! folding into a coarser evaluation alphabet, and drives training with a
//! per-epoch one-cycle learning rate and plateau-based decay.
//!
//! # Architecture
//!
//! The library is built around two traits:
//!
//! - [`traits::RecordSource`]: Indexed source of labeled utterances
//! - [`traits::FrameClassifier`]: Model producing per-frame class scores
//!
//! Data flows through:
//!
//! ```text
//! RecordSource → AugmentationPipeline → FrameDataset (MelSpectrogram + FrameLabelAligner)
//!     → BatchLoader → FrameClassifier → SequenceMetrics (LabelFolder) → TrainingLoop
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use phonecls_core::batch::BatchLoader;
//! use phonecls_core::corpus::TimitCorpus;
//! use phonecls_core::dataset::FrameDataset;
//! use phonecls_core::fold::LabelFolder;
//! use phonecls_core::model::SoftmaxClassifier;
//! use phonecls_core::phoneme::PhonemeInventory;
//! use phonecls_core::settings::FrameSettings;
//! use phonecls_core::trainer::{TrainingConfig, TrainingLoop};
//!
//! let inventory = PhonemeInventory::timit();
//! let settings = FrameSettings::default();
//! let corpus = TimitCorpus::open("timit/train", true)?;
//! let dataset = FrameDataset::new(corpus, settings, inventory)?.with_augmentation(true);
//! let loader = BatchLoader::new(&dataset, 16).shuffle(true).workers(4);
//!
//! let folder = LabelFolder::new(inventory)?;
//! let model = SoftmaxClassifier::new(settings.n_mels, 1, inventory.training_count(), &mut rng);
//! let mut training = TrainingLoop::new(model, TrainingConfig::default(), &folder)?;
//! training.fit(&loader, None::<&BatchLoader<'_, '_, TimitCorpus>>)?;
//! ```

pub mod align;
pub mod audio;
pub mod augment;
pub mod batch;
pub mod corpus;
pub mod dataset;
pub mod error;
pub mod fold;
pub mod metrics;
pub mod model;
pub mod phoneme;
pub mod schedule;
pub mod settings;
pub mod trainer;
pub mod traits;
