//! Epoch orchestration with a one-cycle schedule and plateau-based decay.

use crate::batch::{Batch, BatchLoader};
use crate::error::{AlignmentError, ConfigError, Result, TrainingError};
use crate::fold::LabelFolder;
use crate::metrics::{
    BatchMetrics, ConfusionMatrix, MetricAccumulator, SequenceMetrics, cross_entropy,
};
use crate::schedule::{OneCycleSchedule, PlateauDetector};
use crate::traits::{FrameClassifier, RecordSource};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

const DEFAULT_EPOCHS: usize = 30;
const DEFAULT_BATCH_SIZE: usize = 16;
const DEFAULT_LEARNING_RATE: f32 = 0.001;
const DEFAULT_LR_PATIENCE: usize = 1;
const DEFAULT_LR_REDUCE_FACTOR: f32 = 0.1;
const DEFAULT_VAL_FRACTION: f32 = 0.05;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_SEED: u64 = 42;

/// Validation quantity watched by the plateau detector.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Monitor {
    #[default]
    Loss,
    Fer,
    Per,
}

impl Monitor {
    pub fn value(&self, metrics: &BatchMetrics) -> Option<f32> {
        match self {
            Monitor::Loss => Some(metrics.loss),
            Monitor::Fer => Some(metrics.frame_error_rate),
            Monitor::Per => metrics.phoneme_error_rate,
        }
    }
}

/// Training hyperparameters.
#[derive(clap::Args, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training epochs
    #[arg(long, default_value_t = DEFAULT_EPOCHS)]
    pub epochs: usize,

    /// Records per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Base learning rate (peak of each one-cycle ramp)
    #[arg(long = "lr", default_value_t = DEFAULT_LEARNING_RATE)]
    pub learning_rate: f32,

    /// Stalled validation epochs tolerated before reducing the rate
    #[arg(long, default_value_t = DEFAULT_LR_PATIENCE)]
    pub lr_patience: usize,

    /// Multiplier applied to the base rate on a plateau
    #[arg(long, default_value_t = DEFAULT_LR_REDUCE_FACTOR)]
    pub lr_reduce_factor: f32,

    /// Validation metric watched for plateaus
    #[arg(long, value_enum, default_value_t = Monitor::Loss)]
    pub monitor: Monitor,

    /// Apply waveform and spectrogram augmentation to training records
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub augment: bool,

    /// Fraction of the training corpus held out for validation
    #[arg(long, default_value_t = DEFAULT_VAL_FRACTION)]
    pub val_fraction: f32,

    /// Skip TIMIT dialect (sa*) sentences
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub exclude_sa: bool,

    /// Threads building each batch
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Seed for splitting, shuffling, initialization, and augmentation
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            learning_rate: DEFAULT_LEARNING_RATE,
            lr_patience: DEFAULT_LR_PATIENCE,
            lr_reduce_factor: DEFAULT_LR_REDUCE_FACTOR,
            monitor: Monitor::default(),
            augment: true,
            val_fraction: DEFAULT_VAL_FRACTION,
            exclude_sa: true,
            workers: DEFAULT_WORKERS,
            seed: DEFAULT_SEED,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(ConfigError::Zero { name: "epochs" }.into());
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero { name: "batch size" }.into());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidLearningRate(self.learning_rate).into());
        }
        if !(self.lr_reduce_factor > 0.0 && self.lr_reduce_factor < 1.0) {
            return Err(ConfigError::InvalidReduceFactor(self.lr_reduce_factor).into());
        }
        if !(0.0..1.0).contains(&self.val_fraction) {
            return Err(ConfigError::InvalidFraction(self.val_fraction).into());
        }
        Ok(())
    }
}

/// Per-epoch training record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpochSummary {
    pub epoch: usize,
    /// Base rate in effect during the epoch
    pub learning_rate: f32,
    pub train_loss: f32,
    pub validation: Option<BatchMetrics>,
}

/// Test-set metrics with the evaluation-alphabet confusion matrix.
#[derive(Clone, Debug, Serialize)]
pub struct TestReport {
    pub metrics: Option<BatchMetrics>,
    pub confusion: ConfusionMatrix,
}

/// Owns the model and every piece of mutable training state.
///
/// The one-cycle schedule always runs relative to the current base rate,
/// which only the plateau detector changes.
pub struct TrainingLoop<'f, M> {
    model: M,
    config: TrainingConfig,
    metrics: SequenceMetrics<'f>,
    plateau: PlateauDetector,
    base_rate: f32,
}

impl<'f, M: FrameClassifier> TrainingLoop<'f, M> {
    pub fn new(model: M, config: TrainingConfig, folder: &'f LabelFolder) -> Result<Self> {
        config.validate()?;

        if model.num_classes() != folder.num_classes() {
            return Err(TrainingError::ClassCountMismatch {
                expected: folder.num_classes(),
                got: model.num_classes(),
            }
            .into());
        }

        Ok(Self {
            plateau: PlateauDetector::new(config.lr_patience, config.lr_reduce_factor),
            base_rate: config.learning_rate,
            metrics: SequenceMetrics::new(folder),
            model,
            config,
        })
    }

    /// Current base learning rate.
    pub fn learning_rate(&self) -> f32 {
        self.base_rate
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Run every epoch, validating after each when a validation loader is given.
    pub fn fit<S, V>(
        &mut self,
        train: &BatchLoader<'_, '_, S>,
        validation: Option<&BatchLoader<'_, '_, V>>,
    ) -> Result<Vec<EpochSummary>>
    where
        S: RecordSource + Sync,
        V: RecordSource + Sync,
    {
        let mut history = Vec::with_capacity(self.config.epochs);

        for epoch in 0..self.config.epochs {
            let learning_rate = self.base_rate;
            let train_loss = self.train_epoch(train, epoch)?;
            let validation = match validation {
                Some(loader) => self.validate(loader, epoch)?,
                None => None,
            };

            tracing::info!(
                epoch,
                learning_rate,
                train_loss,
                val_loss = validation.map(|m| m.loss),
                val_fer = validation.map(|m| m.frame_error_rate),
                val_per = validation.and_then(|m| m.phoneme_error_rate),
                "epoch finished"
            );

            history.push(EpochSummary {
                epoch,
                learning_rate,
                train_loss,
                validation,
            });
        }

        Ok(history)
    }

    /// One pass over `loader` with a gradient step per batch. Returns the mean batch loss.
    ///
    /// # Errors
    ///
    /// [`TrainingError::NonFiniteLoss`] stops the run.
    pub fn train_epoch<S: RecordSource + Sync>(
        &mut self,
        loader: &BatchLoader<'_, '_, S>,
        epoch: usize,
    ) -> Result<f32> {
        let schedule = OneCycleSchedule::new(loader.num_batches());
        let mut total = 0.0f64;
        let mut steps = 0;

        for (step, batch) in loader.epoch(epoch).enumerate() {
            let batch = batch?;
            let learning_rate = schedule.rate_at(self.base_rate, step);

            let scores = self.scores(&batch)?;
            let (loss, grads) = cross_entropy(&scores, &batch.labels)?;
            if !loss.is_finite() {
                return Err(TrainingError::NonFiniteLoss { loss, epoch, step }.into());
            }

            self.model.backward(&batch, &grads, learning_rate)?;

            tracing::debug!(epoch, step, loss, learning_rate, "train step");
            total += loss as f64;
            steps += 1;
        }

        Ok(if steps == 0 { 0.0 } else { (total / steps as f64) as f32 })
    }

    /// Evaluate on `loader`, then feed the monitored metric to the plateau detector.
    pub fn validate<S: RecordSource + Sync>(
        &mut self,
        loader: &BatchLoader<'_, '_, S>,
        epoch: usize,
    ) -> Result<Option<BatchMetrics>> {
        let metrics = self.evaluate(loader, epoch, None)?;

        match metrics.and_then(|m| self.config.monitor.value(&m)) {
            Some(value) => self.base_rate = self.plateau.observe(value, self.base_rate),
            None => tracing::warn!(
                epoch,
                monitor = ?self.config.monitor,
                "monitored metric unavailable, skipping plateau check"
            ),
        }

        Ok(metrics)
    }

    /// Evaluate on `loader` and collect a confusion matrix over evaluation groups.
    pub fn test<S: RecordSource + Sync>(
        &mut self,
        loader: &BatchLoader<'_, '_, S>,
    ) -> Result<TestReport> {
        let mut confusion = ConfusionMatrix::new(self.metrics.folder().group_symbols().to_vec());
        let metrics = self.evaluate(loader, 0, Some(&mut confusion))?;

        tracing::info!(
            test_loss = metrics.map(|m| m.loss),
            test_fer = metrics.map(|m| m.frame_error_rate),
            test_per = metrics.and_then(|m| m.phoneme_error_rate),
            frames = confusion.total(),
            "test finished"
        );

        Ok(TestReport { metrics, confusion })
    }

    /// Mean batch metrics over `loader` without updating the model.
    pub fn evaluate<S: RecordSource + Sync>(
        &mut self,
        loader: &BatchLoader<'_, '_, S>,
        epoch: usize,
        mut confusion: Option<&mut ConfusionMatrix>,
    ) -> Result<Option<BatchMetrics>> {
        let mut accumulator = MetricAccumulator::default();

        for batch in loader.epoch(epoch) {
            let batch = batch?;
            let scores = self.scores(&batch)?;
            let evaluation =
                self.metrics
                    .evaluate(&scores, &batch.labels, &batch.label_lengths())?;

            if let Some(matrix) = confusion.as_deref_mut() {
                matrix.update(&evaluation.predicted, &evaluation.target)?;
            }

            tracing::debug!(
                epoch,
                loss = evaluation.metrics.loss,
                fer = evaluation.metrics.frame_error_rate,
                "eval step"
            );
            accumulator.push(&evaluation.metrics);
        }

        Ok(accumulator.mean())
    }

    /// Forward pass with shape checks against the batch.
    fn scores(&mut self, batch: &Batch) -> Result<Vec<Array2<f32>>> {
        let scores = self.model.forward(batch)?;

        let classes = self.model.num_classes();
        if let Some(bad) = scores.iter().find(|s| s.ncols() != classes) {
            return Err(TrainingError::ClassCountMismatch {
                expected: classes,
                got: bad.ncols(),
            }
            .into());
        }

        let rows: usize = scores.iter().map(Array2::nrows).sum();
        if rows != batch.labels.len() {
            return Err(AlignmentError::LabelCountMismatch {
                labels: batch.labels.len(),
                rows,
            }
            .into());
        }

        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::dataset::{FrameDataset, Record};
    use crate::error::Error;
    use crate::model::SoftmaxClassifier;
    use crate::phoneme::{PhonemeInterval, PhonemeInventory};
    use crate::settings::FrameSettings;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f32::consts::PI;

    fn tone(freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / 16000.0).sin() * 0.5)
            .collect()
    }

    /// Low tone labeled "aa" followed by a high tone labeled "s".
    fn records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| {
                let half = 2400 + 160 * i;
                let mut samples = tone(300.0, half);
                samples.extend(tone(5000.0, half));
                Record {
                    audio: AudioBuffer::mono(samples, 16000),
                    intervals: vec![
                        PhonemeInterval::new("aa", 0, half),
                        PhonemeInterval::new("s", half, 2 * half),
                    ],
                }
            })
            .collect()
    }

    fn config() -> TrainingConfig {
        TrainingConfig {
            epochs: 5,
            batch_size: 2,
            learning_rate: 0.05,
            augment: false,
            workers: 2,
            ..TrainingConfig::default()
        }
    }

    fn model() -> SoftmaxClassifier {
        let mut rng = StdRng::seed_from_u64(0);
        SoftmaxClassifier::new(80, 1, 48, &mut rng)
    }

    #[test]
    fn defaults_validate() {
        let config = TrainingConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.epochs, 30);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.monitor, Monitor::Loss);
    }

    #[test]
    fn rejects_bad_hyperparameters() {
        let bad = [
            TrainingConfig { epochs: 0, ..TrainingConfig::default() },
            TrainingConfig { learning_rate: 0.0, ..TrainingConfig::default() },
            TrainingConfig { lr_reduce_factor: 1.0, ..TrainingConfig::default() },
            TrainingConfig { val_fraction: 1.0, ..TrainingConfig::default() },
        ];

        for config in bad {
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{config:?}");
        }
    }

    #[test]
    fn config_loads_from_partial_json() {
        let config: TrainingConfig =
            serde_json::from_str(r#"{"epochs": 3, "monitor": "per"}"#).unwrap();

        assert_eq!(config.epochs, 3);
        assert_eq!(config.monitor, Monitor::Per);
        assert_eq!(config.batch_size, 16);
    }

    #[test]
    fn rejects_model_with_wrong_class_count() {
        let folder = LabelFolder::new(PhonemeInventory::timit()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let model = SoftmaxClassifier::new(80, 1, 39, &mut rng);

        assert!(matches!(
            TrainingLoop::new(model, config(), &folder),
            Err(Error::Training(TrainingError::ClassCountMismatch { expected: 48, got: 39 }))
        ));
    }

    #[test]
    fn fit_reduces_validation_loss() {
        let inventory = PhonemeInventory::timit();
        let folder = LabelFolder::new(inventory).unwrap();
        let settings = FrameSettings::default();

        let train = FrameDataset::new(records(6), settings, inventory).unwrap();
        let val = FrameDataset::new(records(2), settings, inventory).unwrap();
        let train_loader = BatchLoader::new(&train, 2).shuffle(true).workers(2).seed(1);
        let val_loader = BatchLoader::new(&val, 2);

        let mut training = TrainingLoop::new(model(), config(), &folder).unwrap();
        let history = training.fit(&train_loader, Some(&val_loader)).unwrap();

        assert_eq!(history.len(), 5);
        let first = history[0].validation.unwrap();
        let last = history[4].validation.unwrap();
        assert!(last.loss < first.loss, "{} -> {}", first.loss, last.loss);
        assert!(last.frame_error_rate < 0.5);
    }

    #[test]
    fn test_phase_fills_confusion_matrix() {
        let inventory = PhonemeInventory::timit();
        let folder = LabelFolder::new(inventory).unwrap();
        let dataset = FrameDataset::new(records(3), FrameSettings::default(), inventory).unwrap();
        let loader = BatchLoader::new(&dataset, 2);

        let mut training = TrainingLoop::new(model(), config(), &folder).unwrap();
        let report = training.test(&loader).unwrap();

        let frames: usize = (0..3)
            .map(|i| FrameSettings::default().frame_count(2 * (2400 + 160 * i)))
            .sum();
        assert_eq!(report.confusion.total(), frames as u64);
        assert_eq!(report.confusion.labels().len(), 39);
        assert!(report.metrics.is_some());
    }

    #[test]
    fn plateau_reduces_base_rate_across_epochs() {
        let inventory = PhonemeInventory::timit();
        let folder = LabelFolder::new(inventory).unwrap();
        let dataset = FrameDataset::new(records(2), FrameSettings::default(), inventory).unwrap();
        let loader = BatchLoader::new(&dataset, 2);

        // Validation never updates the model, so the second pass cannot improve
        let mut config = config();
        config.learning_rate = 1e-12;
        config.lr_patience = 0;
        let mut training = TrainingLoop::new(model(), config, &folder).unwrap();

        training.validate(&loader, 0).unwrap();
        assert_eq!(training.learning_rate(), 1e-12);
        training.validate(&loader, 1).unwrap();
        assert!((training.learning_rate() - 1e-13).abs() < 1e-18);
    }
}
