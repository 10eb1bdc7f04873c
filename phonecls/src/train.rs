//! Train subcommand - fit a frame classifier and report held-out metrics.

use crate::config::TrainConfig;
use eyre::{Context, Result};
use phonecls_core::batch::BatchLoader;
use phonecls_core::corpus::TimitCorpus;
use phonecls_core::dataset::{FrameDataset, random_split};
use phonecls_core::fold::LabelFolder;
use phonecls_core::metrics::BatchMetrics;
use phonecls_core::model::SoftmaxClassifier;
use phonecls_core::phoneme::PhonemeInventory;
use phonecls_core::settings::FrameSettings;
use phonecls_core::trainer::{TrainingConfig, TrainingLoop};
use phonecls_core::traits::RecordSource;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// CLI arguments for training.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Training corpus root (searched recursively for *.wav + *.phn)
    pub dir: PathBuf,

    /// Test corpus root evaluated once after training
    #[arg(long)]
    pub test_dir: Option<PathBuf>,

    /// JSON config file with `frame` and `training` sections (overrides flags)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write trained weights as JSON
    #[arg(long)]
    pub weights_out: Option<PathBuf>,

    /// Write the test confusion matrix as JSON
    #[arg(long)]
    pub confusion_out: Option<PathBuf>,

    #[command(flatten)]
    pub frame: FrameSettings,

    #[command(flatten)]
    pub training: TrainingConfig,
}

pub fn execute(config: TrainConfig) -> Result<()> {
    let inventory = PhonemeInventory::timit();
    let folder = LabelFolder::new(inventory)?;
    let mut rng = StdRng::seed_from_u64(config.training.seed);

    tracing::info!(dir = ?config.dir.display(), "loading training corpus");
    let corpus = TimitCorpus::open(&config.dir, config.training.exclude_sa)
        .wrap_err_with(|| format!("failed to open corpus: {:?}", config.dir.display()))?;

    let (train_split, val_split) = random_split(&corpus, config.training.val_fraction, &mut rng)?;
    tracing::info!(
        train = train_split.len(),
        validation = val_split.len(),
        "split corpus"
    );

    let train_set = FrameDataset::new(train_split, config.frame, inventory)?
        .with_augmentation(config.training.augment);
    let val_set = FrameDataset::new(val_split, config.frame, inventory)?;

    let train_loader = loader(&train_set, &config.training).shuffle(true);
    let val_loader = loader(&val_set, &config.training);

    let model = SoftmaxClassifier::new(
        config.frame.n_mels,
        config.frame.frame_resolution,
        inventory.training_count(),
        &mut rng,
    );
    let mut training = TrainingLoop::new(model, config.training.clone(), &folder)?;

    let s = Instant::now();
    let history = training
        .fit(&train_loader, (!val_set.is_empty()).then_some(&val_loader))
        .wrap_err("training failed")?;
    tracing::info!(duration = %format_secs(s.elapsed().as_secs_f32()), "training completed");

    if let Some(last) = history.last() {
        println!(
            "epoch {}: train loss {:.4}{}",
            last.epoch + 1,
            last.train_loss,
            last.validation.map(format_metrics).unwrap_or_default()
        );
    }

    if let Some(test_dir) = &config.test_dir {
        let corpus = TimitCorpus::open(test_dir, config.training.exclude_sa)
            .wrap_err_with(|| format!("failed to open test corpus: {:?}", test_dir.display()))?;
        let test_set = FrameDataset::new(corpus, config.frame, inventory)?;
        let report = training
            .test(&loader(&test_set, &config.training))
            .wrap_err("test evaluation failed")?;

        println!(
            "test:{}",
            report.metrics.map(format_metrics).unwrap_or_default()
        );

        if let Some(path) = &config.confusion_out {
            write_json(path, &report.confusion)?;
        }
    } else if config.confusion_out.is_some() {
        tracing::warn!("--confusion-out requires --test-dir, skipping");
    }

    if let Some(path) = &config.weights_out {
        write_json(path, training.model())?;
    }

    Ok(())
}

fn loader<'d, 'a, S: RecordSource + Sync>(
    dataset: &'d FrameDataset<'a, S>,
    training: &TrainingConfig,
) -> BatchLoader<'d, 'a, S> {
    BatchLoader::new(dataset, training.batch_size)
        .workers(training.workers)
        .seed(training.seed)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    tracing::info!(path = ?path.display(), "write json file");

    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)
        .wrap_err_with(|| format!("failed to write json: {:?}", path.display()))
}

fn format_metrics(metrics: BatchMetrics) -> String {
    let per = metrics
        .phoneme_error_rate
        .map_or_else(|| "n/a".to_string(), |per| format!("{per:.4}"));
    format!(
        " loss {:.4} fer {:.4} per {}",
        metrics.loss, metrics.frame_error_rate, per
    )
}

/// Format seconds as a string with two decimal places.
fn format_secs(secs: f32) -> String {
    format!("{:.2}s", secs)
}
