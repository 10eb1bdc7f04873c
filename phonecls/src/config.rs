//! Configuration types for resolved CLI arguments.
//!
//! Args structs (for CLI parsing) live next to their subcommands. The
//! resolved Config structs and their TryFrom implementations live here.

use crate::align::Args as AlignArgs;
use crate::train::Args as TrainArgs;
use eyre::{Context, Result};
use phonecls_core::settings::FrameSettings;
use phonecls_core::trainer::TrainingConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// JSON configuration file accepted by `train --config`.
///
/// Missing sections and fields fall back to their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub frame: FrameSettings,
    pub training: TrainingConfig,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config: {:?}", path.display()))?;
        serde_json::from_str(&text)
            .wrap_err_with(|| format!("failed to parse config: {:?}", path.display()))
    }
}

/// Resolved configuration for training.
#[derive(Debug)]
pub struct TrainConfig {
    pub dir: PathBuf,
    pub test_dir: Option<PathBuf>,
    pub weights_out: Option<PathBuf>,
    pub confusion_out: Option<PathBuf>,
    pub frame: FrameSettings,
    pub training: TrainingConfig,
}

impl TryFrom<TrainArgs> for TrainConfig {
    type Error = eyre::Error;

    fn try_from(args: TrainArgs) -> Result<Self> {
        let (frame, training) = match &args.config {
            Some(path) => {
                let file = ConfigFile::load(path)?;
                (file.frame, file.training)
            }
            None => (args.frame, args.training),
        };

        frame.validate().wrap_err("invalid frame settings")?;
        training.validate().wrap_err("invalid training config")?;

        Ok(Self {
            dir: args.dir,
            test_dir: args.test_dir,
            weights_out: args.weights_out,
            confusion_out: args.confusion_out,
            frame,
            training,
        })
    }
}

/// Resolved configuration for frame alignment.
#[derive(Debug)]
pub struct AlignConfig {
    pub path: PathBuf,
    pub phn: PathBuf,
    pub frame: FrameSettings,
}

impl TryFrom<AlignArgs> for AlignConfig {
    type Error = eyre::Error;

    fn try_from(args: AlignArgs) -> Result<Self> {
        args.frame.validate().wrap_err("invalid frame settings")?;

        let phn = args
            .phn
            .unwrap_or_else(|| args.path.with_extension("phn"));

        Ok(Self {
            path: args.path,
            phn,
            frame: args.frame,
        })
    }
}
