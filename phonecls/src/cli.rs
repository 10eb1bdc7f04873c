//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use eyre::Result;

#[derive(Debug, Parser)]
#[command(name = "phonecls")]
#[command(about = "Frame-level phoneme classifier training and alignment tools")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Train a frame classifier on a TIMIT-style corpus
    Train(crate::train::Args),

    /// Print the per-frame labels derived from a transcript
    Align(crate::align::Args),
}

/// Execute CLI command - separated for testing.
pub fn run_cli(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Train(args) => crate::train::execute(args.try_into()?),
        Commands::Align(args) => crate::align::execute(args.try_into()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phonecls_core::settings::FrameSettings;
    use phonecls_core::trainer::{Monitor, TrainingConfig};

    #[test]
    fn parses_train_command() {
        let cli = Cli::parse_from(["phonecls", "train", "timit/train"]);

        match &cli.command {
            Commands::Train(crate::train::Args {
                dir,
                test_dir: None,
                config: None,
                training,
                frame,
                ..
            }) if dir.to_str() == Some("timit/train") => {
                assert_eq!(training, &TrainingConfig::default());
                assert_eq!(frame, &FrameSettings::default());
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_train_overrides() {
        let cli = Cli::parse_from([
            "phonecls",
            "train",
            "timit/train",
            "--test-dir",
            "timit/test",
            "--epochs",
            "3",
            "--lr",
            "0.01",
            "--monitor",
            "per",
            "--augment",
            "false",
            "--frame-resolution",
            "2",
        ]);

        match &cli.command {
            Commands::Train(crate::train::Args {
                test_dir: Some(test_dir),
                training,
                frame,
                ..
            }) if test_dir.to_str() == Some("timit/test") => {
                assert_eq!(training.epochs, 3);
                assert!((training.learning_rate - 0.01).abs() < 1e-9);
                assert_eq!(training.monitor, Monitor::Per);
                assert!(!training.augment);
                assert_eq!(frame.frame_resolution, 2);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_align_command() {
        let cli = Cli::parse_from(["phonecls", "align", "si1027.wav", "--phn", "si1027.PHN"]);

        match &cli.command {
            Commands::Align(crate::align::Args {
                path,
                phn: Some(phn),
                ..
            }) => {
                assert_eq!(path.to_str(), Some("si1027.wav"));
                assert_eq!(phn.to_str(), Some("si1027.PHN"));
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }
}
