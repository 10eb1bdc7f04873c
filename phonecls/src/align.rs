//! Align subcommand - print the evaluation symbol assigned to every frame.

use crate::config::AlignConfig;
use eyre::{Context, OptionExt, Result};
use phonecls_core::audio::{AudioBuffer, load_audio};
use phonecls_core::augment::{rescale_intervals, waveform};
use phonecls_core::dataset::{FrameDataset, Record};
use phonecls_core::fold::LabelFolder;
use phonecls_core::phoneme::{PhonemeInventory, read_transcript};
use phonecls_core::settings::FrameSettings;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt::Write;
use std::path::PathBuf;

/// CLI arguments for frame alignment.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Path to input WAV file
    pub path: PathBuf,

    /// Transcript path (default: same as input with .phn extension)
    #[arg(long)]
    pub phn: Option<PathBuf>,

    #[command(flatten)]
    pub frame: FrameSettings,
}

pub fn execute(config: AlignConfig) -> Result<()> {
    tracing::info!(
        input = ?config.path.display(),
        transcript = ?config.phn.display(),
        "aligning frames"
    );

    let table = align_file(&config)?;
    print!("{table}");

    Ok(())
}

/// Render one `frame<TAB>start_sec<TAB>symbol` line per label frame.
pub fn align_file(config: &AlignConfig) -> Result<String> {
    let audio = load_audio(&config.path)
        .wrap_err_with(|| format!("failed to load audio: {:?}", config.path.display()))?
        .to_mono()?;
    let intervals = read_transcript(&config.phn)
        .wrap_err_with(|| format!("failed to read transcript: {:?}", config.phn.display()))?;

    let rate = config.frame.sample_rate;
    let record = if audio.sample_rate == rate {
        Record { audio, intervals }
    } else {
        tracing::debug!(from = audio.sample_rate, to = rate, "resampling");
        let factor = audio.sample_rate as f32 / rate as f32;
        let samples = waveform::resample(&audio.samples, audio.sample_rate, rate)?;
        Record {
            audio: AudioBuffer::mono(samples, rate),
            intervals: rescale_intervals(&intervals, factor),
        }
    };

    render(config, record)
}

fn render(config: &AlignConfig, record: Record) -> Result<String> {
    let inventory = PhonemeInventory::timit();
    let folder = LabelFolder::new(inventory)?;
    let dataset = FrameDataset::new(vec![record], config.frame, inventory)?;

    // Unaugmented examples draw no randomness
    let mut rng = StdRng::seed_from_u64(0);
    let example = dataset.example(0, &mut rng)?;

    let stride_sec = config.frame.samples_per_stride() as f32 / config.frame.sample_rate as f32;
    let mut table = String::new();
    for (frame, &label) in example.labels.iter().enumerate() {
        let symbol = inventory
            .evaluation_symbol(folder.fold(label)?)
            .ok_or_eyre("folded label outside evaluation alphabet")?;
        writeln!(table, "{frame}\t{:.2}\t{symbol}", frame as f32 * stride_sec)?;
    }

    Ok(table)
}
