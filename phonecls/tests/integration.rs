//! Integration tests for phonecls CLI.

use clap::Parser;
use hound::{SampleFormat, WavSpec, WavWriter};
use phonecls::align::align_file;
use phonecls::cli::{Cli, run_cli};
use phonecls::config::AlignConfig;
use phonecls_core::settings::FrameSettings;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

/// Write a two-phoneme utterance: a low tone ("aa") then a high tone ("s").
fn write_utterance(dir: &Path, name: &str, half: usize, sample_rate: u32) -> PathBuf {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let path = dir.join(format!("{name}.wav"));
    let mut writer = WavWriter::create(&path, spec).expect("failed to create wav");
    for i in 0..2 * half {
        let freq = if i < half { 300.0 } else { 4000.0 };
        let t = i as f32 / sample_rate as f32;
        let sample = (2.0 * PI * freq * t).sin() * 0.5;
        writer
            .write_sample((sample * i16::MAX as f32) as i16)
            .expect("failed to write sample");
    }
    writer.finalize().expect("failed to finalize wav");

    std::fs::write(
        dir.join(format!("{name}.phn")),
        format!("0 {half} aa\n{half} {} s\n", 2 * half),
    )
    .expect("failed to write transcript");

    path
}

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("phonecls-test-{tag}-{}", std::process::id()));

    // Clean up previous test run
    if dir.exists() {
        std::fs::remove_dir_all(&dir).ok();
    }
    std::fs::create_dir_all(&dir).expect("failed to create temp dir");
    dir
}

fn write_corpus(root: &Path, speakers: &[&str]) {
    for (s, speaker) in speakers.iter().enumerate() {
        let dir = root.join("dr1").join(speaker);
        std::fs::create_dir_all(&dir).expect("failed to create speaker dir");
        for u in 0..3 {
            write_utterance(&dir, &format!("si{u}"), 3200 + 320 * (s + u), 16000);
        }
        write_utterance(&dir, "sa1", 3200, 16000);
    }
}

#[test]
fn train_writes_weights_and_confusion_matrix() {
    let root = temp_dir("train");
    let train_dir = root.join("train");
    let test_dir = root.join("test");
    write_corpus(&train_dir, &["fcjf0", "mdab0"]);
    write_corpus(&test_dir, &["mwbt0"]);

    let weights = root.join("weights.json");
    let confusion = root.join("confusion.json");

    let cli = Cli::parse_from([
        "phonecls",
        "train",
        train_dir.to_str().unwrap(),
        "--test-dir",
        test_dir.to_str().unwrap(),
        "--weights-out",
        weights.to_str().unwrap(),
        "--confusion-out",
        confusion.to_str().unwrap(),
        "--epochs",
        "2",
        "--batch-size",
        "2",
        "--val-fraction",
        "0.2",
        "--workers",
        "2",
    ]);

    run_cli(cli).expect("training failed");

    let weights: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&weights).unwrap()).unwrap();
    assert!(weights.get("weights").is_some());

    let confusion: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&confusion).unwrap()).unwrap();
    assert_eq!(confusion["labels"].as_array().map(Vec::len), Some(39));

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn train_reads_json_config() {
    let root = temp_dir("config");
    let train_dir = root.join("train");
    write_corpus(&train_dir, &["fcjf0"]);

    let config = root.join("config.json");
    std::fs::write(
        &config,
        r#"{"training": {"epochs": 1, "batch_size": 4, "augment": false, "val_fraction": 0.0}}"#,
    )
    .unwrap();
    let weights = root.join("weights.json");

    let cli = Cli::parse_from([
        "phonecls",
        "train",
        train_dir.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "--weights-out",
        weights.to_str().unwrap(),
    ]);

    run_cli(cli).expect("training failed");
    assert!(weights.exists());

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn train_rejects_invalid_config() {
    let root = temp_dir("invalid");
    let train_dir = root.join("train");
    write_corpus(&train_dir, &["fcjf0"]);

    let cli = Cli::parse_from([
        "phonecls",
        "train",
        train_dir.to_str().unwrap(),
        "--lr-reduce-factor",
        "1.5",
    ]);

    assert!(run_cli(cli).is_err());

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn align_prints_one_line_per_frame() {
    let root = temp_dir("align");
    let wav = write_utterance(&root, "si1027", 4000, 16000);

    let config = AlignConfig {
        path: wav.clone(),
        phn: wav.with_extension("phn"),
        frame: FrameSettings::default(),
    };
    let table = align_file(&config).expect("alignment failed");

    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), FrameSettings::default().frame_count(8000));
    assert!(lines[0].ends_with("\taa"));
    assert!(lines.last().unwrap().ends_with("\ts"));
    assert!(lines[1].starts_with("1\t0.01\t"));

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn align_resamples_off_rate_audio() {
    let root = temp_dir("resample");
    let wav = write_utterance(&root, "si648", 4000, 8000);

    let config = AlignConfig {
        path: wav.clone(),
        phn: wav.with_extension("phn"),
        frame: FrameSettings::default(),
    };
    let table = align_file(&config).expect("alignment failed");

    // 8000 samples at 8kHz become 16000 samples at 16kHz
    assert_eq!(table.lines().count(), FrameSettings::default().frame_count(16000));

    std::fs::remove_dir_all(&root).ok();
}
