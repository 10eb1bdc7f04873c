//! On-disk TIMIT-style corpus: `*.wav` files with sibling `*.phn` transcripts.
//!
//! Audio must be RIFF WAV. Original TIMIT distributions ship NIST SPHERE
//! headers and need converting first.

use crate::audio::load_audio;
use crate::dataset::Record;
use crate::error::{DataError, Result};
use crate::phoneme::read_transcript;
use crate::traits::RecordSource;
use std::path::{Path, PathBuf};

/// Paired audio and transcript paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorpusEntry {
    pub audio: PathBuf,
    pub transcript: PathBuf,
}

/// Lazily loaded corpus rooted at a directory.
#[derive(Clone, Debug)]
pub struct TimitCorpus {
    root: PathBuf,
    entries: Vec<CorpusEntry>,
}

impl TimitCorpus {
    /// Walk `root` recursively and pair every WAV file with its transcript.
    ///
    /// With `exclude_sa`, dialect sentences (file names starting with `sa`)
    /// are skipped. Entries are sorted by path.
    pub fn open(root: impl AsRef<Path>, exclude_sa: bool) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut wavs = Vec::new();
        collect_wavs(&root, &mut wavs)?;
        wavs.sort();

        let mut skipped = 0;
        let entries: Vec<CorpusEntry> = wavs
            .into_iter()
            .filter(|path| !(exclude_sa && is_dialect_sentence(path)))
            .filter_map(|audio| match transcript_for(&audio) {
                Some(transcript) => Some(CorpusEntry { audio, transcript }),
                None => {
                    tracing::warn!(path = %audio.display(), "no transcript next to audio file");
                    skipped += 1;
                    None
                }
            })
            .collect();

        tracing::info!(
            root = %root.display(),
            records = entries.len(),
            skipped,
            exclude_sa,
            "opened corpus"
        );

        if entries.is_empty() {
            return Err(DataError::EmptyDataset.into());
        }

        Ok(Self { root, entries })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }
}

impl RecordSource for TimitCorpus {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: usize) -> Result<Record> {
        let entry = self.entries.get(index).ok_or(DataError::IndexOutOfRange {
            index,
            len: self.entries.len(),
        })?;

        Ok(Record {
            audio: load_audio(&entry.audio)?,
            intervals: read_transcript(&entry.transcript)?,
        })
    }
}

fn collect_wavs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|source| DataError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let path = entry
            .map_err(|source| DataError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();

        if path.is_dir() {
            collect_wavs(&path, out)?;
        } else if has_extension(&path, "wav") {
            out.push(path);
        }
    }

    Ok(())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn is_dialect_sentence(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.to_ascii_lowercase().starts_with("sa"))
}

fn transcript_for(audio: &Path) -> Option<PathBuf> {
    ["phn", "PHN"]
        .into_iter()
        .map(|ext| audio.with_extension(ext))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_utterance(dir: &Path, name: &str, with_transcript: bool) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(dir.join(format!("{name}.wav")), spec).unwrap();
        for i in 0..3200 {
            writer
                .write_sample(((i as f32 * 0.05).sin() * 8000.0) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();

        if with_transcript {
            std::fs::write(
                dir.join(format!("{name}.phn")),
                "0 1600 h#\n1600 3200 aa\n",
            )
            .unwrap();
        }
    }

    fn corpus_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("phonecls-corpus-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("dr1/fcjf0")).unwrap();
        dir
    }

    #[test]
    fn pairs_audio_with_transcripts() {
        let dir = corpus_dir("pairs");
        let speaker = dir.join("dr1/fcjf0");
        write_utterance(&speaker, "si1027", true);
        write_utterance(&speaker, "sx127", true);
        write_utterance(&speaker, "sa1", true);
        write_utterance(&speaker, "si648", false);

        let corpus = TimitCorpus::open(&dir, true).unwrap();

        assert_eq!(corpus.len(), 2);
        let record = corpus.get(0).unwrap();
        assert_eq!(record.audio.samples.len(), 3200);
        assert_eq!(record.intervals.len(), 2);

        let with_sa = TimitCorpus::open(&dir, false).unwrap();
        assert_eq!(with_sa.len(), 3);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_corpus_is_an_error() {
        let dir = corpus_dir("empty");

        assert!(matches!(
            TimitCorpus::open(&dir, true),
            Err(Error::Data(DataError::EmptyDataset))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
