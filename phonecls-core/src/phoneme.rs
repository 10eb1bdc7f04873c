//! Phoneme intervals and the process-wide phoneme inventory.
//!
//! Three alphabets are involved:
//!
//! | Alphabet   | Size | Used for                          |
//! |------------|------|-----------------------------------|
//! | corpus     | 61   | symbols found in `.phn` files     |
//! | training   | 48   | model output classes, frame labels|
//! | evaluation | 39   | FER/PER scoring                   |
//!
//! Each fold is many-to-one and defaults to identity for unmapped symbols.

use crate::error::{DataError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

/// A labeled half-open span `[start, stop)` in sample-index space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhonemeInterval {
    pub symbol: String,
    pub start: usize,
    pub stop: usize,
}

impl PhonemeInterval {
    pub fn new(symbol: impl Into<String>, start: usize, stop: usize) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            stop,
        }
    }

    /// Length in samples (zero for degenerate intervals).
    pub fn len(&self) -> usize {
        self.stop.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check that intervals are non-empty, have stop > start, and are ordered by start.
pub fn validate_intervals(intervals: &[PhonemeInterval]) -> Result<()> {
    if intervals.is_empty() {
        return Err(DataError::EmptyTranscript.into());
    }

    for (index, interval) in intervals.iter().enumerate() {
        if interval.stop <= interval.start {
            return Err(DataError::InvalidInterval {
                index,
                start: interval.start,
                stop: interval.stop,
            }
            .into());
        }

        if index > 0 && interval.start < intervals[index - 1].start {
            return Err(DataError::UnorderedIntervals { index }.into());
        }
    }

    Ok(())
}

/// Parse a TIMIT-style transcript: one `start stop symbol` triple per line.
pub fn parse_transcript(text: &str, path: &Path) -> Result<Vec<PhonemeInterval>> {
    let malformed = |line: usize, content: &str| DataError::MalformedTranscript {
        path: path.to_path_buf(),
        line,
        content: content.to_string(),
    };

    let intervals = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next(), fields.next()) {
                (Some(start), Some(stop), Some(symbol), None) => {
                    let start = start.parse().map_err(|_| malformed(i + 1, line))?;
                    let stop = stop.parse().map_err(|_| malformed(i + 1, line))?;
                    Ok(PhonemeInterval::new(symbol, start, stop))
                }
                _ => Err(malformed(i + 1, line).into()),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    validate_intervals(&intervals)?;
    Ok(intervals)
}

/// Read and parse a transcript file.
pub fn read_transcript(path: impl AsRef<Path>) -> Result<Vec<PhonemeInterval>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_transcript(&text, path)
}

const TIMIT_TRAINING: &[&str] = &[
    "aa", "ae", "ah", "ao", "aw", "ax", "er", "ay", "b", "ch", "d", "dh", "dx", "eh", "el", "m",
    "en", "ng", "epi", "ey", "f", "g", "sil", "hh", "ih", "ix", "iy", "jh", "k", "cl", "vcl", "l",
    "n", "ow", "oy", "p", "r", "s", "sh", "t", "th", "uh", "uw", "v", "w", "y", "z", "zh",
];

const TIMIT_CORPUS_FOLD: &[(&str, &str)] = &[
    ("ax-h", "ax"),
    ("axr", "er"),
    ("bcl", "vcl"),
    ("dcl", "vcl"),
    ("gcl", "vcl"),
    ("pcl", "cl"),
    ("tcl", "cl"),
    ("kcl", "cl"),
    ("em", "m"),
    ("eng", "ng"),
    ("h#", "sil"),
    ("pau", "sil"),
    ("q", "sil"),
    ("hv", "hh"),
    ("nx", "n"),
    ("ux", "uw"),
];

const TIMIT_EVALUATION: &[&str] = &[
    "aa", "ae", "ah", "aw", "er", "ay", "b", "ch", "d", "dh", "dx", "eh", "m", "ng", "ey", "f",
    "g", "sil", "hh", "ih", "iy", "jh", "k", "l", "n", "ow", "oy", "p", "r", "s", "sh", "t", "th",
    "uh", "uw", "v", "w", "y", "z",
];

const TIMIT_EVALUATION_FOLD: &[(&str, &str)] = &[
    ("ao", "aa"),
    ("ax", "ah"),
    ("el", "l"),
    ("en", "n"),
    ("ix", "ih"),
    ("cl", "sil"),
    ("vcl", "sil"),
    ("epi", "sil"),
    ("zh", "sh"),
];

static TIMIT: LazyLock<PhonemeInventory> = LazyLock::new(|| {
    PhonemeInventory::new(
        TIMIT_TRAINING,
        TIMIT_CORPUS_FOLD,
        TIMIT_EVALUATION,
        TIMIT_EVALUATION_FOLD,
    )
});

/// Immutable symbol tables with stable symbol↔index mappings.
#[derive(Debug)]
pub struct PhonemeInventory {
    training: Vec<String>,
    training_index: HashMap<String, usize>,
    corpus_fold: HashMap<String, String>,
    evaluation: Vec<String>,
    evaluation_index: HashMap<String, usize>,
    evaluation_fold: HashMap<String, String>,
}

impl PhonemeInventory {
    /// Build an inventory from symbol lists and fold tables.
    pub fn new(
        training: &[&str],
        corpus_fold: &[(&str, &str)],
        evaluation: &[&str],
        evaluation_fold: &[(&str, &str)],
    ) -> Self {
        let index = |symbols: &[&str]| {
            symbols
                .iter()
                .enumerate()
                .map(|(i, s)| (s.to_string(), i))
                .collect::<HashMap<_, _>>()
        };
        let table = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect::<HashMap<_, _>>()
        };

        Self {
            training: training.iter().map(|s| s.to_string()).collect(),
            training_index: index(training),
            corpus_fold: table(corpus_fold),
            evaluation: evaluation.iter().map(|s| s.to_string()).collect(),
            evaluation_index: index(evaluation),
            evaluation_fold: table(evaluation_fold),
        }
    }

    /// The TIMIT inventory, built once per process.
    pub fn timit() -> &'static Self {
        &TIMIT
    }

    /// Training alphabet size (model output classes).
    pub fn training_count(&self) -> usize {
        self.training.len()
    }

    /// Evaluation alphabet size.
    pub fn evaluation_count(&self) -> usize {
        self.evaluation.len()
    }

    pub fn training_symbols(&self) -> &[String] {
        &self.training
    }

    pub fn evaluation_symbols(&self) -> &[String] {
        &self.evaluation
    }

    /// Training-alphabet symbol for a corpus symbol (identity when unmapped).
    pub fn fold_corpus_symbol<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.corpus_fold.get(symbol).map_or(symbol, String::as_str)
    }

    /// Evaluation-alphabet symbol for a training symbol (identity when unmapped).
    pub fn fold_evaluation_symbol<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.evaluation_fold.get(symbol).map_or(symbol, String::as_str)
    }

    /// Training-alphabet index of a corpus symbol.
    pub fn symbol_to_index(&self, symbol: &str) -> Result<usize> {
        let folded = self.fold_corpus_symbol(symbol);
        self.training_index
            .get(folded)
            .copied()
            .ok_or_else(|| DataError::UnknownSymbol(symbol.to_string()).into())
    }

    /// Evaluation-alphabet index of an evaluation symbol.
    pub fn evaluation_index(&self, symbol: &str) -> Result<usize> {
        self.evaluation_index
            .get(symbol)
            .copied()
            .ok_or_else(|| DataError::UnknownSymbol(symbol.to_string()).into())
    }

    pub fn training_symbol(&self, index: usize) -> Option<&str> {
        self.training.get(index).map(String::as_str)
    }

    pub fn evaluation_symbol(&self, index: usize) -> Option<&str> {
        self.evaluation.get(index).map(String::as_str)
    }
}
