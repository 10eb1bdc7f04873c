//! Loss, frame error rate, phoneme error rate, and confusion matrices.
//!
//! Error rates are computed after folding both predictions and targets into
//! the evaluation alphabet. Padding rows never reach any metric.

use crate::error::{MetricError, Result};
use crate::fold::LabelFolder;
use ndarray::{Array2, ArrayView3, Axis, s};
use ndarray_stats::QuantileExt;
use serde::Serialize;

/// Per-record score matrices with padding rows dropped.
///
/// # Errors
///
/// [`MetricError::RowCountMismatch`] if `lengths` names more records than
/// the batch holds, or a length exceeds the padded row count.
pub fn remove_padding(
    padded: ArrayView3<'_, f32>,
    lengths: &[usize],
) -> Result<Vec<Array2<f32>>> {
    let (records, rows, _) = padded.dim();
    if lengths.len() > records {
        return Err(MetricError::RowCountMismatch {
            record: records,
            expected: lengths.len(),
            got: records,
        }
        .into());
    }

    lengths
        .iter()
        .enumerate()
        .map(|(i, &len)| {
            if len > rows {
                return Err(MetricError::RowCountMismatch {
                    record: i,
                    expected: len,
                    got: rows,
                }
                .into());
            }
            Ok(padded.slice(s![i, ..len, ..]).to_owned())
        })
        .collect()
}

/// Split a concatenated sequence into per-record slices.
pub fn split_by_lengths<'a, T>(values: &'a [T], lengths: &[usize]) -> Vec<&'a [T]> {
    let mut rest = values;
    lengths
        .iter()
        .map(|&len| {
            let (head, tail) = rest.split_at(len.min(rest.len()));
            rest = tail;
            head
        })
        .collect()
}

fn check_rows(scores: &[Array2<f32>], lengths: &[usize]) -> Result<()> {
    if scores.len() != lengths.len() {
        return Err(MetricError::RowCountMismatch {
            record: scores.len().min(lengths.len()),
            expected: lengths.len(),
            got: scores.len(),
        }
        .into());
    }

    for (record, (matrix, &expected)) in scores.iter().zip(lengths).enumerate() {
        if matrix.nrows() != expected {
            return Err(MetricError::RowCountMismatch {
                record,
                expected,
                got: matrix.nrows(),
            }
            .into());
        }
    }

    Ok(())
}

/// Mean cross-entropy over every frame and its gradient with respect to the scores.
///
/// `labels` concatenates per-record targets in record order. The gradient of
/// each row is `(softmax - onehot) / total_frames`.
pub fn cross_entropy(scores: &[Array2<f32>], labels: &[usize]) -> Result<(f32, Vec<Array2<f32>>)> {
    let total: usize = scores.iter().map(Array2::nrows).sum();
    if total == 0 {
        return Err(MetricError::EmptyBatch.into());
    }
    if total != labels.len() {
        return Err(MetricError::RowCountMismatch {
            record: 0,
            expected: labels.len(),
            got: total,
        }
        .into());
    }

    let lengths: Vec<usize> = scores.iter().map(Array2::nrows).collect();
    let mut loss = 0.0f64;
    let mut grads = Vec::with_capacity(scores.len());

    for (matrix, targets) in scores.iter().zip(split_by_lengths(labels, &lengths)) {
        let classes = matrix.ncols();
        let mut grad = Array2::zeros(matrix.raw_dim());

        for ((row, mut grad_row), &target) in matrix
            .axis_iter(Axis(0))
            .zip(grad.axis_iter_mut(Axis(0)))
            .zip(targets)
        {
            if target >= classes {
                return Err(MetricError::LabelOutOfRange {
                    label: target,
                    classes,
                }
                .into());
            }

            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let exp = row.mapv(|v| (v - max).exp());
            let sum = exp.sum();

            loss += (sum.ln() + max - row[target]) as f64;

            grad_row.assign(&(exp / sum));
            grad_row[target] -= 1.0;
            grad_row /= total as f32;
        }

        grads.push(grad);
    }

    Ok(((loss / total as f64) as f32, grads))
}

/// Most likely class of every row.
pub fn predictions(scores: &Array2<f32>) -> Result<Vec<usize>> {
    scores
        .axis_iter(Axis(0))
        .map(|row| Ok(row.argmax()?))
        .collect()
}

/// Fraction of positions where `predicted` and `target` differ.
pub fn frame_error_rate(predicted: &[usize], target: &[usize]) -> Result<f32> {
    if target.is_empty() {
        return Err(MetricError::EmptyBatch.into());
    }
    if predicted.len() != target.len() {
        return Err(MetricError::RowCountMismatch {
            record: 0,
            expected: target.len(),
            got: predicted.len(),
        }
        .into());
    }

    let errors = predicted.iter().zip(target).filter(|(p, t)| p != t).count();
    Ok(errors as f32 / target.len() as f32)
}

/// Collapse runs of repeated labels: `[A, A, B, A, A]` becomes `[A, B, A]`.
pub fn collapse_runs(labels: &[usize]) -> Vec<usize> {
    let mut collapsed = labels.to_vec();
    collapsed.dedup();
    collapsed
}

/// Edit distance between collapsed sequences divided by the collapsed target length.
///
/// Returns `None` for an empty target.
pub fn phoneme_error_rate(predicted: &[usize], target: &[usize]) -> Option<f32> {
    let target = collapse_runs(target);
    if target.is_empty() {
        return None;
    }
    let predicted = collapse_runs(predicted);

    let distance = strsim::generic_levenshtein(&predicted, &target);
    Some(distance as f32 / target.len() as f32)
}

/// Scalar metrics for one batch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BatchMetrics {
    pub loss: f32,
    pub frame_error_rate: f32,
    /// Unweighted mean over records with a non-empty target
    pub phoneme_error_rate: Option<f32>,
}

/// Batch metrics plus the folded frame sequences they were computed from.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub metrics: BatchMetrics,
    pub predicted: Vec<usize>,
    pub target: Vec<usize>,
}

/// Scores model output against training-alphabet labels.
#[derive(Clone, Copy, Debug)]
pub struct SequenceMetrics<'f> {
    folder: &'f LabelFolder,
}

impl<'f> SequenceMetrics<'f> {
    pub fn new(folder: &'f LabelFolder) -> Self {
        Self { folder }
    }

    pub fn folder(&self) -> &LabelFolder {
        self.folder
    }

    /// Loss, FER, and PER over unpadded per-record scores.
    ///
    /// `lengths` are label frames per record; `labels` is their concatenation.
    pub fn evaluate(
        &self,
        scores: &[Array2<f32>],
        labels: &[usize],
        lengths: &[usize],
    ) -> Result<Evaluation> {
        check_rows(scores, lengths)?;
        let (loss, _) = cross_entropy(scores, labels)?;

        let mut predicted = Vec::with_capacity(labels.len());
        for matrix in scores {
            predicted.extend(self.folder.fold_sequence(&predictions(matrix)?)?);
        }
        let target = self.folder.fold_sequence(labels)?;

        let frame_error_rate = frame_error_rate(&predicted, &target)?;

        let per_record: Vec<f32> = split_by_lengths(&predicted, lengths)
            .into_iter()
            .zip(split_by_lengths(&target, lengths))
            .filter_map(|(p, t)| phoneme_error_rate(p, t))
            .collect();
        let phoneme_error_rate = (!per_record.is_empty())
            .then(|| per_record.iter().sum::<f32>() / per_record.len() as f32);

        Ok(Evaluation {
            metrics: BatchMetrics {
                loss,
                frame_error_rate,
                phoneme_error_rate,
            },
            predicted,
            target,
        })
    }

    /// [`SequenceMetrics::evaluate`] on zero-padded `(batch, frames, classes)` scores.
    pub fn evaluate_padded(
        &self,
        padded: ArrayView3<'_, f32>,
        labels: &[usize],
        lengths: &[usize],
    ) -> Result<Evaluation> {
        self.evaluate(&remove_padding(padded, lengths)?, labels, lengths)
    }
}

/// Running unweighted mean of batch metrics.
#[derive(Clone, Debug, Default)]
pub struct MetricAccumulator {
    loss: f64,
    frame_error_rate: f64,
    phoneme_error_rate: f64,
    batches: usize,
    per_batches: usize,
}

impl MetricAccumulator {
    pub fn push(&mut self, metrics: &BatchMetrics) {
        self.loss += metrics.loss as f64;
        self.frame_error_rate += metrics.frame_error_rate as f64;
        if let Some(per) = metrics.phoneme_error_rate {
            self.phoneme_error_rate += per as f64;
            self.per_batches += 1;
        }
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Mean over pushed batches, `None` if nothing was pushed.
    pub fn mean(&self) -> Option<BatchMetrics> {
        if self.batches == 0 {
            return None;
        }

        let n = self.batches as f64;
        Some(BatchMetrics {
            loss: (self.loss / n) as f32,
            frame_error_rate: (self.frame_error_rate / n) as f32,
            phoneme_error_rate: (self.per_batches > 0)
                .then(|| (self.phoneme_error_rate / self.per_batches as f64) as f32),
        })
    }
}

/// Evaluation-alphabet confusion counts, rows are targets and columns predictions.
#[derive(Clone, Debug, Serialize)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    counts: Array2<u64>,
}

impl ConfusionMatrix {
    pub fn new(labels: Vec<String>) -> Self {
        let n = labels.len();
        Self {
            labels,
            counts: Array2::zeros((n, n)),
        }
    }

    pub fn update(&mut self, predicted: &[usize], target: &[usize]) -> Result<()> {
        let n = self.labels.len();
        for (&p, &t) in predicted.iter().zip(target) {
            if let Some(label) = [p, t].into_iter().find(|&l| l >= n) {
                return Err(MetricError::LabelOutOfRange { label, classes: n }.into());
            }
            self.counts[[t, p]] += 1;
        }
        Ok(())
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    /// Fraction of counts on the diagonal.
    pub fn accuracy(&self) -> Option<f32> {
        let total = self.total();
        (total > 0).then(|| self.counts.diag().sum() as f32 / total as f32)
    }
}
