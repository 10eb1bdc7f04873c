//! Core traits for dataset and model components.

use crate::batch::Batch;
use crate::dataset::Record;
use crate::error::{DataError, Result};
use ndarray::Array2;

/// Indexed source of labeled utterances.
///
/// Implementations must be stable: `get(i)` returns the same record for the
/// same `i` for the lifetime of the source.
pub trait RecordSource {
    /// Number of records.
    fn len(&self) -> usize;

    /// Load record `index`.
    ///
    /// # Errors
    ///
    /// [`DataError::IndexOutOfRange`] for `index >= len()`, or any load failure.
    fn get(&self, index: usize) -> Result<Record>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordSource for Vec<Record> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: usize) -> Result<Record> {
        self.as_slice()
            .get(index)
            .cloned()
            .ok_or_else(|| DataError::IndexOutOfRange { index, len: self.len() }.into())
    }
}

impl<S: RecordSource + ?Sized> RecordSource for &S {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, index: usize) -> Result<Record> {
        (**self).get(index)
    }
}

/// Frame classifier trained with per-batch gradient steps.
///
/// Scores are unnormalized log-probabilities over the training alphabet,
/// one `(label_frames, num_classes)` matrix per record in the batch.
pub trait FrameClassifier {
    /// Output classes per frame.
    fn num_classes(&self) -> usize;

    /// Score every label frame of every record in `batch`.
    ///
    /// Note: Takes `&mut self` so implementations may cache activations for
    /// [`FrameClassifier::backward`].
    fn forward(&mut self, batch: &Batch) -> Result<Vec<Array2<f32>>>;

    /// Apply one gradient step given `d loss / d scores` for each record.
    fn backward(&mut self, batch: &Batch, grads: &[Array2<f32>], learning_rate: f32)
    -> Result<()>;
}
