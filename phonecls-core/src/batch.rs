//! Padded mini-batches and the multi-threaded loader that assembles them.

use crate::dataset::{Example, FrameDataset};
use crate::error::{AlignmentError, DataError, Result, TrainingError};
use crate::traits::RecordSource;
use ndarray::{Array3, ArrayView2, s};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Records padded to a common length.
///
/// `features` has shape `(batch, max_rows, n_mels)` with zero padding past each
/// record's length. `labels` concatenates every record's frame labels in batch
/// order, so `labels.len() == sum(lengths) / frame_resolution`.
#[derive(Clone, Debug)]
pub struct Batch {
    pub features: Array3<f32>,
    /// Unpadded spectrogram rows per record
    pub lengths: Vec<usize>,
    pub labels: Vec<usize>,
    pub frame_resolution: usize,
}

impl Batch {
    /// Pad and stack examples.
    ///
    /// # Errors
    ///
    /// [`DataError::EmptyBatch`] for no examples, or
    /// [`AlignmentError::LabelCountMismatch`] if an example's rows are not
    /// `labels * frame_resolution`.
    pub fn collate(examples: Vec<Example>, frame_resolution: usize) -> Result<Self> {
        let n_mels = examples
            .first()
            .map(|e| e.features.ncols())
            .ok_or(DataError::EmptyBatch)?;

        for example in &examples {
            if example.features.nrows() != example.labels.len() * frame_resolution {
                return Err(AlignmentError::LabelCountMismatch {
                    labels: example.labels.len(),
                    rows: example.features.nrows(),
                }
                .into());
            }
        }

        let lengths: Vec<usize> = examples.iter().map(|e| e.features.nrows()).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);

        let mut features = Array3::zeros((examples.len(), max_len, n_mels));
        let mut labels = Vec::with_capacity(lengths.iter().sum::<usize>() / frame_resolution);
        for (i, example) in examples.into_iter().enumerate() {
            let rows = example.features.nrows();
            features
                .slice_mut(s![i, ..rows, ..])
                .assign(&example.features);
            labels.extend(example.labels);
        }

        Ok(Self {
            features,
            lengths,
            labels,
            frame_resolution,
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Label frames per record.
    pub fn label_lengths(&self) -> Vec<usize> {
        self.lengths
            .iter()
            .map(|len| len / self.frame_resolution)
            .collect()
    }

    /// Unpadded features of record `index`.
    pub fn record_features(&self, index: usize) -> ArrayView2<'_, f32> {
        self.features.slice(s![index, ..self.lengths[index], ..])
    }
}

/// Seed for the random stream of one record in one epoch.
pub fn record_seed(seed: u64, epoch: usize, index: usize) -> u64 {
    seed ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (index as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

/// Iterates a dataset in batches, building examples on worker threads.
///
/// Every record draws its augmentation randomness from an RNG seeded by
/// `(seed, epoch, index)`, so results do not depend on worker scheduling.
pub struct BatchLoader<'d, 'a, S> {
    dataset: &'d FrameDataset<'a, S>,
    batch_size: usize,
    shuffle: bool,
    workers: usize,
    seed: u64,
}

impl<'d, 'a, S: RecordSource + Sync> BatchLoader<'d, 'a, S> {
    pub fn new(dataset: &'d FrameDataset<'a, S>, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle: false,
            workers: 1,
            seed: 0,
        }
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn dataset(&self) -> &FrameDataset<'a, S> {
        self.dataset
    }

    /// Batches per epoch (the last one may be short).
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Record order for `epoch`.
    pub fn order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(record_seed(self.seed, epoch, usize::MAX));
            order.shuffle(&mut rng);
        }
        order
    }

    /// Lazily load every batch of `epoch`.
    pub fn epoch(&self, epoch: usize) -> impl Iterator<Item = Result<Batch>> + '_ {
        let chunks: Vec<Vec<usize>> = self
            .order(epoch)
            .chunks(self.batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        chunks
            .into_iter()
            .map(move |indices| self.load_batch(&indices, epoch))
    }

    /// Build and collate the examples for `indices`.
    pub fn load_batch(&self, indices: &[usize], epoch: usize) -> Result<Batch> {
        let examples = if self.workers <= 1 || indices.len() <= 1 {
            indices
                .iter()
                .map(|&index| self.load_example(index, epoch))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.load_parallel(indices, epoch)?
        };

        Batch::collate(examples, self.dataset.settings().frame_resolution)
    }

    fn load_example(&self, index: usize, epoch: usize) -> Result<Example> {
        let mut rng = StdRng::seed_from_u64(record_seed(self.seed, epoch, index));
        self.dataset.example(index, &mut rng)
    }

    fn load_parallel(&self, indices: &[usize], epoch: usize) -> Result<Vec<Example>> {
        let per_worker = indices.len().div_ceil(self.workers);

        let results: Vec<Result<Vec<Example>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = indices
                .chunks(per_worker)
                .map(|group| {
                    scope.spawn(move || {
                        group
                            .iter()
                            .map(|&index| self.load_example(index, epoch))
                            .collect::<Result<Vec<_>>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(TrainingError::WorkerPanicked.into()))
                })
                .collect()
        });

        let mut examples = Vec::with_capacity(indices.len());
        for group in results {
            examples.extend(group?);
        }
        Ok(examples)
    }
}
