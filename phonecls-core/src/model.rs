//! Linear softmax frame classifier.
//!
//! Each label frame is the concatenation of `frame_resolution` spectrogram rows.
//! Features are standardized per record and feature before the affine map.

use crate::batch::Batch;
use crate::error::{Result, TrainingError};
use crate::traits::FrameClassifier;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Lower bound on the per-feature standard deviation
const STD_FLOOR: f32 = 1e-5;

/// Affine map from stacked frame features to class scores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxClassifier {
    /// `(n_mels * frame_resolution, classes)`
    weights: Array2<f32>,
    bias: Array1<f32>,
    frame_resolution: usize,
}

impl SoftmaxClassifier {
    /// Small uniform random weights, zero bias.
    pub fn new<R: Rng + ?Sized>(
        n_mels: usize,
        frame_resolution: usize,
        classes: usize,
        rng: &mut R,
    ) -> Self {
        let inputs = n_mels * frame_resolution;
        let bound = 1.0 / (inputs.max(1) as f32).sqrt();
        let weights = Array2::from_shape_fn((inputs, classes), |_| rng.gen_range(-bound..=bound));

        Self {
            weights,
            bias: Array1::zeros(classes),
            frame_resolution,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weights.nrows()
    }

    pub fn frame_resolution(&self) -> usize {
        self.frame_resolution
    }

    /// Stack `frame_resolution` rows per label frame and standardize columns.
    fn frame_inputs(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let frames = features.nrows() / self.frame_resolution;
        let rows = frames * self.frame_resolution;
        let stacked = features
            .slice(ndarray::s![..rows, ..])
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((frames, self.input_dim()))?;

        Ok(standardize(stacked))
    }

    /// Scores for an unbatched spectrogram.
    pub fn score(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let inputs = self.frame_inputs(features)?;
        Ok(inputs.dot(&self.weights) + &self.bias)
    }
}

/// Zero mean and unit variance per column.
fn standardize(mut x: Array2<f32>) -> Array2<f32> {
    if x.nrows() == 0 {
        return x;
    }

    let Some(mean) = x.mean_axis(Axis(0)) else {
        return x;
    };
    let std = x.std_axis(Axis(0), 0.0).mapv(|s| s.max(STD_FLOOR));
    x -= &mean;
    x /= &std;
    x
}

impl FrameClassifier for SoftmaxClassifier {
    fn num_classes(&self) -> usize {
        self.weights.ncols()
    }

    fn forward(&mut self, batch: &Batch) -> Result<Vec<Array2<f32>>> {
        (0..batch.len())
            .map(|i| self.score(batch.record_features(i)))
            .collect()
    }

    fn backward(
        &mut self,
        batch: &Batch,
        grads: &[Array2<f32>],
        learning_rate: f32,
    ) -> Result<()> {
        if grads.len() != batch.len() {
            return Err(TrainingError::ClassCountMismatch {
                expected: batch.len(),
                got: grads.len(),
            }
            .into());
        }

        let mut grad_weights = Array2::<f32>::zeros(self.weights.raw_dim());
        let mut grad_bias = Array1::<f32>::zeros(self.bias.raw_dim());

        for (i, grad) in grads.iter().enumerate() {
            if grad.ncols() != self.num_classes() {
                return Err(TrainingError::ClassCountMismatch {
                    expected: self.num_classes(),
                    got: grad.ncols(),
                }
                .into());
            }

            let inputs = self.frame_inputs(batch.record_features(i))?;
            grad_weights += &inputs.t().dot(grad);
            grad_bias += &grad.sum_axis(Axis(0));
        }

        self.weights.scaled_add(-learning_rate, &grad_weights);
        self.bias.scaled_add(-learning_rate, &grad_bias);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Example;
    use crate::metrics::cross_entropy;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn batch() -> Batch {
        // Two separable classes: feature 0 high for class 0, feature 1 high for class 1
        let features = Array2::from_shape_fn((8, 4), |(r, c)| {
            let class = r % 2;
            if c == class { 5.0 } else { 0.1 * c as f32 }
        });
        let labels = (0..8).map(|r| r % 2).collect();

        Batch::collate(vec![Example { features, labels }], 1).unwrap()
    }

    #[test]
    fn scores_have_one_row_per_label_frame() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut model = SoftmaxClassifier::new(4, 2, 3, &mut rng);
        let example = Example {
            features: Array2::ones((6, 4)),
            labels: vec![0; 3],
        };
        let batch = Batch::collate(vec![example], 2).unwrap();

        let scores = model.forward(&batch).unwrap();

        assert_eq!(model.input_dim(), 8);
        assert_eq!(scores[0].dim(), (3, 3));
    }

    #[test]
    fn gradient_steps_reduce_loss() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut model = SoftmaxClassifier::new(4, 1, 2, &mut rng);
        let batch = batch();

        let (initial, _) = cross_entropy(&model.forward(&batch).unwrap(), &batch.labels).unwrap();
        for _ in 0..50 {
            let scores = model.forward(&batch).unwrap();
            let (_, grads) = cross_entropy(&scores, &batch.labels).unwrap();
            model.backward(&batch, &grads, 0.5).unwrap();
        }
        let (trained, _) = cross_entropy(&model.forward(&batch).unwrap(), &batch.labels).unwrap();

        assert!(trained < initial * 0.5, "{initial} -> {trained}");
    }

    #[test]
    fn weights_roundtrip_through_json() {
        let mut rng = StdRng::seed_from_u64(2);
        let model = SoftmaxClassifier::new(4, 1, 3, &mut rng);

        let json = serde_json::to_string(&model).unwrap();
        let restored: SoftmaxClassifier = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, model);
    }

    #[test]
    fn standardize_handles_constant_columns() {
        let x = Array2::from_elem((4, 2), 3.0);

        let y = standardize(x);

        assert!(y.iter().all(|v| v.is_finite() && v.abs() < 1e-3));
    }
}
