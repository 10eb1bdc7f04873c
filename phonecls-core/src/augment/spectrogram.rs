//! Spectrogram perturbations. Every function returns a new spectrogram of the same shape.

use crate::audio::Spectrogram;
use crate::error::Result;
use ndarray::{Array2, ArrayView2, Axis, concatenate, s};
use rand::Rng;
use rand_distr::StandardNormal;
use std::ops::Range;

/// Add `scale`-weighted unit-variance Gaussian noise.
pub fn add_noise<R: Rng + ?Sized>(spec: &Spectrogram, scale: f32, rng: &mut R) -> Spectrogram {
    spec.mapv(|v| v + scale * rng.sample::<f32, _>(StandardNormal))
}

/// Zero a random band of fewer than `max_width` mel bins across all rows.
pub fn frequency_mask<R: Rng + ?Sized>(
    spec: &Spectrogram,
    max_width: usize,
    rng: &mut R,
) -> Spectrogram {
    let band = mask_span(spec.ncols(), max_width, rng);
    let mut masked = spec.to_owned();
    masked.slice_mut(s![.., band]).fill(0.0);
    masked
}

/// Zero a random span of fewer than `max_width` rows within `block`.
pub fn time_mask<R: Rng + ?Sized>(
    block: ArrayView2<'_, f32>,
    max_width: usize,
    rng: &mut R,
) -> Array2<f32> {
    let span = mask_span(block.nrows(), max_width, rng);
    let mut masked = block.to_owned();
    masked.slice_mut(s![span, ..]).fill(0.0);
    masked
}

/// Split rows into blocks of `block_length` and time-mask each full block with `probability`.
///
/// A trailing partial block is never masked. Masks never cross block boundaries.
pub fn mask_time_blocks<R: Rng + ?Sized>(
    spec: &Spectrogram,
    block_length: usize,
    probability: f64,
    max_width: usize,
    rng: &mut R,
) -> Result<Spectrogram> {
    if spec.nrows() == 0 {
        return Ok(spec.to_owned());
    }

    let blocks: Vec<Array2<f32>> = spec
        .axis_chunks_iter(Axis(0), block_length)
        .map(|block| {
            if block.nrows() == block_length && rng.gen_bool(probability) {
                time_mask(block, max_width, rng)
            } else {
                block.to_owned()
            }
        })
        .collect();

    let views: Vec<_> = blocks.iter().map(|block| block.view()).collect();
    Ok(concatenate(Axis(0), &views)?)
}

/// Random span `[start, start + width)` with `width` uniform in `0..max_width`.
fn mask_span<R: Rng + ?Sized>(size: usize, max_width: usize, rng: &mut R) -> Range<usize> {
    let width = ((rng.r#gen::<f32>() * max_width.min(size) as f32) as usize).min(size);
    let start = rng.gen_range(0..=size - width);
    start..start + width
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ramp(rows: usize, cols: usize) -> Spectrogram {
        Array2::from_shape_fn((rows, cols), |(r, c)| 1.0 + (r * cols + c) as f32)
    }

    fn zero_rows(spec: &Spectrogram) -> Vec<usize> {
        spec.rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|&v| v == 0.0))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn noise_is_small() {
        let mut rng = StdRng::seed_from_u64(1);
        let spec = ramp(50, 80);

        let noisy = add_noise(&spec, 0.005, &mut rng);

        let max_diff = (&noisy - &spec).iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(max_diff > 0.0);
        assert!(max_diff < 0.05);
    }

    #[test]
    fn frequency_mask_zeroes_contiguous_columns() {
        let mut rng = StdRng::seed_from_u64(5);
        let spec = ramp(10, 80);

        for _ in 0..20 {
            let masked = frequency_mask(&spec, 80, &mut rng);
            let zero_cols: Vec<usize> = (0..80)
                .filter(|&c| masked.column(c).iter().all(|&v| v == 0.0))
                .collect();

            assert!(zero_cols.len() < 80);
            assert!(zero_cols.windows(2).all(|w| w[1] == w[0] + 1));
        }
    }

    #[test]
    fn time_masks_stay_inside_blocks() {
        let mut rng = StdRng::seed_from_u64(9);
        let spec = ramp(105, 4);

        for _ in 0..50 {
            let masked = mask_time_blocks(&spec, 20, 1.0, 2, &mut rng).unwrap();

            assert_eq!(masked.dim(), spec.dim());
            let zeros = zero_rows(&masked);
            // At most one row per full block, none in the trailing partial block
            assert!(zeros.len() <= 5);
            assert!(zeros.iter().all(|&r| r < 100));
        }
    }

    #[test]
    fn zero_probability_leaves_blocks_untouched() {
        let mut rng = StdRng::seed_from_u64(2);
        let spec = ramp(60, 4);

        let masked = mask_time_blocks(&spec, 20, 0.0, 2, &mut rng).unwrap();

        assert_eq!(masked, spec);
    }

    #[test]
    fn handles_empty_spectrogram() {
        let mut rng = StdRng::seed_from_u64(2);
        let spec = Spectrogram::zeros((0, 80));

        let masked = mask_time_blocks(&spec, 20, 1.0, 2, &mut rng).unwrap();

        assert_eq!(masked.nrows(), 0);
    }
}
