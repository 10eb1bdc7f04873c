//! Projection of phoneme intervals onto the fixed-stride frame grid.

use crate::error::{AlignmentError, DataError, Result};
use crate::phoneme::{PhonemeInterval, PhonemeInventory};
use crate::settings::FrameSettings;

/// Maps phoneme intervals to one training-alphabet label per frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameLabelAligner<'a> {
    samples_per_frame: usize,
    samples_per_stride: usize,
    inventory: &'a PhonemeInventory,
}

impl<'a> FrameLabelAligner<'a> {
    pub fn new(settings: &FrameSettings, inventory: &'a PhonemeInventory) -> Self {
        Self {
            samples_per_frame: settings.samples_per_frame(),
            samples_per_stride: settings.samples_per_stride(),
            inventory,
        }
    }

    /// Produce exactly `n_frames` labels for a waveform of `n_samples`.
    ///
    /// Frames start at `x = 0, stride, 2 * stride, ...` while
    /// `x + samples_per_frame < n_samples`. A single forward-only cursor walks
    /// the intervals: when less than half a stride of the current phoneme
    /// remains (`stop - x < stride / 2`, strict) and another phoneme follows,
    /// the cursor advances before labeling. Once intervals run out the last
    /// phoneme repeats.
    ///
    /// # Errors
    ///
    /// [`AlignmentError::FrameCountMismatch`] if the walk visits a different
    /// number of frames than `n_frames`. Labels are never padded or truncated.
    pub fn frame_labels(
        &self,
        intervals: &[PhonemeInterval],
        n_frames: usize,
        n_samples: usize,
    ) -> Result<Vec<usize>> {
        if intervals.is_empty() {
            return Err(DataError::EmptyTranscript.into());
        }

        let half_stride = 0.5 * self.samples_per_stride as f64;
        let last = intervals.len() - 1;
        let mut labels = Vec::with_capacity(n_frames);
        let mut cursor = 0;
        let mut x = 0;

        while x + self.samples_per_frame < n_samples {
            let remaining = intervals[cursor].stop as f64 - x as f64;
            if remaining < half_stride && cursor < last {
                cursor += 1;
            }

            labels.push(self.inventory.symbol_to_index(&intervals[cursor].symbol)?);
            x += self.samples_per_stride;
        }

        if labels.len() != n_frames {
            return Err(AlignmentError::FrameCountMismatch {
                expected: n_frames,
                got: labels.len(),
            }
            .into());
        }

        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn aligner() -> FrameLabelAligner<'static> {
        FrameLabelAligner::new(&FrameSettings::default(), PhonemeInventory::timit())
    }

    fn index(symbol: &str) -> usize {
        PhonemeInventory::timit().symbol_to_index(symbol).unwrap()
    }

    #[test]
    fn emits_one_label_per_frame() {
        let settings = FrameSettings::default();
        let n_samples = 16000;
        let n_frames = settings.frame_count(n_samples);
        let intervals = vec![
            PhonemeInterval::new("h#", 0, 8000),
            PhonemeInterval::new("aa", 8000, 16000),
        ];

        let labels = aligner()
            .frame_labels(&intervals, n_frames, n_samples)
            .unwrap();

        assert_eq!(n_frames, 98);
        assert_eq!(labels.len(), n_frames);
    }

    #[test]
    fn single_interval_labels_every_frame() {
        let n_samples = 4800;
        let intervals = vec![PhonemeInterval::new("iy", 0, n_samples)];

        let labels = aligner().frame_labels(&intervals, 28, n_samples).unwrap();

        assert!(labels.iter().all(|&l| l == index("iy")));
    }

    #[test]
    fn boundary_frame_goes_to_majority_phoneme() {
        // Stride 160, half stride 80. Frame 1 starts at 160.
        // "aa" stops at 239: 79 samples remain (< 80) so frame 1 is "iy".
        let intervals = vec![
            PhonemeInterval::new("aa", 0, 239),
            PhonemeInterval::new("iy", 239, 2000),
        ];

        let labels = aligner().frame_labels(&intervals, 10, 2000).unwrap();

        assert_eq!(labels[0], index("aa"));
        assert_eq!(labels[1], index("iy"));
    }

    #[test]
    fn exact_half_stays_with_first_phoneme() {
        // "aa" stops at 240: exactly 80 samples remain, comparison is strict.
        let intervals = vec![
            PhonemeInterval::new("aa", 0, 240),
            PhonemeInterval::new("iy", 240, 2000),
        ];

        let labels = aligner().frame_labels(&intervals, 10, 2000).unwrap();

        assert_eq!(labels[1], index("aa"));
        assert_eq!(labels[2], index("iy"));
    }

    #[test]
    fn last_phoneme_repeats_when_intervals_run_out() {
        let intervals = vec![
            PhonemeInterval::new("aa", 0, 300),
            PhonemeInterval::new("iy", 300, 600),
        ];

        let labels = aligner().frame_labels(&intervals, 10, 2000).unwrap();

        assert_eq!(labels[0], index("aa"));
        assert!(labels[2..].iter().all(|&l| l == index("iy")));
    }

    #[test]
    fn cursor_advances_at_most_once_per_frame() {
        // Short "b" burst is skipped over only one interval per frame.
        let intervals = vec![
            PhonemeInterval::new("aa", 0, 150),
            PhonemeInterval::new("b", 150, 170),
            PhonemeInterval::new("iy", 170, 2000),
        ];

        let labels = aligner().frame_labels(&intervals, 10, 2000).unwrap();

        assert_eq!(labels[0], index("aa"));
        assert_eq!(labels[1], index("b"));
        assert_eq!(labels[2], index("iy"));
    }

    #[test]
    fn mismatched_frame_count_is_fatal() {
        let intervals = vec![PhonemeInterval::new("aa", 0, 2000)];

        let result = aligner().frame_labels(&intervals, 11, 2000);

        assert!(matches!(
            result,
            Err(Error::Alignment(AlignmentError::FrameCountMismatch {
                expected: 11,
                got: 10
            }))
        ));
    }

    #[test]
    fn walks_past_degenerate_intervals() {
        let intervals = vec![
            PhonemeInterval::new("aa", 0, 100),
            PhonemeInterval::new("b", 100, 100),
            PhonemeInterval::new("iy", 100, 2000),
        ];

        let labels = aligner().frame_labels(&intervals, 10, 2000).unwrap();

        assert_eq!(labels.len(), 10);
        assert_eq!(labels[9], index("iy"));
    }
}
