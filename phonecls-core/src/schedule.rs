//! Learning-rate control: a per-epoch one-cycle ramp and plateau-based decay.

/// Symmetric triangular schedule over the steps of one epoch.
///
/// The rate climbs linearly from `base / 10` at step 0 to `base` at the
/// midpoint, then falls back to `base / 10` at the last step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OneCycleSchedule {
    steps: usize,
}

impl OneCycleSchedule {
    pub fn new(steps_per_epoch: usize) -> Self {
        Self {
            steps: steps_per_epoch,
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Rate for `step` (0-based, within one epoch) given the current base rate.
    pub fn rate_at(&self, base: f32, step: usize) -> f32 {
        let low = base / 10.0;
        let half = self.steps / 2;
        if half == 0 {
            return base;
        }

        let step = step.min(self.steps - 1);
        let fraction = if step <= half {
            step as f32 / half as f32
        } else {
            let down = (self.steps - 1 - half).max(1);
            1.0 - (step - half) as f32 / down as f32
        };

        low + (base - low) * fraction
    }
}

/// Relative improvement threshold: a value counts as better only below `0.9999 * last`.
const IMPROVEMENT_THRESHOLD: f32 = 0.9999;

/// Reduces the base learning rate when a monitored metric stops improving.
///
/// The stall counter grows on every epoch that fails to improve on the
/// previous one and is reset only after a reduction. Improvements leave it
/// unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct PlateauDetector {
    patience: usize,
    factor: f32,
    last: f32,
    stalls: usize,
}

impl PlateauDetector {
    pub fn new(patience: usize, factor: f32) -> Self {
        Self {
            patience,
            factor,
            last: f32::INFINITY,
            stalls: 0,
        }
    }

    pub fn stalls(&self) -> usize {
        self.stalls
    }

    /// Record an epoch-level value and return the possibly reduced base rate.
    pub fn observe(&mut self, value: f32, base: f32) -> f32 {
        if value > IMPROVEMENT_THRESHOLD * self.last || value.is_nan() {
            self.stalls += 1;
        }
        self.last = value;

        if self.stalls > self.patience {
            self.stalls = 0;
            let reduced = base * self.factor;
            tracing::info!(from = base, to = reduced, "reducing learning rate on plateau");
            return reduced;
        }

        base
    }
}
