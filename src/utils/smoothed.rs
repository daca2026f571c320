use std::fmt::Debug;

// -------------------------------------------------------------------------------------------------

/// Provides smooth, per sample transitions between a current and target value, to avoid clicks
/// when gain or panning values change while grains are playing.
pub trait SmoothedValue: Debug {
    /// Access to the current, possibly ramped value.
    #[must_use]
    fn current(&self) -> f32;
    /// Access to the target value.
    #[must_use]
    fn target(&self) -> f32;

    /// Ramp, if needed, and return the current value.
    #[must_use]
    fn next(&mut self) -> f32 {
        if self.need_ramp() {
            self.ramp();
        }
        self.current()
    }

    /// true while the current value still moves towards the target.
    #[must_use]
    fn need_ramp(&self) -> bool;
    /// Move current one sample towards the target value.
    fn ramp(&mut self);

    /// Set a new target value. Current follows with the next calls to `ramp` or `next`.
    fn set_target(&mut self, target: f32);
}

// -------------------------------------------------------------------------------------------------

/// One pole smoothed value which approaches its target with a fixed time constant.
#[derive(Debug, Clone)]
pub struct ExponentialSmoothedValue {
    current: f32,
    target: f32,
    coefficient: f32,
}

impl ExponentialSmoothedValue {
    /// Default time constant in ms.
    pub const DEFAULT_TIME_MS: f32 = 5.0;

    /// Distance to the target below which current snaps to the target.
    const EPSILON: f32 = 1e-5;

    pub fn new(value: f32, sample_rate: u32) -> Self {
        Self::with_time(value, Self::DEFAULT_TIME_MS, sample_rate)
    }

    pub fn with_time(value: f32, time_ms: f32, sample_rate: u32) -> Self {
        debug_assert!(sample_rate > 0, "Invalid sample rate");
        let time_samples = time_ms.max(0.0) / 1000.0 * sample_rate.max(1) as f32;
        let coefficient = if time_samples > 0.0 {
            1.0 - (-1.0 / time_samples).exp()
        } else {
            1.0
        };
        Self {
            current: value,
            target: value,
            coefficient,
        }
    }
}

impl SmoothedValue for ExponentialSmoothedValue {
    #[inline(always)]
    fn current(&self) -> f32 {
        self.current
    }

    #[inline(always)]
    fn target(&self) -> f32 {
        self.target
    }

    #[inline(always)]
    fn need_ramp(&self) -> bool {
        self.current != self.target
    }

    fn ramp(&mut self) {
        let distance = self.target - self.current;
        if distance.abs() <= Self::EPSILON {
            self.current = self.target;
        } else {
            self.current += distance * self.coefficient;
        }
    }

    fn set_target(&mut self, target: f32) {
        self.target = target;
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_smoothed_value() {
        let mut value = ExponentialSmoothedValue::new(0.0, 44100);
        assert!(!value.need_ramp());
        assert_eq!(value.next(), 0.0);

        value.set_target(1.0);
        assert!(value.need_ramp());
        let first = value.next();
        assert!(first > 0.0 && first < 1.0);

        // one time constant reaches ~63% of the distance
        let time_constant =
            (ExponentialSmoothedValue::DEFAULT_TIME_MS / 1000.0 * 44100.0) as usize;
        let mut value = ExponentialSmoothedValue::new(0.0, 44100);
        value.set_target(1.0);
        for _ in 0..time_constant {
            let _ = value.next();
        }
        assert!((value.current() - 0.632).abs() < 0.01);

        // converges without overshooting
        for _ in 0..44100 {
            assert!(value.next() <= 1.0);
        }
        assert!(!value.need_ramp());
        assert_eq!(value.current(), 1.0);

        // zero time jumps to the target
        let mut value = ExponentialSmoothedValue::with_time(0.0, 0.0, 44100);
        value.set_target(0.5);
        assert_eq!(value.next(), 0.5);
    }
}
