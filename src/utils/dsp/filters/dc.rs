//! DC removal filter.

// -------------------------------------------------------------------------------------------------

/// DC filter modes.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, strum::Display, strum::EnumString, strum::VariantNames,
)]
pub enum DcFilterMode {
    /// ~5Hz cutoff: good for most cases.
    #[default]
    Default,
    /// ~20Hz cutoff: aggressive, but settles quickly on short grain buffers.
    Fast,
}

// -------------------------------------------------------------------------------------------------

/// DC blocker filter based on a one-pole high-pass filter.
/// `y(n) = x(n) - x(n-1) + R * y(n-1)`
#[derive(Debug, Clone)]
pub struct DcFilter {
    y1: f64, // previous output
    x1: f64, // previous input
    r: f64,  // coefficient
}

impl DcFilter {
    /// Create a new DC filter for the given sample rate and mode.
    pub fn new(sample_rate: u32, mode: DcFilterMode) -> Self {
        let cutoff = match mode {
            DcFilterMode::Default => 5.0,
            DcFilterMode::Fast => 20.0,
        };
        let r = 1.0 - (std::f64::consts::TAU * (cutoff / sample_rate.max(1) as f64));
        Self {
            y1: 0.0,
            x1: 0.0,
            r: r.clamp(0.0, 0.9999),
        }
    }

    /// Process a single sample.
    #[inline]
    pub fn process_sample(&mut self, sample: f64) -> f64 {
        self.y1 = sample - self.x1 + self.r * self.y1;
        self.x1 = sample;
        self.y1
    }

    /// Reset the filter's history.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_offset() {
        let mut filter = DcFilter::new(44100, DcFilterMode::Fast);
        let mut last = 1.0;
        for n in 0..44100 {
            let phase = n as f64 * 440.0 / 44100.0 * std::f64::consts::TAU;
            last = filter.process_sample(0.5 + phase.sin() * 0.1);
        }
        // offset is gone, the sine passes
        assert!(last.abs() <= 0.11);
    }
}
