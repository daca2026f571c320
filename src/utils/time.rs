use std::time::Duration;

// -------------------------------------------------------------------------------------------------

/// Absolute time in sample frames, as counted by the audio clock.
pub type SampleTime = u64;

// -------------------------------------------------------------------------------------------------

/// Convert milliseconds to sample frames with the given sample rate, rounding to the nearest
/// frame. Negative durations result in 0.
pub fn ms_to_samples(ms: f32, sample_rate: u32) -> SampleTime {
    debug_assert!(sample_rate > 0, "Invalid sample rate");
    (ms.max(0.0) as f64 * sample_rate as f64 / 1000.0).round() as SampleTime
}

/// Convert sample frames to milliseconds with the given sample rate.
pub fn samples_to_ms(samples: SampleTime, sample_rate: u32) -> f32 {
    debug_assert!(sample_rate > 0, "Invalid sample rate");
    (samples as f64 * 1000.0 / sample_rate as f64) as f32
}

/// Convert a duration to sample frames with the given sample rate.
pub fn duration_to_samples(duration: Duration, sample_rate: u32) -> SampleTime {
    debug_assert!(sample_rate > 0, "Invalid sample rate");
    (duration.as_secs_f64() * sample_rate as f64).round() as SampleTime
}

/// Convert sample frames to a duration with the given sample rate.
pub fn samples_to_duration(samples: SampleTime, sample_rate: u32) -> Duration {
    debug_assert!(sample_rate > 0, "Invalid sample rate");
    Duration::from_secs_f64(samples as f64 / sample_rate as f64)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(ms_to_samples(60.0, 44100), 2646);
        assert_eq!(ms_to_samples(1000.0, 48000), 48000);
        assert_eq!(ms_to_samples(-10.0, 48000), 0);
        assert!((samples_to_ms(2646, 44100) - 60.0).abs() < 1e-4);
        assert_eq!(duration_to_samples(Duration::from_millis(500), 44100), 22050);
        assert_eq!(samples_to_duration(22050, 44100), Duration::from_millis(500));
    }
}
