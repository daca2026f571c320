//! Bridges the main thread's frame clock and the audio thread's sample clock.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{
    config::EngineConfig,
    utils::time::{ms_to_samples, SampleTime},
};

// -------------------------------------------------------------------------------------------------

/// Timing values of a single main thread frame, in absolute sample frames.
///
/// These are the only timing inputs of the grain scheduler and the distribution pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    pub sample_rate: u32,
    /// Duration of the last frame in seconds.
    pub delta_time: f32,
    /// Audio clock position at the start of this frame.
    pub frame_start_sample: SampleTime,
    /// Duration of the last frame in sample frames.
    pub last_frame_duration_samples: SampleTime,
    /// Estimated start of the next frame, including the lookahead margin. Grains scheduled
    /// in this frame start at or after this time.
    pub next_frame_start_sample: SampleTime,
    /// Grains get scheduled up to, but excluding, this time.
    pub horizon_sample: SampleTime,
    /// Grains starting before this time are stale and get discarded.
    pub discard_threshold_sample: SampleTime,
    /// Range of random start offsets for triggered bursts.
    pub burst_jitter_range_samples: SampleTime,
}

impl FrameTiming {
    /// Create frame timing values from the given clock position and last frame duration.
    pub fn new(
        config: &EngineConfig,
        frame_start_sample: SampleTime,
        last_frame_duration_samples: SampleTime,
        delta_time: f32,
    ) -> Self {
        let sample_rate = config.sample_rate;
        let lookahead = 1.0 + config.lookahead_percent as f64 / 100.0;
        let next_frame_start_sample = frame_start_sample
            + (last_frame_duration_samples as f64 * lookahead).round() as SampleTime;
        let horizon_sample =
            next_frame_start_sample + ms_to_samples(config.queue_duration_ms, sample_rate);
        let discard_threshold_sample = frame_start_sample
            .saturating_sub(ms_to_samples(config.discard_threshold_ms, sample_rate));
        let burst_jitter_range_samples = ms_to_samples(config.burst_offset_range_ms, sample_rate);
        Self {
            sample_rate,
            delta_time,
            frame_start_sample,
            last_frame_duration_samples,
            next_frame_start_sample,
            horizon_sample,
            discard_threshold_sample,
            burst_jitter_range_samples,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Monotonic sample frame counter, advanced by the audio thread and read by the main thread.
#[derive(Debug, Clone)]
pub struct AudioClock {
    position: Arc<AtomicU64>,
    sample_rate: u32,
    last_frame_start: Option<SampleTime>,
}

impl AudioClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            position: Arc::new(AtomicU64::new(0)),
            sample_rate,
            last_frame_start: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Shared handle to the sample counter, for the audio thread.
    pub fn position_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.position)
    }

    /// Current position of the audio clock in sample frames.
    pub fn current_sample(&self) -> SampleTime {
        self.position.load(Ordering::Acquire)
    }

    /// Advance the clock by the given number of sample frames. Called by the audio thread
    /// once per processed output buffer.
    pub fn advance(position: &AtomicU64, frames: u64) {
        position.fetch_add(frames, Ordering::Release);
    }

    /// Start a new main thread frame and calculate its timing values.
    ///
    /// The last frame's duration is measured with the audio clock. When the clock did not
    /// move, e.g. because the output device is not running yet, the frame's delta time is
    /// used instead.
    pub fn begin_frame(&mut self, config: &EngineConfig, delta_time: f32) -> FrameTiming {
        let frame_start = self.current_sample();
        let measured = self
            .last_frame_start
            .map(|last| frame_start.saturating_sub(last))
            .unwrap_or(0);
        let last_frame_duration = if measured > 0 {
            measured
        } else {
            (delta_time.max(0.0) as f64 * self.sample_rate as f64).round() as SampleTime
        };
        self.last_frame_start = Some(frame_start);
        FrameTiming::new(config, frame_start, last_frame_duration, delta_time)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_timing() {
        let config = EngineConfig::default()
            .with_sample_rate(48000)
            .with_lookahead(50.0)
            .with_queue_duration(10.0)
            .with_discard_threshold(20.0)
            .with_burst_offset_range(5.0);
        let timing = FrameTiming::new(&config, 96000, 800, 1.0 / 60.0);
        assert_eq!(timing.next_frame_start_sample, 96000 + 1200);
        assert_eq!(timing.horizon_sample, 96000 + 1200 + 480);
        assert_eq!(timing.discard_threshold_sample, 96000 - 960);
        assert_eq!(timing.burst_jitter_range_samples, 240);

        // thresholds never underflow
        let timing = FrameTiming::new(&config, 100, 800, 1.0 / 60.0);
        assert_eq!(timing.discard_threshold_sample, 0);
    }

    #[test]
    fn clock_frames() {
        let config = EngineConfig::default().with_lookahead(0.0);
        let mut clock = AudioClock::new(44100);

        // stalled clock: frame duration from delta time
        let timing = clock.begin_frame(&config, 0.1);
        assert_eq!(timing.frame_start_sample, 0);
        assert_eq!(timing.last_frame_duration_samples, 4410);
        assert_eq!(timing.next_frame_start_sample, 4410);

        // running clock: measured frame duration
        AudioClock::advance(&clock.position_handle(), 512);
        let timing = clock.begin_frame(&config, 0.1);
        assert_eq!(timing.frame_start_sample, 512);
        assert_eq!(timing.last_frame_duration_samples, 512);
        assert_eq!(timing.next_frame_start_sample, 1024);
        assert_eq!(clock.current_sample(), 512);
    }
}
