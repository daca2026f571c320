//! Grain throughput and discard statistics.

use strum::EnumCount;

use crate::{
    grain::GrainDescriptor,
    utils::time::{samples_to_ms, SampleTime},
};

// -------------------------------------------------------------------------------------------------

/// Reasons why a scheduled grain did not get played.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumCount,
    strum::EnumIter,
    strum::VariantNames,
)]
pub enum DiscardReason {
    /// The grain's host has no active speaker.
    NoSpeaker,
    /// The grain's start time is older than the discard threshold.
    Stale,
    /// All slots of the grain's speaker are playing.
    PoolFull,
}

// -------------------------------------------------------------------------------------------------

/// Counters of a single frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStatistics {
    pub scheduled: usize,
    pub delivered: usize,
    pub discarded: [usize; DiscardReason::COUNT],
}

impl FrameStatistics {
    pub fn discarded(&self, reason: DiscardReason) -> usize {
        self.discarded[reason as usize]
    }

    pub fn total_discarded(&self) -> usize {
        self.discarded.iter().sum()
    }
}

// -------------------------------------------------------------------------------------------------

/// Running grain statistics, updated once per frame by the engine.
#[derive(Debug, Clone, Default)]
pub struct GrainStatistics {
    current: FrameStatistics,
    last_frame: FrameStatistics,
    total_delivered: u64,
    total_discarded: [u64; DiscardReason::COUNT],
    grains_per_second: f32,
    peak_grains_per_second: f32,
    lead_time_sum_ms: f32,
    average_lead_time_ms: f32,
}

impl GrainStatistics {
    /// Smoothing factor of the per frame running averages.
    const SMOOTHING: f32 = 0.1;

    pub fn new() -> Self {
        Self::default()
    }

    /// Counters of the last completed frame.
    pub fn last_frame(&self) -> &FrameStatistics {
        &self.last_frame
    }

    /// Number of grains delivered to speakers since the engine started.
    pub fn total_delivered(&self) -> u64 {
        self.total_delivered
    }

    /// Number of grains discarded for the given reason since the engine started.
    pub fn total_discarded(&self, reason: DiscardReason) -> u64 {
        self.total_discarded[reason as usize]
    }

    /// Smoothed number of delivered grains per second.
    pub fn grains_per_second(&self) -> f32 {
        self.grains_per_second
    }

    /// Highest number of delivered grains per second in a single frame.
    pub fn peak_grains_per_second(&self) -> f32 {
        self.peak_grains_per_second
    }

    /// Smoothed average time between a grain's delivery and its start time. Negative when
    /// grains arrive late.
    pub fn average_lead_time_ms(&self) -> f32 {
        self.average_lead_time_ms
    }

    pub fn record_scheduled(&mut self, count: usize) {
        self.current.scheduled += count;
    }

    pub fn record_delivered(
        &mut self,
        grain: &GrainDescriptor,
        current_sample: SampleTime,
        sample_rate: u32,
    ) {
        self.current.delivered += 1;
        self.total_delivered += 1;
        let lead_time_ms = if grain.dsp_start >= current_sample {
            samples_to_ms(grain.dsp_start - current_sample, sample_rate)
        } else {
            -samples_to_ms(current_sample - grain.dsp_start, sample_rate)
        };
        self.lead_time_sum_ms += lead_time_ms;
    }

    pub fn record_discarded(&mut self, reason: DiscardReason) {
        self.current.discarded[reason as usize] += 1;
        self.total_discarded[reason as usize] += 1;
    }

    /// Finish the current frame and update the running averages.
    pub fn end_frame(&mut self, delta_time: f32) {
        let frame = self.current;
        if delta_time > 0.0 {
            let grains_per_second = frame.delivered as f32 / delta_time;
            self.grains_per_second +=
                (grains_per_second - self.grains_per_second) * Self::SMOOTHING;
            self.peak_grains_per_second = self.peak_grains_per_second.max(grains_per_second);
        }
        if frame.delivered > 0 {
            let lead_time_ms = self.lead_time_sum_ms / frame.delivered as f32;
            self.average_lead_time_ms +=
                (lead_time_ms - self.average_lead_time_ms) * Self::SMOOTHING;
        }
        if frame.total_discarded() > 0 {
            log::trace!(
                "Discarded grains: {} without speaker, {} stale, {} with full speakers",
                frame.discarded(DiscardReason::NoSpeaker),
                frame.discarded(DiscardReason::Stale),
                frame.discarded(DiscardReason::PoolFull)
            );
        }
        self.last_frame = frame;
        self.current = FrameStatistics::default();
        self.lead_time_sum_ms = 0.0;
    }

    /// Reset all counters and averages.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    fn descriptor(dsp_start: SampleTime) -> GrainDescriptor {
        GrainDescriptor {
            host: 0,
            emitter: 0,
            clip: 0,
            sample_start: 0,
            sample_count: 10,
            output_len: 10,
            playhead: 0.0,
            pitch: 1.0,
            volume: 1.0,
            speaker: Some(0),
            dsp_start,
            dsp_tail: 0,
        }
    }

    #[test]
    fn frame_counters() {
        let mut stats = GrainStatistics::new();
        stats.record_scheduled(4);
        stats.record_delivered(&descriptor(1000 + 441), 1000, 44100);
        stats.record_delivered(&descriptor(1000 + 441), 1000, 44100);
        stats.record_discarded(DiscardReason::Stale);
        stats.record_discarded(DiscardReason::PoolFull);
        stats.end_frame(0.5);

        let frame = stats.last_frame();
        assert_eq!(frame.scheduled, 4);
        assert_eq!(frame.delivered, 2);
        assert_eq!(frame.total_discarded(), 2);
        assert_eq!(frame.discarded(DiscardReason::NoSpeaker), 0);
        assert!((stats.grains_per_second() - 0.4).abs() < 1e-5);
        assert_eq!(stats.peak_grains_per_second(), 4.0);
        assert!((stats.average_lead_time_ms() - 1.0).abs() < 1e-4);

        // counters restart with each frame, totals accumulate
        stats.record_discarded(DiscardReason::Stale);
        stats.end_frame(0.5);
        assert_eq!(stats.last_frame().delivered, 0);
        assert_eq!(stats.total_delivered(), 2);
        assert_eq!(stats.total_discarded(DiscardReason::Stale), 2);
        assert_eq!(stats.peak_grains_per_second(), 4.0);

        stats.reset();
        for reason in DiscardReason::iter() {
            assert_eq!(stats.total_discarded(reason), 0);
        }
    }

    #[test]
    fn late_grains() {
        let mut stats = GrainStatistics::new();
        stats.record_delivered(&descriptor(0), 4410, 44100);
        stats.end_frame(0.1);
        assert!((stats.average_lead_time_ms() + 10.0).abs() < 1e-4);
    }
}
