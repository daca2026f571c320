use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Engine wide timing, resource and spatial configuration.
///
/// All values are plain numbers, so they can be loaded from whatever configuration source the
/// host application uses. Call [`EngineConfig::validate`] after changing values manually;
/// [`Engine::new`](crate::Engine::new) does so as well.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// How far ahead of the estimated next frame start grains get scheduled, in ms.
    pub queue_duration_ms: f32,
    /// Max allowed lateness of a grain's start time, relative to the current frame's start,
    /// before it gets discarded, in ms.
    pub discard_threshold_ms: f32,
    /// Range of the random start offset of triggered bursts, in ms.
    pub burst_offset_range_ms: f32,
    /// Safety margin applied to the last frame's duration when estimating the next frame's
    /// start, in percent.
    pub lookahead_percent: f32,
    /// Number of grain playback slots per speaker.
    pub grains_per_speaker: usize,
    /// Max number of speakers.
    pub max_speakers: usize,
    /// Busy:total slot ratio above which a speaker no longer accepts new hosts (0.0 - 1.0).
    pub speaker_busy_load_threshold: f32,
    /// Max distance between a host and an active speaker it attaches to.
    pub speaker_attach_radius: f32,
    /// Hosts further away from the listener are inaudible and don't get speakers.
    pub listener_radius: f32,
    /// Speed at which speakers move towards their hosts, in units per second.
    pub speaker_tracking_speed: f32,
    /// Interval at which speakers get populated or returned to the pool, in ms.
    pub speaker_population_interval_ms: f32,
    /// Time a speaker without hosts lingers before returning to the pool, in ms.
    pub speaker_linger_ms: f32,
    /// Max number of grain sample buffers kept for reuse between frames.
    pub grain_buffer_capacity: usize,
    /// Capacity of the grain emitted event channel.
    pub event_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            queue_duration_ms: 40.0,
            discard_threshold_ms: 20.0,
            burst_offset_range_ms: 10.0,
            lookahead_percent: 10.0,
            grains_per_speaker: 64,
            max_speakers: 32,
            speaker_busy_load_threshold: 0.8,
            speaker_attach_radius: 2.0,
            listener_radius: 50.0,
            speaker_tracking_speed: 10.0,
            speaker_population_interval_ms: 100.0,
            speaker_linger_ms: 500.0,
            grain_buffer_capacity: 256,
            event_queue_capacity: 1024,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_queue_duration(mut self, queue_duration_ms: f32) -> Self {
        self.queue_duration_ms = queue_duration_ms;
        self
    }

    pub fn with_discard_threshold(mut self, discard_threshold_ms: f32) -> Self {
        self.discard_threshold_ms = discard_threshold_ms;
        self
    }

    pub fn with_burst_offset_range(mut self, burst_offset_range_ms: f32) -> Self {
        self.burst_offset_range_ms = burst_offset_range_ms;
        self
    }

    pub fn with_lookahead(mut self, lookahead_percent: f32) -> Self {
        self.lookahead_percent = lookahead_percent;
        self
    }

    pub fn with_grains_per_speaker(mut self, grains_per_speaker: usize) -> Self {
        self.grains_per_speaker = grains_per_speaker;
        self
    }

    pub fn with_max_speakers(mut self, max_speakers: usize) -> Self {
        self.max_speakers = max_speakers;
        self
    }

    pub fn with_speaker_busy_load_threshold(mut self, threshold: f32) -> Self {
        self.speaker_busy_load_threshold = threshold;
        self
    }

    pub fn with_speaker_attach_radius(mut self, radius: f32) -> Self {
        self.speaker_attach_radius = radius;
        self
    }

    pub fn with_listener_radius(mut self, radius: f32) -> Self {
        self.listener_radius = radius;
        self
    }

    pub fn with_speaker_tracking_speed(mut self, speed: f32) -> Self {
        self.speaker_tracking_speed = speed;
        self
    }

    pub fn with_speaker_population_interval(mut self, interval_ms: f32) -> Self {
        self.speaker_population_interval_ms = interval_ms;
        self
    }

    pub fn with_speaker_linger(mut self, linger_ms: f32) -> Self {
        self.speaker_linger_ms = linger_ms;
        self
    }

    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    /// Validate all parameters.
    pub fn validate(&self) -> Result<(), Error> {
        if !(8000..=384000).contains(&self.sample_rate) {
            return Err(Error::ParameterError(format!(
                "Sample rate must be between 8000 and 384000 Hz, but is {}",
                self.sample_rate
            )));
        }
        if !(self.queue_duration_ms > 0.0 && self.queue_duration_ms <= 1000.0) {
            return Err(Error::ParameterError(
                "Queue duration must be between 0 and 1000 ms".to_string(),
            ));
        }
        if !(0.0..=1000.0).contains(&self.discard_threshold_ms) {
            return Err(Error::ParameterError(
                "Discard threshold must be between 0 and 1000 ms".to_string(),
            ));
        }
        if !(0.0..=1000.0).contains(&self.burst_offset_range_ms) {
            return Err(Error::ParameterError(
                "Burst offset range must be between 0 and 1000 ms".to_string(),
            ));
        }
        if !(0.0..=1000.0).contains(&self.lookahead_percent) {
            return Err(Error::ParameterError(
                "Lookahead must be between 0 and 1000 percent".to_string(),
            ));
        }
        if self.grains_per_speaker == 0 || self.max_speakers == 0 {
            return Err(Error::ParameterError(
                "Grains per speaker and max speakers must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.speaker_busy_load_threshold) {
            return Err(Error::ParameterError(
                "Speaker busy load threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.speaker_attach_radius < 0.0
            || self.listener_radius <= 0.0
            || self.speaker_tracking_speed < 0.0
        {
            return Err(Error::ParameterError(
                "Speaker radii and tracking speed must be positive".to_string(),
            ));
        }
        if self.speaker_population_interval_ms < 0.0 || self.speaker_linger_ms < 0.0 {
            return Err(Error::ParameterError(
                "Speaker population interval and linger time must be >= 0".to_string(),
            ));
        }
        if self.event_queue_capacity == 0 {
            return Err(Error::ParameterError(
                "Event queue capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_configs() {
        assert!(EngineConfig::default()
            .with_sample_rate(0)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_queue_duration(0.0)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_grains_per_speaker(0)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_speaker_busy_load_threshold(1.5)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_listener_radius(0.0)
            .validate()
            .is_err());
    }
}
