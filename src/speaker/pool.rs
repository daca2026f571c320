use std::sync::Arc;

use basedrop::{Handle, Shared};
use crossbeam_queue::ArrayQueue;
use glam::Vec3;

use crate::{config::EngineConfig, grain::HostId, mixer::MixerMessage, Error};

use super::{Listener, Speaker, SpeakerOutput, SpeakerState};

// -------------------------------------------------------------------------------------------------

/// Speaker assignment state of a host, as maintained by the [`SpeakerPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HostPlacement {
    pub position: Vec3,
    /// False for hosts without emitters, which never need a speaker.
    pub audible: bool,
    /// Index of the speaker the host is attached to.
    pub speaker: Option<usize>,
}

impl HostPlacement {
    pub fn new(position: Vec3, audible: bool) -> Self {
        Self {
            position,
            audible,
            speaker: None,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Fixed size arena of speakers.
///
/// Attaches audible hosts within the listener's range to nearby speakers, activates new
/// speakers for hosts which have none in reach, moves speakers along with their hosts and
/// returns abandoned speakers to the pool. Activated and released speakers get passed to
/// the audio thread's mixer via the mixer message queue.
pub struct SpeakerPool {
    speakers: Vec<Speaker>,
    mixer_queue: Arc<ArrayQueue<MixerMessage>>,
    population_timer_ms: f32,
}

impl SpeakerPool {
    pub fn new(
        config: &EngineConfig,
        collector_handle: &Handle,
        mixer_queue: Arc<ArrayQueue<MixerMessage>>,
    ) -> Self {
        let speakers = (0..config.max_speakers)
            .map(|index| {
                // slot buffers grow on the main thread when grains get published
                let output = SpeakerOutput::new(index, config.grains_per_speaker, 0);
                Speaker::new(index, Shared::new(collector_handle, output))
            })
            .collect();
        Self {
            speakers,
            mixer_queue,
            // populate in the first frame
            population_timer_ms: f32::MAX,
        }
    }

    /// All speakers, including pooled ones.
    pub fn speakers(&self) -> &[Speaker] {
        &self.speakers
    }

    /// Speaker with the given index, in any state.
    pub fn speaker(&self, index: usize) -> Option<&Speaker> {
        self.speakers.get(index)
    }

    /// Active or lingering speaker with the given index. Returns `None` for pooled speakers.
    pub fn speaker_at(&self, index: usize) -> Option<&Speaker> {
        self.speakers.get(index).filter(|speaker| speaker.is_active())
    }

    /// Manually activate a pooled speaker at the given position. It gets returned to the
    /// pool like any other speaker once it has no hosts and no playing grains.
    pub fn create_speaker(&mut self, position: Vec3) -> Result<usize, Error> {
        self.activate(position).ok_or_else(|| {
            Error::ParameterError("No free speaker available in the speaker pool".to_string())
        })
    }

    /// Immediately return an active speaker to the pool. Its playing grains get stopped.
    /// Hosts which were attached to it get reassigned in the next population pass.
    pub fn destroy_speaker(&mut self, index: usize) -> Result<(), Error> {
        if self.speaker_at(index).is_none() {
            return Err(Error::SpeakerNotFound(index));
        }
        if self.deactivate(index) {
            Ok(())
        } else {
            Err(Error::SendError(format!(
                "Failed to remove speaker #{index} from the mixer"
            )))
        }
    }

    /// Number of active or lingering speakers.
    pub fn active_count(&self) -> usize {
        self.speakers.iter().filter(|s| s.is_active()).count()
    }

    /// Detach a removed host from its speaker.
    pub fn release_host(&mut self, host: HostId, placement: &mut HostPlacement) {
        if let Some(index) = placement.speaker.take() {
            if let Some(speaker) = self.speakers.get_mut(index) {
                speaker.detach(host);
            }
        }
    }

    /// Update host assignments and speaker positions for a new frame. `hosts` are indexed by
    /// their [`HostId`].
    pub fn update(
        &mut self,
        hosts: &mut [HostPlacement],
        listener: &Listener,
        config: &EngineConfig,
        delta_time: f32,
    ) {
        let delta_time_ms = delta_time.max(0.0) * 1000.0;

        self.detach_hosts(hosts, listener, config);

        self.population_timer_ms = (self.population_timer_ms + delta_time_ms).min(f32::MAX);
        if self.population_timer_ms >= config.speaker_population_interval_ms {
            self.population_timer_ms = 0.0;
            self.populate(hosts, listener, config);
        }

        let tracking = (config.speaker_tracking_speed * delta_time).clamp(0.0, 1.0);
        for index in 0..self.speakers.len() {
            let speaker = &mut self.speakers[index];
            match speaker.state {
                SpeakerState::Pooled => continue,
                SpeakerState::Active if speaker.hosts.is_empty() => {
                    log::trace!("Speaker #{index} lost all its hosts");
                    speaker.state = SpeakerState::Lingering;
                    speaker.linger_remaining_ms = config.speaker_linger_ms;
                }
                SpeakerState::Active => {
                    let target = speaker
                        .hosts
                        .iter()
                        .filter_map(|host| hosts.get(*host))
                        .map(|placement| placement.position)
                        .sum::<Vec3>()
                        / speaker.hosts.len() as f32;
                    speaker.position = speaker.position.lerp(target, tracking);
                }
                SpeakerState::Lingering => {
                    speaker.linger_remaining_ms -= delta_time_ms;
                    // retried in the next frame when the mixer queue is full
                    if speaker.linger_remaining_ms <= 0.0
                        && speaker.playing_count() == 0
                        && self.deactivate(index)
                    {
                        continue;
                    }
                }
            }
            let speaker = &self.speakers[index];
            let (gain, pan) = listener.spatialize(speaker.position, config.listener_radius);
            speaker.output.set_gain(gain);
            speaker.output.set_pan(pan);
        }
    }

    /// Detach hosts which left their speaker's range, the listener's range or became silent.
    fn detach_hosts(
        &mut self,
        hosts: &mut [HostPlacement],
        listener: &Listener,
        config: &EngineConfig,
    ) {
        for (host, placement) in hosts.iter_mut().enumerate() {
            let Some(index) = placement.speaker else {
                continue;
            };
            let keep = placement.audible
                && listener.in_range(placement.position, config.listener_radius)
                && self.speakers.get(index).is_some_and(|speaker| {
                    speaker.is_active()
                        && speaker.position.distance(placement.position)
                            <= config.speaker_attach_radius
                });
            if !keep {
                if let Some(speaker) = self.speakers.get_mut(index) {
                    speaker.detach(host);
                }
                placement.speaker = None;
            }
        }
    }

    /// Attach all unassigned audible hosts to a speaker.
    fn populate(
        &mut self,
        hosts: &mut [HostPlacement],
        listener: &Listener,
        config: &EngineConfig,
    ) {
        for (host, placement) in hosts.iter_mut().enumerate() {
            if placement.speaker.is_some()
                || !placement.audible
                || !listener.in_range(placement.position, config.listener_radius)
            {
                continue;
            }
            let nearest = self
                .speakers
                .iter()
                .filter(|speaker| {
                    speaker.is_active()
                        && speaker.load() < config.speaker_busy_load_threshold
                        && speaker.position.distance(placement.position)
                            <= config.speaker_attach_radius
                })
                .min_by(|a, b| {
                    let a = a.position.distance_squared(placement.position);
                    let b = b.position.distance_squared(placement.position);
                    a.total_cmp(&b)
                })
                .map(|speaker| speaker.index);
            let index = match nearest {
                Some(index) => index,
                None => match self.activate(placement.position) {
                    Some(index) => index,
                    None => {
                        log::debug!("No free speaker for host #{host}");
                        continue;
                    }
                },
            };
            self.speakers[index].attach(host);
            placement.speaker = Some(index);
        }
    }

    /// Activate a pooled speaker at the given position and hand it over to the mixer.
    /// Speakers whose removal the mixer did not yet process are skipped.
    fn activate(&mut self, position: Vec3) -> Option<usize> {
        let speaker = self.speakers.iter_mut().find(|speaker| {
            speaker.state == SpeakerState::Pooled && !speaker.output.is_releasing()
        })?;
        let message = MixerMessage::AddSpeaker(Shared::clone(&speaker.output));
        if self.mixer_queue.push(message).is_err() {
            log::error!("Mixer message queue is full, can't activate a new speaker");
            return None;
        }
        log::debug!("Activating speaker #{}", speaker.index);
        speaker.state = SpeakerState::Active;
        speaker.position = position;
        speaker.hosts.clear();
        Some(speaker.index)
    }

    /// Return a speaker to the pool and remove it from the mixer.
    fn deactivate(&mut self, index: usize) -> bool {
        let speaker = &mut self.speakers[index];
        speaker.output.begin_release();
        let message = MixerMessage::RemoveSpeaker(Shared::clone(&speaker.output));
        if self.mixer_queue.push(message).is_err() {
            speaker.output.cancel_release();
            log::warn!("Mixer message queue is full, can't release speaker #{index}");
            return false;
        }
        log::debug!("Releasing speaker #{index}");
        speaker.state = SpeakerState::Pooled;
        speaker.hosts.clear();
        speaker.output.set_gain(0.0);
        true
    }
}

impl std::fmt::Debug for SpeakerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeakerPool")
            .field("speakers", &self.speakers.len())
            .field("active", &self.active_count())
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use basedrop::Collector;

    use super::*;

    fn pool_with_queue(
        config: &EngineConfig,
    ) -> (Collector, SpeakerPool, Arc<ArrayQueue<MixerMessage>>) {
        let collector = Collector::new();
        let queue = Arc::new(ArrayQueue::new(64));
        let pool = SpeakerPool::new(config, &collector.handle(), Arc::clone(&queue));
        (collector, pool, queue)
    }

    fn test_config() -> EngineConfig {
        EngineConfig::default()
            .with_max_speakers(2)
            .with_grains_per_speaker(2)
            .with_speaker_attach_radius(2.0)
            .with_listener_radius(50.0)
            .with_speaker_population_interval(0.0)
            .with_speaker_linger(100.0)
    }

    #[test]
    fn host_assignment() {
        let config = test_config();
        let (_collector, mut pool, queue) = pool_with_queue(&config);
        let listener = Listener::default();
        let mut hosts = vec![
            HostPlacement::new(Vec3::new(1.0, 0.0, 0.0), true),
            HostPlacement::new(Vec3::new(1.5, 0.0, 0.0), true),
            HostPlacement::new(Vec3::new(-10.0, 0.0, 0.0), true),
            // silent and out of range hosts get no speaker
            HostPlacement::new(Vec3::new(-10.0, 0.0, 0.0), false),
            HostPlacement::new(Vec3::new(100.0, 0.0, 0.0), true),
        ];
        pool.update(&mut hosts, &listener, &config, 0.016);

        assert_eq!(hosts[0].speaker, Some(0));
        assert_eq!(hosts[1].speaker, Some(0));
        assert_eq!(hosts[2].speaker, Some(1));
        assert_eq!(hosts[3].speaker, None);
        assert_eq!(hosts[4].speaker, None);
        assert_eq!(pool.active_count(), 2);
        assert_eq!(queue.len(), 2);
        assert_eq!(pool.speaker(0).map(|s| s.hosts().len()), Some(2));
    }

    #[test]
    fn manual_speakers() {
        let config = test_config();
        let (_collector, mut pool, queue) = pool_with_queue(&config);
        assert!(pool.speaker_at(0).is_none());
        assert_eq!(pool.create_speaker(Vec3::Y).ok(), Some(0));
        assert_eq!(pool.create_speaker(Vec3::Y).ok(), Some(1));
        assert!(pool.create_speaker(Vec3::Y).is_err());
        assert_eq!(pool.speaker_at(1).map(|s| s.position()), Some(Vec3::Y));

        assert!(pool.destroy_speaker(1).is_ok());
        assert!(pool.speaker_at(1).is_none());
        assert!(matches!(
            pool.destroy_speaker(1),
            Err(Error::SpeakerNotFound(1))
        ));
        assert!(matches!(
            pool.destroy_speaker(7),
            Err(Error::SpeakerNotFound(7))
        ));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn busy_speakers() {
        let config = test_config();
        let (_collector, mut pool, _queue) = pool_with_queue(&config);
        let listener = Listener::default();
        let mut hosts = vec![HostPlacement::new(Vec3::X, true)];
        pool.update(&mut hosts, &listener, &config, 0.016);
        assert_eq!(hosts[0].speaker, Some(0));

        // a fully loaded speaker accepts no new hosts
        let speaker = pool.speaker(0).unwrap();
        assert!(speaker.publish(&[0.0; 4], 0));
        assert!(speaker.publish(&[0.0; 4], 0));
        assert!(!speaker.publish(&[0.0; 4], 0));
        assert_eq!(speaker.load(), 1.0);

        hosts.push(HostPlacement::new(Vec3::X, true));
        pool.update(&mut hosts, &listener, &config, 0.016);
        assert_eq!(hosts[1].speaker, Some(1));
    }

    #[test]
    fn speaker_tracking_and_release() {
        let config = test_config().with_speaker_tracking_speed(10.0);
        let (_collector, mut pool, queue) = pool_with_queue(&config);
        let listener = Listener::default();
        let mut hosts = vec![HostPlacement::new(Vec3::X, true)];
        pool.update(&mut hosts, &listener, &config, 0.05);
        let _ = queue.pop();

        // speakers follow their hosts
        hosts[0].position = Vec3::new(2.0, 0.0, 0.0);
        pool.update(&mut hosts, &listener, &config, 0.05);
        let position = pool.speaker(0).map(|s| s.position()).unwrap_or_default();
        assert!((position.x - 1.5).abs() < 1e-5);
        let output = pool.speaker(0).unwrap().output();
        assert!(output.pan() > 0.99);
        assert!((output.gain() - (1.0 - 1.5 / 50.0)).abs() < 1e-5);

        // hosts which move away get detached, the speaker lingers and then gets released
        hosts[0].position = Vec3::new(30.0, 0.0, 0.0);
        hosts[0].audible = false;
        pool.update(&mut hosts, &listener, &config, 0.05);
        assert_eq!(hosts[0].speaker, None);
        assert_eq!(pool.speaker(0).map(|s| s.state()), Some(SpeakerState::Lingering));
        pool.update(&mut hosts, &listener, &config, 0.05);
        assert_eq!(pool.speaker(0).map(|s| s.state()), Some(SpeakerState::Lingering));
        pool.update(&mut hosts, &listener, &config, 0.06);
        assert_eq!(pool.speaker(0).map(|s| s.state()), Some(SpeakerState::Pooled));
        assert!(matches!(
            queue.pop(),
            Some(MixerMessage::RemoveSpeaker(output)) if output.index() == 0
        ));
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn released_speakers_wait_for_the_mixer() {
        let config = test_config();
        let (_collector, mut pool, queue) = pool_with_queue(&config);
        assert_eq!(pool.create_speaker(Vec3::X).ok(), Some(0));
        assert!(pool.destroy_speaker(0).is_ok());
        assert!(pool.speaker(0).is_some_and(|s| s.output().is_releasing()));

        // the removal is still queued, so the speaker can't be handed out again yet
        assert_eq!(pool.create_speaker(Vec3::X).ok(), Some(1));
        assert!(pool.create_speaker(Vec3::X).is_err());

        // mixer acknowledges the removal
        while let Some(message) = queue.pop() {
            if let MixerMessage::RemoveSpeaker(output) = message {
                output.finish_release();
            }
        }
        assert_eq!(pool.create_speaker(Vec3::X).ok(), Some(0));
    }
}
