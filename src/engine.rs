//! The engine context: clips, hosts, emitters and speakers of a scene.

use std::sync::Arc;

use basedrop::Collector;
use crossbeam_channel::Receiver;
use crossbeam_queue::ArrayQueue;
use glam::{Quat, Vec3};
use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    actor::Actor,
    clip::{AudioClip, ClipId},
    clock::{AudioClock, FrameTiming},
    config::EngineConfig,
    distribution::GrainDistributor,
    emitter::{Emitter, SchedulerContext},
    grain::{EmitterId, GrainBufferPool, GrainEmittedEvent, GrainRecord, HostId},
    mixer::SpeakerMixer,
    modulation::ModulationContext,
    speaker::{HostPlacement, Listener, SpeakerPool},
    stats::GrainStatistics,
    utils::time::SampleTime,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// A scene object which owns emitters and gets positioned by an [`Actor`].
#[derive(Debug, Clone)]
pub struct Host {
    actor: Actor,
    linked: Option<HostId>,
    emitters: Vec<EmitterId>,
}

impl Host {
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Host which provides the linked actor for modulation inputs.
    pub fn linked(&self) -> Option<HostId> {
        self.linked
    }

    pub fn emitters(&self) -> &[EmitterId] {
        &self.emitters
    }
}

// -------------------------------------------------------------------------------------------------

#[derive(Debug)]
struct EmitterEntry {
    host: HostId,
    emitter: Emitter,
}

// -------------------------------------------------------------------------------------------------

/// Runs the granular synthesis of a scene on the main thread.
///
/// Call [`Engine::update`] once per frame after updating all actors. Grains get scheduled
/// ahead of time, processed and handed over to the [`SpeakerMixer`], which renders them on
/// the audio thread.
pub struct Engine {
    config: EngineConfig,
    clock: AudioClock,
    collector: Collector,
    clips: Vec<Option<AudioClip>>,
    hosts: Vec<Option<Host>>,
    placements: Vec<HostPlacement>,
    emitters: Vec<Option<EmitterEntry>>,
    speakers: SpeakerPool,
    listener: Listener,
    distributor: GrainDistributor,
    stats: GrainStatistics,
    rng: SmallRng,
    buffers: GrainBufferPool,
    grains: Vec<GrainRecord>,
    scene_time: f32,
    last_timing: Option<FrameTiming>,
}

impl Engine {
    /// Create a new engine and the mixer which renders its speakers. The mixer must be
    /// passed to an audio output, see [`crate::output`], or driven manually.
    pub fn new(config: EngineConfig) -> Result<(Self, SpeakerMixer), Error> {
        config.validate()?;
        log::info!(
            "Creating granular engine with {} speakers at {} Hz",
            config.max_speakers,
            config.sample_rate
        );
        let clock = AudioClock::new(config.sample_rate);
        let collector = Collector::new();
        // each speaker gets added and removed at most once per frame
        let mixer_queue = Arc::new(ArrayQueue::new(config.max_speakers * 2 + 1));
        let speakers = SpeakerPool::new(&config, &collector.handle(), Arc::clone(&mixer_queue));
        let mixer = SpeakerMixer::new(
            config.sample_rate,
            config.max_speakers,
            mixer_queue,
            clock.position_handle(),
        );
        let engine = Self {
            clock,
            collector,
            clips: Vec::new(),
            hosts: Vec::new(),
            placements: Vec::new(),
            emitters: Vec::new(),
            speakers,
            listener: Listener::default(),
            distributor: GrainDistributor::new(config.event_queue_capacity),
            stats: GrainStatistics::new(),
            rng: SmallRng::from_rng(&mut rand::rng()),
            buffers: GrainBufferPool::new(config.grain_buffer_capacity),
            grains: Vec::with_capacity(config.grain_buffer_capacity),
            scene_time: 0.0,
            last_timing: None,
            config,
        };
        Ok((engine, mixer))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reseed the engine's random number generator, e.g. for reproducible renderings.
    pub fn seed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    /// Current audio clock position in sample frames.
    pub fn current_sample(&self) -> SampleTime {
        self.clock.current_sample()
    }

    /// Timing values of the last update.
    pub fn last_timing(&self) -> Option<&FrameTiming> {
        self.last_timing.as_ref()
    }

    /// Accumulated delta times of all updates in seconds.
    pub fn scene_time(&self) -> f32 {
        self.scene_time
    }

    // Clips

    /// Add a clip to the clip library.
    pub fn add_clip(&mut self, clip: AudioClip) -> ClipId {
        if clip.is_empty() {
            log::warn!("Adding an empty audio clip: emitters using it stay silent");
        }
        self.clips.push(Some(clip));
        self.clips.len() - 1
    }

    pub fn clip(&self, clip: ClipId) -> Option<&AudioClip> {
        self.clips.get(clip).and_then(Option::as_ref)
    }

    /// Remove a clip from the library. Emitters which still use it stay silent.
    pub fn remove_clip(&mut self, clip: ClipId) -> Result<AudioClip, Error> {
        self.clips
            .get_mut(clip)
            .and_then(Option::take)
            .ok_or(Error::ClipNotFound(clip))
    }

    // Hosts

    /// Add a new host with the given initial actor state.
    pub fn add_host(&mut self, actor: Actor) -> HostId {
        self.placements
            .push(HostPlacement::new(actor.position, false));
        self.hosts.push(Some(Host {
            actor,
            linked: None,
            emitters: Vec::new(),
        }));
        self.hosts.len() - 1
    }

    pub fn host(&self, host: HostId) -> Option<&Host> {
        self.hosts.get(host).and_then(Option::as_ref)
    }

    fn host_mut(&mut self, host: HostId) -> Result<&mut Host, Error> {
        self.hosts
            .get_mut(host)
            .and_then(Option::as_mut)
            .ok_or(Error::HostNotFound(host))
    }

    /// Remove a host and all its emitters.
    pub fn remove_host(&mut self, host: HostId) -> Result<(), Error> {
        let removed = self
            .hosts
            .get_mut(host)
            .and_then(Option::take)
            .ok_or(Error::HostNotFound(host))?;
        for emitter in removed.emitters {
            if let Some(entry) = self.emitters.get_mut(emitter) {
                *entry = None;
            }
        }
        for other in self.hosts.iter_mut().flatten() {
            if other.linked == Some(host) {
                other.linked = None;
            }
        }
        let placement = &mut self.placements[host];
        placement.audible = false;
        self.speakers.release_host(host, placement);
        Ok(())
    }

    /// Update the actor state of a host. Call before [`Engine::update`].
    pub fn update_actor(&mut self, host: HostId, actor: Actor) -> Result<(), Error> {
        self.host_mut(host)?.actor = actor;
        self.placements[host].position = actor.position;
        Ok(())
    }

    /// Link a host with another one, which then provides the linked actor for the host's
    /// modulation inputs.
    pub fn link_host(&mut self, host: HostId, linked: Option<HostId>) -> Result<(), Error> {
        if let Some(linked) = linked {
            if self.host(linked).is_none() || linked == host {
                return Err(Error::HostNotFound(linked));
            }
        }
        self.host_mut(host)?.linked = linked;
        Ok(())
    }

    // Emitters

    /// Validate and add an emitter to the given host.
    pub fn add_emitter(&mut self, host: HostId, emitter: Emitter) -> Result<EmitterId, Error> {
        if self.host(host).is_none() {
            return Err(Error::HostNotFound(host));
        }
        match self.clip(emitter.clip()) {
            None => return Err(Error::ClipNotFound(emitter.clip())),
            Some(clip) if clip.is_empty() => return Err(Error::EmptyClip(emitter.clip())),
            Some(_) => (),
        }
        emitter.validate()?;

        self.emitters.push(Some(EmitterEntry { host, emitter }));
        let id = self.emitters.len() - 1;
        self.host_mut(host)?.emitters.push(id);
        self.placements[host].audible = true;
        log::debug!("Added emitter #{id} to host #{host}");
        Ok(id)
    }

    pub fn emitter(&self, emitter: EmitterId) -> Option<&Emitter> {
        self.emitters
            .get(emitter)
            .and_then(Option::as_ref)
            .map(|entry| &entry.emitter)
    }

    pub fn emitter_mut(&mut self, emitter: EmitterId) -> Option<&mut Emitter> {
        self.emitters
            .get_mut(emitter)
            .and_then(Option::as_mut)
            .map(|entry| &mut entry.emitter)
    }

    /// Remove an emitter from its host.
    pub fn remove_emitter(&mut self, emitter: EmitterId) -> Result<Emitter, Error> {
        let entry = self
            .emitters
            .get_mut(emitter)
            .and_then(Option::take)
            .ok_or(Error::EmitterNotFound(emitter))?;
        if let Some(host) = self.hosts.get_mut(entry.host).and_then(Option::as_mut) {
            host.emitters.retain(|id| *id != emitter);
            self.placements[entry.host].audible = !host.emitters.is_empty();
        }
        Ok(entry.emitter)
    }

    // Speakers and listener

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn set_listener(&mut self, position: Vec3, rotation: Quat) {
        self.listener = Listener::new(position, rotation);
    }

    pub fn speakers(&self) -> &SpeakerPool {
        &self.speakers
    }

    pub fn speakers_mut(&mut self) -> &mut SpeakerPool {
        &mut self.speakers
    }

    /// Speaker index the given host is attached to.
    pub fn host_speaker(&self, host: HostId) -> Option<usize> {
        self.host(host).and(self.placements.get(host)?.speaker)
    }

    // Output

    /// Subscribe to grain emitted events. Replaces an earlier subscription. Without a
    /// subscriber, or once the returned receiver got dropped, no events are queued. Events
    /// which don't fit into the queue get dropped.
    pub fn events(&mut self) -> Receiver<GrainEmittedEvent> {
        self.distributor.subscribe()
    }

    /// Number of grain events dropped because the subscriber did not read them in time.
    pub fn dropped_events(&self) -> u64 {
        self.distributor.dropped_events()
    }

    pub fn statistics(&self) -> &GrainStatistics {
        &self.stats
    }

    /// Run a frame: update speakers, schedule and distribute grains.
    pub fn update(&mut self, delta_time: f32) {
        let delta_time = delta_time.max(0.0);
        let timing = self.clock.begin_frame(&self.config, delta_time);
        self.scene_time += delta_time;

        self.speakers.update(
            &mut self.placements,
            &self.listener,
            &self.config,
            delta_time,
        );

        for (emitter_id, entry) in self.emitters.iter_mut().enumerate() {
            let Some(entry) = entry else {
                continue;
            };
            let Some(host) = self.hosts.get(entry.host).and_then(Option::as_ref) else {
                continue;
            };
            if !self
                .listener
                .in_range(host.actor.position, self.config.listener_radius)
            {
                continue;
            }
            let linked = host
                .linked
                .and_then(|linked| self.hosts.get(linked))
                .and_then(Option::as_ref)
                .map(|linked| &linked.actor);
            let context = SchedulerContext {
                timing: &timing,
                modulation: ModulationContext {
                    primary: Some(&host.actor),
                    linked,
                    collision: host.actor.last_collision.as_ref(),
                    scene_time: self.scene_time,
                    delta_time,
                },
                clip: self.clips.get(entry.emitter.clip()).and_then(Option::as_ref),
                host: entry.host,
                emitter: emitter_id,
                speaker: self.placements.get(entry.host).and_then(|p| p.speaker),
            };
            let count = entry.emitter.schedule(
                &context,
                &mut self.rng,
                &mut self.buffers,
                &mut self.grains,
            );
            self.stats.record_scheduled(count);
        }

        let current_sample = self.clock.current_sample();
        self.distributor.distribute(
            &mut self.grains,
            &self.speakers,
            &timing,
            current_sample,
            &mut self.stats,
            &mut self.buffers,
        );
        self.stats.end_frame(delta_time);
        self.last_timing = Some(timing);

        // release speakers which got dropped by the audio thread
        self.collector.collect();
    }
}

// -------------------------------------------------------------------------------------------------
