//! Virtual speakers which play back grains for nearby hosts.

use basedrop::Shared;
use glam::{Quat, Vec3};

use crate::{grain::HostId, utils::time::SampleTime};

// -------------------------------------------------------------------------------------------------

mod pool;
mod slot;

pub use pool::{HostPlacement, SpeakerPool};
pub use slot::{GrainSlot, SpeakerOutput};

// -------------------------------------------------------------------------------------------------

/// Life cycle state of a [`Speaker`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::VariantNames,
)]
pub enum SpeakerState {
    /// Unused and not mixed by the audio thread.
    #[default]
    Pooled,
    /// Has hosts attached and follows them.
    Active,
    /// Lost all its hosts: plays out its grains and gets returned to the pool afterwards,
    /// unless a new host attaches in the meantime.
    Lingering,
}

// -------------------------------------------------------------------------------------------------

/// The listener position and orientation, used to spatialize speakers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Listener {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// True when the given position is within the given radius around the listener.
    pub fn in_range(&self, position: Vec3, radius: f32) -> bool {
        self.position.distance_squared(position) <= radius * radius
    }

    /// Gain and panning of a sound source at the given position: a linear distance
    /// attenuation within the given radius and the source's horizontal direction in the
    /// listener's local space.
    pub fn spatialize(&self, position: Vec3, radius: f32) -> (f32, f32) {
        let local = self.rotation.inverse() * (position - self.position);
        let distance = local.length();
        let gain = if radius > 0.0 {
            (1.0 - distance / radius).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let pan = if distance > 1.0e-3 {
            (local.x / distance).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        (gain, pan)
    }
}

// -------------------------------------------------------------------------------------------------

/// Main thread side of a virtual speaker.
pub struct Speaker {
    index: usize,
    state: SpeakerState,
    position: Vec3,
    hosts: Vec<HostId>,
    linger_remaining_ms: f32,
    output: Shared<SpeakerOutput>,
}

impl Speaker {
    pub(crate) fn new(index: usize, output: Shared<SpeakerOutput>) -> Self {
        Self {
            index,
            state: SpeakerState::Pooled,
            position: Vec3::ZERO,
            hosts: Vec::new(),
            linger_remaining_ms: 0.0,
            output,
        }
    }

    /// Index of the speaker in the speaker pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> SpeakerState {
        self.state
    }

    /// True when the speaker is in use and gets mixed by the audio thread.
    pub fn is_active(&self) -> bool {
        matches!(self.state, SpeakerState::Active | SpeakerState::Lingering)
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Hosts which are attached to the speaker.
    pub fn hosts(&self) -> &[HostId] {
        &self.hosts
    }

    /// The speaker's audio thread side.
    pub fn output(&self) -> &Shared<SpeakerOutput> {
        &self.output
    }

    /// Ratio of playing grain slots (0.0 - 1.0).
    pub fn load(&self) -> f32 {
        self.output.load()
    }

    /// Number of grains the speaker currently plays.
    pub fn playing_count(&self) -> usize {
        self.output.playing_count()
    }

    /// Hand a grain over to the audio thread. Returns false when all slots are playing.
    pub fn publish(&self, samples: &[f32], dsp_start: SampleTime) -> bool {
        self.output.publish(samples, dsp_start)
    }

    fn attach(&mut self, host: HostId) {
        if !self.hosts.contains(&host) {
            self.hosts.push(host);
        }
        self.state = SpeakerState::Active;
    }

    fn detach(&mut self, host: HostId) {
        self.hosts.retain(|h| *h != host);
    }
}

impl std::fmt::Debug for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Speaker")
            .field("index", &self.index)
            .field("state", &self.state)
            .field("position", &self.position)
            .field("hosts", &self.hosts)
            .field("output", &*self.output)
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------
