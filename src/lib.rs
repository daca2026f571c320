#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod actor;
mod clip;
mod clock;
mod config;
mod distribution;
mod emitter;
mod engine;
mod error;
mod grain;
mod mixer;
mod speaker;
mod stats;
mod window;

// public, flat re-exports
pub use error::Error;

pub use actor::{Actor, Collision};
pub use clip::{AudioClip, ClipId};
pub use clock::{AudioClock, FrameTiming};
pub use config::EngineConfig;
pub use distribution::{check_grain, GrainDistributor};
pub use emitter::{
    Burst, Emitter, EmitterKind, EmitterParameters, EmitterState, EvaluatedParameters,
    PlaybackCondition, SchedulerContext,
};
pub use engine::{Engine, Host};
pub use grain::{
    EmitterId, GrainBufferPool, GrainDescriptor, GrainEmittedEvent, GrainRecord, HostId,
};
pub use mixer::{MixerMessage, SpeakerMixer};
pub use speaker::{
    GrainSlot, HostPlacement, Listener, Speaker, SpeakerOutput, SpeakerPool, SpeakerState,
};
pub use stats::{DiscardReason, FrameStatistics, GrainStatistics};
pub use window::{GrainWindow, WindowConfig, WindowFunction};

#[cfg(feature = "cpal-output")]
pub use output::{AudioHostId, DefaultOutputDevice};
#[cfg(any(feature = "cpal-output", feature = "wav-output"))]
pub use output::OutputDevice;

// public mods
pub mod dsp;
pub mod modulation;
#[cfg(any(feature = "cpal-output", feature = "wav-output"))]
pub mod output;
pub mod utils;

pub use glam;
