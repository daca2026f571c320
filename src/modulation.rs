//! Modulation of emitter parameters by physical and scene inputs.
//!
//! A [`ModulationInput`] pulls a raw scalar from a [`ModulationSource`] (scene time, actor
//! kinematics, a pair of linked actors or the latest collision), normalizes and smooths it,
//! and shapes it with a [`LimiterMode`]. A [`ModulationComponent`] applies the shaped input
//! to the start and end values of one emitter parameter, resulting in a [`ParameterRange`]
//! which the grain scheduler samples for each grain.

use crate::actor::{Actor, Collision};

// -------------------------------------------------------------------------------------------------

mod component;
mod input;

pub use component::{ModulationComponent, ParameterRange};
pub use input::{
    process_value, smooth_value, ActorInput, CollisionInput, InputMode, LimiterMode,
    LinkedInput, ModulationInput, ModulationSource, SceneInput,
};

// -------------------------------------------------------------------------------------------------

/// Per frame inputs that modulation sources may read from.
///
/// Actor and collision references are only valid for the duration of a single frame update.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModulationContext<'a> {
    /// The actor the emitter's host is attached to.
    pub primary: Option<&'a Actor>,
    /// An optional second actor the host is linked with.
    pub linked: Option<&'a Actor>,
    /// The collision which triggered the current burst, or the primary actor's latest one.
    pub collision: Option<&'a Collision>,
    /// Seconds since the engine started.
    pub scene_time: f32,
    /// Duration of the last frame in seconds.
    pub delta_time: f32,
}
