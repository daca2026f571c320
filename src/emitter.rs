//! Grain emitters and their scheduling state.

use crate::{
    actor::{Actor, Collision},
    clip::ClipId,
    dsp::{DspChain, DspEffect},
    modulation::ModulationComponent,
    utils::time::SampleTime,
    window::{GrainWindow, WindowConfig},
    Error,
};

// -------------------------------------------------------------------------------------------------

mod parameters;
mod scheduler;

pub use parameters::{EmitterParameters, EvaluatedParameters};
pub use scheduler::SchedulerContext;

// -------------------------------------------------------------------------------------------------

/// Condition under which an emitter plays.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
)]
pub enum PlaybackCondition {
    /// Always plays. Volatile emitters trigger once when they get created.
    #[default]
    Constant,
    /// Plays while the actor touches another body.
    Contact,
    /// Plays while the actor does not touch another body.
    Airborne,
    /// Plays on each new collision event.
    OnCollision,
}

impl PlaybackCondition {
    /// Parse a condition from its name. Unknown names are configuration errors.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        name.parse::<Self>().map_err(|_| {
            Error::ParameterError(format!("Unknown playback condition: '{name}'"))
        })
    }

    /// Level of the condition for the given actor state. Conditions which depend on an
    /// actor never hold without one.
    pub fn is_met(&self, actor: Option<&Actor>) -> bool {
        match self {
            Self::Constant => true,
            Self::Contact => actor.is_some_and(|actor| actor.is_colliding),
            Self::Airborne => actor.is_some_and(|actor| !actor.is_colliding),
            Self::OnCollision => actor.is_some_and(|actor| actor.last_collision.is_some()),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Scheduling state of an emitter.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::VariantNames,
)]
pub enum EmitterState {
    /// Conditions are not met: no grains get scheduled.
    #[default]
    Idle,
    /// Conditions are met, but no grains were due in the last frame.
    Ready,
    /// Grains got scheduled in the last frame.
    Emitting,
}

// -------------------------------------------------------------------------------------------------

/// A running burst of a volatile emitter.
#[derive(Debug, Clone, PartialEq)]
pub struct Burst {
    /// Absolute start time of the burst, including the random jitter offset.
    pub start_sample: SampleTime,
    /// Total length of the burst.
    pub length_samples: SampleTime,
    /// Offset of the next grain relative to the burst's start.
    pub next_offset: SampleTime,
    /// The collision which triggered the burst, if any.
    pub collision: Option<Collision>,
    /// Number of grains emitted so far.
    pub grain_count: usize,
}

impl Burst {
    /// Normalized position of the next grain in the burst.
    pub fn progress(&self) -> f32 {
        if self.length_samples == 0 {
            1.0
        } else {
            (self.next_offset as f64 / self.length_samples as f64).min(1.0) as f32
        }
    }

    pub fn is_finished(&self) -> bool {
        self.next_offset >= self.length_samples
    }
}

// -------------------------------------------------------------------------------------------------

/// Emitter variants.
#[derive(Debug, Clone)]
pub enum EmitterKind {
    /// Emits grains continuously while its condition is met.
    Stable,
    /// Emits a single burst of grains of the given length when its condition triggers.
    Volatile {
        /// Burst length in milliseconds.
        length: ModulationComponent,
        burst: Option<Burst>,
    },
}

impl EmitterKind {
    pub const LENGTH_RANGE: (f32, f32) = (1.0, 10000.0);

    /// A volatile emitter kind with an unmodulated burst length.
    pub fn volatile(length_ms: f32) -> Self {
        Self::Volatile {
            length: ModulationComponent::new(
                length_ms.clamp(Self::LENGTH_RANGE.0, Self::LENGTH_RANGE.1),
                Self::LENGTH_RANGE.0,
                Self::LENGTH_RANGE.1,
            ),
            burst: None,
        }
    }

    pub fn is_volatile(&self) -> bool {
        matches!(self, Self::Volatile { .. })
    }
}

// -------------------------------------------------------------------------------------------------

/// A grain source bound to one clip, one DSP chain and a playback condition.
///
/// Emitters are owned by a host and get scheduled once per frame by the engine, see
/// [`Emitter::schedule`].
#[derive(Debug)]
pub struct Emitter {
    kind: EmitterKind,
    clip: ClipId,
    condition: PlaybackCondition,
    parameters: EmitterParameters,
    window: GrainWindow,
    dsp_chain: DspChain,
    state: EmitterState,
    condition_was_met: bool,
    last_collision_id: Option<u64>,
    next_grain_sample: Option<SampleTime>,
    clip_error_logged: bool,
}

impl Emitter {
    pub fn new(
        kind: EmitterKind,
        clip: ClipId,
        condition: PlaybackCondition,
        parameters: EmitterParameters,
    ) -> Self {
        Self {
            kind,
            clip,
            condition,
            parameters,
            window: GrainWindow::default(),
            dsp_chain: DspChain::new(),
            state: EmitterState::Idle,
            condition_was_met: false,
            last_collision_id: None,
            next_grain_sample: None,
            clip_error_logged: false,
        }
    }

    /// A stable emitter with the given parameters.
    pub fn stable(
        clip: ClipId,
        condition: PlaybackCondition,
        parameters: EmitterParameters,
    ) -> Self {
        Self::new(EmitterKind::Stable, clip, condition, parameters)
    }

    /// A volatile emitter with the given burst length and parameters.
    pub fn volatile(
        clip: ClipId,
        condition: PlaybackCondition,
        parameters: EmitterParameters,
        length_ms: f32,
    ) -> Self {
        Self::new(EmitterKind::volatile(length_ms), clip, condition, parameters)
    }

    pub fn with_window(mut self, config: WindowConfig) -> Self {
        self.window.set_config(config);
        self
    }

    pub fn with_effect(mut self, effect: impl DspEffect) -> Result<Self, Error> {
        self.dsp_chain.add_effect(effect)?;
        Ok(self)
    }

    /// Validate the emitter's configuration.
    pub fn validate(&self) -> Result<(), Error> {
        self.parameters.validate()?;
        self.window.config().validate()?;
        if let EmitterKind::Volatile { length, .. } = &self.kind {
            length
                .validate()
                .map_err(|err| Error::ParameterError(format!("Length: {err}")))?;
        }
        Ok(())
    }

    pub fn kind(&self) -> &EmitterKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut EmitterKind {
        &mut self.kind
    }

    pub fn clip(&self) -> ClipId {
        self.clip
    }

    pub fn set_clip(&mut self, clip: ClipId) {
        self.clip = clip;
        self.clip_error_logged = false;
    }

    pub fn condition(&self) -> PlaybackCondition {
        self.condition
    }

    pub fn set_condition(&mut self, condition: PlaybackCondition) {
        self.condition = condition;
    }

    pub fn parameters(&self) -> &EmitterParameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut EmitterParameters {
        &mut self.parameters
    }

    pub fn window(&self) -> &GrainWindow {
        &self.window
    }

    pub fn set_window(&mut self, config: WindowConfig) {
        self.window.set_config(config);
    }

    pub fn dsp_chain(&self) -> &DspChain {
        &self.dsp_chain
    }

    pub fn dsp_chain_mut(&mut self) -> &mut DspChain {
        &mut self.dsp_chain
    }

    /// Current scheduling state.
    pub fn state(&self) -> EmitterState {
        self.state
    }

    /// The running burst of a volatile emitter.
    pub fn burst(&self) -> Option<&Burst> {
        match &self.kind {
            EmitterKind::Stable => None,
            EmitterKind::Volatile { burst, .. } => burst.as_ref(),
        }
    }

    /// Update the condition's state for this frame and return its level and whether it
    /// just got triggered (rising edge, or a new collision event).
    fn update_condition(&mut self, actor: Option<&Actor>) -> (bool, bool) {
        match self.condition {
            PlaybackCondition::OnCollision => {
                let collision_id = actor
                    .and_then(|actor| actor.last_collision)
                    .map(|collision| collision.id);
                let triggered = collision_id.is_some() && collision_id != self.last_collision_id;
                if collision_id.is_some() {
                    self.last_collision_id = collision_id;
                }
                (triggered, triggered)
            }
            condition => {
                let met = condition.is_met(actor);
                let triggered = met && !self.condition_was_met;
                self.condition_was_met = met;
                (met, triggered)
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[test]
    fn playback_conditions() {
        assert_eq!(
            PlaybackCondition::from_name("OnCollision").ok(),
            Some(PlaybackCondition::OnCollision)
        );
        assert!(matches!(
            PlaybackCondition::from_name("Sometimes"),
            Err(Error::ParameterError(_))
        ));

        let mut actor = Actor::default();
        assert!(PlaybackCondition::Constant.is_met(None));
        assert!(!PlaybackCondition::Contact.is_met(None));
        assert!(PlaybackCondition::Airborne.is_met(Some(&actor)));
        actor.is_colliding = true;
        assert!(PlaybackCondition::Contact.is_met(Some(&actor)));
        assert!(!PlaybackCondition::Airborne.is_met(Some(&actor)));
    }

    #[test]
    fn condition_edges() {
        let mut emitter = Emitter::volatile(
            0,
            PlaybackCondition::Contact,
            EmitterParameters::default(),
            200.0,
        );
        let mut actor = Actor::default();
        assert_eq!(emitter.update_condition(Some(&actor)), (false, false));
        actor.is_colliding = true;
        assert_eq!(emitter.update_condition(Some(&actor)), (true, true));
        assert_eq!(emitter.update_condition(Some(&actor)), (true, false));

        let mut emitter = Emitter::volatile(
            0,
            PlaybackCondition::OnCollision,
            EmitterParameters::default(),
            200.0,
        );
        actor.last_collision = Some(Collision::new(1, Vec3::X, Vec3::Y));
        assert_eq!(emitter.update_condition(Some(&actor)), (true, true));
        assert_eq!(emitter.update_condition(Some(&actor)), (false, false));
        actor.last_collision = Some(Collision::new(2, Vec3::X, Vec3::Y));
        assert_eq!(emitter.update_condition(Some(&actor)), (true, true));
    }

    #[test]
    fn emitter_validation() -> Result<(), Error> {
        let emitter = Emitter::volatile(
            0,
            PlaybackCondition::Constant,
            EmitterParameters::default(),
            200.0,
        )
        .with_window(WindowConfig::default().with_fades(0.1, 0.1))
        .with_effect(crate::dsp::FilterEffect::default())?;
        assert!(emitter.validate().is_ok());
        assert!(emitter.kind().is_volatile());
        assert_eq!(emitter.dsp_chain().len(), 1);

        let emitter = Emitter::stable(0, PlaybackCondition::Constant, EmitterParameters::default())
            .with_window(WindowConfig::default().with_fades(2.0, 0.0));
        assert!(emitter.validate().is_err());
        Ok(())
    }
}
