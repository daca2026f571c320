use crate::{modulation::ModulationContext, Error};

// -------------------------------------------------------------------------------------------------

/// Inputs which are not bound to any actor.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::Display, strum::VariantNames,
)]
pub enum SceneInput {
    /// Seconds since the engine started.
    Time,
    /// A constant 1.0. Useful to drive a parameter by the limiter's offset and amount only.
    One,
}

/// Inputs read from the emitter host's primary actor.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::Display, strum::VariantNames,
)]
pub enum ActorInput {
    Speed,
    AngularSpeed,
    Height,
    Scale,
    Mass,
    /// 1.0 while the actor is colliding, else 0.0.
    Contact,
}

/// Inputs read from a pair of linked actors.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::Display, strum::VariantNames,
)]
pub enum LinkedInput {
    Distance,
    RelativeSpeed,
    ApproachSpeed,
}

/// Inputs read from a collision event.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::Display, strum::VariantNames,
)]
pub enum CollisionInput {
    Impulse,
    RelativeSpeed,
}

// -------------------------------------------------------------------------------------------------

/// Source group and value a [`ModulationInput`] reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModulationSource {
    Scene(SceneInput),
    Actor(ActorInput),
    Linked(LinkedInput),
    Collision(CollisionInput),
}

impl ModulationSource {
    /// Pull the raw, unnormalized value from the given context.
    ///
    /// Returns `None` when the actor or collision the source depends on is not present.
    pub fn raw_value(&self, context: &ModulationContext) -> Option<f32> {
        match self {
            Self::Scene(input) => Some(match input {
                SceneInput::Time => context.scene_time,
                SceneInput::One => 1.0,
            }),
            Self::Actor(input) => {
                let actor = context.primary?;
                Some(match input {
                    ActorInput::Speed => actor.speed(),
                    ActorInput::AngularSpeed => actor.angular_speed(),
                    ActorInput::Height => actor.position.y,
                    ActorInput::Scale => actor.uniform_scale(),
                    ActorInput::Mass => actor.mass,
                    ActorInput::Contact => {
                        if actor.is_colliding {
                            1.0
                        } else {
                            0.0
                        }
                    }
                })
            }
            Self::Linked(input) => {
                let (primary, linked) = (context.primary?, context.linked?);
                Some(match input {
                    LinkedInput::Distance => primary.distance_to(linked),
                    LinkedInput::RelativeSpeed => (primary.velocity - linked.velocity).length(),
                    LinkedInput::ApproachSpeed => primary.approach_speed(linked),
                })
            }
            Self::Collision(input) => {
                let collision = context.collision?;
                Some(match input {
                    CollisionInput::Impulse => collision.impulse.length(),
                    CollisionInput::RelativeSpeed => collision.relative_velocity.length(),
                })
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// How a newly normalized input value is combined with the previous one.
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
pub enum InputMode {
    /// The new value replaces the previous one.
    #[default]
    Replace,
    /// The new value gets added to the previous, not yet smoothed value.
    Accumulate,
}

/// How the shaped input value is kept within the [0, 1] range.
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
pub enum LimiterMode {
    /// Clamp to [0, 1].
    #[default]
    Clip,
    /// Wrap around with modulo 1.
    Repeat,
    /// Fold back and forth between 0 and 1.
    PingPong,
}

// -------------------------------------------------------------------------------------------------

/// Smoothing factors at or below this value disable smoothing.
const SMOOTHING_EPSILON: f32 = 0.001;

/// Frame rate dependent single-pole low-pass: approaches `target` from `current` at a rate
/// of `(1 - smoothing) * 10 * delta_time`.
pub fn smooth_value(current: f32, target: f32, smoothing: f32, delta_time: f32) -> f32 {
    if smoothing <= SMOOTHING_EPSILON {
        return target;
    }
    let rate = ((1.0 - smoothing.min(1.0)) * 10.0 * delta_time).clamp(0.0, 1.0);
    current + (target - current) * rate
}

/// Shape a smoothed, normalized input value with the given exponent and amount around
/// `offset` and limit the result to [0, 1] with the given limiter mode.
pub fn process_value(
    value: f32,
    offset: f32,
    exponent: f32,
    amount: f32,
    limiter: LimiterMode,
) -> f32 {
    let offset = offset.clamp(0.0, 1.0);
    if amount == 0.0 {
        return offset;
    }
    let shaped = value.abs().powf(exponent).copysign(value);
    let modulated = offset + shaped * amount;
    if !modulated.is_finite() {
        return offset;
    }
    match limiter {
        LimiterMode::Clip => modulated.clamp(0.0, 1.0),
        LimiterMode::Repeat => modulated.rem_euclid(1.0).clamp(0.0, 1.0),
        LimiterMode::PingPong => {
            let folded = modulated.abs().rem_euclid(2.0);
            if folded > 1.0 {
                2.0 - folded
            } else {
                folded
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Reads, normalizes and smooths a raw input value from a [`ModulationSource`].
#[derive(Debug, Clone)]
pub struct ModulationInput {
    /// Where to read the raw value from.
    pub source: ModulationSource,
    /// Raw value range which gets mapped to [0, 1].
    pub input_min: f32,
    pub input_max: f32,
    /// Scales the normalized value.
    pub adjust: f32,
    /// Replace or accumulate normalized values.
    pub mode: InputMode,
    /// Smoothing factor (0.0 = off .. 1.0 = frozen).
    pub smoothing: f32,
    /// Limiter applied after shaping.
    pub limiter: LimiterMode,
    /// Modulation depth and direction (-1.0 .. 1.0).
    pub amount: f32,
    pre_smoothed: f32,
    smoothed: f32,
}

impl ModulationInput {
    pub fn new(source: ModulationSource) -> Self {
        Self {
            source,
            input_min: 0.0,
            input_max: 1.0,
            adjust: 1.0,
            mode: InputMode::Replace,
            smoothing: 0.0,
            limiter: LimiterMode::Clip,
            amount: 1.0,
            pre_smoothed: 0.0,
            smoothed: 0.0,
        }
    }

    pub fn with_range(mut self, input_min: f32, input_max: f32) -> Self {
        self.input_min = input_min;
        self.input_max = input_max;
        self
    }

    pub fn with_adjust(mut self, adjust: f32) -> Self {
        self.adjust = adjust;
        self
    }

    pub fn with_mode(mut self, mode: InputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn with_limiter(mut self, limiter: LimiterMode) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_amount(mut self, amount: f32) -> Self {
        self.amount = amount;
        self
    }

    /// Validate all parameters.
    pub fn validate(&self) -> Result<(), Error> {
        if !(-1.0..=1.0).contains(&self.amount) {
            return Err(Error::ParameterError(
                "Modulation amount must be between -1.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(Error::ParameterError(
                "Modulation smoothing must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !self.input_min.is_finite() || !self.input_max.is_finite() {
            return Err(Error::ParameterError(
                "Modulation input range must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// The latest smoothed, normalized input value.
    pub fn value(&self) -> f32 {
        self.smoothed
    }

    /// Reset accumulated and smoothed state.
    pub fn reset(&mut self) {
        self.pre_smoothed = 0.0;
        self.smoothed = 0.0;
    }

    /// Map a raw value from the input range to [0, 1] and apply the adjust factor.
    pub fn normalize(&self, raw: f32) -> f32 {
        let range = self.input_max - self.input_min;
        if range.abs() <= f32::EPSILON {
            return 0.0;
        }
        ((raw - self.input_min) / range).clamp(0.0, 1.0) * self.adjust
    }

    /// Pull a new value from the source, normalize and smooth it.
    ///
    /// Returns `None` without touching the source when the amount is zero or when the actor
    /// or collision the source depends on is missing.
    pub fn update(&mut self, context: &ModulationContext) -> Option<f32> {
        if self.amount == 0.0 {
            return None;
        }
        let raw = self.source.raw_value(context)?;
        let normalized = self.normalize(raw);
        self.pre_smoothed = match self.mode {
            InputMode::Replace => normalized,
            InputMode::Accumulate => self.pre_smoothed + normalized,
        };
        self.smoothed = smooth_value(
            self.smoothed,
            self.pre_smoothed,
            self.smoothing,
            context.delta_time,
        );
        Some(self.smoothed)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::actor::Actor;

    #[test]
    fn process_value_stays_in_range() {
        let limiters = [LimiterMode::Clip, LimiterMode::Repeat, LimiterMode::PingPong];
        let amounts = [-1.0, -0.75, -0.5, -0.1, 0.0, 0.1, 0.33, 0.5, 1.0];
        let exponents = [0.25, 1.0, 2.0, 4.0];
        for limiter in limiters {
            for amount in amounts {
                for exponent in exponents {
                    for offset_step in 0..=10 {
                        let offset = offset_step as f32 / 10.0;
                        for value_step in 0..=40 {
                            // include accumulated values above 1
                            let value = value_step as f32 / 10.0;
                            let result = process_value(value, offset, exponent, amount, limiter);
                            assert!(
                                (0.0..=1.0).contains(&result),
                                "{limiter} value={value} offset={offset} amount={amount} \
                                 -> {result}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn process_value_limiters() {
        // clip
        assert_eq!(process_value(1.0, 0.5, 1.0, 1.0, LimiterMode::Clip), 1.0);
        assert_eq!(process_value(0.25, 0.5, 1.0, 1.0, LimiterMode::Clip), 0.75);
        assert_eq!(process_value(0.25, 0.5, 1.0, -1.0, LimiterMode::Clip), 0.25);
        assert_eq!(process_value(0.5, 0.0, 2.0, 1.0, LimiterMode::Clip), 0.25);
        // repeat
        assert!((process_value(0.75, 0.5, 1.0, 1.0, LimiterMode::Repeat) - 0.25).abs() < 1e-6);
        assert!((process_value(0.75, 0.5, 1.0, -1.0, LimiterMode::Repeat) - 0.75).abs() < 1e-6);
        // ping pong
        assert!((process_value(0.75, 0.5, 1.0, 1.0, LimiterMode::PingPong) - 0.75).abs() < 1e-6);
        assert!((process_value(1.0, 0.5, 1.0, 1.0, LimiterMode::PingPong) - 0.5).abs() < 1e-6);
        assert!((process_value(0.75, 0.5, 1.0, -1.0, LimiterMode::PingPong) - 0.25).abs() < 1e-6);
        // zero amount passes the offset
        assert_eq!(process_value(0.9, 0.3, 1.0, 0.0, LimiterMode::Repeat), 0.3);
    }

    #[test]
    fn smoothing_depends_on_delta_time() {
        for delta_time in [1.0 / 120.0, 1.0 / 60.0, 1.0 / 30.0, 0.2] {
            // no smoothing: target is returned immediately
            assert_eq!(smooth_value(0.0, 1.0, 0.0, delta_time), 1.0);
            // approaches the target with the expected rate
            let smoothing = 0.5;
            let expected_rate = ((1.0 - smoothing) * 10.0 * delta_time).min(1.0);
            let next = smooth_value(0.0, 1.0, smoothing, delta_time);
            assert!((next - expected_rate).abs() < 1e-6, "dt={delta_time}");
            // and never overshoots
            assert!(next <= 1.0);
        }
        // fully smoothed values are frozen
        assert_eq!(smooth_value(0.25, 1.0, 1.0, 1.0 / 60.0), 0.25);
    }

    #[test]
    fn normalize_and_accumulate() {
        let actor = Actor {
            velocity: Vec3::new(5.0, 0.0, 0.0),
            ..Actor::default()
        };
        let context = ModulationContext {
            primary: Some(&actor),
            delta_time: 1.0 / 60.0,
            ..ModulationContext::default()
        };
        let mut input = ModulationInput::new(ModulationSource::Actor(ActorInput::Speed))
            .with_range(0.0, 10.0)
            .with_mode(InputMode::Accumulate);
        assert_eq!(input.update(&context), Some(0.5));
        assert_eq!(input.update(&context), Some(1.0));

        let mut input = ModulationInput::new(ModulationSource::Actor(ActorInput::Speed))
            .with_range(0.0, 10.0)
            .with_adjust(0.5);
        assert_eq!(input.update(&context), Some(0.25));
        assert_eq!(input.update(&context), Some(0.25));

        // degenerated ranges don't divide by zero
        let input = ModulationInput::new(ModulationSource::Scene(SceneInput::One))
            .with_range(1.0, 1.0);
        assert_eq!(input.normalize(1.0), 0.0);
    }

    #[test]
    fn missing_sources_are_skipped() {
        let context = ModulationContext::default();
        let mut input = ModulationInput::new(ModulationSource::Linked(LinkedInput::Distance));
        assert_eq!(input.update(&context), None);
        let mut input =
            ModulationInput::new(ModulationSource::Collision(CollisionInput::Impulse));
        assert_eq!(input.update(&context), None);

        let actor = Actor::default();
        let context = ModulationContext {
            primary: Some(&actor),
            ..ModulationContext::default()
        };
        let mut input =
            ModulationInput::new(ModulationSource::Actor(ActorInput::Mass)).with_amount(0.0);
        assert_eq!(input.update(&context), None);
    }
}
