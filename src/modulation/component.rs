use rand::Rng;

use crate::{
    modulation::{process_value, ModulationContext, ModulationInput},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Evaluated, modulated start and end values of a single emitter parameter for one frame.
///
/// The scheduler picks a value along the start → end arc for each grain via
/// [`ParameterRange::value_at`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRange {
    pub start: f32,
    pub end: f32,
    pub min: f32,
    pub max: f32,
    pub noise: f32,
}

impl ParameterRange {
    /// A range which always evaluates to the given value.
    pub fn constant(value: f32) -> Self {
        Self {
            start: value,
            end: value,
            min: value,
            max: value,
            noise: 0.0,
        }
    }

    /// Value at the given arc position (0.0 = start, 1.0 = end) with random noise applied,
    /// clamped to the parameter's min/max range.
    pub fn value_at<R: Rng>(&self, position: f32, rng: &mut R) -> f32 {
        let position = position.clamp(0.0, 1.0);
        let mut value = self.start + (self.end - self.start) * position;
        if self.noise > 0.0 {
            let deviation = rng.random::<f32>() * 2.0 - 1.0;
            value += deviation * self.noise * (self.max - self.min) * 0.5;
        }
        value.clamp(self.min.min(self.max), self.max.max(self.min))
    }
}

// -------------------------------------------------------------------------------------------------

/// Modulation state of one emitter parameter.
///
/// Start and end values are set in the parameter's unit (e.g. milliseconds for a grain
/// duration). When an input is present, both get normalized into the parameter's min/max
/// range, used as offsets for the modulation and mapped back afterwards.
#[derive(Debug, Clone)]
pub struct ModulationComponent {
    pub start: f32,
    pub end: f32,
    pub min: f32,
    pub max: f32,
    /// Random deviation relative to the min/max range (0.0 .. 1.0).
    pub noise: f32,
    /// Exponent applied to the modulation input before scaling it by its amount.
    pub exponent: f32,
    /// When set, the start value is never modulated.
    pub fixed_start: bool,
    /// When set, the end value is never modulated.
    pub fixed_end: bool,
    pub input: Option<ModulationInput>,
    latest: Option<ParameterRange>,
}

impl ModulationComponent {
    /// A parameter with the given default value and value range and no modulation.
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        Self {
            start: value,
            end: value,
            min,
            max,
            noise: 0.0,
            exponent: 1.0,
            fixed_start: false,
            fixed_end: false,
            input: None,
            latest: None,
        }
    }

    pub fn with_end(mut self, end: f32) -> Self {
        self.end = end;
        self
    }

    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_exponent(mut self, exponent: f32) -> Self {
        self.exponent = exponent;
        self
    }

    pub fn with_fixed(mut self, fixed_start: bool, fixed_end: bool) -> Self {
        self.fixed_start = fixed_start;
        self.fixed_end = fixed_end;
        self
    }

    pub fn with_input(mut self, input: ModulationInput) -> Self {
        self.input = Some(input);
        self
    }

    /// Validate all parameters.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.min <= self.max) {
            return Err(Error::ParameterError(format!(
                "Invalid parameter range: min {} > max {}",
                self.min, self.max
            )));
        }
        if !(self.min..=self.max).contains(&self.start)
            || !(self.min..=self.max).contains(&self.end)
        {
            return Err(Error::ParameterError(format!(
                "Parameter start/end values must be within {}..={}",
                self.min, self.max
            )));
        }
        if !(0.0..=1.0).contains(&self.noise) {
            return Err(Error::ParameterError(
                "Parameter noise must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(self.exponent > 0.0 && self.exponent.is_finite()) {
            return Err(Error::ParameterError(
                "Modulation exponent must be > 0".to_string(),
            ));
        }
        if let Some(input) = &self.input {
            input.validate()?;
        }
        Ok(())
    }

    /// The range evaluated by the last call to [`Self::update`], or the unmodulated range.
    pub fn latest(&self) -> ParameterRange {
        self.latest.unwrap_or_else(|| self.unmodulated())
    }

    /// Reset input smoothing state and the latest evaluated range.
    pub fn reset(&mut self) {
        if let Some(input) = &mut self.input {
            input.reset();
        }
        self.latest = None;
    }

    /// Pull the input for this frame and evaluate the modulated start and end values.
    pub fn update(&mut self, context: &ModulationContext) -> ParameterRange {
        let mut range = self.unmodulated();
        if let Some(input) = &mut self.input {
            if let Some(value) = input.update(context) {
                let (amount, limiter) = (input.amount, input.limiter);
                let modulate = |offset: f32| {
                    self.denormalize(process_value(
                        value,
                        self.normalize(offset),
                        self.exponent,
                        amount,
                        limiter,
                    ))
                };
                if !self.fixed_start {
                    range.start = modulate(self.start);
                }
                if !self.fixed_end {
                    range.end = modulate(self.end);
                }
            }
        }
        self.latest = Some(range);
        range
    }

    fn unmodulated(&self) -> ParameterRange {
        ParameterRange {
            start: self.start,
            end: self.end,
            min: self.min,
            max: self.max,
            noise: self.noise,
        }
    }

    fn normalize(&self, value: f32) -> f32 {
        let range = self.max - self.min;
        if range <= f32::EPSILON {
            0.0
        } else {
            ((value - self.min) / range).clamp(0.0, 1.0)
        }
    }

    fn denormalize(&self, value: f32) -> f32 {
        self.min + value * (self.max - self.min)
    }
}

// -------------------------------------------------------------------------------------------------
