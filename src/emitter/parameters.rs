use crate::{
    modulation::{ModulationComponent, ModulationContext, ParameterRange},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Modulated parameters shared by all emitter kinds.
#[derive(Debug, Clone)]
pub struct EmitterParameters {
    /// Grain volume as linear gain (0.0 - 2.0).
    pub volume: ModulationComponent,
    /// Normalized grain start position in the clip (0.0 - 1.0).
    pub playhead: ModulationComponent,
    /// Grain duration in milliseconds (1.0 - 2000.0).
    pub duration: ModulationComponent,
    /// Grains per second (0.1 - 500.0).
    pub density: ModulationComponent,
    /// Grain transposition in semitones (-48.0 - 48.0).
    pub transpose: ModulationComponent,
}

impl EmitterParameters {
    pub const VOLUME_RANGE: (f32, f32) = (0.0, 2.0);
    pub const PLAYHEAD_RANGE: (f32, f32) = (0.0, 1.0);
    pub const DURATION_RANGE: (f32, f32) = (1.0, 2000.0);
    pub const DENSITY_RANGE: (f32, f32) = (0.1, 500.0);
    pub const TRANSPOSE_RANGE: (f32, f32) = (-48.0, 48.0);

    /// Create unmodulated parameters with the given default values.
    pub fn new(volume: f32, playhead: f32, duration_ms: f32, density: f32, transpose: f32) -> Self {
        let component = |value: f32, range: (f32, f32)| {
            ModulationComponent::new(value.clamp(range.0, range.1), range.0, range.1)
        };
        Self {
            volume: component(volume, Self::VOLUME_RANGE),
            playhead: component(playhead, Self::PLAYHEAD_RANGE),
            duration: component(duration_ms, Self::DURATION_RANGE),
            density: component(density, Self::DENSITY_RANGE),
            transpose: component(transpose, Self::TRANSPOSE_RANGE),
        }
    }

    /// Validate all parameters.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, component, range) in [
            ("Volume", &self.volume, Self::VOLUME_RANGE),
            ("Playhead", &self.playhead, Self::PLAYHEAD_RANGE),
            ("Duration", &self.duration, Self::DURATION_RANGE),
            ("Density", &self.density, Self::DENSITY_RANGE),
            ("Transpose", &self.transpose, Self::TRANSPOSE_RANGE),
        ] {
            if component.min < range.0 || component.max > range.1 {
                return Err(Error::ParameterError(format!(
                    "{name} range must be within {}..={}",
                    range.0, range.1
                )));
            }
            component
                .validate()
                .map_err(|err| Error::ParameterError(format!("{name}: {err}")))?;
        }
        Ok(())
    }

    /// Evaluate all parameter modulations for the current frame.
    pub fn update(&mut self, context: &ModulationContext) -> EvaluatedParameters {
        EvaluatedParameters {
            volume: self.volume.update(context),
            playhead: self.playhead.update(context),
            duration: self.duration.update(context),
            density: self.density.update(context),
            transpose: self.transpose.update(context),
        }
    }

    /// Reset modulation smoothing states.
    pub fn reset(&mut self) {
        self.volume.reset();
        self.playhead.reset();
        self.duration.reset();
        self.density.reset();
        self.transpose.reset();
    }
}

impl Default for EmitterParameters {
    fn default() -> Self {
        Self::new(1.0, 0.0, 100.0, 10.0, 0.0)
    }
}

// -------------------------------------------------------------------------------------------------

/// Parameter ranges of an emitter for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluatedParameters {
    pub volume: ParameterRange,
    pub playhead: ParameterRange,
    pub duration: ParameterRange,
    pub density: ParameterRange,
    pub transpose: ParameterRange,
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters() {
        let mut parameters = EmitterParameters::default();
        assert!(parameters.validate().is_ok());
        let evaluated = parameters.update(&ModulationContext::default());
        assert_eq!(evaluated.volume.start, 1.0);
        assert_eq!(evaluated.duration.start, 100.0);
        assert_eq!(evaluated.density.start, 10.0);
    }

    #[test]
    fn out_of_range_parameters() {
        // default values get clamped
        let parameters = EmitterParameters::new(5.0, 2.0, 0.0, 0.0, 100.0);
        assert!(parameters.validate().is_ok());
        assert_eq!(parameters.volume.start, 2.0);

        let mut parameters = EmitterParameters::default();
        parameters.density.min = 0.0;
        assert!(parameters.validate().is_err());
    }
}
