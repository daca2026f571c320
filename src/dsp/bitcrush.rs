use crate::{
    dsp::{DspEffect, DspParameters, DspType},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Sample and hold effect: stretches the grain by holding each input sample for `crush_ratio`
/// output samples. Ratios below 2 only slightly smear the signal, higher ratios decimate and
/// slow down the grain.
#[derive(Debug, Clone)]
pub struct BitcrushEffect {
    /// Number of output samples each input sample gets held for (>= 1.0).
    pub crush_ratio: f32,
    /// Dry/wet mix (0.0 - 1.0).
    pub mix: f32,
}

impl BitcrushEffect {
    pub const EFFECT_NAME: &str = "Bitcrush";

    const RATIO: usize = 0;

    pub fn new(crush_ratio: f32) -> Self {
        Self {
            crush_ratio,
            mix: 1.0,
        }
    }

    pub fn with_mix(mut self, mix: f32) -> Self {
        self.mix = mix;
        self
    }

    /// Apply the effect in place.
    pub fn process(params: &DspParameters, samples: &mut [f32]) {
        let ratio = params.params[Self::RATIO].max(1.0);
        let mix = params.mix;
        // hold sources are at or before the processed index, so walk backwards to read
        // unprocessed input only
        for index in (0..samples.len()).rev() {
            let held = samples[(index as f32 / ratio) as usize];
            let dry = samples[index];
            samples[index] = dry + (held - dry) * mix;
        }
    }
}

impl Default for BitcrushEffect {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl DspEffect for BitcrushEffect {
    fn name(&self) -> &'static str {
        Self::EFFECT_NAME
    }

    fn validate(&self) -> Result<(), Error> {
        if !(self.crush_ratio >= 1.0 && self.crush_ratio.is_finite()) {
            return Err(Error::ParameterError(format!(
                "Invalid crush ratio: must be >= 1, but is {}",
                self.crush_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.mix) {
            return Err(Error::ParameterError(
                "Bitcrush mix must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }

    fn dsp_parameters(&self, sample_rate: u32) -> DspParameters {
        DspParameters::new(DspType::Bitcrush, sample_rate)
            .with_mix(self.mix)
            .with_param(Self::RATIO, self.crush_ratio)
    }
}

// -------------------------------------------------------------------------------------------------
