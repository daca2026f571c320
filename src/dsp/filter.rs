use crate::{
    dsp::{mode_index, DspEffect, DspParameters, DspState, DspType},
    utils::{
        dsp::filters::biquad::{BiquadFilter, BiquadFilterCoefficients, BiquadFilterType},
        hz_to_mel, mel_to_hz,
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Biquad filter effect with low-pass, high-pass, band-pass, peak/notch and all-pass types.
///
/// The cutoff is authored in mel, so linear modulations of it feel musically even.
#[derive(Debug, Clone)]
pub struct FilterEffect {
    pub filter_type: BiquadFilterType,
    /// Cutoff frequency in mel.
    pub cutoff_mel: f32,
    /// Resonance (> 0.0).
    pub q: f32,
    /// Gain in dB, only used by the peak/notch type.
    pub gain: f32,
    /// Dry/wet mix (0.0 - 1.0).
    pub mix: f32,
}

impl FilterEffect {
    pub const EFFECT_NAME: &str = "Filter";

    const TYPE: usize = 0;
    const CUTOFF: usize = 1;
    const Q: usize = 2;
    const GAIN: usize = 3;

    pub fn new(filter_type: BiquadFilterType, cutoff_hz: f32, q: f32) -> Self {
        Self {
            filter_type,
            cutoff_mel: hz_to_mel(cutoff_hz),
            q,
            gain: 0.0,
            mix: 1.0,
        }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_mix(mut self, mix: f32) -> Self {
        self.mix = mix;
        self
    }

    /// Cutoff frequency in Hz.
    pub fn cutoff_hz(&self) -> f32 {
        mel_to_hz(self.cutoff_mel)
    }

    /// Derive the biquad coefficients from the given filter parameters. Fails on invalid
    /// filter type tags.
    pub fn coefficients(params: &DspParameters) -> Result<BiquadFilterCoefficients, Error> {
        let type_tag = params.params[Self::TYPE];
        let filter_type = mode_index(type_tag)
            .and_then(BiquadFilterType::from_index)
            .ok_or_else(|| Error::ParameterError(format!("Invalid filter type: {type_tag}")))?;
        // keep modulated cutoffs in a valid range
        let nyquist = params.sample_rate as f32 / 2.0;
        let cutoff = mel_to_hz(params.params[Self::CUTOFF])
            .min(nyquist * 0.99)
            .max(10.0);
        BiquadFilterCoefficients::new(
            filter_type,
            params.sample_rate,
            cutoff,
            params.params[Self::Q].max(0.01),
            params.params[Self::GAIN],
        )
    }

    /// Apply the effect in place, using the coefficients derived when the parameters got
    /// built.
    pub fn process(params: &DspParameters, samples: &mut [f32]) {
        let coefficients = match params.state() {
            DspState::Filter(coefficients) => *coefficients,
            DspState::Stateless => match Self::coefficients(params) {
                Ok(coefficients) => coefficients,
                Err(err) => {
                    log::warn!("Failed to apply grain filter: {err}");
                    return;
                }
            },
        };
        let mix = params.mix as f64;
        let mut filter = BiquadFilter::new();
        for sample in samples.iter_mut() {
            let dry = *sample as f64;
            let wet = filter.process_sample(&coefficients, dry);
            *sample = (dry + (wet - dry) * mix) as f32;
        }
    }
}

impl Default for FilterEffect {
    fn default() -> Self {
        Self::new(BiquadFilterType::LowPass, 2000.0, 0.707)
    }
}

impl DspEffect for FilterEffect {
    fn name(&self) -> &'static str {
        Self::EFFECT_NAME
    }

    fn validate(&self) -> Result<(), Error> {
        if self.q <= 0.0 {
            return Err(Error::ParameterError(format!(
                "Invalid filter Q: must be > 0, but is {}",
                self.q
            )));
        }
        if !(0.0..=1.0).contains(&self.mix) {
            return Err(Error::ParameterError(
                "Filter mix must be between 0.0 and 1.0".to_string(),
            ));
        }
        let cutoff = self.cutoff_hz();
        if !(cutoff > 0.0 && cutoff.is_finite()) {
            return Err(Error::ParameterError(format!(
                "Invalid filter cutoff: must be > 0 Hz, but is {cutoff}",
            )));
        }
        Ok(())
    }

    fn dsp_parameters(&self, sample_rate: u32) -> DspParameters {
        DspParameters::new(DspType::Filter, sample_rate)
            .with_mix(self.mix)
            .with_param(Self::TYPE, self.filter_type.index() as f32)
            .with_param(Self::CUTOFF, self.cutoff_mel)
            .with_param(Self::Q, self.q)
            .with_param(Self::GAIN, self.gain)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::process_dsp;

    fn energy(samples: &[f32]) -> f64 {
        samples.iter().map(|s| (*s as f64).powi(2)).sum()
    }

    #[test]
    fn allpass_impulse_energy() {
        let effect = FilterEffect::new(BiquadFilterType::AllPass, 800.0, 0.707);
        assert!(effect.validate().is_ok());
        let params = effect.dsp_parameters(44100);
        let mut samples = vec![0.0; 8192];
        samples[0] = 1.0;
        process_dsp(&params, &mut samples, &mut Vec::new(), 0);
        assert!((energy(&samples) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn lowpass_attenuates_highs() {
        let params = FilterEffect::new(BiquadFilterType::LowPass, 300.0, 0.707)
            .dsp_parameters(44100);
        let input = (0..4096)
            .map(|i| (i as f32 * std::f32::consts::TAU * 8000.0 / 44100.0).sin())
            .collect::<Vec<_>>();
        let mut output = input.clone();
        process_dsp(&params, &mut output, &mut Vec::new(), 0);
        assert!(energy(&output) < energy(&input) * 0.01);
    }

    #[test]
    fn invalid_filter_types() {
        let mut params = FilterEffect::default().dsp_parameters(44100);
        assert!(params.build().is_ok());
        params.params[FilterEffect::TYPE] = 5.0;
        assert!(params.build().is_err());
        assert!(FilterEffect::coefficients(&params).is_err());

        // unbuilt parameters with invalid types leave the grain untouched
        let mut samples = vec![0.5; 16];
        process_dsp(&params, &mut samples, &mut Vec::new(), 0);
        assert_eq!(samples, vec![0.5; 16]);
    }

    #[test]
    fn out_of_range_cutoffs_are_clamped() {
        let mut params = FilterEffect::default().dsp_parameters(22050);
        params.params[FilterEffect::CUTOFF] = hz_to_mel(20000.0);
        let mut samples = vec![0.5; 256];
        process_dsp(&params, &mut samples, &mut Vec::new(), 0);
        assert!(samples.iter().all(|s| s.is_finite()));
    }
}
