//! Per grain DSP effects.
//!
//! Effects are configured on the main thread and converted into plain [`DspParameters`] via
//! [`DspEffect::dsp_parameters`] whenever their configuration changes. Each grain then gets
//! processed in place by [`process_dsp`], which dispatches on the parameter's [`DspType`] tag.
//! Effects with memory (delay lines, recorded segments) keep their state in a persistent
//! per emitter tail buffer, which is passed along with every grain.

use std::fmt::Debug;

use crate::{
    utils::{dsp::filters::biquad::BiquadFilterCoefficients, time::SampleTime},
    Error,
};

// -------------------------------------------------------------------------------------------------

pub mod bitcrush;
pub mod chopper;
pub mod filter;
pub mod flange;

pub use bitcrush::BitcrushEffect;
pub use chopper::{ChopperEffect, ChopperPitchMode, ChopperPlayMode};
pub use filter::FilterEffect;
pub use flange::FlangeEffect;

// -------------------------------------------------------------------------------------------------

/// Number of generic, effect specific parameter slots in [`DspParameters`].
pub const DSP_PARAMETER_COUNT: usize = 11;

/// Convert a mode parameter value into an index. Mode values must be non negative integers.
pub(crate) fn mode_index(value: f32) -> Option<usize> {
    (value >= 0.0 && value.fract() == 0.0).then_some(value as usize)
}

// -------------------------------------------------------------------------------------------------

/// Effect type tag of [`DspParameters`].
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
    strum::EnumCount,
)]
#[repr(u8)]
pub enum DspType {
    Bitcrush = 0,
    Flange = 1,
    Filter = 2,
    Chopper = 3,
}

impl TryFrom<u8> for DspType {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::Bitcrush),
            1 => Ok(Self::Flange),
            2 => Ok(Self::Filter),
            3 => Ok(Self::Chopper),
            _ => Err(Error::InvalidDspType(tag)),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Processing state which gets derived from [`DspParameters`] when they are built.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum DspState {
    #[default]
    Stateless,
    Filter(BiquadFilterCoefficients),
}

// -------------------------------------------------------------------------------------------------

/// Plain, effect independent description of a configured DSP effect.
///
/// Parameters get validated and their processing state derived with [`DspParameters::build`].
/// Unbuilt parameters can be processed too, but then derive their state for every grain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DspParameters {
    pub dsp_type: DspType,
    pub sample_rate: u32,
    /// Samples that must be reserved in a grain's buffer beyond its nominal length, e.g. to
    /// let delay lines ring out.
    pub sample_tail: usize,
    /// Dry/wet mix (0.0 = dry, 1.0 = wet).
    pub mix: f32,
    /// Effect specific parameter values.
    pub params: [f32; DSP_PARAMETER_COUNT],
    state: DspState,
}

impl DspParameters {
    pub fn new(dsp_type: DspType, sample_rate: u32) -> Self {
        Self {
            dsp_type,
            sample_rate,
            sample_tail: 0,
            mix: 1.0,
            params: [0.0; DSP_PARAMETER_COUNT],
            state: DspState::Stateless,
        }
    }

    /// Create and build parameters from a raw type tag. Fails on unknown type or mode tags.
    pub fn from_raw(
        tag: u8,
        sample_rate: u32,
        sample_tail: usize,
        mix: f32,
        params: [f32; DSP_PARAMETER_COUNT],
    ) -> Result<Self, Error> {
        Self {
            dsp_type: DspType::try_from(tag)?,
            sample_rate,
            sample_tail,
            mix: mix.clamp(0.0, 1.0),
            params,
            state: DspState::Stateless,
        }
        .build()
    }

    /// Validate effect specific mode values and derive the processing state. Must be called
    /// again after changing parameter values.
    pub fn build(mut self) -> Result<Self, Error> {
        self.state = match self.dsp_type {
            DspType::Filter => DspState::Filter(FilterEffect::coefficients(&self)?),
            DspType::Chopper => {
                ChopperEffect::validate_parameters(&self)?;
                DspState::Stateless
            }
            DspType::Bitcrush | DspType::Flange => DspState::Stateless,
        };
        Ok(self)
    }

    /// Processing state as derived by the last [`DspParameters::build`] call.
    pub fn state(&self) -> &DspState {
        &self.state
    }

    pub fn with_tail(mut self, sample_tail: usize) -> Self {
        self.sample_tail = sample_tail;
        self
    }

    pub fn with_mix(mut self, mix: f32) -> Self {
        self.mix = mix.clamp(0.0, 1.0);
        self
    }

    pub fn with_param(mut self, index: usize, value: f32) -> Self {
        debug_assert!(index < DSP_PARAMETER_COUNT, "Invalid parameter index");
        if let Some(param) = self.params.get_mut(index) {
            *param = value;
        }
        self
    }
}

// -------------------------------------------------------------------------------------------------

/// DSP effect authoring interface.
///
/// Effects are plain configuration structs. Processing happens in the effect type's static
/// `process` function, which is called via [`process_dsp`].
pub trait DspEffect: Debug + Send + Sync + 'static {
    /// A unique, static name for the effect.
    fn name(&self) -> &'static str;

    /// Validate the effect's configuration.
    fn validate(&self) -> Result<(), Error>;

    /// Create processing parameters for the given output sample rate.
    fn dsp_parameters(&self, sample_rate: u32) -> DspParameters;
}

// -------------------------------------------------------------------------------------------------

/// Process a single grain's samples in place with the given effect parameters.
///
/// `tail` is the persistent tail buffer of the effect in the emitter's DSP chain.
/// `dsp_start` is the absolute sample time at which the grain starts playing.
pub fn process_dsp(
    params: &DspParameters,
    samples: &mut [f32],
    tail: &mut Vec<f32>,
    dsp_start: SampleTime,
) {
    if samples.is_empty() || params.mix <= 0.0 {
        return;
    }
    match params.dsp_type {
        DspType::Bitcrush => BitcrushEffect::process(params, samples),
        DspType::Flange => FlangeEffect::process(params, samples, tail, dsp_start),
        DspType::Filter => FilterEffect::process(params, samples),
        DspType::Chopper => ChopperEffect::process(params, samples, tail, dsp_start),
    }
}

// -------------------------------------------------------------------------------------------------

/// Sample rate which parameters of effects get built with before the chain got prepared.
const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// An ordered list of DSP effects with their processing parameters and persistent tail
/// buffers. Owned by an emitter.
#[derive(Debug, Default)]
pub struct DspChain {
    effects: Vec<Box<dyn DspEffect>>,
    parameters: Vec<DspParameters>,
    tails: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl DspChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new effect to the chain.
    pub fn add_effect(&mut self, effect: impl DspEffect) -> Result<(), Error> {
        self.add_boxed_effect(Box::new(effect))
    }

    /// Append a new boxed effect to the chain.
    pub fn add_boxed_effect(&mut self, effect: Box<dyn DspEffect>) -> Result<(), Error> {
        effect.validate()?;
        // the actual output rate is applied in `prepare`
        let sample_rate = if self.sample_rate > 0 {
            self.sample_rate
        } else {
            DEFAULT_SAMPLE_RATE
        };
        let parameters = effect.dsp_parameters(sample_rate).build()?;
        self.tails.push(vec![0.0; parameters.sample_tail]);
        self.parameters.push(parameters);
        self.effects.push(effect);
        Ok(())
    }

    /// Remove all effects.
    pub fn clear(&mut self) {
        self.effects.clear();
        self.parameters.clear();
        self.tails.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Names of all effects in the chain, in processing order.
    pub fn effect_names(&self) -> Vec<&'static str> {
        self.effects.iter().map(|e| e.name()).collect()
    }

    /// Current processing parameters of all effects.
    pub fn parameters(&self) -> &[DspParameters] {
        &self.parameters
    }

    /// Rebuild processing parameters for the given sample rate. Tail buffers are only
    /// reallocated when their size changed.
    pub fn prepare(&mut self, sample_rate: u32) {
        if self.sample_rate == sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        for ((effect, parameters), tail) in self
            .effects
            .iter()
            .zip(self.parameters.iter_mut())
            .zip(self.tails.iter_mut())
        {
            match effect.dsp_parameters(sample_rate).build() {
                Ok(built) => *parameters = built,
                Err(err) => log::error!("Failed to build {} parameters: {err}", effect.name()),
            }
            if tail.len() != parameters.sample_tail {
                *tail = vec![0.0; parameters.sample_tail];
            }
        }
    }

    /// Total number of samples the chain needs beyond a grain's nominal length.
    pub fn total_tail(&self) -> usize {
        self.parameters.iter().map(|p| p.sample_tail).sum()
    }

    /// Process a grain buffer through all effects in order.
    pub fn process(&mut self, samples: &mut [f32], dsp_start: SampleTime) {
        for (parameters, tail) in self.parameters.iter().zip(self.tails.iter_mut()) {
            process_dsp(parameters, samples, tail, dsp_start);
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsp_type_tags() {
        assert_eq!(DspType::try_from(0).ok(), Some(DspType::Bitcrush));
        assert_eq!(DspType::try_from(3).ok(), Some(DspType::Chopper));
        assert!(matches!(
            DspType::try_from(4),
            Err(Error::InvalidDspType(4))
        ));
        assert!(DspParameters::from_raw(17, 44100, 0, 1.0, [0.0; DSP_PARAMETER_COUNT]).is_err());
    }

    #[test]
    fn mode_tags() {
        assert_eq!(mode_index(3.0), Some(3));
        assert_eq!(mode_index(1.5), None);
        assert_eq!(mode_index(-1.0), None);
        assert_eq!(mode_index(f32::NAN), None);

        let mut params = [0.0; DSP_PARAMETER_COUNT];
        // filter: low-pass at 1000 mel with Q 0.707
        params[0] = 0.0;
        params[1] = 1000.0;
        params[2] = 0.707;
        let filter = DspParameters::from_raw(DspType::Filter as u8, 44100, 0, 1.0, params);
        assert!(matches!(
            filter.map(|p| *p.state()),
            Ok(DspState::Filter(_))
        ));
        params[0] = 9.0;
        assert!(DspParameters::from_raw(DspType::Filter as u8, 44100, 0, 1.0, params).is_err());
        params[0] = 0.5;
        assert!(DspParameters::from_raw(DspType::Filter as u8, 44100, 0, 1.0, params).is_err());

        // chopper: play mode and pitch mode tags
        let mut params = [0.0; DSP_PARAMETER_COUNT];
        params[0] = 5.0;
        params[1] = 50.0;
        params[5] = 1.0;
        let chopper = DspType::Chopper as u8;
        assert!(DspParameters::from_raw(chopper, 44100, 0, 1.0, params).is_ok());
        params[2] = 7.0;
        assert!(DspParameters::from_raw(chopper, 44100, 0, 1.0, params).is_err());
        params[2] = 1.0;
        params[3] = -1.0;
        assert!(DspParameters::from_raw(chopper, 44100, 0, 1.0, params).is_err());
    }

    #[test]
    fn chains_derive_filter_coefficients_once() -> Result<(), Error> {
        let mut chain = DspChain::new();
        chain.add_effect(FilterEffect::default())?;
        chain.prepare(48000);
        let DspState::Filter(coefficients) = *chain.parameters()[0].state() else {
            panic!("filter coefficients are not derived");
        };
        assert_eq!(coefficients.sample_rate(), 48000);
        assert!((coefficients.cutoff() - 2000.0).abs() < 0.5);

        // cached coefficients process like freshly derived ones
        let input = (0..256).map(|i| (i as f32 * 0.3).sin()).collect::<Vec<_>>();
        let mut cached = input.clone();
        chain.process(&mut cached, 0);
        let mut derived = input.clone();
        let unbuilt = FilterEffect::default().dsp_parameters(48000);
        assert_eq!(*unbuilt.state(), DspState::Stateless);
        process_dsp(&unbuilt, &mut derived, &mut Vec::new(), 0);
        assert_eq!(cached, derived);
        Ok(())
    }

    #[test]
    fn chain_tails() -> Result<(), Error> {
        let mut chain = DspChain::new();
        chain.add_effect(BitcrushEffect::new(2.0))?;
        chain.add_effect(FlangeEffect::default())?;
        chain.prepare(44100);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.effect_names(), vec!["Bitcrush", "Flange"]);
        let flange_tail = FlangeEffect::default().dsp_parameters(44100).sample_tail;
        assert!(flange_tail > 0);
        assert_eq!(chain.total_tail(), flange_tail);

        // sample rate changes rebuild parameters
        chain.prepare(88200);
        assert!(chain.total_tail() > flange_tail);

        let mut samples = vec![0.5; 64 + chain.total_tail()];
        chain.process(&mut samples, 0);
        assert!(samples.iter().all(|s| s.is_finite()));
        Ok(())
    }

    #[test]
    fn invalid_effects_are_rejected() {
        let mut chain = DspChain::new();
        assert!(chain.add_effect(BitcrushEffect::new(0.5)).is_err());
        assert!(chain.is_empty());
    }
}
