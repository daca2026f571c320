use std::f64;

use strum::{Display, EnumIter, EnumString, VariantNames};

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Available filter types for the [`BiquadFilter`].
#[derive(
    Default, Clone, Copy, PartialEq, Eq, Debug, Display, EnumIter, EnumString, VariantNames,
)]
pub enum BiquadFilterType {
    #[default]
    LowPass,
    HighPass,
    BandPass,
    /// Peaking EQ: boosts or cuts (notches) around the cutoff by the filter's gain.
    PeakNotch,
    AllPass,
}

impl BiquadFilterType {
    /// Filter type from its index in the list of all filter types.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::LowPass),
            1 => Some(Self::HighPass),
            2 => Some(Self::BandPass),
            3 => Some(Self::PeakNotch),
            4 => Some(Self::AllPass),
            _ => None,
        }
    }

    /// Index of this filter type in the list of all filter types.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

// -------------------------------------------------------------------------------------------------

/// Normalized biquad coefficients, derived from the filter type, cutoff, Q and gain with the
/// formulas from Robert Bristow-Johnson's "Audio EQ Cookbook".
///
/// See [BiquadFilter] for more info about the filter implementation.
#[derive(Default, Clone, Copy, PartialEq, Debug)]
pub struct BiquadFilterCoefficients {
    filter_type: BiquadFilterType,
    sample_rate: u32,
    cutoff: f32,
    q: f32,
    gain: f32,
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadFilterCoefficients {
    pub fn new(
        filter_type: BiquadFilterType,
        sample_rate: u32,
        cutoff: f32,
        q: f32,
        gain: f32,
    ) -> Result<Self, Error> {
        let mut coefficients = BiquadFilterCoefficients::default();
        coefficients.set(filter_type, sample_rate, cutoff, q, gain)?;
        Ok(coefficients)
    }

    /// Get currently applied filter type.
    pub fn filter_type(&self) -> BiquadFilterType {
        self.filter_type
    }

    /// Get currently applied sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The frequency in Hz where the cutoff of the filter is.
    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    /// The resonance (Q factor) of the filter.
    pub fn q(&self) -> f32 {
        self.q
    }

    /// Gain in dB. Only used by peak filters.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Sets and applies a batch of new filter parameters.
    pub fn set(
        &mut self,
        filter_type: BiquadFilterType,
        sample_rate: u32,
        cutoff: f32,
        q: f32,
        gain: f32,
    ) -> Result<(), Error> {
        if self.filter_type != filter_type
            || self.sample_rate != sample_rate
            || self.cutoff != cutoff
            || self.q != q
            || self.gain != gain
            || self.b0 == 0.0
        {
            self.filter_type = filter_type;
            self.sample_rate = sample_rate;
            self.cutoff = cutoff;
            self.q = q;
            self.gain = gain;
            self.apply()
        } else {
            Ok(())
        }
    }

    /// Applies filter filter parameters.
    pub fn apply(&mut self) -> Result<(), Error> {
        if self.sample_rate == 0 {
            return Err(Error::ParameterError(format!(
                "Invalid filter sample-rate: must be > 0, but is {s}",
                s = self.sample_rate
            )));
        }
        if self.q <= 0.0 {
            return Err(Error::ParameterError(format!(
                "Invalid filter Q: must be > 0, but is {q}",
                q = self.q
            )));
        }
        if self.cutoff <= 0.0 || self.cutoff >= self.sample_rate as f32 / 2.0 {
            return Err(Error::ParameterError(format!(
                "Invalid filter frequency: must be > 0 and < nyquist {n}, but is {f}",
                n = self.sample_rate as f32 / 2.0,
                f = self.cutoff
            )));
        }
        let w0 = 2.0 * f64::consts::PI * self.cutoff as f64 / self.sample_rate as f64;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * self.q as f64);
        let (b0, b1, b2, a0, a1, a2) = match self.filter_type {
            BiquadFilterType::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            BiquadFilterType::HighPass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            BiquadFilterType::BandPass => (
                alpha,
                0.0,
                -alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            BiquadFilterType::PeakNotch => {
                let a = f64::powf(10.0, self.gain as f64 / 40.0);
                (
                    1.0 + alpha * a,
                    -2.0 * cos_w0,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w0,
                    1.0 - alpha / a,
                )
            }
            BiquadFilterType::AllPass => (
                1.0 - alpha,
                -2.0 * cos_w0,
                1.0 + alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Direct form I biquad filter: a two-pole, two-zero recurrence with two samples of input and
/// output history.
///
/// This is a second-order filter with a cutoff slope of 12 dB/octave. Q = 0.707 means no
/// resonant peaking.
#[derive(Default, Clone, Debug)]
pub struct BiquadFilter {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process helper function that calls `process_sample` for each sample in a buffer
    #[inline]
    pub fn process<'a>(
        &mut self,
        coefficients: &BiquadFilterCoefficients,
        output: impl Iterator<Item = &'a mut f32>,
    ) {
        for sample in output {
            *sample = self.process_sample(coefficients, *sample as f64) as f32;
        }
    }

    /// Apply the filter on a single sample.
    #[inline]
    pub fn process_sample(&mut self, coefficients: &BiquadFilterCoefficients, input: f64) -> f64 {
        let output = coefficients.b0 * input + coefficients.b1 * self.x1 + coefficients.b2 * self.x2
            - coefficients.a1 * self.y1
            - coefficients.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }

    /// Reset the filter's history.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// -------------------------------------------------------------------------------------------------
