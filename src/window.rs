//! Grain envelopes.

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Window function used to shape a grain.
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
    strum::EnumCount,
    strum::EnumIter,
)]
#[repr(u8)]
pub enum WindowFunction {
    Sine = 0,
    #[default]
    Hann = 1,
    Hamming = 2,
    /// Tapered cosine, with a configurable taper ratio.
    Tukey = 3,
    /// Gaussian bell, with a configurable width.
    Gaussian = 4,
}

impl WindowFunction {
    /// Window value at `n` of `len` (symmetric, with `len - 1` as denominator).
    fn value(&self, n: usize, len: usize, tukey_alpha: f32, gaussian_sigma: f32) -> f32 {
        use std::f32::consts::PI;
        if len <= 1 {
            return 1.0;
        }
        let x = n as f32 / (len - 1) as f32; // [0, 1]
        match self {
            WindowFunction::Sine => (PI * x).sin(),
            WindowFunction::Hann => 0.5 * (1.0 - (2.0 * PI * x).cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * (2.0 * PI * x).cos(),
            WindowFunction::Tukey => {
                let alpha = tukey_alpha.clamp(0.0, 1.0);
                if alpha <= f32::EPSILON {
                    return 1.0;
                }
                // fold into the first half so both tapers are computed identically
                let x = x.min(1.0 - x);
                let width = alpha / 2.0;
                if x < width {
                    0.5 * (1.0 - (PI * x / width).cos())
                } else {
                    1.0
                }
            }
            WindowFunction::Gaussian => {
                let sigma = gaussian_sigma.max(0.01);
                let d = (x - 0.5) / (sigma * 0.5);
                (-0.5 * d * d).exp()
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Configuration of a grain envelope: a window function with optional linear in and out
/// fades, which get multiplied with the window function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowConfig {
    pub function: WindowFunction,
    /// Linear fade in length, relative to the window size (0.0 - 1.0).
    pub fade_in: f32,
    /// Linear fade out length, relative to the window size (0.0 - 1.0).
    pub fade_out: f32,
    /// Taper ratio of the Tukey window (0.0 = rectangular, 1.0 = Hann).
    pub tukey_alpha: f32,
    /// Width of the Gaussian window, relative to the window size.
    pub gaussian_sigma: f32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            function: WindowFunction::default(),
            fade_in: 0.0,
            fade_out: 0.0,
            tukey_alpha: 0.5,
            gaussian_sigma: 0.4,
        }
    }
}

impl WindowConfig {
    pub fn new(function: WindowFunction) -> Self {
        Self {
            function,
            ..Self::default()
        }
    }

    pub fn with_fades(mut self, fade_in: f32, fade_out: f32) -> Self {
        self.fade_in = fade_in;
        self.fade_out = fade_out;
        self
    }

    /// Validate all parameters.
    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.fade_in) || !(0.0..=1.0).contains(&self.fade_out) {
            return Err(Error::ParameterError(
                "Window fades must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.tukey_alpha) {
            return Err(Error::ParameterError(
                "Tukey alpha must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.01..=1.0).contains(&self.gaussian_sigma) {
            return Err(Error::ParameterError(
                "Gaussian sigma must be between 0.01 and 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Calculate the envelope for a window of the given size.
    pub fn build_window_array(&self, size: usize) -> Vec<f32> {
        let fade_in = (self.fade_in * size as f32).round() as usize;
        let fade_out = (self.fade_out * size as f32).round() as usize;
        (0..size)
            .map(|n| {
                let mut value =
                    self.function
                        .value(n, size, self.tukey_alpha, self.gaussian_sigma);
                if n < fade_in {
                    value *= n as f32 / fade_in as f32;
                }
                let n_reversed = size - 1 - n;
                if n_reversed < fade_out {
                    value *= n_reversed as f32 / fade_out as f32;
                }
                value
            })
            .collect()
    }
}

// -------------------------------------------------------------------------------------------------

/// A precomputed grain envelope, which can be applied to grains of any length.
#[derive(Debug, Clone)]
pub struct GrainWindow {
    config: WindowConfig,
    lut: Vec<f32>,
}

impl GrainWindow {
    /// Resolution of the precomputed envelope.
    pub const RESOLUTION: usize = 2048;

    pub fn new(config: WindowConfig) -> Self {
        let lut = config.build_window_array(Self::RESOLUTION);
        Self { config, lut }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Recalculate the envelope, when the configuration changed.
    pub fn set_config(&mut self, config: WindowConfig) {
        if self.config != config {
            self.config = config;
            self.lut = config.build_window_array(Self::RESOLUTION);
        }
    }

    /// Evaluate the window at normalized phase [0.0, 1.0], linearly interpolating between
    /// the precomputed values.
    #[inline]
    pub fn sample(&self, phase: f32) -> f32 {
        let phase = phase.clamp(0.0, 1.0);
        let index_float = phase * (Self::RESOLUTION - 1) as f32;
        let index = index_float as usize;
        if index >= Self::RESOLUTION - 1 {
            return self.lut[Self::RESOLUTION - 1];
        }
        let fraction = index_float - index as f32;
        self.lut[index] * (1.0 - fraction) + self.lut[index + 1] * fraction
    }

    /// Multiply the given grain buffer with the envelope, stretched to the buffer's length.
    pub fn apply(&self, buffer: &mut [f32]) {
        let len = buffer.len();
        if len <= 1 {
            return;
        }
        let step = 1.0 / (len - 1) as f32;
        for (index, sample) in buffer.iter_mut().enumerate() {
            *sample *= self.sample(index as f32 * step);
        }
    }
}

impl Default for GrainWindow {
    fn default() -> Self {
        Self::new(WindowConfig::default())
    }
}

// -------------------------------------------------------------------------------------------------
