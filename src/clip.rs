//! Source audio for grains.

use assume::assume;

use crate::{utils::buffer::fold_to_mono, Error};

// -------------------------------------------------------------------------------------------------

/// Index of an [`AudioClip`] in the engine's clip library.
pub type ClipId = usize;

// -------------------------------------------------------------------------------------------------

/// Mono audio samples with their original sample rate and channel layout.
///
/// Clips are loaded by the host application: grainfield only consumes raw sample arrays.
/// Multi channel sources get folded to mono on creation, as grains are positioned spatially
/// by their speaker.
#[derive(Debug, Clone)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
    channel_count: usize,
}

impl AudioClip {
    /// Create a clip from mono samples.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, Error> {
        Self::validate_format(1, sample_rate)?;
        Ok(Self {
            samples,
            sample_rate,
            channel_count: 1,
        })
    }

    /// Create a clip from interleaved samples with the given channel layout.
    pub fn from_interleaved(
        interleaved: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, Error> {
        Self::validate_format(channel_count, sample_rate)?;
        Ok(Self {
            samples: fold_to_mono(interleaved, channel_count),
            sample_rate,
            channel_count,
        })
    }

    fn validate_format(channel_count: usize, sample_rate: u32) -> Result<(), Error> {
        if channel_count == 0 {
            return Err(Error::ParameterError(
                "Audio clips need at least one channel".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "Audio clip sample rate must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Mono folded samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of mono sample frames.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the original, unfolded source.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Linearly interpolated read at the given fractional position, clamped to the clip's
    /// bounds.
    #[inline]
    pub fn read(&self, position: f64) -> f32 {
        let len = self.samples.len();
        if len == 0 {
            return 0.0;
        }
        let position = position.clamp(0.0, (len - 1) as f64);
        let index = position as usize;
        let next = (index + 1).min(len - 1);
        let fraction = (position - index as f64) as f32;
        assume!(unsafe: index < len);
        assume!(unsafe: next < len);
        let current = self.samples[index];
        current + (self.samples[next] - current) * fraction
    }
}

// -------------------------------------------------------------------------------------------------
