use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    dsp::{mode_index, DspEffect, DspParameters, DspType},
    utils::{
        buffer::mix_dry_wet,
        dsp::filters::dc::{DcFilter, DcFilterMode},
        time::{ms_to_samples, SampleTime},
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Order in which the [`ChopperEffect`] replays recorded segments.
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
pub enum ChopperPlayMode {
    #[default]
    Forward,
    Reverse,
    /// Randomly step to the previous or next segment.
    Walk,
    /// Jump to random segments.
    Random,
}

impl ChopperPlayMode {
    /// Play mode from its index in the list of all modes.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Forward),
            1 => Some(Self::Reverse),
            2 => Some(Self::Walk),
            3 => Some(Self::Random),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Playback speed progression of the [`ChopperEffect`].
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
pub enum ChopperPitchMode {
    /// Segments play at their original speed.
    #[default]
    Normal,
    /// Speed ramps up by the pitch amount over the grain.
    Ascending,
    /// Speed ramps down by the pitch amount over the grain.
    Descending,
    /// Segments play transposed by the pitch amount.
    Pitched,
}

impl ChopperPitchMode {
    /// Pitch mode from its index in the list of all modes.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Normal),
            1 => Some(Self::Ascending),
            2 => Some(Self::Descending),
            3 => Some(Self::Pitched),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Playback rate at the start and end of the grain for the given pitch in semitones.
    fn rate_range(&self, semitones: f32) -> (f64, f64) {
        let ratio = 2.0f64.powf(semitones.abs() as f64 / 12.0);
        match self {
            Self::Normal => (1.0, 1.0),
            Self::Ascending => (1.0, ratio),
            Self::Descending => (1.0, 1.0 / ratio),
            Self::Pitched => {
                let rate = 2.0f64.powf(semitones as f64 / 12.0);
                (rate, rate)
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Segment based time stretcher and scrambler.
///
/// The first pass cuts the grain into segments at rising zero crossings of the DC blocked
/// signal, with segment lengths bounded to `[min_segment_ms, max_segment_ms]`. The second
/// pass rebuilds the grain by replaying the recorded segments in the selected play and pitch
/// mode. Segments always loop within their own boundaries, so pitched playback does not
/// change the grain's duration.
///
/// A dry copy of the grain and the `(length, offset)` pairs of all segments get recorded into
/// the emitter's tail buffer. When no zero crossings are found, the whole grain is a single
/// segment.
#[derive(Debug, Clone)]
pub struct ChopperEffect {
    pub min_segment_ms: f32,
    pub max_segment_ms: f32,
    pub play_mode: ChopperPlayMode,
    pub pitch_mode: ChopperPitchMode,
    /// Pitch amount in semitones, used by all pitch modes but `Normal`.
    pub pitch: f32,
    /// How often each segment gets played before moving to the next one (>= 1).
    pub repeats: u32,
    /// Dry/wet mix (0.0 - 1.0).
    pub mix: f32,
}

impl ChopperEffect {
    pub const EFFECT_NAME: &str = "Chopper";

    const MIN_SEGMENT: usize = 0;
    const MAX_SEGMENT: usize = 1;
    const PLAY_MODE: usize = 2;
    const PITCH_MODE: usize = 3;
    const PITCH: usize = 4;
    const REPEATS: usize = 5;

    /// Decode the play and pitch mode tags of the given parameters.
    fn modes(params: &DspParameters) -> Result<(ChopperPlayMode, ChopperPitchMode), Error> {
        let play_tag = params.params[Self::PLAY_MODE];
        let pitch_tag = params.params[Self::PITCH_MODE];
        let play_mode = mode_index(play_tag)
            .and_then(ChopperPlayMode::from_index)
            .ok_or_else(|| {
                Error::ParameterError(format!("Invalid chopper play mode: {play_tag}"))
            })?;
        let pitch_mode = mode_index(pitch_tag)
            .and_then(ChopperPitchMode::from_index)
            .ok_or_else(|| {
                Error::ParameterError(format!("Invalid chopper pitch mode: {pitch_tag}"))
            })?;
        Ok((play_mode, pitch_mode))
    }

    /// Validate the mode tags of the given chopper parameters.
    pub fn validate_parameters(params: &DspParameters) -> Result<(), Error> {
        Self::modes(params).map(|_| ())
    }

    /// Apply the effect in place, using `tail` as recording buffer.
    pub fn process(
        params: &DspParameters,
        samples: &mut [f32],
        tail: &mut Vec<f32>,
        dsp_start: SampleTime,
    ) {
        let len = samples.len();
        if len == 0 {
            return;
        }
        let (play_mode, pitch_mode) = match Self::modes(params) {
            Ok(modes) => modes,
            Err(err) => {
                log::warn!("Failed to apply grain chopper: {err}");
                return;
            }
        };
        let sample_rate = params.sample_rate;
        let min_segment =
            ms_to_samples(params.params[Self::MIN_SEGMENT], sample_rate).max(1) as usize;
        let max_segment = (ms_to_samples(params.params[Self::MAX_SEGMENT], sample_rate) as usize)
            .max(min_segment);

        // dry copy followed by two records per segment
        let max_segment_count = len / min_segment + 1;
        let required = len + 2 * max_segment_count;
        if tail.len() < required {
            tail.resize(required, 0.0);
        }
        let (dry, records) = tail.split_at_mut(len);
        dry.copy_from_slice(samples);

        let segment_count =
            Self::record_segments(dry, records, sample_rate, min_segment, max_segment);

        let (rate_start, rate_end) = pitch_mode.rate_range(params.params[Self::PITCH]);
        let repeats = (params.params[Self::REPEATS] as usize).max(1);
        let mut rng = SmallRng::seed_from_u64(dsp_start);

        let mut segment = match play_mode {
            ChopperPlayMode::Forward | ChopperPlayMode::Walk => 0,
            ChopperPlayMode::Reverse => segment_count - 1,
            ChopperPlayMode::Random => rng.random_range(0..segment_count),
        };
        let mut out = 0;
        while out < len {
            let segment_len = records[2 * segment] as usize;
            let segment_offset = records[2 * segment + 1] as usize;
            let source = &dry[segment_offset..segment_offset + segment_len];
            for _ in 0..repeats {
                let mut pos = 0.0f64;
                for _ in 0..segment_len {
                    if out >= len {
                        break;
                    }
                    let progress = out as f64 / len as f64;
                    let rate = rate_start + (rate_end - rate_start) * progress;
                    samples[out] = Self::read_wrapped(source, pos);
                    pos += rate;
                    out += 1;
                }
            }
            segment = match play_mode {
                ChopperPlayMode::Forward => (segment + 1) % segment_count,
                ChopperPlayMode::Reverse => (segment + segment_count - 1) % segment_count,
                ChopperPlayMode::Walk => {
                    if segment_count <= 1 {
                        0
                    } else if segment == 0 {
                        1
                    } else if segment == segment_count - 1 || rng.random::<bool>() {
                        segment - 1
                    } else {
                        segment + 1
                    }
                }
                ChopperPlayMode::Random => rng.random_range(0..segment_count),
            };
        }

        mix_dry_wet(samples, dry, params.mix);
    }

    /// Scan the dry signal for segments and write their (length, offset) pairs into
    /// `records`. Returns the number of recorded segments, which is at least one for
    /// non empty signals.
    fn record_segments(
        dry: &[f32],
        records: &mut [f32],
        sample_rate: u32,
        min_segment: usize,
        max_segment: usize,
    ) -> usize {
        let mut push = |count: &mut usize, length: usize, offset: usize| {
            records[2 * *count] = length as f32;
            records[2 * *count + 1] = offset as f32;
            *count += 1;
        };
        let mut dc_filter = DcFilter::new(sample_rate, DcFilterMode::Fast);
        let mut count = 0;
        let mut start = 0;
        let mut prev = dc_filter.process_sample(dry[0] as f64);
        for (index, sample) in dry.iter().enumerate().skip(1) {
            let current = dc_filter.process_sample(*sample as f64);
            let length = index - start;
            let rising_zero_crossing = prev < 0.0 && current >= 0.0;
            if (rising_zero_crossing && length >= min_segment) || length >= max_segment {
                push(&mut count, length, start);
                start = index;
            }
            prev = current;
        }
        // trailing partial segment, or the whole buffer when nothing was found
        push(&mut count, dry.len() - start, start);
        count
    }

    /// Linearly interpolated read at a position which wraps around the segment's length.
    #[inline]
    fn read_wrapped(source: &[f32], pos: f64) -> f32 {
        let len = source.len();
        let pos = pos.rem_euclid(len as f64);
        let index = pos as usize % len;
        let next = (index + 1) % len;
        let fraction = (pos - pos.floor()) as f32;
        source[index] + (source[next] - source[index]) * fraction
    }
}

impl Default for ChopperEffect {
    fn default() -> Self {
        Self {
            min_segment_ms: 5.0,
            max_segment_ms: 50.0,
            play_mode: ChopperPlayMode::Forward,
            pitch_mode: ChopperPitchMode::Normal,
            pitch: 0.0,
            repeats: 1,
            mix: 1.0,
        }
    }
}

impl DspEffect for ChopperEffect {
    fn name(&self) -> &'static str {
        Self::EFFECT_NAME
    }

    fn validate(&self) -> Result<(), Error> {
        if !(self.min_segment_ms > 0.0 && self.min_segment_ms <= self.max_segment_ms) {
            return Err(Error::ParameterError(format!(
                "Invalid chopper segment range: {}..{} ms",
                self.min_segment_ms, self.max_segment_ms
            )));
        }
        if !(-48.0..=48.0).contains(&self.pitch) {
            return Err(Error::ParameterError(
                "Chopper pitch must be between -48 and 48 semitones".to_string(),
            ));
        }
        if self.repeats == 0 {
            return Err(Error::ParameterError(
                "Chopper repeats must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.mix) {
            return Err(Error::ParameterError(
                "Chopper mix must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }

    fn dsp_parameters(&self, sample_rate: u32) -> DspParameters {
        // recording buffers are sized per grain
        DspParameters::new(DspType::Chopper, sample_rate)
            .with_mix(self.mix)
            .with_param(Self::MIN_SEGMENT, self.min_segment_ms)
            .with_param(Self::MAX_SEGMENT, self.max_segment_ms)
            .with_param(Self::PLAY_MODE, self.play_mode.index() as f32)
            .with_param(Self::PITCH_MODE, self.pitch_mode.index() as f32)
            .with_param(Self::PITCH, self.pitch)
            .with_param(Self::REPEATS, self.repeats as f32)
    }
}

// -------------------------------------------------------------------------------------------------
