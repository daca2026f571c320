//! Grains as produced by the scheduler.

use crate::{clip::ClipId, utils::time::SampleTime};

// -------------------------------------------------------------------------------------------------

/// Id of a host in the engine.
pub type HostId = usize;
/// Id of an emitter in the engine.
pub type EmitterId = usize;

// -------------------------------------------------------------------------------------------------

/// Properties of a scheduled grain without its sample data. Used in events and statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainDescriptor {
    pub host: HostId,
    pub emitter: EmitterId,
    pub clip: ClipId,
    /// Absolute start index into the clip's samples.
    pub sample_start: usize,
    /// Number of clip samples the grain reads.
    pub sample_count: usize,
    /// Number of output samples, without the DSP tail.
    pub output_len: usize,
    /// Normalized playhead position of the grain in the clip.
    pub playhead: f32,
    /// Playback speed ratio, including sample rate compensation.
    pub pitch: f32,
    pub volume: f32,
    /// Index of the target speaker, if the grain's host has one.
    pub speaker: Option<usize>,
    /// Absolute sample time at which the grain starts playing.
    pub dsp_start: SampleTime,
    /// Number of samples reserved for the DSP chain beyond `output_len`.
    pub dsp_tail: usize,
}

// -------------------------------------------------------------------------------------------------

/// A scheduled, processed grain. Lives only between scheduling and distribution within a
/// single frame.
#[derive(Debug, Clone)]
pub struct GrainRecord {
    pub descriptor: GrainDescriptor,
    /// Processed samples: `output_len + dsp_tail` samples.
    pub samples: Vec<f32>,
}

impl GrainRecord {
    /// Total length of the grain's sample buffer.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// -------------------------------------------------------------------------------------------------

/// Event sent when a grain got handed over to a speaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainEmittedEvent {
    /// Index of the speaker which plays the grain.
    pub speaker: usize,
    pub grain: GrainDescriptor,
    /// Audio clock position at the time the grain got distributed.
    pub current_sample: SampleTime,
}

// -------------------------------------------------------------------------------------------------

/// Recycles grain sample buffers between frames, to avoid reallocating them for every grain.
#[derive(Debug, Default)]
pub struct GrainBufferPool {
    buffers: Vec<Vec<f32>>,
    capacity: usize,
}

impl GrainBufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Get a zeroed buffer of the given length.
    pub fn acquire(&mut self, len: usize) -> Vec<f32> {
        match self.buffers.pop() {
            Some(mut buffer) => {
                buffer.clear();
                buffer.resize(len, 0.0);
                buffer
            }
            None => vec![0.0; len],
        }
    }

    /// Return a buffer for reuse. Buffers beyond the pool's capacity are dropped.
    pub fn release(&mut self, buffer: Vec<f32>) {
        if self.buffers.len() < self.capacity {
            self.buffers.push(buffer);
        }
    }

    /// Number of buffers ready for reuse.
    pub fn available(&self) -> usize {
        self.buffers.len()
    }
}

// -------------------------------------------------------------------------------------------------
