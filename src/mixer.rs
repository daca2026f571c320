//! Audio thread side of the engine: mixes all active speakers into the output buffer.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use basedrop::Shared;
use crossbeam_queue::ArrayQueue;

use crate::{
    clock::AudioClock,
    speaker::SpeakerOutput,
    utils::{
        buffer::{clear_buffer, scale_buffer},
        panning_factors,
        smoothed::{ExponentialSmoothedValue, SmoothedValue},
    },
};

// -------------------------------------------------------------------------------------------------

/// Messages from the main thread's speaker pool to the mixer.
pub enum MixerMessage {
    /// Start mixing the given speaker.
    AddSpeaker(Shared<SpeakerOutput>),
    /// Stop mixing the given speaker and acknowledge its release.
    RemoveSpeaker(Shared<SpeakerOutput>),
}

impl std::fmt::Debug for MixerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddSpeaker(output) => write!(f, "AddSpeaker({})", output.index()),
            Self::RemoveSpeaker(output) => write!(f, "RemoveSpeaker({})", output.index()),
        }
    }
}

// -------------------------------------------------------------------------------------------------

struct MixerSpeaker {
    output: Shared<SpeakerOutput>,
    gain: ExponentialSmoothedValue,
    pan: ExponentialSmoothedValue,
}

// -------------------------------------------------------------------------------------------------

/// Renders the grains of all active speakers into an interleaved output buffer and advances
/// the audio clock. Owned by the audio output's callback.
///
/// Never allocates while writing: the speaker list and the render buffer are preallocated
/// and removed speakers get released by the engine's garbage collector.
pub struct SpeakerMixer {
    speakers: Vec<MixerSpeaker>,
    max_speakers: usize,
    messages: Arc<ArrayQueue<MixerMessage>>,
    clock: Arc<AtomicU64>,
    sample_rate: u32,
    volume: f32,
    render_buffer: Vec<f32>,
}

impl SpeakerMixer {
    /// Max number of frames rendered at once.
    const MAX_BLOCK_FRAMES: usize = 1024;

    pub fn new(
        sample_rate: u32,
        max_speakers: usize,
        messages: Arc<ArrayQueue<MixerMessage>>,
        clock: Arc<AtomicU64>,
    ) -> Self {
        Self {
            speakers: Vec::with_capacity(max_speakers),
            max_speakers,
            messages,
            clock,
            sample_rate,
            volume: 1.0,
            render_buffer: vec![0.0; Self::MAX_BLOCK_FRAMES],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Master output volume.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.max(0.0);
    }

    /// Number of speakers which currently get mixed.
    pub fn speaker_count(&self) -> usize {
        self.speakers.len()
    }

    /// Current audio clock position.
    pub fn sample_position(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    fn process_messages(&mut self) {
        while let Some(message) = self.messages.pop() {
            match message {
                MixerMessage::AddSpeaker(output) => {
                    if self.speakers.len() >= self.max_speakers {
                        log::warn!("Mixer is full, ignoring speaker #{}", output.index());
                        continue;
                    }
                    let gain = ExponentialSmoothedValue::new(output.gain(), self.sample_rate);
                    let pan = ExponentialSmoothedValue::new(output.pan(), self.sample_rate);
                    self.speakers.push(MixerSpeaker { output, gain, pan });
                }
                MixerMessage::RemoveSpeaker(output) => {
                    let index = output.index();
                    self.speakers.retain(|speaker| speaker.output.index() != index);
                    // acknowledge even when the speaker never got mixed
                    output.finish_release();
                }
            }
        }
    }

    /// Fill the given interleaved output buffer with the given channel layout.
    pub fn write(&mut self, output: &mut [f32], channel_count: usize) {
        self.process_messages();

        let channel_count = channel_count.max(1);
        let frame_count = output.len() / channel_count;
        clear_buffer(output);

        let mut block_start = self.clock.load(Ordering::Acquire);
        for block in output.chunks_mut(Self::MAX_BLOCK_FRAMES * channel_count) {
            let block_frames = block.len() / channel_count;
            let render_buffer = &mut self.render_buffer[..block_frames];
            for speaker in &mut self.speakers {
                clear_buffer(render_buffer);
                speaker.output.render(render_buffer, block_start);
                speaker.gain.set_target(speaker.output.gain());
                speaker.pan.set_target(speaker.output.pan());
                Self::mix_speaker(speaker, render_buffer, block, channel_count);
            }
            block_start += block_frames as u64;
        }

        if self.volume != 1.0 {
            scale_buffer(output, self.volume);
        }
        AudioClock::advance(&self.clock, frame_count as u64);
    }

    fn mix_speaker(
        speaker: &mut MixerSpeaker,
        input: &[f32],
        output: &mut [f32],
        channel_count: usize,
    ) {
        if channel_count == 1 {
            for (o, i) in output.iter_mut().zip(input) {
                *o += *i * speaker.gain.next();
            }
            return;
        }
        let mut factors = panning_factors(speaker.pan.current());
        for (frame, i) in output.chunks_exact_mut(channel_count).zip(input) {
            if speaker.pan.need_ramp() {
                factors = panning_factors(speaker.pan.next());
            }
            let sample = *i * speaker.gain.next();
            frame[0] += sample * factors.0;
            frame[1] += sample * factors.1;
            // channels beyond the stereo pair get the unpanned signal
            for o in &mut frame[2..] {
                *o += sample;
            }
        }
    }
}

impl std::fmt::Debug for SpeakerMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeakerMixer")
            .field("speakers", &self.speakers.len())
            .field("sample_rate", &self.sample_rate)
            .field("volume", &self.volume)
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------
