use std::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering},
};

use crate::utils::{buffer::add_buffers, time::SampleTime};

// -------------------------------------------------------------------------------------------------

const SLOT_POOLED: u8 = 0;
const SLOT_PLAYING: u8 = 1;

// -------------------------------------------------------------------------------------------------

struct SlotData {
    samples: Vec<f32>,
    dsp_start: SampleTime,
}

/// A single grain playback slot, shared by the main and the audio thread.
///
/// Ownership of the slot's sample data is handed over with the slot's state: while a slot is
/// pooled, only the main thread may write its data. Publishing a grain stores the `Playing`
/// state with release ordering, after which only the audio thread reads the data, advances
/// the playhead and finally returns the slot to the pool, again with release ordering.
pub struct GrainSlot {
    state: AtomicU8,
    playhead: AtomicUsize,
    size: AtomicUsize,
    data: UnsafeCell<SlotData>,
}

// SAFETY: Access to `data` is serialized via `state`, see above.
unsafe impl Sync for GrainSlot {}

impl GrainSlot {
    /// Create a new pooled slot which can hold grains up to the given length without
    /// reallocating.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: AtomicU8::new(SLOT_POOLED),
            playhead: AtomicUsize::new(0),
            size: AtomicUsize::new(0),
            data: UnsafeCell::new(SlotData {
                samples: Vec::with_capacity(capacity),
                dsp_start: 0,
            }),
        }
    }

    /// True when the slot is free for a new grain.
    pub fn is_pooled(&self) -> bool {
        self.state.load(Ordering::Acquire) == SLOT_POOLED
    }

    /// True while the slot's grain gets played back.
    pub fn is_playing(&self) -> bool {
        self.state.load(Ordering::Acquire) == SLOT_PLAYING
    }

    /// Current playback position in samples.
    pub fn playhead(&self) -> usize {
        self.playhead.load(Ordering::Relaxed)
    }

    /// Length of the last published grain in samples.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Playback position relative to the grain's length (0.0 - 1.0).
    pub fn playhead_normalised(&self) -> f32 {
        let size = self.size();
        if size == 0 {
            0.0
        } else {
            (self.playhead() as f32 / size as f32).min(1.0)
        }
    }

    /// Copy the given grain samples into the slot and hand it over to the audio thread.
    ///
    /// Must only be called from the main thread. Returns false when the slot is still
    /// playing: the grain then is not published.
    pub fn publish(&self, samples: &[f32], dsp_start: SampleTime) -> bool {
        if !self.is_pooled() {
            return false;
        }
        {
            // SAFETY: the slot is pooled, so the audio thread does not access its data
            let data = unsafe { &mut *self.data.get() };
            data.samples.clear();
            data.samples.extend_from_slice(samples);
            data.dsp_start = dsp_start;
        }
        self.playhead.store(0, Ordering::Relaxed);
        self.size.store(samples.len(), Ordering::Relaxed);
        self.state.store(SLOT_PLAYING, Ordering::Release);
        true
    }

    /// Stop playback and return the slot to the pool. Must only be called from the audio
    /// thread.
    pub fn stop(&self) {
        if self.is_playing() {
            self.state.store(SLOT_POOLED, Ordering::Release);
        }
    }

    /// Mix the slot's grain into the given mono buffer, which starts at the given absolute
    /// sample time. Grains which start in a later block are left untouched. Late grains start
    /// playing at the start of the block.
    ///
    /// Must only be called from the audio thread. Returns true when the slot is still playing.
    pub fn render(&self, output: &mut [f32], block_start: SampleTime) -> bool {
        if !self.is_playing() {
            return false;
        }
        // SAFETY: the slot is playing, so the main thread does not access its data
        let data = unsafe { &*self.data.get() };

        let block_end = block_start + output.len() as SampleTime;
        if data.dsp_start >= block_end {
            return true;
        }
        let offset = data.dsp_start.saturating_sub(block_start) as usize;
        let playhead = self.playhead.load(Ordering::Relaxed);
        let remaining = &data.samples[playhead.min(data.samples.len())..];
        let count = remaining.len().min(output.len() - offset);
        add_buffers(&mut output[offset..offset + count], &remaining[..count]);

        let playhead = playhead + count;
        if playhead >= data.samples.len() {
            self.playhead.store(data.samples.len(), Ordering::Relaxed);
            self.state.store(SLOT_POOLED, Ordering::Release);
            false
        } else {
            self.playhead.store(playhead, Ordering::Relaxed);
            true
        }
    }
}

impl std::fmt::Debug for GrainSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrainSlot")
            .field("playing", &self.is_playing())
            .field("playhead", &self.playhead())
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------

/// Audio thread side of a speaker: its grain slots and the speaker's gain and panning
/// targets, which the main thread updates once per frame.
///
/// Removing a speaker from the mixer is a two step handshake: the main thread marks the output
/// as releasing before it queues the removal, and the mixer clears the flag after it stopped
/// the output's slots. A releasing output must not be handed out again.
#[derive(Debug)]
pub struct SpeakerOutput {
    index: usize,
    slots: Box<[GrainSlot]>,
    gain: AtomicU32,
    pan: AtomicU32,
    releasing: AtomicBool,
}

impl SpeakerOutput {
    pub fn new(index: usize, slot_count: usize, slot_capacity: usize) -> Self {
        Self {
            index,
            slots: (0..slot_count).map(|_| GrainSlot::new(slot_capacity)).collect(),
            gain: AtomicU32::new(1.0_f32.to_bits()),
            pan: AtomicU32::new(0.0_f32.to_bits()),
            releasing: AtomicBool::new(false),
        }
    }

    /// Index of the speaker in the speaker pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn slots(&self) -> &[GrainSlot] {
        &self.slots
    }

    /// Number of slots which currently play a grain.
    pub fn playing_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_playing()).count()
    }

    /// Number of free slots.
    pub fn pooled_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_pooled()).count()
    }

    /// Ratio of playing slots (0.0 - 1.0).
    pub fn load(&self) -> f32 {
        if self.slots.is_empty() {
            1.0
        } else {
            self.playing_count() as f32 / self.slots.len() as f32
        }
    }

    /// Publish a grain in the first free slot. Returns false when all slots are playing.
    pub fn publish(&self, samples: &[f32], dsp_start: SampleTime) -> bool {
        self.slots
            .iter()
            .find(|slot| slot.is_pooled())
            .is_some_and(|slot| slot.publish(samples, dsp_start))
    }

    /// Stop all playing grains. Must only be called from the audio thread.
    pub fn stop_all(&self) {
        self.slots.iter().for_each(GrainSlot::stop);
    }

    /// True while a removal of this output is queued but not yet processed by the mixer.
    pub fn is_releasing(&self) -> bool {
        self.releasing.load(Ordering::Acquire)
    }

    /// Mark the output as releasing. Must only be called from the main thread, right before
    /// the removal gets queued.
    pub fn begin_release(&self) {
        self.releasing.store(true, Ordering::Release);
    }

    /// Undo `begin_release` when the removal could not be queued. Must only be called from the
    /// main thread.
    pub fn cancel_release(&self) {
        self.releasing.store(false, Ordering::Release);
    }

    /// Stop all grains and acknowledge a queued removal. Must only be called from the audio
    /// thread.
    pub fn finish_release(&self) {
        self.stop_all();
        self.releasing.store(false, Ordering::Release);
    }

    /// Mix all playing grains into the given mono buffer. Returns the number of grains which
    /// are still playing afterwards.
    pub fn render(&self, output: &mut [f32], block_start: SampleTime) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.render(output, block_start))
            .count()
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn pan(&self) -> f32 {
        f32::from_bits(self.pan.load(Ordering::Relaxed))
    }

    pub fn set_pan(&self, pan: f32) {
        self.pan.store(pan.clamp(-1.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_handover() {
        let slot = GrainSlot::new(4);
        assert!(slot.is_pooled());
        assert!(slot.publish(&[1.0, 2.0, 3.0], 10));
        assert!(slot.is_playing());
        // a playing slot can't be overwritten
        assert!(!slot.publish(&[4.0], 10));

        // block before the grain's start
        let mut output = [0.0; 4];
        assert!(slot.render(&mut output, 0));
        assert_eq!(output, [0.0; 4]);

        // sample accurate start within the block
        let mut output = [0.0; 4];
        assert!(slot.render(&mut output, 8));
        assert_eq!(output, [0.0, 0.0, 1.0, 2.0]);
        assert_eq!(slot.playhead(), 2);
        assert_eq!(slot.size(), 3);
        assert!((slot.playhead_normalised() - 2.0 / 3.0).abs() < 1e-6);

        let mut output = [0.0; 4];
        assert!(!slot.render(&mut output, 12));
        assert_eq!(output, [3.0, 0.0, 0.0, 0.0]);
        assert!(slot.is_pooled());
    }

    #[test]
    fn late_grains() {
        let slot = GrainSlot::new(4);
        assert!(slot.publish(&[1.0, 1.0], 0));
        let mut output = [0.0; 4];
        assert!(!slot.render(&mut output, 100));
        assert_eq!(output, [1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn slot_conservation() {
        let output = SpeakerOutput::new(0, 8, 16);
        let total = output.slots().len();
        for n in 0..12 {
            let published = output.publish(&[0.5; 6], (n % 3) as SampleTime);
            assert_eq!(published, n < total);
            assert_eq!(output.playing_count() + output.pooled_count(), total);
        }
        assert_eq!(output.load(), 1.0);

        let mut buffer = [0.0; 4];
        let mut block_start = 0;
        loop {
            buffer.fill(0.0);
            let playing = output.render(&mut buffer, block_start);
            assert_eq!(output.playing_count() + output.pooled_count(), total);
            assert_eq!(output.playing_count(), playing);
            if playing == 0 {
                break;
            }
            block_start += buffer.len() as SampleTime;
        }
        assert_eq!(output.pooled_count(), total);
        assert_eq!(output.load(), 0.0);
    }

    #[test]
    fn stopped_slots() {
        let output = SpeakerOutput::new(0, 2, 4);
        assert!(output.publish(&[1.0; 4], 0));
        assert!(output.publish(&[1.0; 4], 0));
        output.stop_all();
        assert_eq!(output.pooled_count(), 2);
        let mut buffer = [0.0; 4];
        assert_eq!(output.render(&mut buffer, 0), 0);
        assert_eq!(buffer, [0.0; 4]);
    }

    #[test]
    fn release_handshake() {
        let output = SpeakerOutput::new(0, 2, 4);
        assert!(!output.is_releasing());
        assert!(output.publish(&[1.0; 4], 0));
        output.begin_release();
        assert!(output.is_releasing());
        output.finish_release();
        assert!(!output.is_releasing());
        assert_eq!(output.pooled_count(), 2);
    }

    #[test]
    fn gain_and_pan() {
        let output = SpeakerOutput::new(3, 1, 1);
        assert_eq!(output.index(), 3);
        output.set_gain(0.25);
        output.set_pan(-4.0);
        assert_eq!(output.gain(), 0.25);
        assert_eq!(output.pan(), -1.0);
    }
}
