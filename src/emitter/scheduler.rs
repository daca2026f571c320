use rand::Rng;

use crate::{
    clip::AudioClip,
    clock::FrameTiming,
    grain::{EmitterId, GrainBufferPool, GrainDescriptor, GrainRecord, HostId},
    modulation::ModulationContext,
    utils::time::{ms_to_samples, SampleTime},
    Error,
};

use super::{Burst, Emitter, EmitterKind, EmitterState, EvaluatedParameters, PlaybackCondition};

// -------------------------------------------------------------------------------------------------

/// Per emitter inputs for one scheduling pass.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerContext<'a> {
    pub timing: &'a FrameTiming,
    /// Modulation sources of the emitter's host. The primary actor also drives the
    /// emitter's playback condition.
    pub modulation: ModulationContext<'a>,
    /// The emitter's clip, if it exists in the clip library.
    pub clip: Option<&'a AudioClip>,
    pub host: HostId,
    pub emitter: EmitterId,
    /// Index of the speaker the host is attached to.
    pub speaker: Option<usize>,
}

// -------------------------------------------------------------------------------------------------

/// Distance between two grains with the given density in grains per second.
fn grain_spacing(density: f32, sample_rate: u32) -> SampleTime {
    let density = density.max(f32::EPSILON) as f64;
    (sample_rate as f64 / density).round().max(1.0) as SampleTime
}

// -------------------------------------------------------------------------------------------------

impl Emitter {
    /// Schedule all grains which start within the given frame's scheduling window and push
    /// them, processed by the emitter's DSP chain, into `grains`.
    ///
    /// Returns the number of scheduled grains.
    pub fn schedule<R: Rng>(
        &mut self,
        context: &SchedulerContext,
        rng: &mut R,
        buffers: &mut GrainBufferPool,
        grains: &mut Vec<GrainRecord>,
    ) -> usize {
        let Some(clip) = self.checked_clip(context) else {
            self.state = EmitterState::Idle;
            return 0;
        };
        self.dsp_chain.prepare(context.timing.sample_rate);

        let (condition_met, triggered) = self.update_condition(context.modulation.primary);
        let count = if self.kind.is_volatile() {
            self.schedule_burst(clip, context, triggered, rng, buffers, grains)
        } else {
            self.schedule_stable(clip, context, condition_met, rng, buffers, grains)
        };
        if count > 0 {
            log::trace!(
                "Emitter #{} of host #{} scheduled {count} grains",
                context.emitter,
                context.host
            );
        }
        count
    }

    /// Resolve the emitter's clip, logging missing or empty clips once.
    fn checked_clip<'a>(&mut self, context: &SchedulerContext<'a>) -> Option<&'a AudioClip> {
        let error = match context.clip {
            None => Error::ClipNotFound(self.clip),
            Some(clip) if clip.is_empty() => Error::EmptyClip(self.clip),
            Some(clip) => {
                self.clip_error_logged = false;
                return Some(clip);
            }
        };
        if !self.clip_error_logged {
            log::error!(
                "Emitter #{} of host #{} can't play: {error}",
                context.emitter,
                context.host
            );
            self.clip_error_logged = true;
        }
        None
    }

    fn schedule_stable<R: Rng>(
        &mut self,
        clip: &AudioClip,
        context: &SchedulerContext,
        condition_met: bool,
        rng: &mut R,
        buffers: &mut GrainBufferPool,
        grains: &mut Vec<GrainRecord>,
    ) -> usize {
        let timing = context.timing;
        if !condition_met {
            self.state = EmitterState::Idle;
            self.next_grain_sample = None;
            return 0;
        }

        // continue the previous grain sequence, unless it lags behind by more than twice
        // the discard window
        let discard_window = timing.frame_start_sample - timing.discard_threshold_sample;
        let resync_threshold = timing.discard_threshold_sample.saturating_sub(discard_window);
        let mut next_grain_sample = match self.next_grain_sample {
            Some(next) if next >= resync_threshold => next,
            _ => timing.next_frame_start_sample,
        };

        let parameters = self.parameters.update(&context.modulation);
        let mut count = 0;
        while next_grain_sample < timing.horizon_sample {
            self.emit_grain(
                clip,
                &parameters,
                0.0,
                next_grain_sample,
                context,
                rng,
                buffers,
                grains,
            );
            let density = parameters.density.value_at(0.0, rng);
            next_grain_sample += grain_spacing(density, timing.sample_rate);
            count += 1;
        }
        self.next_grain_sample = Some(next_grain_sample);
        self.state = if count > 0 {
            EmitterState::Emitting
        } else {
            EmitterState::Ready
        };
        count
    }

    fn schedule_burst<R: Rng>(
        &mut self,
        clip: &AudioClip,
        context: &SchedulerContext,
        triggered: bool,
        rng: &mut R,
        buffers: &mut GrainBufferPool,
        grains: &mut Vec<GrainRecord>,
    ) -> usize {
        let timing = context.timing;
        let EmitterKind::Volatile { length, burst } = &mut self.kind else {
            return 0;
        };

        if triggered {
            // a new trigger supersedes a running burst
            let length_ms = length.update(&context.modulation).value_at(0.0, rng);
            let jitter = if timing.burst_jitter_range_samples > 0 {
                rng.random_range(0..timing.burst_jitter_range_samples)
            } else {
                0
            };
            let collision = match self.condition {
                PlaybackCondition::OnCollision | PlaybackCondition::Contact => context
                    .modulation
                    .primary
                    .and_then(|actor| actor.last_collision),
                _ => None,
            };
            *burst = Some(Burst {
                start_sample: timing.next_frame_start_sample + jitter,
                length_samples: ms_to_samples(length_ms, timing.sample_rate),
                next_offset: 0,
                collision,
                grain_count: 0,
            });
        }

        let Some(mut current) = burst.take() else {
            self.state = EmitterState::Idle;
            return 0;
        };

        // modulate with the burst's collision rather than the actor's latest one
        let collision = current.collision;
        let modulation = ModulationContext {
            collision: collision.as_ref().or(context.modulation.collision),
            ..context.modulation
        };
        let parameters = self.parameters.update(&modulation);

        let mut count = 0;
        while !current.is_finished() {
            let dsp_start = current.start_sample + current.next_offset;
            if dsp_start >= timing.horizon_sample {
                break;
            }
            let position = current.progress();
            self.emit_grain(
                clip,
                &parameters,
                position,
                dsp_start,
                context,
                rng,
                buffers,
                grains,
            );
            let density = parameters.density.value_at(position, rng);
            current.next_offset += grain_spacing(density, timing.sample_rate);
            current.grain_count += 1;
            count += 1;
        }

        if current.is_finished() {
            log::debug!(
                "Burst of emitter #{} finished after {} grains",
                context.emitter,
                current.grain_count
            );
            self.state = EmitterState::Idle;
        } else {
            self.state = if count > 0 {
                EmitterState::Emitting
            } else {
                EmitterState::Ready
            };
            if let EmitterKind::Volatile { burst, .. } = &mut self.kind {
                *burst = Some(current);
            }
        }
        count
    }

    /// Create, fill and process a single grain.
    #[allow(clippy::too_many_arguments)]
    fn emit_grain<R: Rng>(
        &mut self,
        clip: &AudioClip,
        parameters: &EvaluatedParameters,
        position: f32,
        dsp_start: SampleTime,
        context: &SchedulerContext,
        rng: &mut R,
        buffers: &mut GrainBufferPool,
        grains: &mut Vec<GrainRecord>,
    ) {
        let sample_rate = context.timing.sample_rate;
        let volume = parameters.volume.value_at(position, rng);
        let playhead = parameters.playhead.value_at(position, rng);
        let duration_ms = parameters.duration.value_at(position, rng);
        let transpose = parameters.transpose.value_at(position, rng);

        let pitch = 2.0_f64.powf(transpose as f64 / 12.0) * clip.sample_rate() as f64
            / sample_rate as f64;
        let clip_len = clip.sample_count();
        let output_len = (ms_to_samples(duration_ms, sample_rate) as usize).max(1);
        let sample_count = ((output_len as f64 * pitch).round() as usize).clamp(1, clip_len);
        let max_start = clip_len - sample_count;
        let sample_start = ((playhead as f64 * max_start as f64).round() as usize).min(max_start);
        // grains never read beyond the clip's end
        let readable = ((clip_len - sample_start) as f64 / pitch).floor() as usize;
        let output_len = output_len.min(readable.max(1));

        let dsp_tail = self.dsp_chain.total_tail();
        let mut samples = buffers.acquire(output_len + dsp_tail);
        for (index, sample) in samples[..output_len].iter_mut().enumerate() {
            *sample = clip.read(sample_start as f64 + index as f64 * pitch) * volume;
        }
        self.window.apply(&mut samples[..output_len]);
        self.dsp_chain.process(&mut samples, dsp_start);

        grains.push(GrainRecord {
            descriptor: GrainDescriptor {
                host: context.host,
                emitter: context.emitter,
                clip: self.clip,
                sample_start,
                sample_count,
                output_len,
                playhead,
                pitch: pitch as f32,
                volume,
                speaker: context.speaker,
                dsp_start,
                dsp_tail,
            },
            samples,
        });
    }
}

// -------------------------------------------------------------------------------------------------
