//! Hands scheduled grains over to their speakers, or discards them.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::{
    clock::FrameTiming,
    grain::{GrainBufferPool, GrainDescriptor, GrainEmittedEvent, GrainRecord},
    speaker::{Speaker, SpeakerPool},
    stats::{DiscardReason, GrainStatistics},
    utils::time::SampleTime,
};

// -------------------------------------------------------------------------------------------------

/// Resolve the target speaker of a grain, or the reason why the grain can't be played.
pub fn check_grain<'a>(
    grain: &GrainDescriptor,
    speakers: &'a SpeakerPool,
    timing: &FrameTiming,
) -> Result<&'a Speaker, DiscardReason> {
    let speaker = grain
        .speaker
        .and_then(|index| speakers.speaker_at(index))
        .ok_or(DiscardReason::NoSpeaker)?;
    if grain.dsp_start < timing.discard_threshold_sample {
        return Err(DiscardReason::Stale);
    }
    Ok(speaker)
}

// -------------------------------------------------------------------------------------------------

/// Distributes the grains of a frame to speaker slots and notifies a subscriber about played
/// grains.
///
/// Without a subscriber, or after the subscriber's receiver got dropped, no events are sent.
#[derive(Debug)]
pub struct GrainDistributor {
    events: Option<Sender<GrainEmittedEvent>>,
    event_queue_capacity: usize,
    events_overflowing: bool,
    dropped_events: u64,
}

impl GrainDistributor {
    pub fn new(event_queue_capacity: usize) -> Self {
        Self {
            events: None,
            event_queue_capacity,
            events_overflowing: false,
            dropped_events: 0,
        }
    }

    /// Create a new event queue and return its receiver. An earlier subscription gets
    /// disconnected.
    pub fn subscribe(&mut self) -> Receiver<GrainEmittedEvent> {
        let (sender, receiver) = bounded(self.event_queue_capacity);
        self.events = Some(sender);
        self.events_overflowing = false;
        receiver
    }

    /// True while events get sent to a subscriber.
    pub fn is_subscribed(&self) -> bool {
        self.events.is_some()
    }

    /// Number of grain events which got dropped because the subscriber's queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// Distribute all given grains and recycle their buffers. `current_sample` is the audio
    /// clock's position at the time of the distribution.
    pub fn distribute(
        &mut self,
        grains: &mut Vec<GrainRecord>,
        speakers: &SpeakerPool,
        timing: &FrameTiming,
        current_sample: SampleTime,
        stats: &mut GrainStatistics,
        buffers: &mut GrainBufferPool,
    ) {
        for grain in grains.drain(..) {
            let descriptor = grain.descriptor;
            match check_grain(&descriptor, speakers, timing) {
                Ok(speaker) if speaker.publish(&grain.samples, descriptor.dsp_start) => {
                    stats.record_delivered(&descriptor, current_sample, timing.sample_rate);
                    self.send_event(GrainEmittedEvent {
                        speaker: speaker.index(),
                        grain: descriptor,
                        current_sample,
                    });
                }
                Ok(_) => stats.record_discarded(DiscardReason::PoolFull),
                Err(reason) => stats.record_discarded(reason),
            }
            buffers.release(grain.samples);
        }
    }

    fn send_event(&mut self, event: GrainEmittedEvent) {
        let Some(events) = &self.events else {
            return;
        };
        match events.try_send(event) {
            Ok(()) => self.events_overflowing = false,
            Err(TrySendError::Full(_)) => {
                if !self.events_overflowing {
                    log::debug!("Grain event queue is full, dropping events");
                    self.events_overflowing = true;
                }
                self.dropped_events += 1;
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Grain event subscriber disconnected");
                self.events = None;
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use basedrop::Collector;
    use crossbeam_queue::ArrayQueue;
    use glam::Vec3;

    use super::*;
    use crate::config::EngineConfig;

    fn grain(speaker: Option<usize>, dsp_start: SampleTime) -> GrainRecord {
        GrainRecord {
            descriptor: GrainDescriptor {
                host: 0,
                emitter: 0,
                clip: 0,
                sample_start: 0,
                sample_count: 4,
                output_len: 4,
                playhead: 0.0,
                pitch: 1.0,
                volume: 1.0,
                speaker,
                dsp_start,
                dsp_tail: 0,
            },
            samples: vec![1.0; 4],
        }
    }

    fn test_setup(config: &EngineConfig) -> (Collector, SpeakerPool) {
        let collector = Collector::new();
        let queue = Arc::new(ArrayQueue::new(16));
        let mut pool = SpeakerPool::new(config, &collector.handle(), queue);
        assert!(pool.create_speaker(Vec3::ZERO).is_ok());
        (collector, pool)
    }

    #[test]
    fn discard_boundary() {
        let config = EngineConfig::default().with_discard_threshold(20.0);
        let (_collector, pool) = test_setup(&config);
        let timing = FrameTiming::new(&config, 44100, 735, 1.0 / 60.0);
        let threshold = timing.discard_threshold_sample;
        assert_eq!(threshold, 44100 - 882);

        let stale = grain(Some(0), threshold - 1);
        assert!(matches!(
            check_grain(&stale.descriptor, &pool, &timing),
            Err(DiscardReason::Stale)
        ));
        let accepted = grain(Some(0), threshold);
        assert!(check_grain(&accepted.descriptor, &pool, &timing).is_ok());

        // unknown and pooled speakers
        let missing = grain(Some(7), threshold);
        assert!(matches!(
            check_grain(&missing.descriptor, &pool, &timing),
            Err(DiscardReason::NoSpeaker)
        ));
        let missing = grain(Some(1), threshold);
        assert!(matches!(
            check_grain(&missing.descriptor, &pool, &timing),
            Err(DiscardReason::NoSpeaker)
        ));
    }

    #[test]
    fn distribute_grains() {
        let config = EngineConfig::default().with_grains_per_speaker(2);
        let (_collector, pool) = test_setup(&config);
        let timing = FrameTiming::new(&config, 44100, 735, 1.0 / 60.0);
        let mut distributor = GrainDistributor::new(1);
        let receiver = distributor.subscribe();
        let mut stats = GrainStatistics::new();
        let mut buffers = GrainBufferPool::new(8);

        let start = timing.next_frame_start_sample;
        let mut grains = vec![
            grain(Some(0), start),
            grain(None, start),
            grain(Some(0), 0),
            grain(Some(0), start + 10),
            // no more free slots
            grain(Some(0), start + 20),
        ];
        distributor.distribute(&mut grains, &pool, &timing, 44100, &mut stats, &mut buffers);
        stats.end_frame(1.0 / 60.0);

        assert!(grains.is_empty());
        assert_eq!(buffers.available(), 5);
        let frame = stats.last_frame();
        assert_eq!(frame.delivered, 2);
        assert_eq!(frame.discarded(DiscardReason::NoSpeaker), 1);
        assert_eq!(frame.discarded(DiscardReason::Stale), 1);
        assert_eq!(frame.discarded(DiscardReason::PoolFull), 1);
        assert_eq!(pool.speaker_at(0).map(|s| s.playing_count()), Some(2));

        // the event queue only holds a single event
        let event = receiver.try_recv().ok();
        assert_eq!(event.map(|e| e.speaker), Some(0));
        assert_eq!(event.map(|e| e.grain.dsp_start), Some(start));
        assert_eq!(event.map(|e| e.current_sample), Some(44100));
        assert_eq!(distributor.dropped_events(), 1);
    }

    #[test]
    fn events_without_subscriber() {
        let config = EngineConfig::default();
        let (_collector, pool) = test_setup(&config);
        let timing = FrameTiming::new(&config, 44100, 735, 1.0 / 60.0);
        let mut distributor = GrainDistributor::new(1);
        let mut stats = GrainStatistics::new();
        let mut buffers = GrainBufferPool::new(8);
        let start = timing.next_frame_start_sample;

        // nothing gets queued or counted as dropped without a subscriber
        assert!(!distributor.is_subscribed());
        let mut grains = vec![grain(Some(0), start), grain(Some(0), start + 1)];
        distributor.distribute(&mut grains, &pool, &timing, 44100, &mut stats, &mut buffers);
        assert_eq!(stats.total_delivered(), 2);
        assert_eq!(distributor.dropped_events(), 0);

        // dropping the receiver ends the subscription
        let receiver = distributor.subscribe();
        assert!(distributor.is_subscribed());
        drop(receiver);
        let mut grains = vec![grain(Some(0), start + 2)];
        distributor.distribute(&mut grains, &pool, &timing, 44100, &mut stats, &mut buffers);
        assert!(!distributor.is_subscribed());
        assert_eq!(distributor.dropped_events(), 0);
    }
}
