use std::{
    fs::File,
    io::BufWriter,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{
    error::Error,
    mixer::SpeakerMixer,
    output::OutputDevice,
    utils::time::{duration_to_samples, samples_to_duration},
};

// -------------------------------------------------------------------------------------------------

/// Writes mixer output blocks into a 32-bit float wave file.
///
/// Can be used directly to render a scene offline: update the engine, then render the frame's
/// samples, and repeat.
pub struct WavRenderer {
    writer: WavWriter<BufWriter<File>>,
    sample_rate: u32,
    channel_count: usize,
    buffer: Vec<f32>,
    frames_written: u64,
}

impl WavRenderer {
    pub fn create<P: AsRef<Path>>(
        path: P,
        sample_rate: u32,
        channel_count: usize,
    ) -> Result<Self, Error> {
        if channel_count == 0 || channel_count > u16::MAX as usize {
            return Err(Error::ParameterError(format!(
                "Invalid wav output channel count: {channel_count}"
            )));
        }
        let spec = WavSpec {
            channels: channel_count as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(path, spec)?;
        Ok(Self {
            writer,
            sample_rate,
            channel_count,
            buffer: Vec::new(),
            frames_written: 0,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Number of sample frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Duration of the audio written so far.
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.frames_written, self.sample_rate)
    }

    /// Render the given number of frames from the mixer and append them to the file.
    pub fn render(&mut self, mixer: &mut SpeakerMixer, frame_count: usize) -> Result<(), Error> {
        self.buffer.resize(frame_count * self.channel_count, 0.0);
        mixer.write(&mut self.buffer, self.channel_count);
        for sample in &self.buffer {
            self.writer.write_sample(*sample)?;
        }
        self.frames_written += frame_count as u64;
        Ok(())
    }

    /// Flush and close the file.
    pub fn finalize(self) -> Result<(), Error> {
        self.writer.finalize()?;
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Realtime paced wave file output.
///
/// Renders the mixer in a background thread at the pace of a real audio device, so the engine
/// can be driven by a regular frame loop without a sound card.
pub struct WavOutput {
    stream: Arc<Mutex<WavStream>>,
    stream_thread: Option<JoinHandle<()>>,
    channel_count: usize,
    sample_rate: u32,
}

impl WavOutput {
    /// Frames rendered per block.
    const BLOCK_FRAMES: usize = 512;

    /// Create the file and start rendering the mixer. Rendering stops after the given
    /// duration, or runs until the output gets closed when no duration is set.
    pub fn open<P: AsRef<Path>>(
        path: P,
        mixer: SpeakerMixer,
        channel_count: usize,
        duration: Option<Duration>,
    ) -> Result<Self, Error> {
        let sample_rate = mixer.sample_rate();
        let renderer = WavRenderer::create(path, sample_rate, channel_count)?;
        let duration_frames = duration.map(|duration| duration_to_samples(duration, sample_rate));
        let stream = Arc::new(Mutex::new(WavStream {
            renderer: Some(renderer),
            mixer,
            volume: 1.0,
            running: true,
            duration_frames,
            resume_frame: 0,
            resume_time: Instant::now(),
        }));

        let stream_thread = thread::Builder::new().name("wav_output".to_string()).spawn({
            let stream = Arc::clone(&stream);
            move || Self::run(&stream, sample_rate)
        })?;

        Ok(Self {
            stream,
            stream_thread: Some(stream_thread),
            channel_count,
            sample_rate,
        })
    }

    fn run(stream: &Mutex<WavStream>, sample_rate: u32) {
        if let Err(err) = audio_thread_priority::promote_current_thread_to_real_time(
            Self::BLOCK_FRAMES as u32,
            sample_rate,
        ) {
            log::warn!("Failed to promote wav output thread to real-time priority: {err}");
        }
        loop {
            {
                let mut stream = lock(stream);
                if stream.is_finished() {
                    break;
                }
                if let Err(err) = stream.process(sample_rate) {
                    log::error!("Failed to write wav output: {err}");
                    stream.finish();
                    break;
                }
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// true when the file got finalized, either because the duration elapsed or because
    /// writing failed.
    pub fn is_finished(&self) -> bool {
        lock(&self.stream).is_finished()
    }
}

impl OutputDevice for WavOutput {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn sample_position(&self) -> u64 {
        lock(&self.stream).frames_written()
    }

    fn volume(&self) -> f32 {
        lock(&self.stream).volume
    }

    fn set_volume(&mut self, volume: f32) {
        let mut stream = lock(&self.stream);
        stream.volume = volume;
        stream.mixer.set_volume(volume);
    }

    fn is_running(&self) -> bool {
        let stream = lock(&self.stream);
        stream.running && !stream.is_finished()
    }

    fn pause(&mut self) {
        lock(&self.stream).running = false;
    }

    fn resume(&mut self) {
        let mut stream = lock(&self.stream);
        if !stream.running {
            stream.running = true;
            stream.resume_frame = stream.frames_written();
            stream.resume_time = Instant::now();
        }
    }

    fn close(&mut self) {
        if let Some(thread) = self.stream_thread.take() {
            lock(&self.stream).finish();
            if thread.join().is_err() {
                log::error!("Wav output thread panicked");
            }
        }
    }
}

impl Drop for WavOutput {
    fn drop(&mut self) {
        self.close();
    }
}

// -------------------------------------------------------------------------------------------------

fn lock(stream: &Mutex<WavStream>) -> MutexGuard<'_, WavStream> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}

// -------------------------------------------------------------------------------------------------

struct WavStream {
    renderer: Option<WavRenderer>,
    mixer: SpeakerMixer,
    volume: f32,
    running: bool,
    duration_frames: Option<u64>,
    resume_frame: u64,
    resume_time: Instant,
}

impl WavStream {
    fn is_finished(&self) -> bool {
        self.renderer.is_none()
    }

    fn frames_written(&self) -> u64 {
        self.renderer
            .as_ref()
            .map_or(self.resume_frame, WavRenderer::frames_written)
    }

    /// Render all blocks which are due since the last resume.
    fn process(&mut self, sample_rate: u32) -> Result<(), Error> {
        if !self.running {
            return Ok(());
        }
        let due_frame = self.resume_frame
            + (self.resume_time.elapsed().as_secs_f64() * sample_rate as f64) as u64;
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        while renderer.frames_written() + WavOutput::BLOCK_FRAMES as u64 <= due_frame {
            let mut frames = WavOutput::BLOCK_FRAMES;
            if let Some(duration_frames) = self.duration_frames {
                let remaining = duration_frames.saturating_sub(renderer.frames_written());
                frames = frames.min(remaining as usize);
            }
            if frames == 0 {
                break;
            }
            renderer.render(&mut self.mixer, frames)?;
        }
        let reached_end = self
            .duration_frames
            .is_some_and(|duration| renderer.frames_written() >= duration);
        if reached_end {
            log::info!("Wav output reached its duration");
            self.finish();
        }
        Ok(())
    }

    /// Finalize the file. Later calls are no-ops.
    fn finish(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            self.resume_frame = renderer.frames_written();
            if let Err(err) = renderer.finalize() {
                log::error!("Failed to finalize wav output: {err}");
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::{
        Actor, AudioClip, Emitter, EmitterParameters, Engine, EngineConfig, PlaybackCondition,
    };

    fn test_engine() -> Result<(Engine, SpeakerMixer), Error> {
        let (mut engine, mixer) = Engine::new(EngineConfig::default())?;
        let samples = (0..44100)
            .map(|i| (i as f32 * 220.0 * std::f32::consts::TAU / 44100.0).sin())
            .collect();
        let clip = engine.add_clip(AudioClip::from_mono(samples, 44100)?);
        let host = engine.add_host(Actor::at_position(Vec3::new(1.0, 0.0, 0.0)));
        let parameters = EmitterParameters::new(1.0, 0.5, 40.0, 50.0, 0.0);
        engine.add_emitter(
            host,
            Emitter::stable(clip, PlaybackCondition::Constant, parameters),
        )?;
        Ok((engine, mixer))
    }

    #[test]
    fn render_engine_frames() -> Result<(), Error> {
        const FRAMES: usize = 20;
        const FRAME_SAMPLES: usize = 735;

        let (mut engine, mut mixer) = test_engine()?;
        let path = std::env::temp_dir().join(format!(
            "grainfield_render_engine_frames_{}.wav",
            std::process::id()
        ));
        let mut renderer = WavRenderer::create(&path, 44100, 2)?;
        assert_eq!(renderer.channel_count(), 2);
        for _ in 0..FRAMES {
            engine.update(1.0 / 60.0);
            renderer.render(&mut mixer, FRAME_SAMPLES)?;
        }
        assert_eq!(renderer.frames_written(), (FRAMES * FRAME_SAMPLES) as u64);
        // 20 frames at 60 fps
        assert!((renderer.duration().as_secs_f64() - 1.0 / 3.0).abs() < 1e-6);
        renderer.finalize()?;

        let mut reader = hound::WavReader::open(&path)?;
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.sample_format, SampleFormat::Float);
        assert_eq!(reader.duration() as usize, FRAMES * FRAME_SAMPLES);
        let samples = reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?;
        let _ = std::fs::remove_file(&path);

        assert_eq!(samples.len(), FRAMES * FRAME_SAMPLES * 2);
        assert!(samples.iter().all(|s| s.is_finite()));
        assert!(samples.iter().any(|s| s.abs() > 0.01));
        Ok(())
    }

    #[test]
    fn paced_output_stops_after_its_duration() -> Result<(), Error> {
        let (_engine, mixer) = test_engine()?;
        let path = std::env::temp_dir().join(format!(
            "grainfield_paced_output_{}.wav",
            std::process::id()
        ));
        let duration = Duration::from_millis(50);
        let mut output = WavOutput::open(&path, mixer, 2, Some(duration))?;
        assert_eq!(output.sample_rate(), 44100);
        let started = Instant::now();
        while !output.is_finished() && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(output.is_finished());
        assert!(!output.is_running());
        assert_eq!(output.sample_position(), duration_to_samples(duration, 44100));
        output.close();

        let reader = hound::WavReader::open(&path)?;
        assert_eq!(reader.duration() as u64, duration_to_samples(duration, 44100));
        let _ = std::fs::remove_file(&path);
        Ok(())
    }
}
