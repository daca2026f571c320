use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

#[cfg(feature = "assert-allocs")]
use assert_no_alloc::*;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    StreamConfig,
};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::{
    error::Error,
    mixer::SpeakerMixer,
    output::{AudioHostId, OutputDevice},
};

// -------------------------------------------------------------------------------------------------

const PREFERRED_SAMPLE_FORMAT: cpal::SampleFormat = cpal::SampleFormat::F32;
const PREFERRED_CHANNELS: cpal::ChannelCount = 2;
const PREFERRED_BUFFER_SIZE: cpal::BufferSize = if cfg!(debug_assertions) {
    cpal::BufferSize::Default
} else {
    cpal::BufferSize::Fixed(1024)
};

// -------------------------------------------------------------------------------------------------

/// Realtime audio output via cpal.
///
/// The cpal stream lives in its own thread. The stream's callback owns the mixer and
/// receives volume and pause messages from this controller.
pub struct CpalOutput {
    channel_count: usize,
    sample_rate: u32,
    volume: f32,
    running: Arc<AtomicBool>,
    playback_pos: Arc<AtomicU64>,
    callback_send: Sender<CallbackMsg>,
    stream_send: Sender<StreamMsg>,
    stream_thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the system's default output device and start playing the given mixer.
    pub fn open(mixer: SpeakerMixer) -> Result<Self, Error> {
        Self::open_with_host(AudioHostId::Default, mixer)
    }

    /// Open the default output device of the given audio host and start playing the given
    /// mixer. The device must support the mixer's sample rate.
    pub fn open_with_host(host_id: AudioHostId, mixer: SpeakerMixer) -> Result<Self, Error> {
        let host = match host_id {
            AudioHostId::Default => cpal::default_host(),
            #[cfg(target_os = "windows")]
            AudioHostId::Asio => cpal::host_from_id(cpal::HostId::Asio)?,
            #[cfg(target_os = "windows")]
            AudioHostId::Wasapi => cpal::host_from_id(cpal::HostId::Wasapi)?,
            #[cfg(target_os = "linux")]
            AudioHostId::Alsa => cpal::host_from_id(cpal::HostId::Alsa)?,
            #[cfg(target_os = "linux")]
            AudioHostId::Jack => cpal::host_from_id(cpal::HostId::Jack)?,
        };

        let device = host
            .default_output_device()
            .ok_or(cpal::DefaultStreamConfigError::DeviceNotAvailable)?;
        if let Ok(name) = device.name() {
            log::info!("Using audio device: {name}");
        }

        let supported = Self::preferred_output_config(&device, mixer.sample_rate())?;
        if supported.sample_rate().0 != mixer.sample_rate() {
            return Err(Error::ParameterError(format!(
                "Audio device does not support the engine's sample rate of {} Hz",
                mixer.sample_rate()
            )));
        }
        let config = StreamConfig {
            buffer_size: PREFERRED_BUFFER_SIZE,
            ..supported.config()
        };
        let channel_count = config.channels as usize;
        let sample_rate = config.sample_rate.0;

        let running = Arc::new(AtomicBool::new(true));
        let playback_pos = Arc::new(AtomicU64::new(0));
        let (callback_send, callback_recv) = bounded(16);
        let (stream_send, stream_recv) = unbounded();
        let (ready_send, ready_recv) = bounded(1);

        let stream_thread = thread::Builder::new().name("audio_output".to_string()).spawn({
            let callback = StreamCallback {
                callback_recv,
                mixer,
                channel_count,
                playback_pos: Arc::clone(&playback_pos),
                running: Arc::clone(&running),
            };
            move || match Stream::open(device, config, callback) {
                Ok(stream) => {
                    let _ = ready_send.send(Ok(()));
                    stream.run(stream_recv);
                }
                Err(err) => {
                    let _ = ready_send.send(Err(err));
                }
            }
        })?;
        ready_recv
            .recv()
            .map_err(|err| Error::SendError(err.to_string()))??;

        Ok(Self {
            channel_count,
            sample_rate,
            volume: 1.0,
            running,
            playback_pos,
            callback_send,
            stream_send,
            stream_thread: Some(stream_thread),
        })
    }

    fn preferred_output_config(
        device: &cpal::Device,
        sample_rate: u32,
    ) -> Result<cpal::SupportedStreamConfig, Error> {
        let sample_rate = cpal::SampleRate(sample_rate);
        for s in device.supported_output_configs()? {
            let rates = s.min_sample_rate()..=s.max_sample_rate();
            if s.channels() == PREFERRED_CHANNELS
                && s.sample_format() == PREFERRED_SAMPLE_FORMAT
                && rates.contains(&sample_rate)
            {
                return Ok(s.with_sample_rate(sample_rate));
            }
        }
        Ok(device.default_output_config()?)
    }

    fn send_to_callback(&self, msg: CallbackMsg) {
        if self.callback_send.try_send(msg).is_err() {
            log::error!("Output stream callback is not responding");
        }
    }

    fn send_to_stream(&self, msg: StreamMsg) {
        if self.stream_send.send(msg).is_err() {
            log::error!("Output stream thread is dead");
        }
    }
}

impl OutputDevice for CpalOutput {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn sample_position(&self) -> u64 {
        self.playback_pos.load(Ordering::Relaxed)
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.send_to_callback(CallbackMsg::SetVolume(volume));
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn pause(&mut self) {
        self.send_to_stream(StreamMsg::Pause);
        self.send_to_callback(CallbackMsg::Pause);
    }

    fn resume(&mut self) {
        self.send_to_stream(StreamMsg::Resume);
        self.send_to_callback(CallbackMsg::Resume);
    }

    fn close(&mut self) {
        if let Some(thread) = self.stream_thread.take() {
            self.send_to_stream(StreamMsg::Close);
            if thread.join().is_err() {
                log::error!("Output stream thread panicked");
            }
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

// -------------------------------------------------------------------------------------------------

enum StreamMsg {
    Pause,
    Resume,
    Close,
}

enum CallbackMsg {
    SetVolume(f32),
    Pause,
    Resume,
}

// -------------------------------------------------------------------------------------------------

struct Stream {
    stream: cpal::Stream,
    _device: cpal::Device,
}

impl Stream {
    fn open(
        device: cpal::Device,
        config: StreamConfig,
        mut callback: StreamCallback,
    ) -> Result<Self, Error> {
        log::info!("Opening output stream: {config:?}");
        let stream = device.build_output_stream(
            &config,
            move |output, _| {
                callback.write_samples(output);
            },
            |err| {
                log::error!("Audio output error: {err}");
            },
            None,
        )?;
        stream.play()?;
        Ok(Self {
            stream,
            _device: device,
        })
    }

    fn run(self, messages: Receiver<StreamMsg>) {
        while let Ok(msg) = messages.recv() {
            match msg {
                StreamMsg::Pause => {
                    log::debug!("Pausing audio output stream");
                    if let Err(err) = self.stream.pause() {
                        log::error!("Failed to pause stream: {err}");
                    }
                }
                StreamMsg::Resume => {
                    log::debug!("Resuming audio output stream");
                    if let Err(err) = self.stream.play() {
                        log::error!("Failed to start stream: {err}");
                    }
                }
                StreamMsg::Close => break,
            }
        }
        log::debug!("Closing audio output stream");
        let _ = self.stream.pause();
    }
}

// -------------------------------------------------------------------------------------------------

struct StreamCallback {
    callback_recv: Receiver<CallbackMsg>,
    mixer: SpeakerMixer,
    channel_count: usize,
    playback_pos: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl StreamCallback {
    fn write_samples(&mut self, output: &mut [f32]) {
        while let Ok(msg) = self.callback_recv.try_recv() {
            match msg {
                CallbackMsg::SetVolume(volume) => self.mixer.set_volume(volume),
                CallbackMsg::Pause => self.running.store(false, Ordering::Relaxed),
                CallbackMsg::Resume => self.running.store(true, Ordering::Relaxed),
            }
        }

        if self.running.load(Ordering::Relaxed) {
            #[cfg(not(feature = "assert-allocs"))]
            self.mixer.write(output, self.channel_count);
            #[cfg(feature = "assert-allocs")]
            assert_no_alloc(|| self.mixer.write(output, self.channel_count));

            let frames = output.len() / self.channel_count.max(1);
            self.playback_pos
                .fetch_add(frames as u64, Ordering::Relaxed);
        } else {
            output.fill(0.0);
        }
    }
}

// -------------------------------------------------------------------------------------------------

impl From<cpal::HostUnavailable> for Error {
    fn from(err: cpal::HostUnavailable) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(err: cpal::DefaultStreamConfigError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(err: cpal::SupportedStreamConfigsError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::BuildStreamError> for Error {
    fn from(err: cpal::BuildStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::PlayStreamError> for Error {
    fn from(err: cpal::PlayStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::PauseStreamError> for Error {
    fn from(err: cpal::PauseStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}
