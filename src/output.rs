//! Audio outputs which drive a [`SpeakerMixer`](crate::SpeakerMixer).

#[cfg(feature = "cpal-output")]
pub mod cpal;
#[cfg(feature = "wav-output")]
pub mod wav;

/// The enabled realtime audio output type.
#[cfg(feature = "cpal-output")]
pub type DefaultOutputDevice = cpal::CpalOutput;

/// Available audio hosts for cpal output (platform specific)
#[cfg(feature = "cpal-output")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudioHostId {
    #[default]
    Default, // system default
    #[cfg(target_os = "windows")]
    Asio,
    #[cfg(target_os = "windows")]
    Wasapi,
    #[cfg(target_os = "linux")]
    Alsa,
    #[cfg(target_os = "linux")]
    Jack,
}

// -------------------------------------------------------------------------------------------------

/// Output device controller. The device owns the mixer and calls it from its audio thread.
pub trait OutputDevice {
    /// Actual device's output sample buffer channel count.
    fn channel_count(&self) -> usize;
    /// Actual device's output sample rate.
    fn sample_rate(&self) -> u32;
    /// Number of sample frames the device has written so far.
    fn sample_position(&self) -> u64;

    /// Get actual output volume.
    fn volume(&self) -> f32;
    /// Set a new output volume.
    fn set_volume(&mut self, volume: f32);

    /// true when the device is currently writing samples.
    fn is_running(&self) -> bool;
    /// Pause writing. The audio clock stops while paused.
    fn pause(&mut self);
    /// Resume from paused playback.
    fn resume(&mut self);

    /// Release the audio device.
    fn close(&mut self);
}
