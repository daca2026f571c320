pub mod buffer;
pub mod dsp;
pub mod smoothed;
pub mod time;

// -------------------------------------------------------------------------------------------------

/// Convert a frequency on the mel scale to Hz.
pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Convert a frequency in Hz to the mel scale.
pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

// -------------------------------------------------------------------------------------------------

/// Constant power panning factors for the left and right channel of the given panning value
/// in range [-1, 1].
pub fn panning_factors(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
    let (sin, cos) = angle.sin_cos();
    // normalize so that center panning is unity gain
    (
        cos * std::f32::consts::SQRT_2,
        sin * std::f32::consts::SQRT_2,
    )
}

// -------------------------------------------------------------------------------------------------
