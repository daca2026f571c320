//! Oscillators for modulation.

use std::f64::consts::TAU;

// -------------------------------------------------------------------------------------------------

/// Waveform types for LFO oscillators.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, strum::Display, strum::EnumString, strum::VariantNames,
)]
pub enum LfoWaveform {
    #[default]
    Sine,
    Triangle,
}

// -------------------------------------------------------------------------------------------------

/// Simple non bandlimited oscillator which can be used as LFO in effects.
#[derive(Debug, Default, Clone)]
pub struct Lfo {
    phase: f64,
    phase_inc: f64,
    waveform: LfoWaveform,
}

impl Lfo {
    pub fn new(sample_rate: u32, rate: f64, waveform: LfoWaveform) -> Self {
        let phase_inc = TAU * rate / sample_rate.max(1) as f64;
        Self {
            phase: 0.0,
            phase_inc,
            waveform,
        }
    }

    /// Current phase in radians.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Set or reset the LFO's phase in radians.
    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase.rem_euclid(TAU);
    }

    /// Set the phase the LFO would have at the given absolute sample time, when it
    /// started running at sample time 0.
    pub fn sync_to_sample_time(&mut self, sample_time: u64) {
        self.set_phase(sample_time as f64 * self.phase_inc);
    }

    /// Advances phase and returns new value in range [-1, 1].
    pub fn next(&mut self) -> f64 {
        let val = match self.waveform {
            LfoWaveform::Sine => self.phase.sin(),
            LfoWaveform::Triangle => {
                let normalized_phase = self.phase / TAU;
                if normalized_phase < 0.5 {
                    4.0 * normalized_phase - 1.0
                } else {
                    -4.0 * normalized_phase + 3.0
                }
            }
        };
        self.phase += self.phase_inc;
        if self.phase >= TAU {
            self.phase = self.phase.rem_euclid(TAU);
        }
        val
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_sync() {
        let mut running = Lfo::new(1000, 3.0, LfoWaveform::Sine);
        for _ in 0..250 {
            let _ = running.next();
        }
        let mut synced = Lfo::new(1000, 3.0, LfoWaveform::Sine);
        synced.sync_to_sample_time(250);
        assert!((running.next() - synced.next()).abs() < 1e-9);
    }

    #[test]
    fn value_range() {
        for waveform in [LfoWaveform::Sine, LfoWaveform::Triangle] {
            let mut lfo = Lfo::new(44100, 7.0, waveform);
            for _ in 0..44100 {
                let value = lfo.next();
                assert!((-1.0..=1.0).contains(&value));
            }
        }
    }
}
