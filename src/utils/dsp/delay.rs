//! Delay buffers to delay or lookup signals.

// -------------------------------------------------------------------------------------------------

/// Mono delay line with fractional delay time support, which operates on an externally owned
/// ring buffer.
///
/// The ring buffer usually is an emitter's persistent DSP tail, so the delay line state is
/// carried from one grain to the next. The write position is derived from absolute sample
/// time, so grains which overlap in time also overlap in the ring buffer.
#[derive(Debug)]
pub struct DelayLine<'a> {
    buffer: &'a mut [f32],
    write_pos: usize,
}

impl<'a> DelayLine<'a> {
    /// Create a new delay line on the given buffer, with the write position at the given
    /// absolute sample time.
    pub fn new(buffer: &'a mut [f32], sample_time: u64) -> Self {
        let write_pos = if buffer.is_empty() {
            0
        } else {
            (sample_time % buffer.len() as u64) as usize
        };
        Self { buffer, write_pos }
    }

    /// Max possible delay in samples.
    pub fn max_delay(&self) -> usize {
        self.buffer.len().saturating_sub(1)
    }

    /// Process and add a single new sample and return the delayed sample with the given
    /// feedback.
    pub fn process_sample(&mut self, input: f32, feedback: f32, delay_pos: f32) -> f32 {
        let len = self.buffer.len();
        if len < 2 {
            return input;
        }
        let delay_pos = delay_pos.clamp(0.0, (len - 1) as f32);

        let read_pos = self.write_pos as f32 - delay_pos;
        let read_pos_floor = read_pos.floor();
        let fraction = read_pos - read_pos_floor;

        let index1 = (read_pos_floor as isize).rem_euclid(len as isize) as usize;
        let index2 = (index1 + 1) % len;

        let val1 = self.buffer[index1];
        let val2 = self.buffer[index2];
        let output = val1 + (val2 - val1) * fraction;

        self.buffer[self.write_pos] = input + output * feedback;
        self.write_pos = (self.write_pos + 1) % len;

        output
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_delay() {
        let mut buffer = vec![0.0; 8];
        let mut delay = DelayLine::new(&mut buffer, 3);
        assert_eq!(delay.max_delay(), 7);
        let input = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let output = input
            .iter()
            .map(|s| delay.process_sample(*s, 0.0, 3.0))
            .collect::<Vec<_>>();
        assert_eq!(output, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn fractional_delay_and_feedback() {
        let mut buffer = vec![0.0; 16];
        let mut delay = DelayLine::new(&mut buffer, 0);
        let mut output = Vec::new();
        output.push(delay.process_sample(1.0, 0.5, 1.5));
        for _ in 0..6 {
            output.push(delay.process_sample(0.0, 0.5, 1.5));
        }
        // interpolated between two samples
        assert_eq!(output[0], 0.0);
        assert_eq!(output[1], 0.5);
        assert_eq!(output[2], 0.625);
        // feedback repeats attenuated echoes
        assert!(output[3..].iter().any(|s| *s > 0.0 && *s < 0.5));
    }

    #[test]
    fn state_persists_in_buffer() {
        let mut buffer = vec![0.0; 8];
        {
            let mut delay = DelayLine::new(&mut buffer, 0);
            delay.process_sample(1.0, 0.0, 2.0);
        }
        let mut delay = DelayLine::new(&mut buffer, 1);
        assert_eq!(delay.process_sample(0.0, 0.0, 0.0), 0.0);
        assert_eq!(delay.process_sample(0.0, 0.0, 2.0), 1.0);
    }
}
