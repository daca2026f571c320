// -------------------------------------------------------------------------------------------------

/// Fill the given buffer with zeros.
#[inline]
pub fn clear_buffer(buffer: &mut [f32]) {
    buffer.fill(0.0);
}

/// Multiply all samples in the given buffer with the given factor.
#[inline]
pub fn scale_buffer(buffer: &mut [f32], factor: f32) {
    for sample in buffer.iter_mut() {
        *sample *= factor;
    }
}

/// Add the source buffer into the destination buffer.
#[inline]
pub fn add_buffers(destination: &mut [f32], source: &[f32]) {
    for (d, s) in destination.iter_mut().zip(source.iter()) {
        *d += *s;
    }
}

/// Cross-fade the processed `wet` buffer with the given `dry` signal. A mix of 1.0 keeps the
/// wet signal only, 0.0 restores the dry signal.
#[inline]
pub fn mix_dry_wet(wet: &mut [f32], dry: &[f32], mix: f32) {
    if mix >= 1.0 {
        return;
    }
    for (w, d) in wet.iter_mut().zip(dry.iter()) {
        *w = *d + (*w - *d) * mix;
    }
}

// -------------------------------------------------------------------------------------------------

/// Fold the given interleaved buffer into a new mono buffer by averaging all channels.
pub fn fold_to_mono(interleaved: &[f32], channel_count: usize) -> Vec<f32> {
    match channel_count {
        0 => Vec::new(),
        1 => interleaved.to_vec(),
        _ => {
            let scale = 1.0 / channel_count as f32;
            interleaved
                .chunks_exact(channel_count)
                .map(|frame| frame.iter().sum::<f32>() * scale)
                .collect()
        }
    }
}

// -------------------------------------------------------------------------------------------------
