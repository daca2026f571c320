//! Filters used by the grain effects.

pub mod biquad;
pub mod dc;
