//! Common, shared DSP tools for the grain effects.

pub mod delay;
pub mod filters;
pub mod lfo;
