use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by grainfield.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    ClipNotFound(usize),
    EmptyClip(usize),
    HostNotFound(usize),
    EmitterNotFound(usize),
    SpeakerNotFound(usize),
    InvalidDspType(u8),
    OutputDeviceError(Box<dyn error::Error + Send + Sync>),
    ParameterError(String),
    SendError(String),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClipNotFound(clip_id) => write!(f, "Audio clip with id {clip_id} not found"),
            Self::EmptyClip(clip_id) => {
                write!(f, "Audio clip with id {clip_id} has no valid samples")
            }
            Self::HostNotFound(host_id) => write!(f, "Host with id {host_id} not found"),
            Self::EmitterNotFound(emitter_id) => {
                write!(f, "Emitter with id {emitter_id} not found")
            }
            Self::SpeakerNotFound(index) => write!(f, "Speaker at index {index} not found"),
            Self::InvalidDspType(tag) => write!(f, "Invalid DSP effect type tag: {tag}"),
            Self::OutputDeviceError(err) => err.fmt(f),
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::SendError(str) => write!(f, "Failed to send channel message: {str}"),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(err: crossbeam_channel::SendError<T>) -> Self {
        Error::SendError(err.to_string())
    }
}

#[cfg(feature = "wav-output")]
impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Error::OutputDeviceError(Box::new(err))
    }
}
