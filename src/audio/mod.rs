//! Audio decode and paced playback for slide narration

pub mod decoder;
pub mod playback;
pub mod progress;

pub use decoder::{decode_pcm_s16le, DecodedBuffer};
pub use playback::{NarrationPlayer, OnFinishCallback, OnProgressCallback, PlaybackControl, PlaybackExitReason};
pub use progress::{PlaybackProgressInfo, SharedProgress};

use std::error::Error;

/// Error types specific to narration audio handling.
#[derive(Debug)]
pub enum AudioError {
    DecodeError(String),
    PlaybackError(String),
    InvalidState(String),
    TaskJoinError(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::DecodeError(e) => write!(f, "Decode error: {}", e),
            AudioError::PlaybackError(e) => write!(f, "Playback error: {}", e),
            AudioError::InvalidState(s) => write!(f, "Invalid state: {}", s),
            AudioError::TaskJoinError(e) => write!(f, "Async task join error: {}", e),
        }
    }
}

impl Error for AudioError {}

impl From<tokio::task::JoinError> for AudioError {
    fn from(e: tokio::task::JoinError) -> Self {
        AudioError::TaskJoinError(e.to_string())
    }
}
