use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex as TokioMutex;

/// Cadence at which the player recomputes and emits playback progress.
pub const PROGRESS_TICK: StdDuration = StdDuration::from_millis(33);

/// Holds the current narration playback progress.
#[derive(Debug, Default, Clone)]
pub struct PlaybackProgressInfo {
    /// Fraction of the current slide's narration played, in [0.0, 1.0].
    pub fraction: f64,
    pub elapsed_seconds: f64,
    pub total_seconds: f64,
}

// Type alias for the shared progress tracker
pub type SharedProgress = Arc<TokioMutex<PlaybackProgressInfo>>;
