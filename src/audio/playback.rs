use crate::audio::decoder::DecodedBuffer;
use crate::audio::progress::{PlaybackProgressInfo, SharedProgress, PROGRESS_TICK};
use crate::audio::AudioError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

const LOG_TARGET: &str = "slidecast::audio::playback";

/// Callback invoked exactly once when a narration finishes naturally.
pub type OnFinishCallback = Box<dyn FnOnce() + Send + Sync + 'static>;

/// Callback invoked at each progress tick with the clamped fraction.
pub type OnProgressCallback = Box<dyn Fn(f64) + Send + Sync + 'static>;

/// Indicates why a playback run terminated without error.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PlaybackExitReason {
    Completed,
    ShutdownSignal,
}

/// Abstraction over the audio-signal-producing backend so the engine can be
/// driven (and tested) without playback hardware.
#[async_trait]
pub trait PlaybackControl: Send + Sync {
    /// Plays one decoded narration buffer in real time.
    ///
    /// Emits a non-decreasing `fraction` via `on_progress` at a fixed cadence,
    /// ending with exactly 1.0 before `on_finish` runs. A shutdown signal stops
    /// playback immediately; neither callback fires after that — the caller
    /// owns the interpretation of an explicit stop.
    async fn play(
        &mut self,
        audio: Arc<DecodedBuffer>,
        on_progress: OnProgressCallback,
        on_finish: OnFinishCallback,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<PlaybackExitReason, AudioError>;

    /// Injects the shared progress tracker updated during playback.
    fn set_progress_tracker(&mut self, tracker: SharedProgress);
}

/// Clock-paced narration player.
///
/// The narration engine only needs wall-clock playback position to drive
/// progress and advancement, so the default player paces the decoded buffer
/// against a monotonic clock rather than talking to an output device.
pub struct NarrationPlayer {
    progress_tracker: Option<SharedProgress>,
}

impl NarrationPlayer {
    pub fn new() -> Self {
        NarrationPlayer { progress_tracker: None }
    }

    async fn update_tracker(&self, fraction: f64, elapsed_seconds: f64, total_seconds: f64) {
        if let Some(tracker) = &self.progress_tracker {
            let mut info = tracker.lock().await;
            *info = PlaybackProgressInfo {
                fraction,
                elapsed_seconds,
                total_seconds,
            };
        }
    }
}

impl Default for NarrationPlayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackControl for NarrationPlayer {
    async fn play(
        &mut self,
        audio: Arc<DecodedBuffer>,
        on_progress: OnProgressCallback,
        on_finish: OnFinishCallback,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<PlaybackExitReason, AudioError> {
        let total_seconds = audio.duration_seconds();
        if audio.channel_count() == 0 {
            return Err(AudioError::PlaybackError("decoded buffer has no channels".to_string()));
        }

        info!(target: LOG_TARGET, frames = audio.frame_count(), duration_seconds = total_seconds, "Starting paced narration playback.");

        if total_seconds <= 0.0 {
            // Zero-length narration still reports a completed pass.
            self.update_tracker(1.0, 0.0, 0.0).await;
            on_progress(1.0);
            on_finish();
            return Ok(PlaybackExitReason::Completed);
        }

        let started = Instant::now();
        let mut ticker = tokio::time::interval(PROGRESS_TICK);

        loop {
            tokio::select! {
                biased; // Prioritize shutdown check

                _ = shutdown_rx.recv() => {
                    info!(target: LOG_TARGET, "Shutdown signal received, stopping narration playback silently.");
                    return Ok(PlaybackExitReason::ShutdownSignal);
                }

                _ = ticker.tick() => {
                    let elapsed = started.elapsed().as_secs_f64();
                    // Monotonic clock plus clamping keeps the emitted fraction non-decreasing.
                    let fraction = (elapsed / total_seconds).min(1.0);
                    trace!(target: LOG_TARGET, fraction, elapsed, "Progress tick.");
                    self.update_tracker(fraction, elapsed.min(total_seconds), total_seconds).await;
                    on_progress(fraction);

                    if elapsed >= total_seconds {
                        debug!(target: LOG_TARGET, "Narration playback reached end of buffer.");
                        on_finish();
                        return Ok(PlaybackExitReason::Completed);
                    }
                }
            }
        }
    }

    fn set_progress_tracker(&mut self, tracker: SharedProgress) {
        self.progress_tracker = Some(tracker);
    }
}
