// src/scheduler/session_task_manager.rs

use super::{SharedPlaybackBackend, SCHEDULER_LOG_TARGET};
use crate::audio::playback::{OnFinishCallback, OnProgressCallback};
use crate::audio::DecodedBuffer;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace};

/// Manages a single narration playback task.
#[derive(Debug)]
pub struct SessionTaskManager {
    task_handle: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
    slide_id: String, // Stored for logging
}

impl SessionTaskManager {
    /// Sends the shutdown signal to the managed task.
    fn signal_shutdown(&mut self) {
        debug!(target: SCHEDULER_LOG_TARGET, slide_id = %self.slide_id, "Sending shutdown signal to narration session.");
        // Send signal, ignore error if receiver is already gone (task might have finished)
        if let Err(e) = self.shutdown_tx.send(()) {
            trace!(target: SCHEDULER_LOG_TARGET, slide_id = %self.slide_id, "Failed to send shutdown signal (receiver likely dropped): {}", e);
        }
    }

    /// Waits for the managed task to complete with a timeout.
    /// Consumes the manager instance.
    #[instrument(skip(self), fields(slide_id = %self.slide_id))]
    pub async fn await_completion(mut self) {
        debug!(target: SCHEDULER_LOG_TARGET, "Waiting for narration session task to finish...");
        let timeout_duration = StdDuration::from_secs(5);

        tokio::select! {
            biased; // Prioritize checking the result if ready
            result = &mut self.task_handle => {
                match result {
                    Ok(()) => {
                        info!(target: SCHEDULER_LOG_TARGET, slide_id = %self.slide_id, "Narration session task finished gracefully.");
                    }
                    Err(e) => {
                        if e.is_panic() {
                            error!(target: SCHEDULER_LOG_TARGET, slide_id = %self.slide_id, "Narration session task panicked: {:?}", e);
                        } else if e.is_cancelled() {
                            info!(target: SCHEDULER_LOG_TARGET, slide_id = %self.slide_id, "Narration session task was cancelled.");
                        } else {
                            error!(target: SCHEDULER_LOG_TARGET, slide_id = %self.slide_id, "Narration session task join error: {:?}", e);
                        }
                    }
                }
            }
            _ = tokio::time::sleep(timeout_duration) => {
                error!(target: SCHEDULER_LOG_TARGET, slide_id = %self.slide_id, "Timeout waiting for narration session task after {:?}. Aborting task.", timeout_duration);
                self.task_handle.abort();
            }
        }
    }

    /// Stops the managed task by sending a shutdown signal and awaiting completion.
    /// Consumes the manager instance.
    #[instrument(skip(self), fields(slide_id = %self.slide_id))]
    pub async fn stop_task(mut self) {
        info!(target: SCHEDULER_LOG_TARGET, "Stopping narration session task...");
        let slide_id = self.slide_id.clone();
        self.signal_shutdown();
        self.await_completion().await;
        info!(target: SCHEDULER_LOG_TARGET, slide_id = %slide_id, "Narration session stop sequence complete.");
    }

    /// Returns a reference to the JoinHandle for polling in select!
    pub fn handle(&mut self) -> &mut JoinHandle<()> {
        &mut self.task_handle
    }

    /// Returns the slide ID associated with this session.
    pub fn slide_id(&self) -> &str {
        &self.slide_id
    }
}

/// Spawns a new Tokio task that plays one slide's narration on the shared
/// playback backend.
#[instrument(skip(backend, buffer, on_progress, on_finish), fields(slide_id = %slide_id))]
pub fn spawn_session_task(
    backend: SharedPlaybackBackend,
    buffer: Arc<DecodedBuffer>,
    slide_id: String,
    on_progress: OnProgressCallback,
    on_finish: OnFinishCallback,
) -> SessionTaskManager {
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let slide_id_for_struct = slide_id.clone();

    info!(target: SCHEDULER_LOG_TARGET, "Spawning async task for narration playback of slide {}", slide_id);
    let task_handle = tokio::spawn(async move {
        debug!(target: SCHEDULER_LOG_TARGET, slide_id = %slide_id, "[Session Task] Started.");

        let play_result = {
            let mut backend_guard = backend.lock().await;
            backend_guard.play(buffer, on_progress, on_finish, shutdown_rx).await
        }; // Mutex guard is dropped here

        match play_result {
            Ok(reason) => debug!(target: SCHEDULER_LOG_TARGET, slide_id = %slide_id, "[Session Task] Playback exited: {:?}.", reason),
            Err(e) => error!(target: SCHEDULER_LOG_TARGET, slide_id = %slide_id, "[Session Task] Playback failed: {}", e),
        }
        debug!(target: SCHEDULER_LOG_TARGET, slide_id = %slide_id, "[Session Task] Finished.");
    });

    SessionTaskManager {
        task_handle,
        shutdown_tx,
        slide_id: slide_id_for_struct,
    }
}
