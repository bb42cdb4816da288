// src/scheduler/session_starter.rs
use super::{session_task_manager, AutoplayState, Scheduler, SchedulerCommand, SchedulerStateUpdate, SCHEDULER_LOG_TARGET};
use crate::audio::playback::{OnFinishCallback, OnProgressCallback};
use crate::audio::PlaybackProgressInfo;
use crate::cache::CachedAudio;
use crate::synth::NarrationRequest;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, trace, warn};

/// Starts a new play attempt for the slide at the current cursor.
///
/// Mints a fresh generation, transitions to `AwaitingAudio` and spawns the
/// audio resolution, which reports back through the internal command channel.
#[instrument(skip(scheduler), fields(slide_index = scheduler.current_index))]
pub async fn begin_current_slide(scheduler: &mut Scheduler) {
    // Stop any previous session before starting a new attempt.
    if let Some(manager) = scheduler.session_task_manager.take() {
        info!(target: SCHEDULER_LOG_TARGET, "Stopping previous narration session before new slide.");
        manager.stop_task().await;
    }
    if let Some(handle) = scheduler.pending_advance.take() {
        handle.abort();
    }
    *scheduler.current_progress.lock().await = PlaybackProgressInfo::default();
    let generation = scheduler.mint_generation();

    let slide = match scheduler.deck.slide(scheduler.current_index) {
        Some(slide) => slide.clone(),
        None => {
            error!(target: SCHEDULER_LOG_TARGET, "Cannot play slide at index {}: Index out of bounds.", scheduler.current_index);
            scheduler.autoplay_enabled = false;
            scheduler.set_state(AutoplayState::Idle);
            scheduler.broadcast_update(SchedulerStateUpdate::Stopped);
            return;
        }
    };
    let voice_name = scheduler
        .deck
        .effective_voice(scheduler.current_index)
        .unwrap_or_default()
        .to_string();

    scheduler.set_state(AutoplayState::AwaitingAudio);

    if slide.narration_text.trim().is_empty() {
        // Not a failure: the slide is presented for the delay window only.
        debug!(target: SCHEDULER_LOG_TARGET, slide_id = %slide.id, "Slide has no narration text.");
        if let Err(e) = scheduler
            .internal_command_tx
            .try_send(SchedulerCommand::AudioReady { generation, audio: None })
        {
            error!(target: SCHEDULER_LOG_TARGET, "Failed to queue silent-slide continuation: {}", e);
        }
        return;
    }

    let request = NarrationRequest {
        slide_id: slide.id.clone(),
        text: slide.narration_text.clone(),
        voice_name,
    };
    let cache = scheduler.cache.clone();
    let client = scheduler.synthesis_client.clone();
    let format = scheduler.pcm_format;
    let resolve_timeout = scheduler.resolve_timeout;
    let live_generation = scheduler.live_generation.clone();
    let internal_command_tx = scheduler.internal_command_tx.clone();

    tokio::spawn(async move {
        let outcome = tokio::time::timeout(resolve_timeout, cache.resolve(&request, client, format)).await;

        if live_generation.load(Ordering::SeqCst) != generation {
            debug!(target: SCHEDULER_LOG_TARGET, slide_id = %request.slide_id, generation, "Audio resolved for stale generation, dropping.");
            return;
        }

        let command = match outcome {
            Ok(Ok(audio)) => SchedulerCommand::AudioReady {
                generation,
                audio: Some(audio),
            },
            Ok(Err(error)) => SchedulerCommand::AudioFailed { generation, error },
            Err(_elapsed) => SchedulerCommand::AudioFailed {
                generation,
                error: crate::cache::ResolveError::Synthesis(format!(
                    "audio resolution exceeded {} ms",
                    resolve_timeout.as_millis()
                )),
            },
        };
        if internal_command_tx.send(command).await.is_err() {
            debug!(target: SCHEDULER_LOG_TARGET, "Scheduler gone before audio resolution could report.");
        }
    });
}

/// Spawns the playback session for resolved audio and fires the prefetch for
/// the next slide.
#[instrument(skip(scheduler, audio), fields(slide_id = %audio.slide_id))]
pub async fn start_session(scheduler: &mut Scheduler, audio: Arc<CachedAudio>) {
    let generation = scheduler.generation;
    let backend = scheduler.playback_backend();

    // --- Progress Callback ---
    // Emitted from the playback task; compare-and-discard keeps a stale
    // session from reporting after a newer generation was minted.
    let live_generation = scheduler.live_generation.clone();
    let state_update_tx = scheduler.state_update_tx.clone();
    let progress_slide_id = audio.slide_id.clone();
    let on_progress: OnProgressCallback = Box::new(move |fraction| {
        if live_generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let _ = state_update_tx.send(SchedulerStateUpdate::Progress {
            slide_id: progress_slide_id.clone(),
            fraction,
        });
    });

    // --- Finish Callback ---
    let live_generation = scheduler.live_generation.clone();
    let internal_command_tx = scheduler.internal_command_tx.clone();
    let finish_slide_id = audio.slide_id.clone();
    let on_finish: OnFinishCallback = Box::new(move || {
        if live_generation.load(Ordering::SeqCst) != generation {
            debug!(target: SCHEDULER_LOG_TARGET, slide_id = %finish_slide_id, "Narration ended for stale generation, dropping.");
            return;
        }
        info!(target: SCHEDULER_LOG_TARGET, slide_id = %finish_slide_id, "Narration finished naturally. Sending SessionFinished command.");
        if let Err(e) = internal_command_tx.try_send(SchedulerCommand::SessionFinished { generation }) {
            error!(target: SCHEDULER_LOG_TARGET, slide_id = %finish_slide_id, "Failed to send SessionFinished command: {}", e);
        }
    });

    let manager = session_task_manager::spawn_session_task(
        backend,
        audio.buffer.clone(),
        audio.slide_id.clone(),
        on_progress,
        on_finish,
    );
    scheduler.session_task_manager = Some(manager);
    scheduler.set_state(AutoplayState::Playing);

    // Warm the next slide's audio while this one plays.
    spawn_prefetch(scheduler);
}

/// Fires (without awaiting) a cache resolution for the next slide so its audio
/// is warm by the time the cursor reaches it. Best-effort: failures are logged
/// and swallowed; the slide simply falls back to a cold fetch on its turn.
fn spawn_prefetch(scheduler: &Scheduler) {
    let next_index = scheduler.current_index + 1;
    let slide = match scheduler.deck.slide(next_index) {
        Some(slide) => slide,
        None => return,
    };
    if slide.narration_text.trim().is_empty() {
        return;
    }
    let request = NarrationRequest {
        slide_id: slide.id.clone(),
        text: slide.narration_text.clone(),
        voice_name: scheduler
            .deck
            .effective_voice(next_index)
            .unwrap_or_default()
            .to_string(),
    };
    let cache = scheduler.cache.clone();
    let client = scheduler.synthesis_client.clone();
    let format = scheduler.pcm_format;

    debug!(target: SCHEDULER_LOG_TARGET, slide_id = %request.slide_id, "Prefetching narration for next slide.");
    tokio::spawn(async move {
        match cache.resolve(&request, client, format).await {
            Ok(_) => trace!(target: SCHEDULER_LOG_TARGET, slide_id = %request.slide_id, "Prefetch complete, audio is warm."),
            Err(e) => warn!(target: SCHEDULER_LOG_TARGET, slide_id = %request.slide_id, error = %e, "Prefetch failed; slide will cold fetch on its turn."),
        }
    });
}
