use super::{session_starter, AutoplayState, Scheduler, SchedulerCommand, SchedulerStateUpdate, SCHEDULER_LOG_TARGET};
use crate::cache::{CachedAudio, ResolveError};
use crate::config::MAX_AUTOPLAY_DELAY_MS;
use crate::deck::SlideDeck;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Replaces the slide deck.
///
/// A structural change while narration is active is treated as a manual
/// interruption: stop audio, drop timers, autoplay off.
#[instrument(skip(scheduler, deck), fields(slide_count = deck.slide_count()))]
pub async fn handle_load_deck(scheduler: &mut Scheduler, deck: SlideDeck) {
    info!(target: SCHEDULER_LOG_TARGET, "Handling LoadDeck command with {} slides.", deck.slide_count());
    if scheduler.state != AutoplayState::Idle {
        scheduler.cancel_active().await;
        scheduler.autoplay_enabled = false;
        scheduler.set_state(AutoplayState::Idle);
    }
    scheduler.deck = deck;
    if scheduler.current_index >= scheduler.deck.slide_count() {
        scheduler.current_index = scheduler.deck.slide_count().saturating_sub(1);
    }
    scheduler.broadcast_update(SchedulerStateUpdate::SlideAdvanced {
        index: scheduler.current_index,
    });
}

#[instrument(skip(scheduler))]
pub async fn handle_set_autoplay(scheduler: &mut Scheduler, enabled: bool) {
    info!(target: SCHEDULER_LOG_TARGET, "Handling SetAutoplay({}) command.", enabled);
    if enabled {
        if scheduler.autoplay_enabled && scheduler.state != AutoplayState::Idle {
            debug!(target: SCHEDULER_LOG_TARGET, "Autoplay already active, ignoring.");
            return;
        }
        if scheduler.deck.slide_count() == 0 {
            warn!(target: SCHEDULER_LOG_TARGET, "SetAutoplay: Deck is empty, cannot start autoplay.");
            return;
        }
        scheduler.autoplay_enabled = true;
        session_starter::begin_current_slide(scheduler).await;
    } else {
        scheduler.autoplay_enabled = false;
        scheduler.cancel_active().await;
        scheduler.set_state(AutoplayState::Idle);
    }
}

/// Applies the side effects every manual navigation shares: autoplay off,
/// active audio stopped, timers cleared, outstanding continuations stale.
async fn interrupt_for_manual_navigation(scheduler: &mut Scheduler) {
    scheduler.autoplay_enabled = false;
    scheduler.cancel_active().await;
    scheduler.set_state(AutoplayState::Idle);
}

#[instrument(skip(scheduler))]
pub async fn handle_next(scheduler: &mut Scheduler) {
    info!(target: SCHEDULER_LOG_TARGET, "Handling Next command.");
    interrupt_for_manual_navigation(scheduler).await;
    if scheduler.deck.slide_count() == 0 || scheduler.deck.is_last(scheduler.current_index) {
        info!(target: SCHEDULER_LOG_TARGET, "Next: Already at end of deck or deck empty.");
        return;
    }
    scheduler.current_index += 1;
    scheduler.broadcast_update(SchedulerStateUpdate::SlideAdvanced {
        index: scheduler.current_index,
    });
}

#[instrument(skip(scheduler))]
pub async fn handle_previous(scheduler: &mut Scheduler) {
    info!(target: SCHEDULER_LOG_TARGET, "Handling Previous command.");
    interrupt_for_manual_navigation(scheduler).await;
    if scheduler.deck.slide_count() == 0 || scheduler.current_index == 0 {
        info!(target: SCHEDULER_LOG_TARGET, "Previous: Already at start of deck or deck empty.");
        return;
    }
    scheduler.current_index -= 1;
    scheduler.broadcast_update(SchedulerStateUpdate::SlideAdvanced {
        index: scheduler.current_index,
    });
}

#[instrument(skip(scheduler))]
pub async fn handle_jump_to(scheduler: &mut Scheduler, index: usize) {
    info!(target: SCHEDULER_LOG_TARGET, "Handling JumpTo({}) command.", index);
    interrupt_for_manual_navigation(scheduler).await;
    if index >= scheduler.deck.slide_count() {
        warn!(target: SCHEDULER_LOG_TARGET, "JumpTo: Index {} out of bounds ({} slides).", index, scheduler.deck.slide_count());
        return;
    }
    if index != scheduler.current_index {
        scheduler.current_index = index;
        scheduler.broadcast_update(SchedulerStateUpdate::SlideAdvanced {
            index: scheduler.current_index,
        });
    }
}

pub fn handle_set_delay(scheduler: &mut Scheduler, delay_ms: u64) {
    let clamped = delay_ms.min(MAX_AUTOPLAY_DELAY_MS);
    if clamped != delay_ms {
        warn!(target: SCHEDULER_LOG_TARGET, "Autoplay delay {} ms clamped to {} ms.", delay_ms, clamped);
    }
    scheduler.autoplay_delay = std::time::Duration::from_millis(clamped);
}

/// Audio resolution completed for the current attempt; `None` means the slide
/// has no narration and is presented for the configured delay only.
#[instrument(skip(scheduler, audio))]
pub async fn handle_audio_ready(scheduler: &mut Scheduler, generation: u64, audio: Option<Arc<CachedAudio>>) {
    if !scheduler.is_current(generation) {
        debug!(target: SCHEDULER_LOG_TARGET, generation, current = scheduler.generation, "Discarding stale AudioReady.");
        return;
    }
    match audio {
        Some(audio) => session_starter::start_session(scheduler, audio).await,
        None => {
            debug!(target: SCHEDULER_LOG_TARGET, "Slide has no narration text, presenting silently.");
            scheduler.set_state(AutoplayState::Playing);
            start_advance_timer(scheduler);
        }
    }
}

#[instrument(skip(scheduler))]
pub async fn handle_audio_failed(scheduler: &mut Scheduler, generation: u64, error: ResolveError) {
    if !scheduler.is_current(generation) {
        debug!(target: SCHEDULER_LOG_TARGET, generation, current = scheduler.generation, "Discarding stale AudioFailed.");
        return;
    }
    warn!(target: SCHEDULER_LOG_TARGET, index = scheduler.current_index, error = %error, "Narration unavailable for slide.");
    scheduler.broadcast_update(SchedulerStateUpdate::TransientError(format!(
        "Narration unavailable: {}",
        error
    )));
    scheduler.set_state(AutoplayState::Error);
    // The sequence must never stall on one slide's failure.
    start_advance_timer(scheduler);
}

#[instrument(skip(scheduler))]
pub async fn handle_session_finished(scheduler: &mut Scheduler, generation: u64) {
    if !scheduler.is_current(generation) {
        debug!(target: SCHEDULER_LOG_TARGET, generation, current = scheduler.generation, "Discarding stale SessionFinished.");
        return;
    }
    info!(target: SCHEDULER_LOG_TARGET, index = scheduler.current_index, "Narration finished, waiting before advancing.");
    start_advance_timer(scheduler);
}

#[instrument(skip(scheduler))]
pub async fn handle_advance_elapsed(scheduler: &mut Scheduler, generation: u64) {
    if !scheduler.is_current(generation) {
        debug!(target: SCHEDULER_LOG_TARGET, generation, current = scheduler.generation, "Discarding stale AdvanceElapsed.");
        return;
    }
    scheduler.pending_advance = None;
    if !scheduler.autoplay_enabled {
        debug!(target: SCHEDULER_LOG_TARGET, "Advance timer elapsed with autoplay disabled, ignoring.");
        return;
    }
    if scheduler.deck.is_last(scheduler.current_index) {
        info!(target: SCHEDULER_LOG_TARGET, "End of deck reached, autoplay returning to idle.");
        scheduler.autoplay_enabled = false;
        scheduler.cancel_active().await;
        scheduler.set_state(AutoplayState::Idle);
        scheduler.broadcast_update(SchedulerStateUpdate::Stopped);
        return;
    }
    scheduler.current_index += 1;
    scheduler.broadcast_update(SchedulerStateUpdate::SlideAdvanced {
        index: scheduler.current_index,
    });
    session_starter::begin_current_slide(scheduler).await;
}

/// Schedules the delay-then-advance step for the current generation.
///
/// The timer checks the live generation before reporting back, and its handle
/// is also aborted on cancellation.
pub fn start_advance_timer(scheduler: &mut Scheduler) {
    if let Some(handle) = scheduler.pending_advance.take() {
        handle.abort();
    }
    let generation = scheduler.generation;
    let delay = scheduler.autoplay_delay;
    let live_generation = scheduler.live_generation.clone();
    let internal_command_tx = scheduler.internal_command_tx.clone();

    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if live_generation.load(Ordering::SeqCst) != generation {
            debug!(target: SCHEDULER_LOG_TARGET, generation, "Advance timer elapsed for stale generation, dropping.");
            return;
        }
        if internal_command_tx
            .send(SchedulerCommand::AdvanceElapsed { generation })
            .await
            .is_err()
        {
            debug!(target: SCHEDULER_LOG_TARGET, "Scheduler gone before advance timer could report.");
        }
    });
    scheduler.pending_advance = Some(handle);
}
