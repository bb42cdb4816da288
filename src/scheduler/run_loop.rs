// src/scheduler/run_loop.rs
use super::{command_handler, AutoplayState, Scheduler, SchedulerCommand, SchedulerStateUpdate, SCHEDULER_LOG_TARGET};
use tracing::{error, info, trace};

/// Runs the scheduler's command processing loop.
pub async fn run_scheduler_loop(scheduler: &mut Scheduler) {
    info!(target: SCHEDULER_LOG_TARGET, "Scheduler run loop started.");

    loop {
        tokio::select! {
            biased; // Check commands first

            // --- Command Processing ---
            Some(command) = scheduler.command_rx.recv() => {
                trace!(target: SCHEDULER_LOG_TARGET, "Received command: {:?}", command);
                match command {
                    SchedulerCommand::LoadDeck(deck) => command_handler::handle_load_deck(scheduler, deck).await,
                    SchedulerCommand::SetAutoplay(enabled) => command_handler::handle_set_autoplay(scheduler, enabled).await,
                    SchedulerCommand::Next => command_handler::handle_next(scheduler).await,
                    SchedulerCommand::Previous => command_handler::handle_previous(scheduler).await,
                    SchedulerCommand::JumpTo(index) => command_handler::handle_jump_to(scheduler, index).await,
                    SchedulerCommand::SetDelayMs(delay_ms) => command_handler::handle_set_delay(scheduler, delay_ms),
                    SchedulerCommand::GetFullState(responder) => {
                        let snapshot = scheduler.snapshot().await;
                        let _ = responder.send(snapshot); // Ignore error if receiver dropped
                    }
                    SchedulerCommand::AudioReady { generation, audio } => command_handler::handle_audio_ready(scheduler, generation, audio).await,
                    SchedulerCommand::AudioFailed { generation, error } => command_handler::handle_audio_failed(scheduler, generation, error).await,
                    SchedulerCommand::SessionFinished { generation } => command_handler::handle_session_finished(scheduler, generation).await,
                    SchedulerCommand::AdvanceElapsed { generation } => command_handler::handle_advance_elapsed(scheduler, generation).await,
                    SchedulerCommand::Shutdown => {
                        info!(target: SCHEDULER_LOG_TARGET, "Shutdown command received. Exiting run loop.");
                        break;
                    }
                }
            }

            // --- Handle Session Task Completion ---
            // Natural completion arrives as a SessionFinished command; reaching
            // here means the task ended without one (stopped early or panicked),
            // so only the slot needs clearing.
            res = async { scheduler.session_task_manager.as_mut().unwrap().handle().await }, if scheduler.session_task_manager.is_some() => {
                let finished_manager = scheduler.session_task_manager.take().unwrap();
                if let Err(e) = res {
                    error!(target: SCHEDULER_LOG_TARGET, slide_id = %finished_manager.slide_id(), "Narration session task panicked: {:?}", e);
                } else {
                    trace!(target: SCHEDULER_LOG_TARGET, slide_id = %finished_manager.slide_id(), "Narration session task finished polling.");
                }
            }

            else => {
                // All channels closed or error occurred, break the loop
                info!(target: SCHEDULER_LOG_TARGET, "Command channel closed or select! error. Exiting run loop.");
                break;
            }
        }
    }

    info!(target: SCHEDULER_LOG_TARGET, "Scheduler run loop finished. Performing final cleanup.");
    scheduler.cancel_active().await;
    scheduler.autoplay_enabled = false;
    scheduler.set_state(AutoplayState::Idle);
    scheduler.broadcast_update(SchedulerStateUpdate::Stopped);
    info!(target: SCHEDULER_LOG_TARGET, "Scheduler task cleanup complete.");
}
