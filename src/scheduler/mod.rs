//! Autoplay scheduler: drives narration playback across the slide sequence

use crate::audio::playback::PlaybackControl;
use crate::audio::{PlaybackProgressInfo, SharedProgress};
use crate::cache::{NarrationCache, PcmFormat};
use crate::config::{Settings, MAX_AUTOPLAY_DELAY_MS};
use crate::deck::SlideDeck;
use crate::synth::SynthesisClient;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{broadcast, mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace};

mod command_handler;
mod run_loop;
mod session_starter;
mod session_task_manager;
mod state;

// Re-export key types for convenience
pub use state::{AutoplayState, SchedulerCommand, SchedulerSnapshot, SchedulerStateUpdate};

const SCHEDULER_LOG_TARGET: &str = "slidecast::scheduler";

/// Shared playback backend type; the audio-signal-producing context is a
/// process-level resource reused across every session.
type SharedPlaybackBackend = Arc<TokioMutex<Box<dyn PlaybackControl>>>;

/// Owns the slide cursor, the autoplay state machine and all cancellation.
pub struct Scheduler {
    // --- Configuration ---
    synthesis_client: Arc<dyn SynthesisClient>,
    pcm_format: PcmFormat,
    autoplay_delay: StdDuration,
    resolve_timeout: StdDuration,

    // --- State ---
    deck: SlideDeck,
    current_index: usize,
    autoplay_enabled: bool,
    state: AutoplayState,
    // Strictly increasing, minted once per attempt to play a slide. The
    // atomic mirror lets spawned continuations compare-and-discard without
    // touching the scheduler.
    generation: u64,
    live_generation: Arc<AtomicU64>,

    // --- Communication ---
    command_rx: mpsc::Receiver<SchedulerCommand>,
    state_update_tx: broadcast::Sender<SchedulerStateUpdate>,
    // Sender for internal continuations (AudioReady, SessionFinished, ...)
    internal_command_tx: mpsc::Sender<SchedulerCommand>,

    // --- Audio ---
    cache: NarrationCache,
    // Lazily constructed on first playback, then reused for the session.
    playback_backend: Option<SharedPlaybackBackend>,
    current_progress: SharedProgress,
    session_task_manager: Option<session_task_manager::SessionTaskManager>,
    pending_advance: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Creates a new Scheduler instance and the command channel sender.
    /// The Scheduler itself should be run in a separate task using `Scheduler::run`.
    pub fn new(
        synthesis_client: Arc<dyn SynthesisClient>,
        deck: SlideDeck,
        settings: &Settings,
        state_update_capacity: usize, // Capacity for the state broadcast channel
        command_buffer_size: usize,   // Capacity for the command mpsc channel
    ) -> (Self, mpsc::Sender<SchedulerCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer_size);
        let (state_update_tx, _) = broadcast::channel(state_update_capacity);

        let scheduler = Scheduler {
            synthesis_client,
            pcm_format: PcmFormat {
                sample_rate: settings.sample_rate,
                channel_count: settings.channel_count,
            },
            autoplay_delay: StdDuration::from_millis(settings.autoplay_delay_ms.min(MAX_AUTOPLAY_DELAY_MS)),
            resolve_timeout: StdDuration::from_millis(settings.resolve_timeout_ms),
            deck,
            current_index: 0,
            autoplay_enabled: false,
            state: AutoplayState::Idle,
            generation: 0,
            live_generation: Arc::new(AtomicU64::new(0)),
            command_rx,
            state_update_tx: state_update_tx.clone(),
            internal_command_tx: command_tx.clone(),
            cache: NarrationCache::new(),
            playback_backend: None,
            current_progress: Arc::new(TokioMutex::new(PlaybackProgressInfo::default())),
            session_task_manager: None,
            pending_advance: None,
        };

        (scheduler, command_tx)
    }

    /// Subscribes to scheduler state updates.
    pub fn subscribe_state_updates(&self) -> broadcast::Receiver<SchedulerStateUpdate> {
        self.state_update_tx.subscribe()
    }

    // --- Private Helper Methods ---

    /// Sends a state update via the broadcast channel, logging errors.
    fn broadcast_update(&self, update: SchedulerStateUpdate) {
        trace!(target: SCHEDULER_LOG_TARGET, "Broadcasting state update: {:?}", update);
        if self.state_update_tx.send(update.clone()).is_err() {
            // Error occurs if there are no active receivers. This is normal if
            // the host UI is not listening yet.
            debug!(target: SCHEDULER_LOG_TARGET, "No active listeners for state update: {:?}", update);
        }
    }

    /// Moves to `state`, broadcasting only actual transitions.
    fn set_state(&mut self, state: AutoplayState) {
        if self.state != state {
            debug!(target: SCHEDULER_LOG_TARGET, "Autoplay state: {:?} -> {:?}", self.state, state);
            self.state = state;
            self.broadcast_update(SchedulerStateUpdate::AutoplayStateChanged(state));
        }
    }

    /// Mints a new generation, invalidating every outstanding continuation.
    fn mint_generation(&mut self) -> u64 {
        self.generation += 1;
        self.live_generation.store(self.generation, Ordering::SeqCst);
        trace!(target: SCHEDULER_LOG_TARGET, generation = self.generation, "Minted new generation.");
        self.generation
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Returns the shared playback backend, constructing it on first use.
    fn playback_backend(&mut self) -> SharedPlaybackBackend {
        if self.playback_backend.is_none() {
            info!(target: SCHEDULER_LOG_TARGET, "Creating playback backend (NarrationPlayer).");
            let mut player: Box<dyn PlaybackControl> = Box::new(crate::audio::NarrationPlayer::new());
            player.set_progress_tracker(self.current_progress.clone());
            self.playback_backend = Some(Arc::new(TokioMutex::new(player)));
        }
        self.playback_backend.as_ref().unwrap().clone()
    }

    /// Stops active audio, clears the pending advance timer and invalidates
    /// all outstanding continuations.
    async fn cancel_active(&mut self) {
        if let Some(manager) = self.session_task_manager.take() {
            info!(target: SCHEDULER_LOG_TARGET, "Stopping active narration session.");
            manager.stop_task().await;
        }
        if let Some(handle) = self.pending_advance.take() {
            debug!(target: SCHEDULER_LOG_TARGET, "Aborting pending advance timer.");
            handle.abort();
        }
        self.mint_generation();
        *self.current_progress.lock().await = PlaybackProgressInfo::default();
    }

    /// Constructs the full current state object.
    async fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            autoplay_enabled: self.autoplay_enabled,
            state: self.state,
            current_index: self.current_index,
            slide_count: self.deck.slide_count(),
            current_slide_id: self.deck.slide(self.current_index).map(|s| s.id.clone()),
            generation: self.generation,
            progress: self.current_progress.lock().await.clone(),
        }
    }

    // --- Main Run Loop ---

    /// Runs the scheduler's command processing loop. This should be spawned as a Tokio task.
    #[instrument(skip(self))]
    pub async fn run(&mut self) {
        run_loop::run_scheduler_loop(self).await;
    }
}
