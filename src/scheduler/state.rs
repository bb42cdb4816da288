use crate::audio::PlaybackProgressInfo;
use crate::cache::{CachedAudio, ResolveError};
use crate::deck::SlideDeck;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Commands that can be sent to the Scheduler task.
///
/// The `generation`-carrying variants are internal continuations; their
/// handlers discard them when the captured generation is no longer current.
#[derive(Debug)]
pub enum SchedulerCommand {
    LoadDeck(SlideDeck),
    SetAutoplay(bool),
    Next,
    Previous,
    JumpTo(usize),
    SetDelayMs(u64),
    GetFullState(oneshot::Sender<SchedulerSnapshot>),
    AudioReady {
        generation: u64,
        /// `None` means the slide has no narration text; not a failure.
        audio: Option<Arc<CachedAudio>>,
    },
    AudioFailed {
        generation: u64,
        error: ResolveError,
    },
    SessionFinished {
        generation: u64,
    },
    AdvanceElapsed {
        generation: u64,
    },
    Shutdown,
}

/// Lifecycle of the autoplay state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplayState {
    Idle,
    AwaitingAudio,
    Playing,
    Error,
}

/// Snapshot of the scheduler's full state for the host UI.
#[derive(Debug, Clone)]
pub struct SchedulerSnapshot {
    pub autoplay_enabled: bool,
    pub state: AutoplayState,
    pub current_index: usize,
    pub slide_count: usize,
    pub current_slide_id: Option<String>,
    pub generation: u64,
    pub progress: PlaybackProgressInfo,
}

/// Updates broadcast by the Scheduler task about its state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerStateUpdate {
    AutoplayStateChanged(AutoplayState),
    SlideAdvanced {
        index: usize,
    },
    Progress {
        slide_id: String,
        fraction: f64,
    },
    /// Auto-dismissing, non-fatal notice for the host UI.
    TransientError(String),
    Stopped,
}
