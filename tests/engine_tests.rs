//! End-to-end tests for the autoplay scheduler.
//!
//! A scripted synthesis client stands in for the external speech service, so
//! every path (success, failure, never-resolving) runs against real timers
//! with short durations.

use async_trait::async_trait;
use bytes::Bytes;
use slidecast::config::Settings;
use slidecast::deck::{Slide, SlideDeck};
use slidecast::scheduler::{AutoplayState, Scheduler, SchedulerCommand, SchedulerStateUpdate};
use slidecast::synth::{SynthesisClient, SynthesisError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};

const SAMPLE_RATE: u32 = 8_000;

#[derive(Clone, Copy)]
enum SynthesisScript {
    /// Respond with silent PCM of the given frame count.
    Succeed { frames: usize },
    /// Respond with an HTTP-style service failure.
    FailService,
    /// Never resolve; the engine's fallback window must cover this.
    NeverResolve,
}

struct ScriptedSynthesisClient {
    script: SynthesisScript,
    calls: AtomicUsize,
}

impl ScriptedSynthesisClient {
    fn new(script: SynthesisScript) -> Arc<Self> {
        Arc::new(ScriptedSynthesisClient {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisClient for ScriptedSynthesisClient {
    async fn synthesize(&self, _text: &str, _voice_name: &str) -> Result<Bytes, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            SynthesisScript::Succeed { frames } => Ok(Bytes::from(vec![0u8; frames * 2])),
            SynthesisScript::FailService => Err(SynthesisError::Service {
                status: 503,
                message: "speech service unavailable".to_string(),
            }),
            SynthesisScript::NeverResolve => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.autoplay_delay_ms = 10;
    settings.resolve_timeout_ms = 200;
    settings.sample_rate = SAMPLE_RATE;
    settings.channel_count = 1;
    settings
}

fn deck_of(narrations: &[&str]) -> SlideDeck {
    SlideDeck {
        slides: narrations
            .iter()
            .enumerate()
            .map(|(i, text)| Slide {
                id: format!("slide-{}", i),
                narration_text: text.to_string(),
                voice_override: None,
            })
            .collect(),
        default_voice: "nova".to_string(),
    }
}

struct Harness {
    command_tx: mpsc::Sender<SchedulerCommand>,
    updates: broadcast::Receiver<SchedulerStateUpdate>,
    handle: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn spawn(client: Arc<dyn SynthesisClient>, deck: SlideDeck, settings: Settings) -> Self {
        let (mut scheduler, command_tx) = Scheduler::new(client, deck, &settings, 256, 32);
        let updates = scheduler.subscribe_state_updates();
        let handle = tokio::spawn(async move {
            scheduler.run().await;
        });
        Harness {
            command_tx,
            updates,
            handle,
        }
    }

    async fn send(&self, command: SchedulerCommand) {
        self.command_tx.send(command).await.expect("scheduler alive");
    }

    /// Collects updates until autoplay goes idle (inclusive) or the deadline hits.
    async fn collect_until_idle(&mut self, deadline: Duration) -> Vec<SchedulerStateUpdate> {
        let mut events = Vec::new();
        let collect = async {
            loop {
                match self.updates.recv().await {
                    Ok(update) => {
                        let is_idle = update == SchedulerStateUpdate::AutoplayStateChanged(AutoplayState::Idle);
                        events.push(update);
                        if is_idle {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        tokio::time::timeout(deadline, collect)
            .await
            .expect("scheduler did not reach idle in time");
        events
    }

    /// Drains whatever arrives within the window without expecting idle.
    async fn collect_for(&mut self, window: Duration) -> Vec<SchedulerStateUpdate> {
        let mut events = Vec::new();
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, self.updates.recv()).await {
                Ok(Ok(update)) => events.push(update),
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => break,
                Err(_) => break,
            }
        }
        events
    }

    /// Waits for a matching update, panicking at the deadline.
    async fn wait_for(
        &mut self,
        deadline: Duration,
        predicate: impl Fn(&SchedulerStateUpdate) -> bool,
    ) -> SchedulerStateUpdate {
        let wait = async {
            loop {
                match self.updates.recv().await {
                    Ok(update) if predicate(&update) => return update,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("update channel closed"),
                }
            }
        };
        tokio::time::timeout(deadline, wait)
            .await
            .expect("expected update did not arrive in time")
    }

    async fn snapshot(&self) -> slidecast::scheduler::SchedulerSnapshot {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerCommand::GetFullState(tx)).await;
        rx.await.expect("snapshot response")
    }

    async fn shutdown(self) {
        let _ = self.command_tx.send(SchedulerCommand::Shutdown).await;
        let _ = self.handle.await;
    }
}

fn advanced_indices(events: &[SchedulerStateUpdate]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            SchedulerStateUpdate::SlideAdvanced { index } => Some(*index),
            _ => None,
        })
        .collect()
}

fn transient_errors(events: &[SchedulerStateUpdate]) -> Vec<&String> {
    events
        .iter()
        .filter_map(|e| match e {
            SchedulerStateUpdate::TransientError(message) => Some(message),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn autoplay_advances_through_deck_and_returns_to_idle() {
    // 400 frames at 8 kHz = 50 ms of narration per slide.
    let client = ScriptedSynthesisClient::new(SynthesisScript::Succeed { frames: 400 });
    let mut harness = Harness::spawn(client.clone(), deck_of(&["one", "two", "three"]), test_settings());

    harness.send(SchedulerCommand::SetAutoplay(true)).await;
    let events = harness.collect_until_idle(Duration::from_secs(5)).await;

    assert_eq!(advanced_indices(&events), vec![1, 2], "must advance through every slide exactly once");
    assert!(transient_errors(&events).is_empty());
    assert!(events.contains(&SchedulerStateUpdate::AutoplayStateChanged(AutoplayState::Idle)));

    // Each slide is synthesized once: the cursor's fetch and the prefetch for
    // the same slide share one call through the cache.
    assert_eq!(client.call_count(), 3);

    let snapshot = harness.snapshot().await;
    assert!(!snapshot.autoplay_enabled);
    assert_eq!(snapshot.state, AutoplayState::Idle);
    assert_eq!(snapshot.current_index, 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn progress_is_monotonic_and_completes_before_advance() {
    let client = ScriptedSynthesisClient::new(SynthesisScript::Succeed { frames: 800 });
    let mut harness = Harness::spawn(client, deck_of(&["only slide"]), test_settings());

    harness.send(SchedulerCommand::SetAutoplay(true)).await;
    let events = harness.collect_until_idle(Duration::from_secs(5)).await;

    let fractions: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            SchedulerStateUpdate::Progress { fraction, .. } => Some(*fraction),
            _ => None,
        })
        .collect();

    assert!(!fractions.is_empty(), "playback must emit progress");
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]), "progress must be non-decreasing: {:?}", fractions);
    assert_eq!(*fractions.last().unwrap(), 1.0, "progress must reach exactly 1.0");

    // The final 1.0 must land before the transition away from Playing.
    let last_progress_pos = events
        .iter()
        .rposition(|e| matches!(e, SchedulerStateUpdate::Progress { .. }))
        .unwrap();
    let idle_pos = events
        .iter()
        .position(|e| *e == SchedulerStateUpdate::AutoplayStateChanged(AutoplayState::Idle))
        .unwrap();
    assert!(last_progress_pos < idle_pos);

    harness.shutdown().await;
}

#[tokio::test]
async fn synthesis_failure_emits_one_notice_per_slide_and_keeps_advancing() {
    let client = ScriptedSynthesisClient::new(SynthesisScript::FailService);
    let mut harness = Harness::spawn(client, deck_of(&["one", "two"]), test_settings());

    harness.send(SchedulerCommand::SetAutoplay(true)).await;
    let events = harness.collect_until_idle(Duration::from_secs(5)).await;

    let notices = transient_errors(&events);
    assert_eq!(notices.len(), 2, "exactly one notice per failing slide: {:?}", notices);
    assert!(notices.iter().all(|m| m.contains("Synthesis failed")));
    assert_eq!(advanced_indices(&events), vec![1], "the sequence must not stall on a broken slide");
    assert!(events.contains(&SchedulerStateUpdate::AutoplayStateChanged(AutoplayState::Error)));

    harness.shutdown().await;
}

#[tokio::test]
async fn unresolved_synthesis_advances_within_the_fallback_window() {
    let client = ScriptedSynthesisClient::new(SynthesisScript::NeverResolve);
    let settings = test_settings(); // resolve_timeout_ms = 200
    let mut harness = Harness::spawn(client, deck_of(&["one", "two"]), settings);

    let started = Instant::now();
    harness.send(SchedulerCommand::SetAutoplay(true)).await;
    harness
        .wait_for(Duration::from_secs(2), |e| {
            matches!(e, SchedulerStateUpdate::SlideAdvanced { index: 1 })
        })
        .await;

    // One timeout (200 ms) plus the 10 ms delay, with generous headroom.
    assert!(started.elapsed() < Duration::from_secs(1), "advance must happen within the fallback window");

    let events = harness.collect_until_idle(Duration::from_secs(2)).await;
    // Slide 0 produced its notice before the advance we waited on; slide 1
    // produces exactly one more.
    assert_eq!(transient_errors(&events).len(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn empty_narration_is_skipped_silently() {
    let client = ScriptedSynthesisClient::new(SynthesisScript::Succeed { frames: 400 });
    let mut harness = Harness::spawn(client.clone(), deck_of(&["", "spoken"]), test_settings());

    harness.send(SchedulerCommand::SetAutoplay(true)).await;
    let events = harness.collect_until_idle(Duration::from_secs(5)).await;

    assert!(transient_errors(&events).is_empty(), "a silent slide is not an error");
    assert_eq!(advanced_indices(&events), vec![1]);
    // Only the spoken slide reaches the synthesis service.
    assert_eq!(client.call_count(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn manual_navigation_stops_playback_and_disables_autoplay() {
    // 40_000 frames = 5 s of narration, far longer than the test runs.
    let client = ScriptedSynthesisClient::new(SynthesisScript::Succeed { frames: 40_000 });
    let mut harness = Harness::spawn(client, deck_of(&["one", "two", "three"]), test_settings());

    harness.send(SchedulerCommand::SetAutoplay(true)).await;
    harness
        .wait_for(Duration::from_secs(2), |e| {
            *e == SchedulerStateUpdate::AutoplayStateChanged(AutoplayState::Playing)
        })
        .await;

    harness.send(SchedulerCommand::Next).await;
    harness
        .wait_for(Duration::from_secs(2), |e| {
            *e == SchedulerStateUpdate::AutoplayStateChanged(AutoplayState::Idle)
        })
        .await;

    let snapshot = harness.snapshot().await;
    assert!(!snapshot.autoplay_enabled, "manual navigation must disable autoplay");
    assert_eq!(snapshot.state, AutoplayState::Idle);
    assert_eq!(snapshot.current_index, 1);

    // No stale continuation may surface after the interruption: no progress
    // for the stopped slide, no transition back to Playing, no advance.
    let trailing = harness.collect_for(Duration::from_millis(300)).await;
    for event in &trailing {
        match event {
            SchedulerStateUpdate::Progress { slide_id, .. } => {
                panic!("stale progress for {} after interruption", slide_id)
            }
            SchedulerStateUpdate::AutoplayStateChanged(AutoplayState::Playing) => {
                panic!("playback resumed after interruption")
            }
            SchedulerStateUpdate::SlideAdvanced { index } if *index != 1 => {
                panic!("unexpected advance to {} after interruption", index)
            }
            _ => {}
        }
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn disabling_autoplay_during_wait_clears_the_pending_advance() {
    let client = ScriptedSynthesisClient::new(SynthesisScript::Succeed { frames: 80 });
    let mut settings = test_settings();
    settings.autoplay_delay_ms = 300; // long enough to toggle during the wait
    let mut harness = Harness::spawn(client, deck_of(&["one", "two"]), settings);

    harness.send(SchedulerCommand::SetAutoplay(true)).await;
    // 80 frames = 10 ms of audio; wait for the first slide to finish playing
    // and the inter-slide delay to begin.
    harness
        .wait_for(Duration::from_secs(2), |e| {
            matches!(e, SchedulerStateUpdate::Progress { fraction, .. } if *fraction == 1.0)
        })
        .await;

    harness.send(SchedulerCommand::SetAutoplay(false)).await;
    harness
        .wait_for(Duration::from_secs(2), |e| {
            *e == SchedulerStateUpdate::AutoplayStateChanged(AutoplayState::Idle)
        })
        .await;

    // Past the original delay window: the cleared timer must not advance.
    let trailing = harness.collect_for(Duration::from_millis(500)).await;
    assert!(
        advanced_indices(&trailing).is_empty(),
        "pending advance must be cancelled when autoplay is disabled"
    );
    let snapshot = harness.snapshot().await;
    assert_eq!(snapshot.current_index, 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn replacing_the_deck_mid_playback_interrupts_and_goes_idle() {
    let client = ScriptedSynthesisClient::new(SynthesisScript::Succeed { frames: 40_000 });
    let mut harness = Harness::spawn(client, deck_of(&["one", "two", "three"]), test_settings());

    harness.send(SchedulerCommand::SetAutoplay(true)).await;
    harness
        .wait_for(Duration::from_secs(2), |e| {
            *e == SchedulerStateUpdate::AutoplayStateChanged(AutoplayState::Playing)
        })
        .await;

    harness.send(SchedulerCommand::LoadDeck(deck_of(&["fresh"]))).await;
    harness
        .wait_for(Duration::from_secs(2), |e| {
            *e == SchedulerStateUpdate::AutoplayStateChanged(AutoplayState::Idle)
        })
        .await;

    let snapshot = harness.snapshot().await;
    assert!(!snapshot.autoplay_enabled);
    assert_eq!(snapshot.slide_count, 1);
    assert_eq!(snapshot.current_index, 0, "cursor must be clamped into the new deck");

    harness.shutdown().await;
}
