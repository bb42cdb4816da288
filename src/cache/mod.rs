//! Narration cache with single-flight audio resolution
//!
//! One entry per slide. An entry is valid only when its text fingerprint and
//! voice name exactly match the slide's current narration text and effective
//! voice; any mismatch is a miss, never a stale hit.


use crate::audio::{decode_pcm_s16le, DecodedBuffer};
use crate::synth::{NarrationRequest, SynthesisClient};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex as TokioMutex};
use tracing::{debug, trace, warn};

const LOG_TARGET: &str = "slidecast::cache";

/// PCM layout the synthesis service produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channel_count: usize,
}

/// Narration audio cached for one slide.
#[derive(Debug, Clone)]
pub struct CachedAudio {
    pub slide_id: String,
    pub text_fingerprint: String,
    pub voice_name: String,
    pub buffer: Arc<DecodedBuffer>,
    pub duration_seconds: f64,
}

/// Failure to produce narration audio for a slide.
///
/// Clonable so the in-flight result can be fanned out to every waiter; the
/// synthesis and decode variants stay distinguishable in logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    Synthesis(String),
    Decode(String),
    Interrupted(String),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::Synthesis(e) => write!(f, "Synthesis failed: {}", e),
            ResolveError::Decode(e) => write!(f, "Audio decode failed: {}", e),
            ResolveError::Interrupted(e) => write!(f, "Resolution interrupted: {}", e),
        }
    }
}

impl Error for ResolveError {}

type ResolveResult = Result<Arc<CachedAudio>, ResolveError>;

struct InFlight {
    text: String,
    voice_name: String,
    result_tx: broadcast::Sender<ResolveResult>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, Arc<CachedAudio>>,
    pending: HashMap<String, InFlight>,
}

/// Shared narration cache. Cheap to clone; all clones see the same entries.
#[derive(Clone)]
pub struct NarrationCache {
    inner: Arc<TokioMutex<CacheInner>>,
}

impl NarrationCache {
    pub fn new() -> Self {
        NarrationCache {
            inner: Arc::new(TokioMutex::new(CacheInner::default())),
        }
    }

    /// Returns the cached audio for a slide only under an exact
    /// `(text, voice)` match.
    pub async fn lookup(&self, slide_id: &str, text: &str, voice_name: &str) -> Option<Arc<CachedAudio>> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(slide_id)
            .filter(|entry| entry.text_fingerprint == text && entry.voice_name == voice_name)
            .cloned()
    }

    /// Stores audio for a slide, unconditionally replacing any prior entry.
    pub async fn store(
        &self,
        slide_id: &str,
        text: &str,
        voice_name: &str,
        buffer: Arc<DecodedBuffer>,
    ) -> Arc<CachedAudio> {
        let entry = Arc::new(CachedAudio {
            slide_id: slide_id.to_string(),
            text_fingerprint: text.to_string(),
            voice_name: voice_name.to_string(),
            duration_seconds: buffer.duration_seconds(),
            buffer,
        });
        let mut inner = self.inner.lock().await;
        inner.entries.insert(slide_id.to_string(), entry.clone());
        entry
    }

    /// Returns cached audio for the request, synthesizing and decoding on a
    /// miss.
    ///
    /// Concurrent resolves for the same `(slide_id, text, voice)` share one
    /// underlying synthesis call: the first caller becomes the leader and the
    /// rest subscribe to its result. The leader's work runs in a detached task
    /// so a caller dropped by a timeout cannot strand the other waiters.
    pub async fn resolve(
        &self,
        request: &NarrationRequest,
        client: Arc<dyn SynthesisClient>,
        format: PcmFormat,
    ) -> ResolveResult {
        let mut result_rx = {
            let mut inner = self.inner.lock().await;

            if let Some(entry) = inner
                .entries
                .get(&request.slide_id)
                .filter(|e| e.text_fingerprint == request.text && e.voice_name == request.voice_name)
            {
                trace!(target: LOG_TARGET, slide_id = %request.slide_id, "Cache hit.");
                return Ok(entry.clone());
            }

            let in_flight_matches = match inner.pending.get(&request.slide_id) {
                Some(p) if p.text == request.text && p.voice_name == request.voice_name => true,
                Some(_) => {
                    // An older fetch for a previous (text, voice) is still
                    // running; it will land with its own fingerprint and
                    // simply miss future lookups. Start a fresh one.
                    debug!(target: LOG_TARGET, slide_id = %request.slide_id, "In-flight synthesis is for outdated content, starting a new one.");
                    false
                }
                None => false,
            };

            if in_flight_matches {
                debug!(target: LOG_TARGET, slide_id = %request.slide_id, "Joining in-flight synthesis for slide.");
                inner.pending[&request.slide_id].result_tx.subscribe()
            } else {
                let (result_tx, result_rx) = broadcast::channel::<ResolveResult>(1);
                inner.pending.insert(
                    request.slide_id.clone(),
                    InFlight {
                        text: request.text.clone(),
                        voice_name: request.voice_name.clone(),
                        result_tx: result_tx.clone(),
                    },
                );
                self.spawn_leader(request.clone(), client, format, result_tx);
                result_rx
            }
        };

        result_rx
            .recv()
            .await
            .unwrap_or_else(|e| Err(ResolveError::Interrupted(format!("in-flight synthesis dropped: {}", e))))
    }

    /// Runs synthesize -> decode -> store in a detached task and fans the
    /// result out to every subscriber.
    fn spawn_leader(
        &self,
        request: NarrationRequest,
        client: Arc<dyn SynthesisClient>,
        format: PcmFormat,
        result_tx: broadcast::Sender<ResolveResult>,
    ) {
        let cache = self.clone();
        tokio::spawn(async move {
            let result = synthesize_and_decode(&request, client.as_ref(), format).await;

            let entry = match result {
                Ok(buffer) => Ok(cache
                    .store(&request.slide_id, &request.text, &request.voice_name, Arc::new(buffer))
                    .await),
                Err(e) => {
                    warn!(target: LOG_TARGET, slide_id = %request.slide_id, error = %e, "Narration resolution failed.");
                    Err(e)
                }
            };

            let mut inner = cache.inner.lock().await;
            // Only clear the pending slot if it still belongs to this fetch;
            // a newer fetch for changed content may have replaced it.
            let still_registered = inner
                .pending
                .get(&request.slide_id)
                .map_or(false, |p| p.text == request.text && p.voice_name == request.voice_name);
            if still_registered {
                inner.pending.remove(&request.slide_id);
            }
            drop(inner);

            // Send errors only mean every waiter has already gone away.
            let _ = result_tx.send(entry);
        });
    }
}

impl Default for NarrationCache {
    fn default() -> Self {
        Self::new()
    }
}

async fn synthesize_and_decode(
    request: &NarrationRequest,
    client: &dyn SynthesisClient,
    format: PcmFormat,
) -> Result<DecodedBuffer, ResolveError> {
    let raw = client
        .synthesize(&request.text, &request.voice_name)
        .await
        .map_err(|e| ResolveError::Synthesis(e.to_string()))?;

    decode_pcm_s16le(&raw, format.sample_rate, format.channel_count)
        .map_err(|e| ResolveError::Decode(e.to_string()))
}
