use serde::{Deserialize, Serialize};

/// One request to synthesize narration audio for a slide.
///
/// `slide_id` keys the cache; the `(text, voice_name)` pair is the identity
/// that decides whether a cached entry may be reused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NarrationRequest {
    pub slide_id: String,
    pub text: String,
    pub voice_name: String,
}
