//! Slide deck models consumed by the narration engine

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::io;
use std::path::Path;

/// One slide with its speaker-notes narration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slide {
    pub id: String,
    #[serde(default)]
    pub narration_text: String,
    /// Per-slide voice, overriding the deck default when set.
    #[serde(default)]
    pub voice_override: Option<String>,
}

/// An ordered slide sequence plus the presentation-level default voice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlideDeck {
    pub slides: Vec<Slide>,
    pub default_voice: String,
}

impl SlideDeck {
    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    pub fn slide(&self, index: usize) -> Option<&Slide> {
        self.slides.get(index)
    }

    /// The voice used for the slide at `index`: its override, falling back to
    /// the deck default.
    pub fn effective_voice(&self, index: usize) -> Option<&str> {
        self.slides
            .get(index)
            .map(|slide| slide.voice_override.as_deref().unwrap_or(&self.default_voice))
    }

    pub fn is_last(&self, index: usize) -> bool {
        self.slides.is_empty() || index >= self.slides.len() - 1
    }

    /// Loads a deck from a JSON file.
    pub fn load(path: &Path) -> Result<Self, DeckError> {
        let content = fs::read_to_string(path)?;
        let deck: SlideDeck = serde_json::from_str(&content)?;
        Ok(deck)
    }
}

/// Error types for deck loading.
#[derive(Debug)]
pub enum DeckError {
    IoError(io::Error),
    ParseError(String),
}

impl From<io::Error> for DeckError {
    fn from(err: io::Error) -> Self {
        DeckError::IoError(err)
    }
}

impl From<serde_json::Error> for DeckError {
    fn from(err: serde_json::Error) -> Self {
        DeckError::ParseError(err.to_string())
    }
}

impl std::fmt::Display for DeckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeckError::IoError(e) => write!(f, "I/O error: {}", e),
            DeckError::ParseError(s) => write!(f, "Parse error: {}", s),
        }
    }
}

impl Error for DeckError {}
