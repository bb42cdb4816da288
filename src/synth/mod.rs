//! Speech-synthesis service boundary

pub mod api;
pub mod models;

pub use api::{HttpSynthesisClient, SynthesisClient, SynthesisError};
pub use models::NarrationRequest;
