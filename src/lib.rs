//! Audio-reactive visual engine: a kick/onset feature extractor, effect
//! slots with their own surfaces and options, a compositor that blends
//! active slots in order, and a kick-gated automix.

pub mod audio;
pub mod effects;
pub mod engine;
pub mod error;
pub mod render;

pub use engine::{Engine, EngineSettings};
pub use error::{EngineError, Result};
