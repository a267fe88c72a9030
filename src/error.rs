use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures the engine reports. None of them stop the frame loop: callers
/// log and discard render and cleanup errors, and a rejected reorder leaves
/// the previous order in place.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load effect '{id}': {reason}")]
    PluginLoad { id: String, reason: String },

    #[error("slot {slot} failed to render: {reason}")]
    Render { slot: usize, reason: String },

    #[error("invalid reorder request: {0}")]
    InvalidReorder(String),

    #[error("slot {slot} cleanup failed: {reason}")]
    Cleanup { slot: usize, reason: String },

    #[error("no slot with index {0}")]
    UnknownSlot(usize),

    #[error("unknown blend mode '{0}'")]
    UnknownBlendMode(String),

    #[error("invalid option schema: {0}")]
    InvalidSchema(String),
}
