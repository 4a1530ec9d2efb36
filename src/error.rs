use thiserror::Error;

use crate::events::{ImmersiveMode, SessionTicket, ViewerMode};

/// Library error type for the synthesis pipeline and the viewer state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Zero-sized grid or a buffer whose length disagrees with its dimensions.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// The device cannot host the requested immersive session.
    #[error("{0} sessions are not supported on this device")]
    UnsupportedCapability(ImmersiveMode),

    /// A session grant arrived after the viewer already moved on.
    #[error("stale session completion for ticket {0}")]
    StaleSessionCompletion(SessionTicket),

    /// The requested mode cannot be reached from the current one.
    #[error("cannot switch from {from} to {requested}")]
    InvalidTransition {
        from: ViewerMode,
        requested: ViewerMode,
    },

    /// Background mode is fixed once an immersive session has been requested.
    #[error("passthrough cannot change while in {0}")]
    PassthroughLocked(ViewerMode),
}

pub type Result<T> = std::result::Result<T, Error>;
