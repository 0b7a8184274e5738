//! Error types for trackrunner

use std::fmt;
use std::time::Duration;

use crate::vehicle::SessionState;
use crate::vehicle::protocol::ParseError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Why a scan stopped before completing a lap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The session dropped while waiting for telemetry
    LinkLost,
    /// The caller asked the scan to stop
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::LinkLost => write!(f, "link lost"),
            AbortReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed inbound or outbound frame
    #[error("frame error: {0}")]
    Parse(#[from] ParseError),

    /// Command issued before the handshake completed or after disconnect
    #[error("session is {0}, commands need an active session")]
    NotActive(SessionState),

    /// Lifecycle callback arrived in a state that does not expect it
    #[error("unexpected {event} while session is {state}")]
    InvalidTransition {
        state: SessionState,
        event: &'static str,
    },

    #[error("a track scan is already in progress")]
    ScanAlreadyInProgress,

    #[error("track scan aborted: {0}")]
    ScanAborted(AbortReason),

    /// No new position marker arrived within the configured window
    #[error("track scan made no progress for {0:?}")]
    ScanTimedOut(Duration),

    /// The transport can no longer carry frames
    #[error("link closed")]
    LinkClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}
