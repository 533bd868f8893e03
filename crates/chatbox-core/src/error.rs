//! Unified error types for the chatbox core.
//!
//! Every way a session can end is an explicit [`SessionError`] variant, and
//! every variant maps onto exactly one [`FailureKind`] for logging. The
//! supervisor treats all of them the same way (tear down, wait, reconnect),
//! so the classification exists to make failures observable and testable,
//! not to pick different recovery paths.

use std::fmt;

use thiserror::Error;

/// Close code used when the stream ends without a close frame.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed before a session could start.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect (token redacted).
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The server answered the upgrade request with a non-101 status.
    #[error("server rejected the handshake with HTTP status {status}")]
    InvalidStatus {
        /// HTTP status code returned by the server.
        status: u16,
    },

    /// The connection was closed by either side.
    #[error("connection closed with code {code}: {reason}")]
    Closed {
        /// WebSocket close code (1006 when no close frame was received).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },

    /// Message send failed.
    #[error("failed to send frame: {0}")]
    SendFailed(String),

    /// I/O or protocol error on an open connection.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Creates a closure error without a close frame.
    pub fn abnormal_close(reason: impl Into<String>) -> Self {
        Self::Closed {
            code: ABNORMAL_CLOSE_CODE,
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Decode Errors
// =============================================================================

/// A single inbound frame could not be decoded.
///
/// Decode errors are local to one frame: the frame is dropped and the
/// session continues.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The frame has a recognised shape but a field is missing or mistyped.
    #[error("malformed {shape} frame: {reason}")]
    Malformed {
        /// The recognised frame shape.
        shape: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

impl DecodeError {
    /// Creates a malformed frame error.
    pub fn malformed(shape: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            shape,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Registration Errors
// =============================================================================

/// Errors raised while building the registry at startup.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// Interval zero is reserved and cannot be scheduled.
    #[error("interval 0 is reserved and cannot be scheduled (job '{job}')")]
    ReservedInterval {
        /// Name of the rejected job.
        job: String,
    },
}

// =============================================================================
// Session Errors
// =============================================================================

/// Coarse classification of why a session ended.
///
/// This is what the supervisor logs before it waits and reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The server sent `Hello { ok: false }`.
    HandshakeRejected,
    /// The connection closed with a normal close code.
    ClosedCleanly,
    /// The connection closed with an error close code.
    ClosedWithError {
        /// The close code.
        code: u16,
    },
    /// The HTTP upgrade was answered with an unexpected status.
    InvalidHandshakeStatus {
        /// The HTTP status code.
        status: u16,
    },
    /// Anything else: protocol violations, handler and job failures.
    Unclassified,
}

impl FailureKind {
    /// Classifies a websocket close code.
    pub fn from_close_code(code: u16) -> Self {
        match code {
            1000 | 1001 => Self::ClosedCleanly,
            code => Self::ClosedWithError { code },
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandshakeRejected => f.write_str("handshake rejected"),
            Self::ClosedCleanly => f.write_str("closed cleanly"),
            Self::ClosedWithError { code } => write!(f, "closed with error code {code}"),
            Self::InvalidHandshakeStatus { status } => {
                write!(f, "invalid handshake status {status}")
            }
            Self::Unclassified => f.write_str("unclassified"),
        }
    }
}

/// The reason a session ended.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server answered the handshake with `ok = false`.
    #[error("handshake rejected by server")]
    HandshakeRejected,

    /// The first frame was not a hello frame.
    #[error("expected hello as first frame, got {got}")]
    UnexpectedFirstFrame {
        /// Short description of what arrived instead.
        got: String,
    },

    /// No frame arrived within the handshake timeout.
    #[error("no hello frame within the handshake timeout")]
    HandshakeTimeout,

    /// The transport failed or closed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A command handler returned an error it did not handle itself.
    #[error("handler for command '{command}' failed: {source}")]
    Handler {
        /// The command being invoked.
        command: String,
        /// The handler's error.
        #[source]
        source: anyhow::Error,
    },

    /// A scheduled job returned an error.
    #[error("job '{job}' (every {interval}s) failed: {source}")]
    Job {
        /// Name of the failing job.
        job: String,
        /// Interval group of the failing job.
        interval: u64,
        /// The job's error.
        #[source]
        source: anyhow::Error,
    },
}

impl SessionError {
    /// Maps this error onto its log classification.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::HandshakeRejected => FailureKind::HandshakeRejected,
            Self::Transport(TransportError::Closed { code, .. }) => {
                FailureKind::from_close_code(*code)
            }
            Self::Transport(TransportError::InvalidStatus { status }) => {
                FailureKind::InvalidHandshakeStatus { status: *status }
            }
            _ => FailureKind::Unclassified,
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
