//! Error types for the editor bridge.

use crate::host::contract::{ContractError, RequestKind};

/// Top-level error type for the host/editor bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// An RPC request had no fallback and no reply arrived in time.
    #[error("{kind} request timed out after {after_ms}ms")]
    Timeout {
        /// The request kind that timed out.
        kind: RequestKind,
        /// The deadline that elapsed, in milliseconds.
        after_ms: u64,
    },

    /// The bridge was disposed while the operation was outstanding.
    #[error("bridge disposed")]
    Disposed,

    /// An inbound payload failed validation.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Message contract violation at the boundary.
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    /// Backend (project or auth API) failure.
    #[error("API error: {0}")]
    Api(String),

    /// Save attempted without an authenticated session.
    #[error("you need to log in before saving this project")]
    NotAuthenticated,

    /// A project document was still a serialized string instead of a structured value.
    #[error("project document is a serialized string, not a structured value")]
    DocumentSerialized,

    /// A save was requested while another save is still running.
    #[error("a save is already in progress")]
    SaveInProgress,

    /// The operation needs a loaded or saved project.
    #[error("no project: {0}")]
    NoProject(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl BridgeError {
    /// Whether this error points the user at the login flow.
    #[must_use]
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BridgeError>;
