//! Editor bridge: host-side coordination with an embedded visual-programming
//! editor.
//!
//! The editor runs in an isolated context reachable only through one-way,
//! unordered messages. This crate keeps the host and the editor in sync:
//!
//! - **Readiness**: the editor's container and runtime boot independently;
//!   nothing is transferred until both have announced themselves.
//! - **RPC**: request/response with correlation ids and deadlines on top of
//!   the one-way channel.
//! - **Session**: tri-state authentication pushed into the editor, never
//!   while still unknown.
//! - **Project lifecycle**: fetch, transfer at most once per project, save,
//!   export.
//! - **Title sync**: reconciliation of the host's and the editor's titles.
//!
//! [`host::bridge::EditorBridge`] owns all of it. The `editor-bridge-host`
//! binary runs it over newline-delimited JSON on stdin/stdout.

pub mod config;
pub mod error;
pub mod host;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use host::bridge::{EditorBridge, InboundFrame};
