//! Host side of the embedded editor boundary.
//!
//! [`bridge::EditorBridge`] owns the RPC channel, readiness tracker and the
//! session, title and project synchronizers. [`stdio`] runs it headless over
//! newline-delimited JSON.

pub mod bridge;
pub mod channel;
pub mod contract;
pub mod events;
pub mod gateway;
pub mod http;
pub mod project;
pub mod readiness;
pub mod record;
pub mod session;
pub mod stdio;
pub mod title;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a state mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
