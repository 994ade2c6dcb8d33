//! Two-signal readiness tracking for the embedded editor.
//!
//! The editor's container ("transport attached") and its internal engine
//! ("runtime initialized") boot independently and announce themselves in
//! either order. Consumers gate on [`ReadinessTracker::is_ready`], which only
//! holds once both have fired, and must re-check after *either* signal.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessState {
    pub transport_attached: bool,
    pub runtime_initialized: bool,
}

impl ReadinessState {
    #[must_use]
    pub fn is_ready(self) -> bool {
        self.transport_attached && self.runtime_initialized
    }
}

/// Which readiness signal arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessSignal {
    TransportAttached,
    RuntimeInitialized,
}

#[derive(Debug)]
pub struct ReadinessTracker {
    state_tx: watch::Sender<ReadinessState>,
}

impl Default for ReadinessTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessTracker {
    #[must_use]
    pub fn new() -> Self {
        let (state_tx, _state_rx) = watch::channel(ReadinessState::default());
        Self { state_tx }
    }

    /// Record a signal. Returns `true` if it changed the state.
    ///
    /// Signals are one-shot: repeating one is a no-op.
    pub fn signal(&self, signal: ReadinessSignal) -> bool {
        let changed = self.state_tx.send_if_modified(|state| {
            let slot = match signal {
                ReadinessSignal::TransportAttached => &mut state.transport_attached,
                ReadinessSignal::RuntimeInitialized => &mut state.runtime_initialized,
            };
            if *slot {
                false
            } else {
                *slot = true;
                true
            }
        });
        if changed {
            let state = self.state();
            tracing::info!(
                ?signal,
                transport_attached = state.transport_attached,
                runtime_initialized = state.runtime_initialized,
                ready = state.is_ready(),
                "readiness signal"
            );
        }
        changed
    }

    pub fn mark_transport_attached(&self) -> bool {
        self.signal(ReadinessSignal::TransportAttached)
    }

    pub fn mark_runtime_initialized(&self) -> bool {
        self.signal(ReadinessSignal::RuntimeInitialized)
    }

    #[must_use]
    pub fn state(&self) -> ReadinessState {
        *self.state_tx.borrow()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    #[must_use]
    pub fn transport_attached(&self) -> bool {
        self.state().transport_attached
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.state_tx.subscribe()
    }

    /// Wait until both signals have fired.
    pub async fn wait_ready(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail while borrowed.
        let _ = rx.wait_for(|state| state.is_ready()).await;
    }
}
