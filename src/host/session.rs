//! Authentication state propagation into the embedded editor.
//!
//! The host learns who is logged in asynchronously. Until that resolves the
//! session is [`AuthState::Unknown`] and nothing is pushed, so the editor
//! never briefly sees a logged-in user as anonymous.

use crate::error::Result;
use crate::host::channel::RpcChannel;
use crate::host::contract::{EventLevel, HostMessage, SessionSnapshot};
use crate::host::events::Diagnostics;
use crate::host::gateway::{AuthService, Profile};
use crate::host::lock;
use crate::host::readiness::ReadinessTracker;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Unknown,
    Authenticated,
    Anonymous,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub state: AuthState,
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
}

impl Session {
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            state: AuthState::Anonymous,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn authenticated(profile: Profile) -> Self {
        Self {
            state: AuthState::Authenticated,
            display_name: Some(profile.display_name),
            avatar_ref: profile.avatar_ref,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    /// The pushable form of this session, or `None` while it is unresolved.
    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        match self.state {
            AuthState::Unknown => None,
            AuthState::Anonymous => Some(SessionSnapshot::anonymous()),
            AuthState::Authenticated => Some(SessionSnapshot {
                authenticated: true,
                display_name: self.display_name.clone(),
                avatar_ref: self.avatar_ref.clone(),
            }),
        }
    }
}

pub struct SessionSynchronizer {
    channel: Arc<RpcChannel>,
    readiness: Arc<ReadinessTracker>,
    auth: Arc<dyn AuthService>,
    session: Mutex<Session>,
    diagnostics: Diagnostics,
    cancel: CancellationToken,
}

impl std::fmt::Debug for SessionSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSynchronizer")
            .field("session", &self.session())
            .finish_non_exhaustive()
    }
}

impl SessionSynchronizer {
    #[must_use]
    pub fn new(
        channel: Arc<RpcChannel>,
        readiness: Arc<ReadinessTracker>,
        auth: Arc<dyn AuthService>,
        diagnostics: Diagnostics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            channel,
            readiness,
            auth,
            session: Mutex::new(Session::default()),
            diagnostics,
            cancel,
        }
    }

    #[must_use]
    pub fn session(&self) -> Session {
        lock(&self.session).clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        lock(&self.session).is_authenticated()
    }

    /// Resolve the session from the auth service and push it if it changed.
    ///
    /// Any failure to reach the service counts as anonymous.
    pub async fn check_status(&self) -> Session {
        let resolved = match self.auth.profile().await {
            Ok(Some(profile)) => Session::authenticated(profile),
            Ok(None) => Session::anonymous(),
            Err(e) => {
                tracing::warn!(error = %e, "auth status check failed; treating as anonymous");
                Session::anonymous()
            }
        };
        self.set_session(resolved.clone());
        resolved
    }

    /// Replace the session, pushing when the value changed.
    pub fn set_session(&self, session: Session) -> bool {
        let changed = {
            let mut current = lock(&self.session);
            if *current == session {
                false
            } else {
                *current = session;
                true
            }
        };
        if changed {
            self.push();
        }
        changed
    }

    /// Send the session snapshot into the editor.
    ///
    /// No-op while the editor's transport is not attached or the session is
    /// still unknown.
    pub fn push(&self) -> bool {
        if !self.readiness.transport_attached() {
            tracing::debug!("session push skipped: transport not attached");
            return false;
        }
        let Some(snapshot) = self.session().snapshot() else {
            tracing::debug!("session push skipped: auth state unknown");
            return false;
        };
        let authenticated = snapshot.authenticated;
        let sent = self.channel.send(&HostMessage::UserInfoUpdate(snapshot));
        if sent {
            self.diagnostics.emit(
                EventLevel::Debug,
                "session.pushed",
                serde_json::json!({ "authenticated": authenticated }),
            );
        }
        sent
    }

    /// Push after `delay` unless the bridge is disposed first.
    pub fn schedule_delayed_push(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("delayed session push cancelled");
                }
                () = tokio::time::sleep(delay) => {
                    this.push();
                }
            }
        })
    }

    /// Log out through the auth service.
    ///
    /// The session only turns anonymous once the service confirms, so a
    /// failed logout leaves both sides of the boundary untouched. On success
    /// an anonymous snapshot is pushed even if nothing appeared to change.
    pub async fn logout(&self) -> Result<()> {
        if let Err(e) = self.auth.logout().await {
            self.diagnostics
                .notice(EventLevel::Error, format!("Logout failed: {e}"));
            return Err(e);
        }
        tracing::info!("logged out");
        if !self.set_session(Session::anonymous()) {
            self.push();
        }
        Ok(())
    }

    pub fn on_ack(&self, echo: &serde_json::Value) {
        self.diagnostics
            .emit(EventLevel::Debug, "session.ack", echo.clone());
    }
}
