//! Correlated request/response on top of a one-way broadcast transport.
//!
//! The embedded editor can only receive fire-and-forget frames and answer
//! with fire-and-forget frames of its own. [`RpcChannel::request`] simulates
//! a call by tagging the outbound frame with a generated correlation id and
//! parking a resolver under that id until a reply, the deadline or
//! [`RpcChannel::dispose`] settles it.

use crate::error::{BridgeError, Result};
use crate::host::contract::{EventLevel, HostMessage, RequestKind, WireFrame};
use crate::host::events::Diagnostics;
use crate::host::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// The boundary to the embedded editor.
pub trait EmbeddedTransport: Send + Sync + 'static {
    /// Origin of the attached target, or `None` while nothing is attached.
    fn attached_origin(&self) -> Option<String>;

    /// Deliver one frame to the attached target.
    fn post(&self, frame: &WireFrame) -> Result<()>;
}

/// A decoded RPC reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Title(String),
    Document(serde_json::Value),
    Thumbnail(Option<Vec<u8>>),
}

impl Reply {
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Title(_) => RequestKind::Title,
            Self::Document(_) => RequestKind::Export,
            Self::Thumbnail(_) => RequestKind::Thumbnail,
        }
    }

    pub fn into_title(self) -> Result<String> {
        match self {
            Self::Title(title) => Ok(title),
            other => Err(mismatch(RequestKind::Title, &other)),
        }
    }

    pub fn into_document(self) -> Result<serde_json::Value> {
        match self {
            Self::Document(document) => Ok(document),
            other => Err(mismatch(RequestKind::Export, &other)),
        }
    }

    pub fn into_thumbnail(self) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Thumbnail(image) => Ok(image),
            other => Err(mismatch(RequestKind::Thumbnail, &other)),
        }
    }
}

fn mismatch(expected: RequestKind, got: &Reply) -> BridgeError {
    BridgeError::MalformedPayload(format!("expected {expected} reply, got {}", got.kind()))
}

/// What a pending request gets resolved with.
#[derive(Debug, Clone)]
pub enum Delivery {
    Reply(Reply),
    Malformed(String),
}

struct PendingRequest {
    kind: RequestKind,
    resolver: oneshot::Sender<Delivery>,
}

#[derive(Default)]
struct ChannelState {
    pending: HashMap<String, PendingRequest>,
    disposed: bool,
}

/// Removes a pending entry when its request future finishes or is dropped.
struct PendingGuard<'a> {
    state: &'a Mutex<ChannelState>,
    correlation_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).pending.remove(&self.correlation_id);
    }
}

pub struct RpcChannel {
    transport: Arc<dyn EmbeddedTransport>,
    expected_origin: String,
    state: Mutex<ChannelState>,
    diagnostics: Diagnostics,
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("expected_origin", &self.expected_origin)
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl RpcChannel {
    #[must_use]
    pub fn new(
        transport: Arc<dyn EmbeddedTransport>,
        expected_origin: impl Into<String>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            transport,
            expected_origin: expected_origin.into(),
            state: Mutex::new(ChannelState::default()),
            diagnostics,
        }
    }

    #[must_use]
    pub fn expected_origin(&self) -> &str {
        &self.expected_origin
    }

    /// Whether a frame from `origin` may be acted upon.
    #[must_use]
    pub fn accepts_origin(&self, origin: &str) -> bool {
        origin == self.expected_origin
    }

    /// Fire-and-forget send.
    ///
    /// Returns whether the frame was handed to the transport. A missing or
    /// foreign target is a silent no-op, never an error.
    pub fn send(&self, message: &HostMessage) -> bool {
        self.post(message, None)
    }

    fn post(&self, message: &HostMessage, correlation_id: Option<&str>) -> bool {
        let message_type = message.message_type();
        if lock(&self.state).disposed {
            tracing::debug!(%message_type, "channel disposed; dropping outbound frame");
            return false;
        }
        match self.transport.attached_origin() {
            None => {
                tracing::debug!(%message_type, "embedded target not attached; dropping outbound frame");
                false
            }
            Some(origin) if !self.accepts_origin(&origin) => {
                tracing::warn!(
                    %message_type,
                    origin = %origin,
                    expected = %self.expected_origin,
                    "embedded target origin mismatch; refusing to send"
                );
                false
            }
            Some(_) => match self.transport.post(&message.to_frame(correlation_id)) {
                Ok(()) => {
                    tracing::trace!(%message_type, ?correlation_id, "frame sent");
                    true
                }
                Err(e) => {
                    tracing::warn!(%message_type, error = %e, "transport rejected outbound frame");
                    false
                }
            },
        }
    }

    /// Issue a correlated request and wait for its reply.
    ///
    /// On deadline expiry or a malformed reply the request resolves with
    /// `fallback`; with no fallback it fails with [`BridgeError::Timeout`]
    /// or [`BridgeError::MalformedPayload`].
    pub async fn request(
        &self,
        kind: RequestKind,
        timeout: Duration,
        fallback: Option<Reply>,
    ) -> Result<Reply> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let (resolver, reply_rx) = oneshot::channel();
        {
            let mut state = lock(&self.state);
            if state.disposed {
                return Err(BridgeError::Disposed);
            }
            state
                .pending
                .insert(correlation_id.clone(), PendingRequest { kind, resolver });
        }
        let _guard = PendingGuard {
            state: &self.state,
            correlation_id: correlation_id.clone(),
        };

        self.post(&kind.request_message(), Some(&correlation_id));

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(Delivery::Reply(reply))) => Ok(reply),
            Ok(Ok(Delivery::Malformed(detail))) => match fallback {
                Some(value) => {
                    self.diagnostics.emit(
                        EventLevel::Warn,
                        "rpc.malformed_fallback",
                        serde_json::json!({ "kind": kind, "detail": detail }),
                    );
                    Ok(value)
                }
                None => {
                    self.diagnostics.emit(
                        EventLevel::Error,
                        "rpc.malformed",
                        serde_json::json!({ "kind": kind, "detail": detail }),
                    );
                    Err(BridgeError::MalformedPayload(detail))
                }
            },
            Ok(Err(_closed)) => Err(BridgeError::Disposed),
            Err(_elapsed) => {
                let after_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                match fallback {
                    Some(value) => {
                        self.diagnostics.emit(
                            EventLevel::Warn,
                            "rpc.timeout_fallback",
                            serde_json::json!({ "kind": kind, "after_ms": after_ms }),
                        );
                        Ok(value)
                    }
                    None => {
                        self.diagnostics.emit(
                            EventLevel::Error,
                            "rpc.timeout",
                            serde_json::json!({ "kind": kind, "after_ms": after_ms }),
                        );
                        Err(BridgeError::Timeout { kind, after_ms })
                    }
                }
            }
        }
    }

    /// Route an inbound reply to its pending request(s).
    ///
    /// A correlated reply settles exactly that request. An uncorrelated one
    /// settles every pending request of the kind. Returns how many requests
    /// were settled; zero means the reply was stale or unsolicited.
    pub fn deliver(
        &self,
        kind: RequestKind,
        correlation_id: Option<&str>,
        delivery: Delivery,
    ) -> usize {
        let resolvers: Vec<oneshot::Sender<Delivery>> = {
            let mut state = lock(&self.state);
            match correlation_id {
                Some(id) => match state.pending.get(id).map(|entry| entry.kind) {
                    Some(pending_kind) if pending_kind == kind => state
                        .pending
                        .remove(id)
                        .map(|entry| vec![entry.resolver])
                        .unwrap_or_default(),
                    Some(pending_kind) => {
                        tracing::warn!(
                            correlation_id = id,
                            expected = %pending_kind,
                            got = %kind,
                            "reply kind does not match pending request; ignoring"
                        );
                        Vec::new()
                    }
                    None => Vec::new(),
                },
                None => {
                    let ids: Vec<String> = state
                        .pending
                        .iter()
                        .filter(|(_, entry)| entry.kind == kind)
                        .map(|(id, _)| id.clone())
                        .collect();
                    ids.iter()
                        .filter_map(|id| state.pending.remove(id))
                        .map(|entry| entry.resolver)
                        .collect()
                }
            }
        };

        if resolvers.is_empty() {
            tracing::debug!(%kind, ?correlation_id, "reply without pending request; ignoring");
            return 0;
        }

        let mut settled = 0;
        for resolver in resolvers {
            if resolver.send(delivery.clone()).is_ok() {
                settled += 1;
            }
        }
        settled
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Clear every pending resolver and refuse further traffic.
    ///
    /// Outstanding request futures resolve with [`BridgeError::Disposed`].
    /// Returns how many requests were cleared.
    pub fn dispose(&self) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut state = lock(&self.state);
            state.disposed = true;
            state.pending.drain().map(|(_, entry)| entry).collect()
        };
        let cleared = drained.len();
        drop(drained);
        if cleared > 0 {
            tracing::info!(cleared, "disposed channel with pending requests");
        }
        cleared
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        lock(&self.state).disposed
    }
}
