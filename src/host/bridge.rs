//! The bridge object a host session owns.
//!
//! [`EditorBridge`] is built once per host session from the configuration
//! and the injected collaborators, receives every inbound frame through
//! [`EditorBridge::handle_inbound`] and is torn down with
//! [`EditorBridge::dispose`].

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::host::channel::{Delivery, EmbeddedTransport, Reply, RpcChannel};
use crate::host::contract::{
    ContractError, ContractErrorKind, EmbeddedMessage, EventEnvelope, EventLevel, InboundMessage,
    RequestKind, decode_inbound,
};
use crate::host::events::Diagnostics;
use crate::host::gateway::{AuthService, ProjectGateway};
use crate::host::project::{LoadState, ProjectLifecycle, ProjectSettings};
use crate::host::readiness::{ReadinessSignal, ReadinessState, ReadinessTracker};
use crate::host::record::{ProjectId, ProjectPatch, ProjectRecord, RecordCell};
use crate::host::session::{Session, SessionSynchronizer};
use crate::host::title::TitleSynchronizer;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A raw inbound frame together with the origin it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    pub origin: String,
    pub message: serde_json::Value,
}

pub struct EditorBridge {
    channel: Arc<RpcChannel>,
    readiness: Arc<ReadinessTracker>,
    session: Arc<SessionSynchronizer>,
    titles: Arc<TitleSynchronizer>,
    project: Arc<ProjectLifecycle>,
    diagnostics: Diagnostics,
    session_push_delay: Duration,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl std::fmt::Debug for EditorBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorBridge")
            .field("channel", &self.channel)
            .field("readiness", &self.readiness.state())
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

impl EditorBridge {
    #[must_use]
    pub fn new(
        config: &BridgeConfig,
        transport: Arc<dyn EmbeddedTransport>,
        gateway: Arc<dyn ProjectGateway>,
        auth: Arc<dyn AuthService>,
    ) -> Arc<Self> {
        let diagnostics = Diagnostics::new(config.embed.event_capacity);
        let cancel = CancellationToken::new();
        let channel = Arc::new(RpcChannel::new(
            transport,
            config.embed.expected_origin.clone(),
            diagnostics.clone(),
        ));
        let readiness = Arc::new(ReadinessTracker::new());
        let record = RecordCell::new(ProjectRecord::blank(&config.project.placeholder_title));

        let session = Arc::new(SessionSynchronizer::new(
            Arc::clone(&channel),
            Arc::clone(&readiness),
            auth,
            diagnostics.clone(),
            cancel.clone(),
        ));
        let titles = Arc::new(TitleSynchronizer::new(
            Arc::clone(&channel),
            record.clone(),
            config.project.placeholder_title.clone(),
            config.timeouts.title(),
            diagnostics.clone(),
        ));
        let project = Arc::new(
            ProjectLifecycle::new(
                Arc::clone(&channel),
                Arc::clone(&readiness),
                Arc::clone(&session),
                Arc::clone(&titles),
                gateway,
                record,
                diagnostics.clone(),
            )
            .with_timeouts(config.timeouts.export(), config.timeouts.thumbnail())
            .with_export_dir(config.project.export_dir.clone()),
        );

        Arc::new(Self {
            channel,
            readiness,
            session,
            titles,
            project,
            diagnostics,
            session_push_delay: config.timeouts.session_push_delay(),
            cancel,
            tasks: TaskTracker::new(),
        })
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.diagnostics.subscribe()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    #[must_use]
    pub fn readiness(&self) -> ReadinessState {
        self.readiness.state()
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.session.session()
    }

    #[must_use]
    pub fn title(&self) -> String {
        self.titles.title()
    }

    #[must_use]
    pub fn record(&self) -> ProjectRecord {
        self.project.record()
    }

    #[must_use]
    pub fn load_state(&self) -> LoadState {
        self.project.load_state()
    }

    #[must_use]
    pub fn last_sent_id(&self) -> Option<ProjectId> {
        self.project.last_sent_id()
    }

    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.channel.pending_count()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Validate and dispatch one inbound frame.
    ///
    /// Frames from any origin other than the configured one are dropped
    /// without being decoded.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Contract`] when the frame does not match the
    /// message schema. A malformed RPC reply still settles its pending
    /// request.
    pub fn handle_inbound(self: &Arc<Self>, origin: &str, raw: &serde_json::Value) -> Result<()> {
        if self.is_disposed() {
            tracing::debug!("bridge disposed; ignoring inbound frame");
            return Ok(());
        }
        if !self.channel.accepts_origin(origin) {
            tracing::warn!(
                origin,
                expected = %self.channel.expected_origin(),
                "dropping frame from unexpected origin"
            );
            return Ok(());
        }

        match decode_inbound(raw) {
            Ok(inbound) => {
                self.dispatch(inbound);
                Ok(())
            }
            Err(e) => {
                self.reject(&e);
                Err(BridgeError::Contract(e))
            }
        }
    }

    fn reject(&self, error: &ContractError) {
        self.diagnostics.emit(
            EventLevel::Warn,
            "contract.rejected",
            serde_json::json!({
                "kind": format!("{:?}", error.kind),
                "message_type": error.message_type.map(|t| t.as_str()),
                "message": error.message,
            }),
        );
        if error.kind != ContractErrorKind::MalformedPayload {
            return;
        }
        if let Some(kind) = error.message_type.and_then(|t| t.reply_kind()) {
            self.channel.deliver(
                kind,
                error.correlation_id.as_deref(),
                Delivery::Malformed(error.message.clone()),
            );
        }
    }

    fn dispatch(self: &Arc<Self>, inbound: InboundMessage) {
        let correlation_id = inbound.correlation_id.as_deref();
        tracing::trace!(message_type = %inbound.message.message_type(), ?correlation_id, "inbound frame");

        match inbound.message {
            EmbeddedMessage::LoadProjectAck(ack) => self.project.on_load_ack(&ack),
            EmbeddedMessage::ExportProjectResponse(document) => {
                self.channel.deliver(
                    RequestKind::Export,
                    correlation_id,
                    Delivery::Reply(Reply::Document(document)),
                );
            }
            EmbeddedMessage::ThumbnailResponse(image) => {
                self.channel.deliver(
                    RequestKind::Thumbnail,
                    correlation_id,
                    Delivery::Reply(Reply::Thumbnail(image)),
                );
            }
            EmbeddedMessage::ProjectTitleResponse(title) => {
                self.channel.deliver(
                    RequestKind::Title,
                    correlation_id,
                    Delivery::Reply(Reply::Title(title)),
                );
            }
            EmbeddedMessage::UserInfoUpdateAck(echo) => self.session.on_ack(&echo),
            EmbeddedMessage::TitleUpdate(title) => {
                self.titles.apply_update(&title);
            }
            EmbeddedMessage::TransportReady { timestamp } => {
                self.on_readiness(ReadinessSignal::TransportAttached, timestamp);
            }
            EmbeddedMessage::RuntimeReady { timestamp } => {
                self.on_readiness(ReadinessSignal::RuntimeInitialized, timestamp);
            }
            EmbeddedMessage::SaveRequested => {
                let project = Arc::clone(&self.project);
                self.spawn("save", async move { project.save().await.map(|_| ()) });
            }
            EmbeddedMessage::LogoutRequested => {
                let session = Arc::clone(&self.session);
                self.spawn("logout", async move { session.logout().await });
            }
        }
    }

    fn on_readiness(self: &Arc<Self>, signal: ReadinessSignal, timestamp: Option<i64>) {
        let sent_at = timestamp.and_then(chrono::DateTime::from_timestamp_millis);
        tracing::debug!(?signal, ?sent_at, "readiness signal received");
        self.readiness.signal(signal);
        self.project.try_transfer();
        let push = self.session.schedule_delayed_push(self.session_push_delay);
        self.tasks.spawn(async move {
            if let Err(e) = push.await {
                tracing::debug!(error = %e, "delayed session push task failed");
            }
        });
    }

    /// Run a user action in the background until it finishes or the bridge
    /// is disposed.
    fn spawn<F>(&self, action: &'static str, future: F)
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(action, "bridge disposed; abandoning action");
                }
                result = future => {
                    if let Err(e) = result {
                        tracing::warn!(action, error = %e, "editor-requested action failed");
                    }
                }
            }
        });
    }

    /// Resolve the auth session and push it to the editor.
    pub async fn check_session(&self) -> Session {
        self.session.check_status().await
    }

    pub async fn load_project(&self, id: impl Into<ProjectId>) -> Result<()> {
        self.project.load_project(id.into()).await
    }

    pub fn new_project(&self) {
        self.project.new_project();
    }

    pub fn replace_record(&self, record: ProjectRecord) {
        self.project.replace_record(record);
    }

    pub async fn save(&self) -> Result<ProjectRecord> {
        self.project.save().await
    }

    pub async fn export_to_file(&self, dir: Option<&Path>) -> Result<PathBuf> {
        self.project.export_to_file(dir).await
    }

    pub async fn open_settings(&self) -> Result<ProjectSettings> {
        self.project.open_settings().await
    }

    pub async fn update_settings(&self, patch: ProjectPatch) -> Result<ProjectSettings> {
        self.project.update_settings(patch).await
    }

    pub async fn request_title(&self) -> Result<String> {
        self.titles.request_title().await
    }

    pub fn set_title(&self, raw: &str) -> String {
        self.titles.set_title(raw)
    }

    pub async fn logout(&self) -> Result<()> {
        self.session.logout().await
    }

    /// Tear the bridge down.
    ///
    /// Cancels delayed pushes and editor-requested actions, and settles every
    /// pending request with [`BridgeError::Disposed`]. Idempotent.
    pub fn dispose(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        let cleared = self.channel.dispose();
        self.tasks.close();
        tracing::info!(cleared, "editor bridge disposed");
    }

    /// Wait for background tasks to finish after [`Self::dispose`].
    pub async fn shutdown(&self) {
        self.dispose();
        self.tasks.wait().await;
    }

    /// Drive the bridge from a stream of inbound frames.
    ///
    /// Resolves the session first, then dispatches frames until the sender
    /// side closes, and finally disposes the bridge.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<InboundFrame>) {
        let session = Arc::clone(&self.session);
        self.tasks.spawn(async move {
            session.check_status().await;
        });

        while let Some(frame) = inbound.recv().await {
            if let Err(e) = self.handle_inbound(&frame.origin, &frame.message) {
                tracing::debug!(error = %e, "inbound frame rejected");
            }
        }

        tracing::info!("inbound stream closed; shutting down bridge");
        self.shutdown().await;
    }
}

impl Drop for EditorBridge {
    fn drop(&mut self) {
        self.dispose();
    }
}
