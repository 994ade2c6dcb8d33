//! Project lifecycle: fetch, transfer into the editor, save and export.
//!
//! A fetched project is held until the editor is fully ready and is then
//! transferred exactly once per project identity. Loads can be triggered
//! repeatedly by the host (route changes, re-renders); duplicates are
//! absorbed here.

use crate::error::{BridgeError, Result};
use crate::host::channel::{Reply, RpcChannel};
use crate::host::contract::{EventLevel, HostMessage, LoadAck, RequestKind};
use crate::host::events::Diagnostics;
use crate::host::gateway::ProjectGateway;
use crate::host::lock;
use crate::host::readiness::ReadinessTracker;
use crate::host::record::{ProjectId, ProjectPatch, ProjectRecord, RecordCell, ensure_structured};
use crate::host::session::SessionSynchronizer;
use crate::host::title::TitleSynchronizer;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_THUMBNAIL_TIMEOUT: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Idle,
    Fetching { id: ProjectId },
    HoldingUnsent { id: ProjectId, record: ProjectRecord },
    Transferred(ProjectId),
}

#[derive(Debug)]
struct LifecycleState {
    load: LoadState,
    last_sent_id: Option<ProjectId>,
    /// Bumped whenever the host moves to another project; in-flight
    /// results tagged with an older value are discarded.
    generation: u64,
}

/// The editable settings of the current project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    pub id: Option<ProjectId>,
    pub title: String,
    pub description: String,
    pub is_public: bool,
}

/// Clears the in-flight save flag on every exit path.
struct SavingGuard<'a>(&'a AtomicBool);

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ProjectLifecycle {
    channel: Arc<RpcChannel>,
    readiness: Arc<ReadinessTracker>,
    session: Arc<SessionSynchronizer>,
    titles: Arc<TitleSynchronizer>,
    gateway: Arc<dyn ProjectGateway>,
    record: RecordCell,
    state: Mutex<LifecycleState>,
    saving: AtomicBool,
    export_timeout: Duration,
    thumbnail_timeout: Duration,
    export_dir: PathBuf,
    diagnostics: Diagnostics,
}

impl std::fmt::Debug for ProjectLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectLifecycle")
            .field("load", &self.load_state())
            .field("last_sent_id", &self.last_sent_id())
            .finish_non_exhaustive()
    }
}

impl ProjectLifecycle {
    #[must_use]
    pub fn new(
        channel: Arc<RpcChannel>,
        readiness: Arc<ReadinessTracker>,
        session: Arc<SessionSynchronizer>,
        titles: Arc<TitleSynchronizer>,
        gateway: Arc<dyn ProjectGateway>,
        record: RecordCell,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            channel,
            readiness,
            session,
            titles,
            gateway,
            record,
            state: Mutex::new(LifecycleState {
                load: LoadState::Idle,
                last_sent_id: None,
                generation: 0,
            }),
            saving: AtomicBool::new(false),
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            thumbnail_timeout: DEFAULT_THUMBNAIL_TIMEOUT,
            export_dir: PathBuf::from("."),
            diagnostics,
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, export: Duration, thumbnail: Duration) -> Self {
        self.export_timeout = export;
        self.thumbnail_timeout = thumbnail;
        self
    }

    #[must_use]
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }

    #[must_use]
    pub fn load_state(&self) -> LoadState {
        lock(&self.state).load.clone()
    }

    #[must_use]
    pub fn last_sent_id(&self) -> Option<ProjectId> {
        lock(&self.state).last_sent_id.clone()
    }

    #[must_use]
    pub fn record(&self) -> ProjectRecord {
        self.record.snapshot()
    }

    /// Fail unless the editor holds the current project.
    ///
    /// While a project is being fetched or waits for readiness the editor
    /// still shows something else, so its document must not be read back.
    fn ensure_editor_in_sync(&self) -> Result<()> {
        match &lock(&self.state).load {
            LoadState::Fetching { id } => Err(BridgeError::NoProject(format!(
                "project {id} is still loading"
            ))),
            LoadState::HoldingUnsent { id, .. } => Err(BridgeError::NoProject(format!(
                "project {id} has not reached the editor yet"
            ))),
            LoadState::Idle | LoadState::Transferred(_) => Ok(()),
        }
    }

    /// Fetch a stored project and transfer it once the editor is ready.
    ///
    /// A repeated load of the project already being fetched, held or
    /// transferred is a no-op.
    pub async fn load_project(&self, id: ProjectId) -> Result<()> {
        let generation = {
            let mut state = lock(&self.state);
            let duplicate = match &state.load {
                LoadState::Fetching { id: fetching } => *fetching == id,
                LoadState::HoldingUnsent { id: held, .. } => *held == id,
                LoadState::Transferred(sent) => *sent == id,
                LoadState::Idle => state.last_sent_id.as_ref() == Some(&id),
            };
            if duplicate {
                tracing::debug!(project_id = %id, load = ?state.load, "duplicate project load ignored");
                return Ok(());
            }
            state.generation += 1;
            state.load = LoadState::Fetching { id: id.clone() };
            state.generation
        };

        tracing::info!(project_id = %id, "fetching project");
        let fetched = self.gateway.fetch(&id).await;

        let record = {
            let mut state = lock(&self.state);
            if state.generation != generation {
                tracing::debug!(project_id = %id, "discarding stale fetch result");
                return Ok(());
            }
            match fetched {
                Ok(mut record) => {
                    record.id = Some(id.clone());
                    state.load = LoadState::HoldingUnsent {
                        id: id.clone(),
                        record: record.clone(),
                    };
                    record
                }
                Err(e) => {
                    state.load = LoadState::Idle;
                    drop(state);
                    self.diagnostics.notice(
                        EventLevel::Error,
                        format!("Could not load project {id}: {e}"),
                    );
                    return Err(e);
                }
            }
        };

        let title = record.title.clone();
        self.record.replace(record);
        self.titles.apply_update(&title);
        self.try_transfer();
        Ok(())
    }

    /// Transfer the held project into the editor if both readiness signals
    /// have fired. Returns whether a `LOAD_PROJECT` frame was sent.
    pub fn try_transfer(&self) -> bool {
        if !self.readiness.is_ready() {
            return false;
        }
        let (id, document) = {
            let mut state = lock(&self.state);
            let (id, document) = match &state.load {
                LoadState::HoldingUnsent { id, record } => (id.clone(), record.document.clone()),
                _ => return false,
            };
            if state.last_sent_id.as_ref() == Some(&id) {
                state.load = LoadState::Transferred(id);
                return false;
            }
            state.load = LoadState::Transferred(id.clone());
            state.last_sent_id = Some(id.clone());
            (id, document)
        };

        let sent = self.channel.send(&HostMessage::LoadProject(document));
        self.diagnostics.emit(
            EventLevel::Info,
            "project.transferred",
            serde_json::json!({ "project_id": id, "sent": sent }),
        );
        true
    }

    /// Replace the in-memory record without transferring it.
    pub fn replace_record(&self, record: ProjectRecord) {
        let title = record.title.clone();
        {
            let mut state = lock(&self.state);
            if let LoadState::HoldingUnsent { id, record: held } = &mut state.load {
                if record.id.as_ref() == Some(&*id) {
                    *held = record.clone();
                }
            }
        }
        self.record.replace(record);
        self.titles.apply_update(&title);
    }

    /// Start over with a blank, unsaved project.
    pub fn new_project(&self) {
        {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.load = LoadState::Idle;
            state.last_sent_id = None;
        }
        let placeholder = self.titles.placeholder().to_owned();
        self.record.replace(ProjectRecord::blank(&placeholder));
        self.titles.apply_update(&placeholder);
        tracing::info!("started new project");
    }

    pub fn on_load_ack(&self, ack: &LoadAck) {
        if ack.success {
            self.diagnostics
                .emit(EventLevel::Debug, "project.load_ack", serde_json::json!({}));
        } else {
            self.diagnostics.emit(
                EventLevel::Warn,
                "project.load_failed",
                serde_json::json!({ "error": ack.error }),
            );
        }
    }

    /// Save the editor's current project to the backend.
    ///
    /// Requires an authenticated session. On failure the local record is
    /// left untouched and the save can be retried.
    pub async fn save(&self) -> Result<ProjectRecord> {
        if self.saving.swap(true, Ordering::AcqRel) {
            self.diagnostics
                .notice(EventLevel::Warn, "A save is already in progress");
            return Err(BridgeError::SaveInProgress);
        }
        let _saving = SavingGuard(&self.saving);

        let result = self.save_current().await;
        match &result {
            Ok(saved) => self.diagnostics.notice(
                EventLevel::Info,
                format!("Saved \"{}\"", saved.title),
            ),
            Err(BridgeError::NotAuthenticated) => self
                .diagnostics
                .notice(EventLevel::Warn, BridgeError::NotAuthenticated.to_string()),
            Err(e) => self
                .diagnostics
                .notice(EventLevel::Error, format!("Save failed: {e}")),
        }
        result
    }

    async fn save_current(&self) -> Result<ProjectRecord> {
        if !self.session.is_authenticated() {
            return Err(BridgeError::NotAuthenticated);
        }
        self.ensure_editor_in_sync()?;
        let generation = lock(&self.state).generation;

        self.titles.sync_from_editor().await?;
        let document = self.export_document().await?;
        let thumbnail = self
            .channel
            .request(
                RequestKind::Thumbnail,
                self.thumbnail_timeout,
                Some(Reply::Thumbnail(None)),
            )
            .await?
            .into_thumbnail()?;

        let mut candidate = self.record.snapshot();
        candidate.document = document;
        if thumbnail.is_some() {
            candidate.cover_thumbnail = thumbnail;
        }

        let mut saved = match candidate.id.clone() {
            Some(id) => {
                tracing::info!(project_id = %id, "updating project");
                self.gateway.update(&id, &candidate).await?
            }
            None => {
                tracing::info!("creating project");
                self.gateway.create(&candidate).await?
            }
        };
        if saved.id.is_none() {
            saved.id.clone_from(&candidate.id);
        }
        if saved.document.is_null() {
            saved.document = candidate.document;
        }

        {
            let mut state = lock(&self.state);
            if state.generation != generation {
                tracing::debug!("project changed during save; not adopting the saved record");
                return Ok(saved);
            }
            let in_editor = matches!(state.load, LoadState::Idle | LoadState::Transferred(_));
            match saved.id.clone() {
                Some(id) if in_editor => {
                    state.last_sent_id = Some(id.clone());
                    state.load = LoadState::Transferred(id);
                }
                _ => {
                    tracing::debug!(load = ?state.load, "editor not in sync after save; keeping load state");
                }
            }
        }
        self.record.replace(saved.clone());
        self.titles.apply_update(&saved.title);
        Ok(saved)
    }

    /// Ask the editor for its document and check it is structured.
    async fn export_document(&self) -> Result<serde_json::Value> {
        let document = self
            .channel
            .request(RequestKind::Export, self.export_timeout, None)
            .await?
            .into_document()?;
        if let Err(e) = ensure_structured(&document) {
            self.diagnostics.emit(
                EventLevel::Error,
                "project.document_rejected",
                serde_json::json!({ "error": e.to_string() }),
            );
            return Err(e);
        }
        Ok(document)
    }

    /// Write the editor's current document to `<dir>/<title>.json`.
    ///
    /// Uses the configured export directory when `dir` is `None`.
    pub async fn export_to_file(&self, dir: Option<&Path>) -> Result<PathBuf> {
        let result = self.write_export(dir).await;
        match &result {
            Ok(path) => self.diagnostics.notice(
                EventLevel::Info,
                format!("Exported to {}", path.display()),
            ),
            Err(e) => self
                .diagnostics
                .notice(EventLevel::Error, format!("Export failed: {e}")),
        }
        result
    }

    async fn write_export(&self, dir: Option<&Path>) -> Result<PathBuf> {
        self.ensure_editor_in_sync()?;
        let title = self.titles.sync_from_editor().await?;
        let document = self.export_document().await?;

        let dir = dir.unwrap_or(&self.export_dir);
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!(
            "{}.json",
            sanitize_file_stem(&title, self.titles.placeholder())
        ));
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| BridgeError::MalformedPayload(format!("cannot encode document: {e}")))?;
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(path = %path.display(), "project exported");
        Ok(path)
    }

    /// Reconcile the title with the editor and return the settings view.
    pub async fn open_settings(&self) -> Result<ProjectSettings> {
        self.titles.sync_from_editor().await?;
        Ok(self.settings())
    }

    #[must_use]
    pub fn settings(&self) -> ProjectSettings {
        let record = self.record.snapshot();
        ProjectSettings {
            id: record.id,
            title: record.title,
            description: record.description,
            is_public: record.is_public,
        }
    }

    /// Apply a settings edit.
    ///
    /// Saved projects are patched on the backend first and left untouched
    /// locally if that fails. Unsaved projects are only changed locally.
    pub async fn update_settings(&self, mut patch: ProjectPatch) -> Result<ProjectSettings> {
        if patch.is_empty() {
            return Ok(self.settings());
        }
        if let Some(title) = patch.title.take() {
            patch.title = Some(crate::host::title::normalize_title(
                &title,
                self.titles.placeholder(),
            ));
        }

        if let Some(id) = self.record.id() {
            if let Err(e) = self.gateway.patch(&id, &patch).await {
                self.diagnostics
                    .notice(EventLevel::Error, format!("Could not update settings: {e}"));
                return Err(e);
            }
        }

        let previous_title = self.titles.title();
        self.record.update(|record| patch.apply_to(record));
        if let Some(title) = patch.title.as_ref().filter(|t| **t != previous_title) {
            self.titles.set_title(title);
        }
        Ok(self.settings())
    }
}

/// Make `title` safe to use as a file name.
#[must_use]
pub fn sanitize_file_stem(title: &str, placeholder: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        placeholder.to_owned()
    } else {
        cleaned.to_owned()
    }
}
