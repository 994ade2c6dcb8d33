//! Project title synchronization between host dialogs and the editor.
//!
//! The editor keeps its own editable copy of the title and does not report
//! every keystroke, so the host reconciles on demand (before save, before
//! file export, when settings open) and also accepts unsolicited updates.

use crate::error::Result;
use crate::host::channel::{Reply, RpcChannel};
use crate::host::contract::{EventLevel, HostMessage, RequestKind};
use crate::host::events::Diagnostics;
use crate::host::lock;
use crate::host::record::RecordCell;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_PLACEHOLDER_TITLE: &str = "Untitled";

#[derive(Debug)]
pub struct TitleSynchronizer {
    channel: Arc<RpcChannel>,
    record: RecordCell,
    /// UI-facing title.
    title: Mutex<String>,
    placeholder: String,
    request_timeout: Duration,
    diagnostics: Diagnostics,
}

impl TitleSynchronizer {
    #[must_use]
    pub fn new(
        channel: Arc<RpcChannel>,
        record: RecordCell,
        placeholder: impl Into<String>,
        request_timeout: Duration,
        diagnostics: Diagnostics,
    ) -> Self {
        let placeholder = placeholder.into();
        let placeholder = if placeholder.trim().is_empty() {
            DEFAULT_PLACEHOLDER_TITLE.to_owned()
        } else {
            placeholder.trim().to_owned()
        };
        let initial = normalize_title(&record.snapshot().title, &placeholder);
        Self {
            channel,
            record,
            title: Mutex::new(initial),
            placeholder,
            request_timeout,
            diagnostics,
        }
    }

    #[must_use]
    pub fn title(&self) -> String {
        lock(&self.title).clone()
    }

    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Ask the editor for its current title.
    ///
    /// Falls back to the title known when the request was issued.
    pub async fn request_title(&self) -> Result<String> {
        let last_known = self.title();
        self.channel
            .request(
                RequestKind::Title,
                self.request_timeout,
                Some(Reply::Title(last_known)),
            )
            .await?
            .into_title()
    }

    /// Normalize `raw` and write it to the UI title and the project record.
    ///
    /// Returns whether anything observable changed.
    pub fn apply_update(&self, raw: &str) -> bool {
        let normalized = normalize_title(raw, &self.placeholder);
        let ui_changed = {
            let mut title = lock(&self.title);
            if *title == normalized {
                false
            } else {
                title.clone_from(&normalized);
                true
            }
        };
        let record_changed = self.record.update(|record| {
            if record.title == normalized {
                false
            } else {
                record.title.clone_from(&normalized);
                true
            }
        });

        let changed = ui_changed || record_changed;
        if changed {
            self.diagnostics.emit(
                EventLevel::Debug,
                "title.updated",
                serde_json::json!({ "title": normalized }),
            );
        }
        changed
    }

    /// Pull the editor's title and apply it.
    pub async fn sync_from_editor(&self) -> Result<String> {
        let title = self.request_title().await?;
        self.apply_update(&title);
        Ok(self.title())
    }

    /// Apply a host-side edit and push it into the editor.
    pub fn set_title(&self, raw: &str) -> String {
        self.apply_update(raw);
        let title = self.title();
        self.channel
            .send(&HostMessage::SetProjectTitle(title.clone()));
        title
    }
}

/// Trim `raw`, substituting `placeholder` when nothing is left.
#[must_use]
pub fn normalize_title(raw: &str, placeholder: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        placeholder.to_owned()
    } else {
        trimmed.to_owned()
    }
}
