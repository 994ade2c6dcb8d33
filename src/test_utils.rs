//! In-memory collaborators shared by unit and integration tests.
//!
//! [`RecordingTransport`] stands in for the embedded editor's message port,
//! [`MemoryGateway`] for project storage and [`StaticAuth`] for the auth
//! service.

use crate::error::{BridgeError, Result};
use crate::host::channel::EmbeddedTransport;
use crate::host::contract::WireFrame;
use crate::host::gateway::{AuthService, Profile, ProjectGateway};
use crate::host::lock;
use crate::host::record::{ProjectId, ProjectPatch, ProjectRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Transport that records every posted frame.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    origin: Mutex<Option<String>>,
    frames: Mutex<Vec<WireFrame>>,
}

impl RecordingTransport {
    /// No target attached yet.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn attached(origin: &str) -> Self {
        let transport = Self::default();
        transport.attach(origin);
        transport
    }

    pub fn attach(&self, origin: &str) {
        *lock(&self.origin) = Some(origin.to_owned());
    }

    pub fn detach(&self) {
        *lock(&self.origin) = None;
    }

    #[must_use]
    pub fn frames(&self) -> Vec<WireFrame> {
        lock(&self.frames).clone()
    }

    #[must_use]
    pub fn last_frame(&self) -> Option<WireFrame> {
        lock(&self.frames).last().cloned()
    }

    #[must_use]
    pub fn frames_of_type(&self, message_type: &str) -> Vec<WireFrame> {
        lock(&self.frames)
            .iter()
            .filter(|frame| frame.message_type == message_type)
            .cloned()
            .collect()
    }

    /// Correlation id of the most recent frame of `message_type`.
    #[must_use]
    pub fn last_correlation_id(&self, message_type: &str) -> Option<String> {
        self.frames_of_type(message_type)
            .into_iter()
            .rev()
            .find_map(|frame| frame.correlation_id)
    }
}

impl EmbeddedTransport for RecordingTransport {
    fn attached_origin(&self) -> Option<String> {
        lock(&self.origin).clone()
    }

    fn post(&self, frame: &WireFrame) -> Result<()> {
        lock(&self.frames).push(frame.clone());
        Ok(())
    }
}

/// Project store backed by a `HashMap`, with call counters and failure
/// switches.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    projects: Mutex<HashMap<ProjectId, ProjectRecord>>,
    next_id: AtomicU64,
    fetch_delay: Mutex<Option<Duration>>,
    fail_writes: AtomicBool,
    fail_fetch: AtomicBool,
    fetch_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    patch_calls: AtomicUsize,
}

impl MemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(100),
            ..Self::default()
        }
    }

    /// Store `record` under `id`.
    pub fn insert(&self, id: impl Into<ProjectId>, mut record: ProjectRecord) {
        let id = id.into();
        record.id = Some(id.clone());
        lock(&self.projects).insert(id, record);
    }

    #[must_use]
    pub fn get(&self, id: &ProjectId) -> Option<ProjectRecord> {
        lock(&self.projects).get(id).cloned()
    }

    /// Delay every fetch by `delay` (simulated network latency).
    pub fn set_fetch_delay(&self, delay: Duration) {
        *lock(&self.fetch_delay) = Some(delay);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn patches(&self) -> usize {
        self.patch_calls.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::Api("HTTP 500 Internal Server Error: store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectGateway for MemoryGateway {
    async fn fetch(&self, id: &ProjectId) -> Result<ProjectRecord> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.fetch_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(BridgeError::Api("HTTP 503 Service Unavailable: try later".into()));
        }
        self.get(id)
            .ok_or_else(|| BridgeError::Api(format!("HTTP 404 Not Found: project {id}")))
    }

    async fn create(&self, record: &ProjectRecord) -> Result<ProjectRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        let id = ProjectId::from(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut stored = record.clone();
        stored.id = Some(id.clone());
        lock(&self.projects).insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: &ProjectId, record: &ProjectRecord) -> Result<ProjectRecord> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        let mut stored = record.clone();
        stored.id = Some(id.clone());
        lock(&self.projects).insert(id.clone(), stored.clone());
        Ok(stored)
    }

    async fn patch(&self, id: &ProjectId, patch: &ProjectPatch) -> Result<ProjectRecord> {
        self.patch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        let mut projects = lock(&self.projects);
        let record = projects
            .get_mut(id)
            .ok_or_else(|| BridgeError::Api(format!("HTTP 404 Not Found: project {id}")))?;
        patch.apply_to(record);
        Ok(record.clone())
    }
}

/// Auth service with a fixed profile and failure switches.
#[derive(Debug, Default)]
pub struct StaticAuth {
    profile: Mutex<Option<Profile>>,
    fail_profile: AtomicBool,
    fail_logout: AtomicBool,
    logout_delay: Mutex<Option<Duration>>,
    logout_calls: AtomicUsize,
}

impl StaticAuth {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn logged_in(display_name: &str) -> Self {
        let auth = Self::default();
        *lock(&auth.profile) = Some(Profile {
            display_name: display_name.to_owned(),
            avatar_ref: None,
        });
        auth
    }

    pub fn fail_profile(&self, fail: bool) {
        self.fail_profile.store(fail, Ordering::SeqCst);
    }

    pub fn fail_logout(&self, fail: bool) {
        self.fail_logout.store(fail, Ordering::SeqCst);
    }

    /// Delay every logout call by `delay` (simulated network latency).
    pub fn set_logout_delay(&self, delay: Duration) {
        *lock(&self.logout_delay) = Some(delay);
    }

    #[must_use]
    pub fn logouts(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthService for StaticAuth {
    async fn profile(&self) -> Result<Option<Profile>> {
        if self.fail_profile.load(Ordering::SeqCst) {
            return Err(BridgeError::Api("connection error: refused".into()));
        }
        Ok(lock(&self.profile).clone())
    }

    async fn logout(&self) -> Result<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.logout_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(BridgeError::Api("HTTP 502 Bad Gateway: upstream".into()));
        }
        *lock(&self.profile) = None;
        Ok(())
    }
}
