//! Contracts for the backend collaborators the bridge depends on.
//!
//! Only success or failure of these calls matters to the bridge; storage
//! and authentication internals live behind them.

use crate::error::Result;
use crate::host::record::{ProjectId, ProjectPatch, ProjectRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Durable project storage.
///
/// Callers must pass records whose document already passed
/// [`crate::host::record::ensure_structured`].
#[async_trait]
pub trait ProjectGateway: Send + Sync + 'static {
    async fn fetch(&self, id: &ProjectId) -> Result<ProjectRecord>;
    async fn create(&self, record: &ProjectRecord) -> Result<ProjectRecord>;
    async fn update(&self, id: &ProjectId, record: &ProjectRecord) -> Result<ProjectRecord>;
    async fn patch(&self, id: &ProjectId, patch: &ProjectPatch) -> Result<ProjectRecord>;
}

/// Display fields of a logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
}

/// Host authentication service.
#[async_trait]
pub trait AuthService: Send + Sync + 'static {
    /// Current user, or `Ok(None)` when nobody is logged in.
    async fn profile(&self) -> Result<Option<Profile>>;

    async fn logout(&self) -> Result<()>;
}
