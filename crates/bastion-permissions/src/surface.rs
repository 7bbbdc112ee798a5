use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use bastion_core::Permission;

/// Everything a consent surface needs to render one prompt. The broker adds
/// no policy of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub id: Uuid,
    pub extension_id: String,
    pub display_name: String,
    pub permissions: Vec<Permission>,
    /// Permission-specific details, e.g. `host` for network access.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl PermissionRequest {
    pub fn new(extension_id: &str, display_name: &str, permissions: Vec<Permission>) -> Self {
        Self {
            id: Uuid::new_v4(),
            extension_id: extension_id.to_string(),
            display_name: display_name.to_string(),
            permissions,
            context: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, key: &str, value: &str) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }
}

/// The UI that shows one consent prompt at a time.
///
/// Called while the broker holds its queue lock: implementations must not
/// call back into the broker synchronously.
pub trait ConsentSurface: Send + Sync {
    fn attach(&self, request: &PermissionRequest);

    fn detach(&self, request_id: Uuid);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Attached(PermissionRequest),
    Detached(Uuid),
}

/// Forwards attach/detach to a channel, for UIs living on another task.
pub struct ChannelSurface {
    tx: mpsc::UnboundedSender<SurfaceEvent>,
}

impl ChannelSurface {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConsentSurface for ChannelSurface {
    fn attach(&self, request: &PermissionRequest) {
        // A closed receiver means nobody renders prompts; the request stays
        // current until allow/deny.
        let _ = self.tx.send(SurfaceEvent::Attached(request.clone()));
    }

    fn detach(&self, request_id: Uuid) {
        let _ = self.tx.send(SurfaceEvent::Detached(request_id));
    }
}
