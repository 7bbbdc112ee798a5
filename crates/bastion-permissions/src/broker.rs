use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bastion_core::{Permission, Result};
use bastion_store::GrantStore;

use crate::surface::{ConsentSurface, PermissionRequest};

struct Pending {
    request: PermissionRequest,
    reply: oneshot::Sender<bool>,
}

#[derive(Default)]
struct QueueState {
    current: Option<Pending>,
    queue: VecDeque<Pending>,
}

/// Where a request sits in the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    /// Waiting; `position` 0 is next in line.
    Queued { position: usize },
    Showing,
}

/// Serializes consent prompts across all extensions and persists grants.
pub struct PermissionBroker {
    surface: Arc<dyn ConsentSurface>,
    grants: Arc<GrantStore>,
    state: Mutex<QueueState>,
}

impl PermissionBroker {
    pub fn new(surface: Arc<dyn ConsentSurface>, grants: Arc<GrantStore>) -> Self {
        Self {
            surface,
            grants,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn grants(&self) -> &GrantStore {
        &self.grants
    }

    // ── Prompting ──────────────────────────────────────────────

    /// Queue `request` and wait for the user's answer. Resolves to `false`
    /// on denial or if the broker is dropped first.
    pub async fn prompt(&self, request: PermissionRequest) -> bool {
        let id = request.id;
        let (reply, answer) = oneshot::channel();
        {
            let mut state = self.state.lock();
            debug!(request_id = %id, extension = %request.extension_id, "permission request queued");
            state.queue.push_back(Pending { request, reply });
            self.promote(&mut state);
        }
        answer.await.unwrap_or(false)
    }

    /// Skip every permission already granted, prompt for the rest, and
    /// persist them if the user allows.
    pub async fn request(
        &self,
        extension_id: &str,
        display_name: &str,
        permissions: &[Permission],
        context: BTreeMap<String, String>,
    ) -> bool {
        let missing: Vec<Permission> = permissions
            .iter()
            .filter(|p| !self.grants.is_granted(extension_id, p))
            .cloned()
            .collect();
        if missing.is_empty() {
            return true;
        }

        let mut request = PermissionRequest::new(extension_id, display_name, missing.clone());
        request.context = context;
        if !self.prompt(request).await {
            return false;
        }
        for permission in &missing {
            if let Err(e) = self.grants.grant(extension_id, permission) {
                warn!(extension = %extension_id, %permission, error = %e, "failed to persist grant");
            }
        }
        true
    }

    /// Resolve the showing request as allowed. Returns its id.
    pub fn allow(&self) -> Option<Uuid> {
        self.resolve(true)
    }

    pub fn deny(&self) -> Option<Uuid> {
        self.resolve(false)
    }

    fn resolve(&self, allowed: bool) -> Option<Uuid> {
        let mut state = self.state.lock();
        let pending = state.current.take()?;
        let id = pending.request.id;
        self.surface.detach(id);
        info!(
            request_id = %id,
            extension = %pending.request.extension_id,
            allowed,
            "permission request resolved"
        );
        // The requester may have gone away; the answer is simply dropped.
        let _ = pending.reply.send(allowed);
        self.promote(&mut state);
        Some(id)
    }

    /// Show the next live request if nothing is showing.
    fn promote(&self, state: &mut QueueState) {
        while state.current.is_none() {
            let Some(next) = state.queue.pop_front() else {
                return;
            };
            if next.reply.is_closed() {
                debug!(request_id = %next.request.id, "requester gone, skipping");
                continue;
            }
            info!(
                request_id = %next.request.id,
                extension = %next.request.extension_id,
                permissions = next.request.permissions.len(),
                "showing permission prompt"
            );
            self.surface.attach(&next.request);
            state.current = Some(next);
        }
    }

    // ── Inspection ─────────────────────────────────────────────

    pub fn current(&self) -> Option<PermissionRequest> {
        self.state.lock().current.as_ref().map(|p| p.request.clone())
    }

    /// Requests waiting behind the showing one.
    pub fn queue_depth(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn state(&self, request_id: Uuid) -> Option<PromptState> {
        let state = self.state.lock();
        if state
            .current
            .as_ref()
            .is_some_and(|p| p.request.id == request_id)
        {
            return Some(PromptState::Showing);
        }
        state
            .queue
            .iter()
            .position(|p| p.request.id == request_id)
            .map(|position| PromptState::Queued { position })
    }

    // ── Grants ─────────────────────────────────────────────────

    pub fn revoke(&self, extension_id: &str, permission: &Permission) -> Result<bool> {
        self.grants.revoke(extension_id, permission)
    }

    pub fn reset_extension(&self, extension_id: &str) -> Result<usize> {
        self.grants.reset_extension(extension_id)
    }

    pub fn reset_all(&self) -> Result<usize> {
        self.grants.reset_all()
    }
}
