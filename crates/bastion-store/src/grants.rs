use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use bastion_core::{Permission, PermissionGrant, Result};

use crate::json_file::JsonFile;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GrantState {
    #[serde(default)]
    grants: BTreeMap<String, BTreeMap<Permission, DateTime<Utc>>>,
}

/// Persisted (extension, permission) → granted-at consents.
pub struct GrantStore {
    file: JsonFile<GrantState>,
}

impl GrantStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn is_granted(&self, extension_id: &str, permission: &Permission) -> bool {
        self.file
            .read()
            .grants
            .get(extension_id)
            .is_some_and(|perms| perms.contains_key(permission))
    }

    /// Record a grant. Re-granting refreshes the timestamp.
    pub fn grant(&self, extension_id: &str, permission: &Permission) -> Result<PermissionGrant> {
        let granted_at = Utc::now();
        self.file.transact(|state| {
            state
                .grants
                .entry(extension_id.to_string())
                .or_default()
                .insert(permission.clone(), granted_at);
            Ok(())
        })?;
        info!(extension = extension_id, permission = %permission, "permission granted");
        Ok(PermissionGrant {
            extension_id: extension_id.to_string(),
            permission: permission.clone(),
            granted_at,
        })
    }

    /// Returns whether a grant existed.
    pub fn revoke(&self, extension_id: &str, permission: &Permission) -> Result<bool> {
        self.file.transact(|state| {
            let Some(perms) = state.grants.get_mut(extension_id) else {
                return Ok(false);
            };
            let removed = perms.remove(permission).is_some();
            if perms.is_empty() {
                state.grants.remove(extension_id);
            }
            Ok(removed)
        })
    }

    /// Drop every grant held by one extension. Returns how many were removed.
    pub fn reset_extension(&self, extension_id: &str) -> Result<usize> {
        self.file
            .transact(|state| Ok(state.grants.remove(extension_id).map_or(0, |p| p.len())))
    }

    /// Drop every grant for every extension.
    pub fn reset_all(&self) -> Result<usize> {
        self.file.transact(|state| {
            let count = state.grants.values().map(|p| p.len()).sum();
            state.grants.clear();
            Ok(count)
        })
    }

    pub fn list(&self, extension_id: &str) -> Vec<PermissionGrant> {
        self.file
            .read()
            .grants
            .remove(extension_id)
            .map(|perms| {
                perms
                    .into_iter()
                    .map(|(permission, granted_at)| PermissionGrant {
                        extension_id: extension_id.to_string(),
                        permission,
                        granted_at,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn list_all(&self) -> Vec<PermissionGrant> {
        self.file
            .read()
            .grants
            .into_iter()
            .flat_map(|(extension_id, perms)| {
                perms.into_iter().map(move |(permission, granted_at)| PermissionGrant {
                    extension_id: extension_id.clone(),
                    permission,
                    granted_at,
                })
            })
            .collect()
    }
}
