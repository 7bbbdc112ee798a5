use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an extension, e.g. `acme.widgets`.
pub type ExtensionId = String;

/// One file of an installed extension as recorded at install time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the extension's install directory, `/`-separated.
    pub path: String,
    /// Lowercase hex SHA-256 of the file contents.
    pub hash: String,
    pub size: u64,
}

/// The persisted record for one installed extension.
///
/// A record exists only after a successful verify-and-extract cycle. A record
/// without manifest entries predates integrity tracking and is never trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledExtensionRecord {
    pub id: ExtensionId,
    pub version: String,
    pub installed_at: DateTime<Utc>,
    pub format_version: u32,
    pub package_sha256: String,
    pub signature_base64: String,
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
    /// Host version requirement declared by the package, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_range: Option<String>,
    #[serde(default)]
    pub corrupted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrupted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrupted_reason: Option<String>,
}

impl InstalledExtensionRecord {
    pub fn has_manifest(&self) -> bool {
        !self.files.is_empty()
    }

    /// Flag the record as quarantined. The flag stays until the record is
    /// replaced by a successful repair or update.
    pub fn mark_corrupted(&mut self, reason: impl Into<String>) {
        self.corrupted = true;
        self.corrupted_at = Some(Utc::now());
        self.corrupted_reason = Some(reason.into());
    }
}

/// Why an installed extension failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The package requires a host version this host does not satisfy.
    Incompatible {
        required_range: String,
        host_version: String,
    },
    /// On-disk bytes no longer match the recorded manifest, or the manifest
    /// is missing. The record is quarantined.
    Corrupted { detail: String },
    /// The check itself could not run (I/O error, broken record, ...).
    Unverifiable { detail: String },
}

/// The action a host should offer for a failing extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    Update,
    Repair,
}

impl Remedy {
    pub fn label(&self) -> &'static str {
        match self {
            Remedy::Update => "Update",
            Remedy::Repair => "Repair",
        }
    }

    /// Name of the manager operation that performs this remedy.
    pub fn action(&self) -> &'static str {
        match self {
            Remedy::Update => "update",
            Remedy::Repair => "repair",
        }
    }
}

impl FailureReason {
    pub fn remedy(&self) -> Remedy {
        match self {
            FailureReason::Incompatible { .. } => Remedy::Update,
            FailureReason::Corrupted { .. } | FailureReason::Unverifiable { .. } => Remedy::Repair,
        }
    }

    pub fn corrupted(detail: impl Into<String>) -> Self {
        FailureReason::Corrupted {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Incompatible {
                required_range,
                host_version,
            } => write!(
                f,
                "requires host {required_range}, running {host_version}"
            ),
            FailureReason::Corrupted { detail } => write!(f, "corrupted: {detail}"),
            FailureReason::Unverifiable { detail } => write!(f, "could not verify: {detail}"),
        }
    }
}

/// Result of re-verifying an installed extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    Failed(FailureReason),
}

impl VerifyOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, VerifyOutcome::Verified)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            VerifyOutcome::Verified => None,
            VerifyOutcome::Failed(reason) => Some(reason),
        }
    }
}

/// An installed extension with a strictly newer version upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAvailable {
    pub id: ExtensionId,
    pub current_version: String,
    pub latest_version: String,
}

/// A named privileged capability, e.g. `network` or `clipboard`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(String);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn network() -> Self {
        Self::new("network")
    }

    pub fn clipboard() -> Self {
        Self::new("clipboard")
    }

    pub fn commands() -> Self {
        Self::new("commands")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A persisted user consent for one capability of one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub extension_id: ExtensionId,
    pub permission: Permission,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Install,
    Update,
    Uninstall,
}

/// Emitted after every successful install, update, or uninstall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionChange {
    pub action: ChangeAction,
    pub id: ExtensionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<InstalledExtensionRecord>,
}
