use thiserror::Error;

use crate::types::FailureReason;

/// Unified error type for the whole extension trust boundary.
#[derive(Error, Debug)]
pub enum BastionError {
    // ── Construction ───────────────────────────────────────────
    /// A required collaborator was not supplied.
    #[error("configuration error: {0}")]
    Configuration(String),

    // ── Upstream / marketplace ─────────────────────────────────
    #[error("not found upstream: {id}{}", .version.as_ref().map(|v| format!("@{v}")).unwrap_or_default())]
    NotFound { id: String, version: Option<String> },

    #[error("marketplace error: {id}: {reason}")]
    Marketplace { id: String, reason: String },

    // ── Packages & integrity ───────────────────────────────────
    #[error("extension not installed: {0}")]
    NotInstalled(String),

    #[error("integrity check failed: {id}: {reason}")]
    Integrity { id: String, reason: String },

    #[error("package error: {id}: {reason}")]
    Package { id: String, reason: String },

    /// The load gate refused to hand an extension to the host.
    #[error("refusing to load {id}: {reason}; run {}() to recover", .reason.remedy().action())]
    LoadRefused { id: String, reason: FailureReason },

    // ── Host ───────────────────────────────────────────────────
    #[error("host failed to load {id}: {reason}")]
    Host { id: String, reason: String },

    // ── Persistence ────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    // ── Config ─────────────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl BastionError {
    /// Whether this failure means the requested extension or version does not
    /// exist upstream.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BastionError::NotFound { .. })
    }

    pub fn integrity(id: &str, reason: impl Into<String>) -> Self {
        BastionError::Integrity {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn package(id: &str, reason: impl Into<String>) -> Self {
        BastionError::Package {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BastionError>;
