use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, maps to `bastion.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BastionConfig {
    pub extensions: ExtensionsConfig,
    pub marketplace: MarketplaceConfig,
    pub permissions: PermissionsConfig,
    pub sandbox: SandboxConfig,
    pub logging: LoggingConfig,
}

/// `~/.bastion`, or `./.bastion` when no home directory is known.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bastion")
}

// ── Extensions ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    /// Root directory; each extension is extracted into `<dir>/<id>/`.
    pub dir: PathBuf,
    /// JSON record store of installed extensions.
    pub state_file: PathBuf,
    /// Version of the host, checked against a package's declared host range.
    pub host_version: String,
    /// OS-generated files tolerated inside an install directory.
    pub ignore_extra_paths: Vec<String>,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        let data = default_data_dir();
        Self {
            dir: data.join("extensions"),
            state_file: data.join("extensions.json"),
            host_version: "1.0.0".into(),
            ignore_extra_paths: vec![
                ".DS_Store".into(),
                "Thumbs.db".into(),
                "desktop.ini".into(),
                "__MACOSX".into(),
            ],
        }
    }
}

// ── Marketplace ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub url: String,
    /// Per-request timeout for marketplace HTTP calls.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            url: "https://marketplace.bastion.dev".into(),
            timeout_secs: 30,
            user_agent: format!("bastion/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ── Permissions ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// JSON store of granted (extension, permission) pairs.
    pub grants_file: PathBuf,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            grants_file: default_data_dir().join("permissions.json"),
        }
    }
}

// ── Sandbox ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Delay of the first deferred scrub pass.
    pub short_delay_ms: u64,
    /// Delay of the second deferred scrub pass.
    pub long_delay_ms: u64,
    /// Privileged identifiers scrubbed in addition to the built-in set.
    pub extra_globals: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            short_delay_ms: 50,
            long_delay_ms: 500,
            extra_globals: vec![],
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty" or "json".
    pub format: String,
    /// Log file path (None = stderr only).
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            file: None,
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "note",
        };
        write!(f, "{}: {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl BastionConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Marketplace url ───
        let url = &self.marketplace.url;
        if url.is_empty() {
            warnings.push(ConfigWarning {
                field: "marketplace.url".into(),
                message: "marketplace url is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'https://marketplace.bastion.dev'".into()),
            });
        } else if url.starts_with("http://") {
            warnings.push(ConfigWarning {
                field: "marketplace.url".into(),
                message: "marketplace is reached over plain http".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Package hashes are still checked, but metadata can be tampered with in transit".into()),
            });
        } else if !url.starts_with("https://") {
            warnings.push(ConfigWarning {
                field: "marketplace.url".into(),
                message: format!("'{}' is not an http(s) url", url),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        if self.marketplace.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "marketplace.timeout_secs".into(),
                message: "timeout is 0, requests never time out".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }

        // ── Host version ───
        if semver::Version::parse(&self.extensions.host_version).is_err() {
            warnings.push(ConfigWarning {
                field: "extensions.host_version".into(),
                message: format!("'{}' is not a semantic version", self.extensions.host_version),
                severity: WarningSeverity::Error,
                hint: Some("Use MAJOR.MINOR.PATCH, e.g. '1.4.0'".into()),
            });
        }

        // ── Storage paths ───
        if self.extensions.state_file.as_os_str().is_empty() {
            warnings.push(ConfigWarning {
                field: "extensions.state_file".into(),
                message: "state file path is empty".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        if self.extensions.dir.as_os_str().is_empty() {
            warnings.push(ConfigWarning {
                field: "extensions.dir".into(),
                message: "extensions directory is empty".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        // ── Sandbox schedule ───
        if self.sandbox.long_delay_ms <= self.sandbox.short_delay_ms {
            warnings.push(ConfigWarning {
                field: "sandbox.long_delay_ms".into(),
                message: format!(
                    "long delay {}ms must be greater than short delay {}ms",
                    self.sandbox.long_delay_ms, self.sandbox.short_delay_ms
                ),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
