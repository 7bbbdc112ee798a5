use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bastion_core::{
    BastionError, ChangeAction, ExtensionChange, InstalledExtensionRecord, ListenerRegistry,
    Result, Subscription, UpdateAvailable,
};
use bastion_store::RecordStore;

use crate::digest::{digest_matches, sha256_hex};
use crate::format::{LEGACY_FORMAT_VERSION, PackageFormat, VerifyOptions};
use crate::integrity::DEFAULT_IGNORED_PATHS;
use crate::marketplace::{ExtensionListing, Marketplace};
use crate::version::{SemverComparator, VersionComparator};

pub const DEFAULT_HOST_VERSION: &str = "1.0.0";

/// Installs, updates, repairs, and removes extension packages, and owns the
/// integrity monitor and load gate for what it installed.
///
/// Every install goes: listing → download → hash check → signature check and
/// staged extraction → directory swap → record. Any failure, including a
/// failed record write, leaves the previous install of that id untouched.
pub struct ExtensionManager {
    pub(crate) marketplace: Arc<dyn Marketplace>,
    pub(crate) format: Arc<dyn PackageFormat>,
    pub(crate) versions: Arc<dyn VersionComparator>,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) install_root: PathBuf,
    pub(crate) host_version: String,
    pub(crate) ignore_extra_paths: Vec<String>,
    listeners: ListenerRegistry<ExtensionChange>,
}

/// Builder for [`ExtensionManager`]. Marketplace, package format, record
/// store, and install root are required.
#[derive(Default)]
pub struct ExtensionManagerBuilder {
    marketplace: Option<Arc<dyn Marketplace>>,
    format: Option<Arc<dyn PackageFormat>>,
    versions: Option<Arc<dyn VersionComparator>>,
    store: Option<Arc<dyn RecordStore>>,
    install_root: Option<PathBuf>,
    host_version: Option<String>,
    ignore_extra_paths: Option<Vec<String>>,
}

impl ExtensionManagerBuilder {
    pub fn marketplace(mut self, marketplace: Arc<dyn Marketplace>) -> Self {
        self.marketplace = Some(marketplace);
        self
    }

    pub fn format(mut self, format: Arc<dyn PackageFormat>) -> Self {
        self.format = Some(format);
        self
    }

    pub fn versions(mut self, versions: Arc<dyn VersionComparator>) -> Self {
        self.versions = Some(versions);
        self
    }

    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn install_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_root = Some(dir.into());
        self
    }

    pub fn host_version(mut self, version: impl Into<String>) -> Self {
        self.host_version = Some(version.into());
        self
    }

    pub fn ignore_extra_paths(mut self, paths: Vec<String>) -> Self {
        self.ignore_extra_paths = Some(paths);
        self
    }

    pub fn build(self) -> Result<ExtensionManager> {
        fn required<T>(value: Option<T>, name: &str) -> Result<T> {
            value.ok_or_else(|| BastionError::Configuration(format!("{name} is required")))
        }

        let manager = ExtensionManager {
            marketplace: required(self.marketplace, "marketplace")?,
            format: required(self.format, "package format")?,
            store: required(self.store, "record store")?,
            install_root: required(self.install_root, "install root")?,
            versions: self.versions.unwrap_or_else(|| Arc::new(SemverComparator)),
            host_version: self
                .host_version
                .unwrap_or_else(|| DEFAULT_HOST_VERSION.to_string()),
            ignore_extra_paths: self.ignore_extra_paths.unwrap_or_else(|| {
                DEFAULT_IGNORED_PATHS.iter().map(|p| p.to_string()).collect()
            }),
            listeners: ListenerRegistry::new(),
        };
        manager.sweep_leftovers();
        Ok(manager)
    }
}

/// Extension ids double as directory names under the install root.
fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if ok {
        Ok(())
    } else {
        Err(BastionError::package(id, "invalid extension id"))
    }
}

const STAGING_PREFIX: &str = ".staging-";
const RETIRED_PREFIX: &str = ".retired-";

/// The id embedded in a `.staging-{id}-{uuid}` / `.retired-{id}-{uuid}` name.
fn leftover_id<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.rsplit_once('-'))
        .map(|(id, _)| id)
        .filter(|id| validate_id(id).is_ok())
}

fn remove_dir_best_effort(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "failed to remove directory"),
    }
}

impl ExtensionManager {
    pub fn builder() -> ExtensionManagerBuilder {
        ExtensionManagerBuilder::default()
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn record(&self, id: &str) -> Option<InstalledExtensionRecord> {
        self.store.get(id)
    }

    pub fn installed(&self) -> Vec<InstalledExtensionRecord> {
        self.store.list()
    }

    pub fn install_dir(&self, id: &str) -> PathBuf {
        self.install_root.join(id)
    }

    pub fn host_version(&self) -> &str {
        &self.host_version
    }

    // ── Events ─────────────────────────────────────────────────

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ExtensionChange) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, sub: Subscription) -> bool {
        self.listeners.unsubscribe(sub)
    }

    fn emit(&self, action: ChangeAction, id: &str, record: Option<InstalledExtensionRecord>) {
        let change = ExtensionChange {
            action,
            id: id.to_string(),
            record,
        };
        let failed = self.listeners.emit(&change);
        if failed > 0 {
            debug!(extension = %id, failed, "some change listeners panicked");
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Install `id` at `version`, or at the marketplace's latest version.
    pub async fn install(
        &self,
        id: &str,
        version: Option<&str>,
    ) -> Result<InstalledExtensionRecord> {
        validate_id(id)?;
        let listing = self.marketplace.get_extension(id).await?;
        let version = match version {
            Some(v) => v.to_string(),
            None => listing
                .latest_version
                .clone()
                .ok_or_else(|| BastionError::Marketplace {
                    id: id.to_string(),
                    reason: "marketplace reported no latest version".into(),
                })?,
        };
        let record = self.install_from_listing(id, &version, &listing).await?;
        self.emit(ChangeAction::Install, id, Some(record.clone()));
        Ok(record)
    }

    /// Move to the marketplace's latest version if it is strictly newer.
    /// Otherwise returns the existing record without downloading anything.
    pub async fn update(&self, id: &str) -> Result<InstalledExtensionRecord> {
        let current = self
            .store
            .get(id)
            .ok_or_else(|| BastionError::NotInstalled(id.to_string()))?;
        let listing = self.marketplace.get_extension(id).await?;
        let latest = match listing.latest_version.as_deref() {
            Some(latest) if self.versions.is_newer(latest, &current.version) => latest.to_string(),
            _ => {
                debug!(extension = %id, version = %current.version, "already up to date");
                return Ok(current);
            }
        };

        info!(extension = %id, from = %current.version, to = %latest, "updating extension");
        let record = self.install_from_listing(id, &latest, &listing).await?;
        self.emit(ChangeAction::Update, id, Some(record.clone()));
        Ok(record)
    }

    /// Remove the extracted directory (best effort) and the record.
    pub async fn uninstall(&self, id: &str) -> Result<Option<InstalledExtensionRecord>> {
        if validate_id(id).is_ok() {
            remove_dir_best_effort(&self.install_dir(id));
        }
        let removed = self.store.remove(id)?;
        info!(extension = %id, had_record = removed.is_some(), "extension uninstalled");
        self.emit(ChangeAction::Uninstall, id, removed.clone());
        Ok(removed)
    }

    /// Installed extensions with a strictly newer marketplace version.
    /// Ids whose listing cannot be fetched are skipped.
    pub async fn check_for_updates(&self) -> Vec<UpdateAvailable> {
        let mut available = Vec::new();
        for record in self.store.list() {
            let listing = match self.marketplace.get_extension(&record.id).await {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(extension = %record.id, error = %e, "update check failed");
                    continue;
                }
            };
            match listing.latest_version {
                Some(latest) if self.versions.is_newer(&latest, &record.version) => {
                    available.push(UpdateAvailable {
                        id: record.id,
                        current_version: record.version,
                        latest_version: latest,
                    });
                }
                _ => {}
            }
        }
        available
    }

    /// Reinstall the recorded version, falling back to the latest version
    /// when the recorded one is gone upstream.
    pub async fn repair(&self, id: &str) -> Result<InstalledExtensionRecord> {
        let current = self
            .store
            .get(id)
            .ok_or_else(|| BastionError::NotInstalled(id.to_string()))?;
        let listing = self.marketplace.get_extension(id).await?;

        info!(extension = %id, version = %current.version, "repairing extension");
        let record = match self
            .install_from_listing(id, &current.version, &listing)
            .await
        {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                let latest =
                    listing
                        .latest_version
                        .clone()
                        .ok_or_else(|| BastionError::Marketplace {
                            id: id.to_string(),
                            reason: "recorded version is gone and no latest version is listed"
                                .into(),
                        })?;
                warn!(
                    extension = %id,
                    missing = %current.version,
                    fallback = %latest,
                    "recorded version unavailable upstream, repairing to latest"
                );
                self.install_from_listing(id, &latest, &listing).await?
            }
            Err(e) => return Err(e),
        };
        self.emit(ChangeAction::Update, id, Some(record.clone()));
        Ok(record)
    }

    // ── Install pipeline ───────────────────────────────────────

    async fn install_from_listing(
        &self,
        id: &str,
        version: &str,
        listing: &ExtensionListing,
    ) -> Result<InstalledExtensionRecord> {
        validate_id(id)?;
        let public_key_pem = listing
            .publisher_public_key_pem
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                BastionError::integrity(id, "marketplace listing has no publisher public key")
            })?;

        info!(extension = %id, %version, "installing extension");
        let download = self.marketplace.download_package(id, version).await?;

        let package_sha256 = sha256_hex(&download.bytes);
        if let Some(expected) = download.sha256.as_deref() {
            if !digest_matches(&package_sha256, expected) {
                warn!(extension = %id, %version, %expected, actual = %package_sha256, "package hash mismatch");
                return Err(BastionError::integrity(
                    id,
                    format!("package hash mismatch: expected {expected}, got {package_sha256}"),
                ));
            }
        }

        let format_version = match download.format_version {
            Some(v) => v,
            None => self.format.detect_format_version(&download.bytes)?,
        };
        if format_version == LEGACY_FORMAT_VERSION && download.signature_base64.is_none() {
            warn!(extension = %id, %version, "legacy package without signature");
            return Err(BastionError::integrity(
                id,
                "legacy package format requires a signature",
            ));
        }

        std::fs::create_dir_all(&self.install_root)?;
        let staging = self
            .install_root
            .join(format!("{STAGING_PREFIX}{id}-{}", Uuid::new_v4().simple()));
        let opts = VerifyOptions {
            public_key_pem,
            signature_base64: download.signature_base64.as_deref(),
            format_version,
            expected_id: id,
            expected_version: version,
        };
        let extracted = match self
            .format
            .verify_and_extract(&download.bytes, &staging, &opts)
        {
            Ok(extracted) => extracted,
            Err(e) => {
                remove_dir_best_effort(&staging);
                warn!(extension = %id, %version, error = %e, "package rejected");
                return Err(e);
            }
        };

        let retired = match self.swap_into_place(id, &staging) {
            Ok(retired) => retired,
            Err(e) => {
                remove_dir_best_effort(&staging);
                return Err(e);
            }
        };

        let record = InstalledExtensionRecord {
            id: id.to_string(),
            version: version.to_string(),
            installed_at: Utc::now(),
            format_version: extracted.format_version,
            package_sha256,
            signature_base64: extracted.signature_base64,
            files: extracted.files,
            host_range: extracted.host_range,
            corrupted: false,
            corrupted_at: None,
            corrupted_reason: None,
        };
        if let Err(e) = self.store.put(record.clone()) {
            warn!(extension = %id, %version, error = %e, "record write failed, rolling back");
            self.roll_back_swap(id, retired.as_deref());
            return Err(e);
        }
        if let Some(retired) = retired {
            remove_dir_best_effort(&retired);
        }
        info!(extension = %id, %version, files = record.files.len(), "extension installed");
        Ok(record)
    }

    /// Replace the live directory with a verified staging directory. Returns
    /// where the previous live directory was moved, if there was one; it is
    /// restored if the final rename fails.
    fn swap_into_place(&self, id: &str, staging: &Path) -> Result<Option<PathBuf>> {
        let live = self.install_dir(id);
        let retired = self
            .install_root
            .join(format!("{RETIRED_PREFIX}{id}-{}", Uuid::new_v4().simple()));
        let had_live = live.exists();
        if had_live {
            std::fs::rename(&live, &retired)?;
        }
        if let Err(e) = std::fs::rename(staging, &live) {
            if had_live {
                if let Err(restore) = std::fs::rename(&retired, &live) {
                    warn!(extension = %id, error = %restore, "failed to restore previous install");
                }
            }
            return Err(e.into());
        }
        Ok(had_live.then_some(retired))
    }

    /// Undo a completed swap: drop the new live directory and move the
    /// retired one back.
    fn roll_back_swap(&self, id: &str, retired: Option<&Path>) {
        let live = self.install_dir(id);
        remove_dir_best_effort(&live);
        if let Some(retired) = retired {
            if let Err(e) = std::fs::rename(retired, &live) {
                warn!(extension = %id, error = %e, "failed to restore previous install");
            }
        }
    }

    /// Clear `.staging-*` and `.retired-*` directories left by an interrupted
    /// install. A retired directory whose live directory is missing is moved
    /// back into place instead.
    fn sweep_leftovers(&self) {
        let entries = match std::fs::read_dir(&self.install_root) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let path = entry.path();
            if leftover_id(name, STAGING_PREFIX).is_some() {
                debug!(dir = %path.display(), "removing leftover staging directory");
                remove_dir_best_effort(&path);
            } else if let Some(id) = leftover_id(name, RETIRED_PREFIX) {
                let live = self.install_dir(id);
                if live.exists() {
                    debug!(dir = %path.display(), "removing leftover retired directory");
                    remove_dir_best_effort(&path);
                } else {
                    warn!(extension = %id, "restoring install retired by an interrupted swap");
                    if let Err(e) = std::fs::rename(&path, &live) {
                        warn!(extension = %id, error = %e, "failed to restore retired install");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_validation() {
        assert!(validate_id("acme.widgets").is_ok());
        assert!(validate_id("acme-widgets_2").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("..").is_err());
        assert!(validate_id(".staging-x").is_err());
        assert!(validate_id("a/b").is_err());
    }

    #[test]
    fn leftover_names() {
        assert_eq!(
            leftover_id(".staging-acme.widgets-0123abcd", STAGING_PREFIX),
            Some("acme.widgets")
        );
        assert_eq!(
            leftover_id(".retired-acme-widgets-0123abcd", RETIRED_PREFIX),
            Some("acme-widgets")
        );
        assert_eq!(leftover_id(".staging-", STAGING_PREFIX), None);
        assert_eq!(leftover_id("acme.widgets", STAGING_PREFIX), None);
        assert_eq!(leftover_id(".retired-x-1", STAGING_PREFIX), None);
    }

    #[test]
    fn builder_requires_collaborators() {
        let err = ExtensionManager::builder().build().err().unwrap();
        assert!(matches!(err, BastionError::Configuration(_)));
        assert!(err.to_string().contains("marketplace"));
    }
}
