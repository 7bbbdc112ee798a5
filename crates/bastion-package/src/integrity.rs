use std::collections::BTreeMap;
use tracing::{debug, warn};

use bastion_core::{
    BastionError, FailureReason, InstalledExtensionRecord, Result, VerifyOutcome,
};

use crate::host::ExtensionHost;
use crate::manager::ExtensionManager;

/// OS-generated files tolerated inside an install directory.
pub const DEFAULT_IGNORED_PATHS: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", "__MACOSX"];

const LEGACY_MANIFEST_REASON: &str = "no integrity manifest recorded (legacy install); repair required";

impl ExtensionManager {
    /// Re-check an installed extension against its recorded manifest.
    ///
    /// A failed check is persisted as quarantine, and a quarantined record
    /// answers from the stored reason without touching the disk again.
    /// Host incompatibility is reported but never persisted.
    pub fn verify_installed(&self, id: &str) -> Result<VerifyOutcome> {
        let record = self
            .store
            .get(id)
            .ok_or_else(|| BastionError::NotInstalled(id.to_string()))?;

        if record.corrupted {
            let detail = record
                .corrupted_reason
                .unwrap_or_else(|| "quarantined".to_string());
            return Ok(VerifyOutcome::Failed(FailureReason::corrupted(detail)));
        }

        if !record.has_manifest() {
            self.quarantine(id, LEGACY_MANIFEST_REASON)?;
            return Ok(VerifyOutcome::Failed(FailureReason::corrupted(
                LEGACY_MANIFEST_REASON,
            )));
        }

        if let Some(range) = record.host_range.as_deref() {
            if !self.versions.satisfies(&self.host_version, range) {
                debug!(extension = %id, %range, host = %self.host_version, "host version incompatible");
                return Ok(VerifyOutcome::Failed(FailureReason::Incompatible {
                    required_range: range.to_string(),
                    host_version: self.host_version.clone(),
                }));
            }
        }

        let check = self.format.verify_extracted_dir(
            &self.install_dir(id),
            &record.files,
            &self.ignore_extra_paths,
        )?;
        if check.ok {
            return Ok(VerifyOutcome::Verified);
        }
        let reason = check
            .reason
            .unwrap_or_else(|| "install directory does not match manifest".to_string());
        self.quarantine(id, &reason)?;
        Ok(VerifyOutcome::Failed(FailureReason::corrupted(reason)))
    }

    /// Verify every installed extension. An error while checking one id
    /// becomes an `Unverifiable` entry for that id.
    pub fn verify_all_installed(&self) -> BTreeMap<String, VerifyOutcome> {
        self.store
            .ids()
            .into_iter()
            .map(|id| {
                let outcome = self.verify_installed(&id).unwrap_or_else(|e| {
                    warn!(extension = %id, error = %e, "verification could not run");
                    VerifyOutcome::Failed(FailureReason::Unverifiable {
                        detail: e.to_string(),
                    })
                });
                (id, outcome)
            })
            .collect()
    }

    /// The only sanctioned way to run extension code: re-verify, then hand
    /// the install directory to the host. The host is never called for an
    /// extension that fails verification.
    pub async fn load_into_host<H>(&self, host: &H, id: &str) -> Result<H::Handle>
    where
        H: ExtensionHost + ?Sized,
    {
        if let VerifyOutcome::Failed(reason) = self.verify_installed(id)? {
            warn!(extension = %id, %reason, remedy = reason.remedy().action(), "load refused");
            return Err(BastionError::LoadRefused {
                id: id.to_string(),
                reason,
            });
        }
        debug!(extension = %id, "verified, loading into host");
        host.load_extension(&self.install_dir(id)).await
    }

    fn quarantine(&self, id: &str, reason: &str) -> Result<()> {
        warn!(extension = %id, %reason, "quarantining extension");
        self.store
            .update(id, &mut |record: &mut InstalledExtensionRecord| {
                record.mark_corrupted(reason)
            })?;
        Ok(())
    }
}
