//! In-memory marketplace and host for deterministic tests.
//!
//! Nothing here touches the network. Call logs are public so tests can
//! assert "no download happened" or "the host was never asked to load".

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bastion_core::{BastionError, Result};

use crate::host::ExtensionHost;
use crate::marketplace::{ExtensionListing, Marketplace, PackageDownload};

#[derive(Default)]
pub struct MockMarketplace {
    listings: Mutex<HashMap<String, ExtensionListing>>,
    packages: Mutex<HashMap<(String, String), PackageDownload>>,
    /// Every `(id, version)` passed to `download_package`.
    pub downloads: Mutex<Vec<(String, String)>>,
    /// Every id passed to `get_extension`.
    pub lookups: Mutex<Vec<String>>,
}

impl MockMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(self, id: &str, listing: ExtensionListing) -> Self {
        self.set_listing(id, listing);
        self
    }

    pub fn with_package(self, id: &str, version: &str, package: PackageDownload) -> Self {
        self.add_package(id, version, package);
        self
    }

    pub fn set_listing(&self, id: &str, listing: ExtensionListing) {
        self.listings.lock().insert(id.to_string(), listing);
    }

    pub fn set_latest(&self, id: &str, version: &str) {
        if let Some(listing) = self.listings.lock().get_mut(id) {
            listing.latest_version = Some(version.to_string());
        }
    }

    pub fn remove_listing(&self, id: &str) {
        self.listings.lock().remove(id);
    }

    pub fn add_package(&self, id: &str, version: &str, package: PackageDownload) {
        self.packages
            .lock()
            .insert((id.to_string(), version.to_string()), package);
    }

    pub fn remove_package(&self, id: &str, version: &str) {
        self.packages
            .lock()
            .remove(&(id.to_string(), version.to_string()));
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().len()
    }
}

#[async_trait]
impl Marketplace for MockMarketplace {
    async fn get_extension(&self, id: &str) -> Result<ExtensionListing> {
        self.lookups.lock().push(id.to_string());
        self.listings
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| BastionError::NotFound {
                id: id.to_string(),
                version: None,
            })
    }

    async fn download_package(&self, id: &str, version: &str) -> Result<PackageDownload> {
        self.downloads
            .lock()
            .push((id.to_string(), version.to_string()));
        self.packages
            .lock()
            .get(&(id.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| BastionError::NotFound {
                id: id.to_string(),
                version: Some(version.to_string()),
            })
    }
}

/// Host that "loads" an extension by remembering its directory.
#[derive(Default)]
pub struct MockHost {
    pub loaded: Mutex<Vec<PathBuf>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_count(&self) -> usize {
        self.loaded.lock().len()
    }
}

#[async_trait]
impl ExtensionHost for MockHost {
    type Handle = PathBuf;

    async fn load_extension(&self, install_dir: &Path) -> Result<PathBuf> {
        self.loaded.lock().push(install_dir.to_path_buf());
        Ok(install_dir.to_path_buf())
    }
}
