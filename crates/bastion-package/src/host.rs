use async_trait::async_trait;
use std::path::Path;

use bastion_core::Result;

/// The host application's primitive for executing an extension's code.
///
/// Call it only through [`crate::ExtensionManager::load_into_host`], which
/// re-verifies the install directory first.
#[async_trait]
pub trait ExtensionHost: Send + Sync {
    type Handle: Send;

    async fn load_extension(&self, install_dir: &Path) -> Result<Self::Handle>;
}
