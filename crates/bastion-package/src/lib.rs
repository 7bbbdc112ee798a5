//! # bastion-package
//!
//! Verifies, installs, updates, and quarantines third-party extension
//! packages, and gates every load of extension code behind a fresh integrity
//! check.
//!
//! ## Flow
//!
//! ```text
//! marketplace metadata → download → SHA-256 + signature → staged extraction
//!     → persisted manifest → (every load) re-verify → host load
//! ```
//!
//! The marketplace transport, package container format, version ordering,
//! and host loader are collaborators behind traits; [`HttpMarketplace`],
//! [`BundleFormat`], and [`SemverComparator`] are the shipped
//! implementations.

pub mod bundle;
pub mod digest;
pub mod format;
pub mod host;
pub mod integrity;
pub mod manager;
pub mod marketplace;
pub mod mock;
pub mod version;

pub use bundle::{BundleFormat, BundleWriter, SignedBundle, public_key_pem};
pub use format::{
    CURRENT_FORMAT_VERSION, DirCheck, ExtractedPackage, LEGACY_FORMAT_VERSION, PackageFormat,
    VerifyOptions,
};
pub use host::ExtensionHost;
pub use integrity::DEFAULT_IGNORED_PATHS;
pub use manager::{ExtensionManager, ExtensionManagerBuilder};
pub use marketplace::{ExtensionListing, HttpMarketplace, Marketplace, PackageDownload};
pub use version::{SemverComparator, VersionComparator};
