use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path};
use walkdir::WalkDir;

use bastion_core::{ManifestEntry, Result};

use crate::digest;

/// Format whose packages carry no embedded signature.
pub const LEGACY_FORMAT_VERSION: u32 = 1;
pub const CURRENT_FORMAT_VERSION: u32 = 2;

/// Inputs for [`PackageFormat::verify_and_extract`].
#[derive(Debug, Clone)]
pub struct VerifyOptions<'a> {
    pub public_key_pem: &'a str,
    /// Detached signature from the marketplace, if any.
    pub signature_base64: Option<&'a str>,
    pub format_version: u32,
    /// The package must declare exactly this id and version. A valid
    /// signature over some other package is rejected.
    pub expected_id: &'a str,
    pub expected_version: &'a str,
}

/// Outcome of a successful verify-and-extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPackage {
    pub files: Vec<ManifestEntry>,
    pub signature_base64: String,
    pub format_version: u32,
    pub host_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirCheck {
    pub ok: bool,
    pub reason: Option<String>,
}

impl DirCheck {
    pub fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

/// The binary package container: signature scheme and archive layout.
pub trait PackageFormat: Send + Sync {
    /// Sniff the container's format version from raw bytes.
    fn detect_format_version(&self, bytes: &[u8]) -> Result<u32>;

    /// Verify the signature and extract into `dest_dir`. Nothing is written
    /// unless verification succeeds.
    fn verify_and_extract(
        &self,
        bytes: &[u8],
        dest_dir: &Path,
        opts: &VerifyOptions<'_>,
    ) -> Result<ExtractedPackage>;

    /// Compare an extracted directory against its recorded manifest.
    fn verify_extracted_dir(
        &self,
        dir: &Path,
        files: &[ManifestEntry],
        ignore_extra_paths: &[String],
    ) -> Result<DirCheck> {
        scan_extracted_dir(dir, files, ignore_extra_paths)
    }
}

const MAX_LISTED_PROBLEMS: usize = 3;

/// Walk `dir` and report missing files, unexpected extra files, and
/// size or hash mismatches.
///
/// A path is ignored when any of its components is in `ignore_extra_paths`,
/// so `__MACOSX/whatever` and `sub/.DS_Store` are both skipped.
pub fn scan_extracted_dir(
    dir: &Path,
    files: &[ManifestEntry],
    ignore_extra_paths: &[String],
) -> Result<DirCheck> {
    if !dir.is_dir() {
        return Ok(DirCheck::failed(format!(
            "install directory missing: {}",
            dir.display()
        )));
    }

    let expected: BTreeMap<&str, &ManifestEntry> =
        files.iter().map(|f| (f.path.as_str(), f)).collect();
    let ignored: BTreeSet<&str> = ignore_extra_paths.iter().map(String::as_str).collect();

    let mut present = BTreeSet::new();
    let mut problems = Vec::new();

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = match entry.path().strip_prefix(dir) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        if is_ignored(rel, &ignored) {
            continue;
        }
        let rel = to_manifest_path(rel);
        if expected.contains_key(rel.as_str()) {
            present.insert(rel);
        } else {
            problems.push(format!("unexpected file: {rel}"));
        }
    }

    for (path, entry) in &expected {
        if !present.contains(*path) {
            problems.push(format!("missing file: {path}"));
            continue;
        }
        let (hash, size) = digest::sha256_file(&dir.join(path))?;
        if size != entry.size {
            problems.push(format!(
                "size mismatch: {path} (expected {}, found {size})",
                entry.size
            ));
        } else if !digest::digest_matches(&hash, &entry.hash) {
            problems.push(format!("hash mismatch: {path}"));
        }
    }

    if problems.is_empty() {
        return Ok(DirCheck::ok());
    }
    let extra = problems.len().saturating_sub(MAX_LISTED_PROBLEMS);
    let mut reason = problems
        .into_iter()
        .take(MAX_LISTED_PROBLEMS)
        .collect::<Vec<_>>()
        .join("; ");
    if extra > 0 {
        reason.push_str(&format!(" (+{extra} more)"));
    }
    Ok(DirCheck::failed(reason))
}

fn is_ignored(rel: &Path, ignored: &BTreeSet<&str>) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(name) => name.to_str().is_some_and(|n| ignored.contains(n)),
        _ => false,
    })
}

/// `/`-separated relative path, regardless of platform.
pub(crate) fn to_manifest_path(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
