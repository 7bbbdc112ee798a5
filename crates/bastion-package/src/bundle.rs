//! `BundleFormat`: the shipped [`PackageFormat`].
//!
//! A bundle is a JSON document carrying every file inline (base64) plus an
//! Ed25519 signature over the compact JSON encoding of a `SignedListing`:
//!
//! ```text
//! {"domain":"bastion-bundle","id":..,"version":..,"format_version":..,
//!  "host_range":..|null,"files":[{"path":..,"hash":..,"size":..},..]}
//! ```
//!
//! Files are sorted by path. String escaping keeps field boundaries
//! unambiguous, so no path or range value can re-split the listing.
//!
//! Format 1 bundles carry no signature of their own; the marketplace must
//! supply a detached one. Format 2 bundles embed it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use bastion_core::{BastionError, ManifestEntry, Result};

use crate::digest::sha256_hex;
use crate::marketplace::PackageDownload;
use crate::format::{
    CURRENT_FORMAT_VERSION, ExtractedPackage, LEGACY_FORMAT_VERSION, PackageFormat,
    VerifyOptions, to_manifest_path,
};

const SIGNING_DOMAIN: &str = "bastion-bundle";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BundleDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format_version: Option<u32>,
    id: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host_range: Option<String>,
    files: Vec<BundleFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BundleFile {
    path: String,
    data: String,
}

#[derive(Serialize)]
struct SignedListing<'a> {
    domain: &'static str,
    id: &'a str,
    version: &'a str,
    format_version: u32,
    host_range: Option<&'a str>,
    files: Vec<SignedFile<'a>>,
}

#[derive(Serialize)]
struct SignedFile<'a> {
    path: &'a str,
    hash: &'a str,
    size: u64,
}

fn signing_message(
    id: &str,
    version: &str,
    format_version: u32,
    host_range: Option<&str>,
    files: &[ManifestEntry],
) -> Result<Vec<u8>> {
    let listing = SignedListing {
        domain: SIGNING_DOMAIN,
        id,
        version,
        format_version,
        host_range,
        files: files
            .iter()
            .map(|f| SignedFile {
                path: &f.path,
                hash: &f.hash,
                size: f.size,
            })
            .collect(),
    };
    Ok(serde_json::to_vec(&listing)?)
}

/// Relative, `/`-separated, no `.`/`..`/root components, no control characters.
fn is_safe_path(path: &str) -> bool {
    !path.is_empty()
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
        && to_manifest_path(Path::new(path)) == path
}

fn has_control(value: &str) -> bool {
    value.chars().any(char::is_control)
}

/// PEM (SPKI) encoding of a publisher key, as served by the marketplace.
pub fn public_key_pem(key: &VerifyingKey) -> Result<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| BastionError::Other(anyhow::anyhow!("encoding public key: {e}")))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BundleFormat;

impl BundleFormat {
    fn parse(bytes: &[u8], id_hint: &str) -> Result<BundleDocument> {
        serde_json::from_slice(bytes)
            .map_err(|e| BastionError::package(id_hint, format!("malformed bundle: {e}")))
    }
}

impl PackageFormat for BundleFormat {
    fn detect_format_version(&self, bytes: &[u8]) -> Result<u32> {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(default)]
            format_version: Option<u32>,
        }
        let probe: Probe = serde_json::from_slice(bytes)
            .map_err(|e| BastionError::package("<unknown>", format!("malformed bundle: {e}")))?;
        Ok(probe.format_version.unwrap_or(LEGACY_FORMAT_VERSION))
    }

    fn verify_and_extract(
        &self,
        bytes: &[u8],
        dest_dir: &Path,
        opts: &VerifyOptions<'_>,
    ) -> Result<ExtractedPackage> {
        let id = opts.expected_id;
        let doc = Self::parse(bytes, id)?;

        let declared = doc.format_version.unwrap_or(LEGACY_FORMAT_VERSION);
        if declared != opts.format_version {
            return Err(BastionError::integrity(
                id,
                format!(
                    "format version mismatch: bundle declares {declared}, expected {}",
                    opts.format_version
                ),
            ));
        }
        if doc.id != opts.expected_id || doc.version != opts.expected_version {
            warn!(
                extension = %id,
                declared = %format!("{}@{}", doc.id, doc.version),
                "bundle identity does not match request"
            );
            return Err(BastionError::integrity(
                id,
                format!(
                    "bundle is {}@{}, expected {}@{}",
                    doc.id, doc.version, opts.expected_id, opts.expected_version
                ),
            ));
        }

        if [doc.id.as_str(), doc.version.as_str()]
            .into_iter()
            .chain(doc.host_range.as_deref())
            .any(has_control)
        {
            return Err(BastionError::integrity(
                id,
                "control character in bundle identity or host range",
            ));
        }

        let signature_b64 = match (declared, doc.signature.as_deref(), opts.signature_base64) {
            (LEGACY_FORMAT_VERSION, _, None) => {
                return Err(BastionError::integrity(
                    id,
                    "legacy bundle requires a detached signature",
                ));
            }
            (LEGACY_FORMAT_VERSION, _, Some(detached)) => detached.to_string(),
            (_, Some(embedded), Some(detached)) if embedded != detached => {
                return Err(BastionError::integrity(
                    id,
                    "detached signature differs from embedded signature",
                ));
            }
            (_, Some(embedded), _) => embedded.to_string(),
            (_, None, Some(detached)) => detached.to_string(),
            (_, None, None) => return Err(BastionError::integrity(id, "bundle is unsigned")),
        };

        let mut contents: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for file in &doc.files {
            if !is_safe_path(&file.path) {
                return Err(BastionError::integrity(
                    id,
                    format!("unsafe path in bundle: {:?}", file.path),
                ));
            }
            let data = BASE64
                .decode(file.data.as_bytes())
                .map_err(|e| BastionError::package(id, format!("{}: {e}", file.path)))?;
            if contents.insert(file.path.clone(), data).is_some() {
                return Err(BastionError::integrity(
                    id,
                    format!("duplicate path in bundle: {}", file.path),
                ));
            }
        }
        let files: Vec<ManifestEntry> = contents
            .iter()
            .map(|(path, data)| ManifestEntry {
                path: path.clone(),
                hash: sha256_hex(data),
                size: data.len() as u64,
            })
            .collect();

        let key = VerifyingKey::from_public_key_pem(opts.public_key_pem)
            .map_err(|e| BastionError::integrity(id, format!("invalid publisher key: {e}")))?;
        let sig_bytes = BASE64
            .decode(signature_b64.as_bytes())
            .map_err(|e| BastionError::integrity(id, format!("signature is not base64: {e}")))?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| BastionError::integrity(id, format!("malformed signature: {e}")))?;
        let message = signing_message(
            &doc.id,
            &doc.version,
            declared,
            doc.host_range.as_deref(),
            &files,
        )?;
        key.verify_strict(&message, &signature).map_err(|_| {
            warn!(extension = %id, "signature verification failed");
            BastionError::integrity(id, "signature verification failed")
        })?;

        std::fs::create_dir_all(dest_dir)?;
        for (path, data) in &contents {
            let target = dest_dir.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, data)?;
        }
        debug!(extension = %id, files = files.len(), dest = %dest_dir.display(), "bundle extracted");

        Ok(ExtractedPackage {
            files,
            signature_base64: signature_b64,
            format_version: declared,
            host_range: doc.host_range,
        })
    }
}

// ── Writer ─────────────────────────────────────────────────────

/// A built bundle plus the values a marketplace would publish beside it.
#[derive(Debug, Clone)]
pub struct SignedBundle {
    pub bytes: Vec<u8>,
    pub signature_base64: String,
    pub sha256: String,
}

impl PackageDownload {
    /// A download as a well-behaved marketplace serves `bundle`: bytes plus
    /// declared hash and detached signature. The format version is left for
    /// sniffing.
    pub fn from_signed(bundle: &SignedBundle) -> Self {
        Self {
            bytes: bundle.bytes.clone(),
            sha256: Some(bundle.sha256.clone()),
            signature_base64: Some(bundle.signature_base64.clone()),
            format_version: None,
        }
    }
}

/// Builds and signs bundles.
#[derive(Debug, Clone)]
pub struct BundleWriter {
    id: String,
    version: String,
    format_version: u32,
    host_range: Option<String>,
    files: BTreeMap<String, Vec<u8>>,
}

impl BundleWriter {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            format_version: CURRENT_FORMAT_VERSION,
            host_range: None,
            files: BTreeMap::new(),
        }
    }

    /// Produce a format 1 bundle; the signature is only returned, not embedded.
    pub fn legacy(mut self) -> Self {
        self.format_version = LEGACY_FORMAT_VERSION;
        self
    }

    pub fn host_range(mut self, range: &str) -> Self {
        self.host_range = Some(range.to_string());
        self
    }

    pub fn file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.to_string(), data.into());
        self
    }

    pub fn build(&self, key: &SigningKey) -> Result<SignedBundle> {
        let entries: Vec<ManifestEntry> = self
            .files
            .iter()
            .map(|(path, data)| ManifestEntry {
                path: path.clone(),
                hash: sha256_hex(data),
                size: data.len() as u64,
            })
            .collect();
        let message = signing_message(
            &self.id,
            &self.version,
            self.format_version,
            self.host_range.as_deref(),
            &entries,
        )?;
        let signature_base64 = BASE64.encode(key.sign(&message).to_bytes());

        let legacy = self.format_version == LEGACY_FORMAT_VERSION;
        let doc = BundleDocument {
            format_version: (!legacy).then_some(self.format_version),
            id: self.id.clone(),
            version: self.version.clone(),
            host_range: self.host_range.clone(),
            files: self
                .files
                .iter()
                .map(|(path, data)| BundleFile {
                    path: path.clone(),
                    data: BASE64.encode(data),
                })
                .collect(),
            signature: (!legacy).then(|| signature_base64.clone()),
        };
        let bytes = serde_json::to_vec(&doc)?;
        let sha256 = sha256_hex(&bytes);
        Ok(SignedBundle {
            bytes,
            signature_base64,
            sha256,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn opts<'a>(pem: &'a str, id: &'a str, version: &'a str, fv: u32) -> VerifyOptions<'a> {
        VerifyOptions {
            public_key_pem: pem,
            signature_base64: None,
            format_version: fv,
            expected_id: id,
            expected_version: version,
        }
    }

    #[test]
    fn safe_paths() {
        assert!(is_safe_path("main.js"));
        assert!(is_safe_path("lib/util.js"));
        assert!(!is_safe_path("../escape.js"));
        assert!(!is_safe_path("/etc/passwd"));
        assert!(!is_safe_path("./main.js"));
        assert!(!is_safe_path("lib\\util.js"));
        assert!(!is_safe_path(""));
        assert!(!is_safe_path("a.js\tdeadbeef\t1\nb.js"));
        assert!(!is_safe_path("main\u{0}.js"));
    }

    #[test]
    fn detects_format_versions() {
        let k = key(1);
        let current = BundleWriter::new("a.b", "1.0.0").build(&k).unwrap();
        let legacy = BundleWriter::new("a.b", "1.0.0").legacy().build(&k).unwrap();
        assert_eq!(BundleFormat.detect_format_version(&current.bytes).unwrap(), 2);
        assert_eq!(BundleFormat.detect_format_version(&legacy.bytes).unwrap(), 1);
        assert!(BundleFormat.detect_format_version(b"not json").is_err());
    }

    #[test]
    fn extracts_signed_bundle() {
        let k = key(2);
        let pem = public_key_pem(&k.verifying_key()).unwrap();
        let bundle = BundleWriter::new("a.b", "1.0.0")
            .host_range(">=1.0")
            .file("main.js", "console.log(1)")
            .file("lib/util.js", "export {}")
            .build(&k)
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = BundleFormat
            .verify_and_extract(&bundle.bytes, dir.path(), &opts(&pem, "a.b", "1.0.0", 2))
            .unwrap();
        assert_eq!(out.files.len(), 2);
        assert_eq!(out.files[0].path, "lib/util.js");
        assert_eq!(out.host_range.as_deref(), Some(">=1.0"));
        assert_eq!(out.signature_base64, bundle.signature_base64);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("main.js")).unwrap(),
            "console.log(1)"
        );
    }

    #[test]
    fn tampered_host_range_breaks_signature() {
        let k = key(3);
        let pem = public_key_pem(&k.verifying_key()).unwrap();
        let bundle = BundleWriter::new("a.b", "1.0.0")
            .host_range(">=2.0")
            .file("main.js", "x")
            .build(&k)
            .unwrap();
        let mut doc: serde_json::Value = serde_json::from_slice(&bundle.bytes).unwrap();
        doc["host_range"] = serde_json::json!(">=0.1");
        let bytes = serde_json::to_vec(&doc).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = BundleFormat
            .verify_and_extract(&bytes, &dir.path().join("out"), &opts(&pem, "a.b", "1.0.0", 2))
            .unwrap_err();
        assert!(err.to_string().contains("signature verification failed"));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn format_mismatch_rejected() {
        let k = key(4);
        let pem = public_key_pem(&k.verifying_key()).unwrap();
        let bundle = BundleWriter::new("a.b", "1.0.0").build(&k).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = BundleFormat
            .verify_and_extract(&bundle.bytes, dir.path(), &opts(&pem, "a.b", "1.0.0", 1))
            .unwrap_err();
        assert!(err.to_string().contains("format version mismatch"));
    }

    #[test]
    fn resplit_file_listing_rejected() {
        let k = key(5);
        let pem = public_key_pem(&k.verifying_key()).unwrap();
        let genuine = BundleWriter::new("a.b", "1.0.0")
            .file("a.js", "A")
            .file("b.js", "B")
            .build(&k)
            .unwrap();

        // One file whose path swallows a.js's listing line and carries b.js's bytes.
        let merged_path = format!("a.js\t{}\t1\nb.js", sha256_hex(b"A"));
        let forged = serde_json::json!({
            "format_version": 2,
            "id": "a.b",
            "version": "1.0.0",
            "files": [{ "path": merged_path, "data": BASE64.encode("B") }],
            "signature": genuine.signature_base64,
        });
        let bytes = serde_json::to_vec(&forged).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = BundleFormat
            .verify_and_extract(&bytes, &dir.path().join("out"), &opts(&pem, "a.b", "1.0.0", 2))
            .unwrap_err();
        assert!(err.to_string().contains("unsafe path"));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn resplit_through_host_range_rejected() {
        let k = key(6);
        let pem = public_key_pem(&k.verifying_key()).unwrap();
        let genuine = BundleWriter::new("a.b", "1.0.0")
            .host_range(">=1.0")
            .file("a.js", "A")
            .build(&k)
            .unwrap();

        let smuggled = format!(">=1.0\na.js\t{}\t1", sha256_hex(b"A"));
        let forged = serde_json::json!({
            "format_version": 2,
            "id": "a.b",
            "version": "1.0.0",
            "host_range": smuggled,
            "files": [],
            "signature": genuine.signature_base64,
        });
        let bytes = serde_json::to_vec(&forged).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = BundleFormat
            .verify_and_extract(&bytes, &dir.path().join("out"), &opts(&pem, "a.b", "1.0.0", 2))
            .unwrap_err();
        assert!(err.to_string().contains("control character"));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn listing_encoding_keeps_fields_apart() {
        let split = signing_message(
            "a.b",
            "1.0.0",
            2,
            None,
            &[
                ManifestEntry { path: "a.js".into(), hash: "h".into(), size: 1 },
                ManifestEntry { path: "b.js".into(), hash: "h".into(), size: 1 },
            ],
        )
        .unwrap();
        let merged = signing_message(
            "a.b",
            "1.0.0",
            2,
            None,
            &[ManifestEntry { path: "a.js\th\t1\nb.js".into(), hash: "h".into(), size: 1 }],
        )
        .unwrap();
        assert_ne!(split, merged);
    }
}
