#[cfg(test)]
mod tests {
    use bastion_core::*;
    use chrono::Utc;

    fn record() -> InstalledExtensionRecord {
        InstalledExtensionRecord {
            id: "acme.widgets".into(),
            version: "1.0.0".into(),
            installed_at: Utc::now(),
            format_version: 2,
            package_sha256: "ab".repeat(32),
            signature_base64: "c2ln".into(),
            files: vec![ManifestEntry {
                path: "main.js".into(),
                hash: "cd".repeat(32),
                size: 12,
            }],
            host_range: None,
            corrupted: false,
            corrupted_at: None,
            corrupted_reason: None,
        }
    }

    // ── Record tests ───────────────────────────────────────────

    #[test]
    fn test_record_uses_camel_case_schema() {
        let json = serde_json::to_value(record()).unwrap();
        assert!(json.get("installedAt").is_some());
        assert!(json.get("formatVersion").is_some());
        assert!(json.get("packageSha256").is_some());
        assert!(json.get("signatureBase64").is_some());
        assert_eq!(json["files"][0]["hash"], "cd".repeat(32));
        // Unset quarantine metadata stays out of the file.
        assert!(json.get("corruptedReason").is_none());
    }

    #[test]
    fn test_record_without_files_is_legacy() {
        let json = serde_json::json!({
            "id": "old.ext",
            "version": "0.1.0",
            "installedAt": "2024-01-01T00:00:00Z",
            "formatVersion": 1,
            "packageSha256": "00",
            "signatureBase64": ""
        });
        let rec: InstalledExtensionRecord = serde_json::from_value(json).unwrap();
        assert!(!rec.has_manifest());
        assert!(!rec.corrupted);
    }

    #[test]
    fn test_mark_corrupted_sets_metadata() {
        let mut rec = record();
        rec.mark_corrupted("hash mismatch: main.js");
        assert!(rec.corrupted);
        assert!(rec.corrupted_at.is_some());
        assert_eq!(rec.corrupted_reason.as_deref(), Some("hash mismatch: main.js"));
    }

    // ── Failure reason tests ───────────────────────────────────

    #[test]
    fn test_failure_reason_remedies() {
        let incompatible = FailureReason::Incompatible {
            required_range: ">=2.0.0".into(),
            host_version: "1.4.0".into(),
        };
        assert_eq!(incompatible.remedy(), Remedy::Update);
        assert_eq!(FailureReason::corrupted("x").remedy(), Remedy::Repair);
        assert_eq!(
            FailureReason::Unverifiable { detail: "io".into() }.remedy(),
            Remedy::Repair
        );
        assert_eq!(Remedy::Update.label(), "Update");
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::Incompatible {
            required_range: ">=2.0.0".into(),
            host_version: "1.4.0".into(),
        };
        let s = reason.to_string();
        assert!(s.contains(">=2.0.0"));
        assert!(s.contains("1.4.0"));
    }

    #[test]
    fn test_verify_outcome_accessors() {
        assert!(VerifyOutcome::Verified.is_ok());
        let failed = VerifyOutcome::Failed(FailureReason::corrupted("missing file"));
        assert!(!failed.is_ok());
        assert_eq!(failed.failure(), Some(&FailureReason::corrupted("missing file")));
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_not_found_display_includes_version() {
        let err = BastionError::NotFound {
            id: "acme.widgets".into(),
            version: Some("1.0.0".into()),
        };
        assert_eq!(err.to_string(), "not found upstream: acme.widgets@1.0.0");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_load_refused_names_remedy() {
        let err = BastionError::LoadRefused {
            id: "acme.widgets".into(),
            reason: FailureReason::corrupted("hash mismatch: main.js"),
        };
        let s = err.to_string();
        assert!(s.contains("hash mismatch: main.js"));
        assert!(s.contains("repair()"));
        assert!(!err.is_not_found());

        let err = BastionError::LoadRefused {
            id: "acme.widgets".into(),
            reason: FailureReason::Incompatible {
                required_range: ">=2.0.0".into(),
                host_version: "1.0.0".into(),
            },
        };
        assert!(err.to_string().contains("update()"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BastionError = io_err.into();
        assert!(err.to_string().contains("file not found"));
        assert!(!err.is_not_found());
    }

    // ── Permission tests ───────────────────────────────────────

    #[test]
    fn test_permission_serializes_as_string() {
        let json = serde_json::to_string(&Permission::network()).unwrap();
        assert_eq!(json, "\"network\"");
        let back: Permission = serde_json::from_str("\"clipboard\"").unwrap();
        assert_eq!(back, Permission::clipboard());
    }

    #[test]
    fn test_change_event_action_names() {
        let change = ExtensionChange {
            action: ChangeAction::Update,
            id: "acme.widgets".into(),
            record: None,
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["action"], "update");
        assert!(json.get("record").is_none());
    }
}
