#[cfg(test)]
mod tests {
    // ── Record store ───────────────────────────────────────────

    mod records {
        use bastion_core::{InstalledExtensionRecord, ManifestEntry};
        use bastion_store::{JsonRecordStore, RecordStore};
        use chrono::Utc;

        fn record(id: &str, version: &str) -> InstalledExtensionRecord {
            InstalledExtensionRecord {
                id: id.into(),
                version: version.into(),
                installed_at: Utc::now(),
                format_version: 2,
                package_sha256: "00".repeat(32),
                signature_base64: "c2ln".into(),
                files: vec![ManifestEntry {
                    path: "index.js".into(),
                    hash: "11".repeat(32),
                    size: 3,
                }],
                host_range: None,
                corrupted: false,
                corrupted_at: None,
                corrupted_reason: None,
            }
        }

        #[test]
        fn test_put_get_list() {
            let dir = tempfile::tempdir().unwrap();
            let store = JsonRecordStore::open(dir.path().join("extensions.json"));

            store.put(record("b.ext", "1.0.0")).unwrap();
            store.put(record("a.ext", "2.0.0")).unwrap();

            assert_eq!(store.get("a.ext").unwrap().version, "2.0.0");
            assert!(store.get("missing").is_none());
            assert_eq!(store.ids(), vec!["a.ext", "b.ext"]);
            assert_eq!(store.list().len(), 2);
        }

        #[test]
        fn test_put_replaces_same_id() {
            let dir = tempfile::tempdir().unwrap();
            let store = JsonRecordStore::open(dir.path().join("extensions.json"));

            store.put(record("a.ext", "1.0.0")).unwrap();
            store.put(record("a.ext", "1.1.0")).unwrap();

            assert_eq!(store.list().len(), 1);
            assert_eq!(store.get("a.ext").unwrap().version, "1.1.0");
        }

        #[test]
        fn test_update_and_remove() {
            let dir = tempfile::tempdir().unwrap();
            let store = JsonRecordStore::open(dir.path().join("extensions.json"));
            store.put(record("a.ext", "1.0.0")).unwrap();

            let updated = store
                .update("a.ext", &mut |r| r.mark_corrupted("tampered"))
                .unwrap()
                .unwrap();
            assert!(updated.corrupted);
            assert!(store.get("a.ext").unwrap().corrupted);

            assert!(store.update("nope", &mut |_| {}).unwrap().is_none());

            let removed = store.remove("a.ext").unwrap();
            assert!(removed.is_some());
            assert!(store.remove("a.ext").unwrap().is_none());
            assert!(store.list().is_empty());
        }

        #[test]
        fn test_schema_has_installed_map() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("extensions.json");
            let store = JsonRecordStore::open(&path);
            store.put(record("a.ext", "1.0.0")).unwrap();

            let raw: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
            assert_eq!(raw["installed"]["a.ext"]["version"], "1.0.0");
        }

        #[test]
        fn test_corrupt_state_file_means_nothing_installed() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("extensions.json");
            std::fs::write(&path, "[[[").unwrap();

            let store = JsonRecordStore::open(&path);
            assert!(store.list().is_empty());
            assert!(store.get("a.ext").is_none());
        }

        #[test]
        fn test_writes_for_one_id_keep_other_ids() {
            let dir = tempfile::tempdir().unwrap();
            let store = JsonRecordStore::open(dir.path().join("extensions.json"));
            store.put(record("a.ext", "1.0.0")).unwrap();
            store.put(record("b.ext", "1.0.0")).unwrap();

            store.remove("a.ext").unwrap();
            assert_eq!(store.get("b.ext").unwrap().version, "1.0.0");
        }
    }

    // ── Grant store ────────────────────────────────────────────

    mod grants {
        use bastion_core::Permission;
        use bastion_store::GrantStore;

        #[test]
        fn test_grant_and_query() {
            let dir = tempfile::tempdir().unwrap();
            let store = GrantStore::open(dir.path().join("permissions.json"));

            assert!(!store.is_granted("acme.widgets", &Permission::network()));
            let grant = store.grant("acme.widgets", &Permission::network()).unwrap();
            assert_eq!(grant.permission, Permission::network());
            assert!(store.is_granted("acme.widgets", &Permission::network()));
            assert!(!store.is_granted("acme.widgets", &Permission::clipboard()));
            assert!(!store.is_granted("other.ext", &Permission::network()));
        }

        #[test]
        fn test_grants_survive_reopen() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("permissions.json");
            GrantStore::open(&path)
                .grant("acme.widgets", &Permission::clipboard())
                .unwrap();

            let reopened = GrantStore::open(&path);
            assert!(reopened.is_granted("acme.widgets", &Permission::clipboard()));
            assert_eq!(reopened.list("acme.widgets").len(), 1);
        }

        #[test]
        fn test_revoke_single_grant() {
            let dir = tempfile::tempdir().unwrap();
            let store = GrantStore::open(dir.path().join("permissions.json"));
            store.grant("acme.widgets", &Permission::network()).unwrap();
            store.grant("acme.widgets", &Permission::clipboard()).unwrap();

            assert!(store.revoke("acme.widgets", &Permission::network()).unwrap());
            assert!(!store.revoke("acme.widgets", &Permission::network()).unwrap());
            assert!(store.is_granted("acme.widgets", &Permission::clipboard()));
        }

        #[test]
        fn test_reset_extension_and_all() {
            let dir = tempfile::tempdir().unwrap();
            let store = GrantStore::open(dir.path().join("permissions.json"));
            store.grant("a.ext", &Permission::network()).unwrap();
            store.grant("a.ext", &Permission::commands()).unwrap();
            store.grant("b.ext", &Permission::clipboard()).unwrap();

            assert_eq!(store.reset_extension("a.ext").unwrap(), 2);
            assert!(store.list("a.ext").is_empty());
            assert_eq!(store.list_all().len(), 1);

            assert_eq!(store.reset_all().unwrap(), 1);
            assert!(store.list_all().is_empty());
        }
    }
}
