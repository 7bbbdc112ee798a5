#[cfg(test)]
mod tests {
    use bastion_config::ConfigLoader;
    use bastion_config::schema::*;
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_defaults_validate_cleanly() {
        let config = BastionConfig::default();
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
    }

    #[test]
    fn test_extensions_config_defaults() {
        let config = ExtensionsConfig::default();
        assert!(config.dir.ends_with("extensions"));
        assert!(config.state_file.ends_with("extensions.json"));
        assert_eq!(config.host_version, "1.0.0");
        assert!(config.ignore_extra_paths.contains(&".DS_Store".to_string()));
        assert!(config.ignore_extra_paths.contains(&"Thumbs.db".to_string()));
    }

    #[test]
    fn test_sandbox_config_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.short_delay_ms, 50);
        assert_eq!(config.long_delay_ms, 500);
        assert!(config.extra_globals.is_empty());
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_invalid_host_version_is_error() {
        let mut config = BastionConfig::default();
        config.extensions.host_version = "one".into();
        let err = config.validate().unwrap_err();
        assert!(err.contains("extensions.host_version"));
    }

    #[test]
    fn test_inverted_sandbox_delays_is_error() {
        let mut config = BastionConfig::default();
        config.sandbox.short_delay_ms = 500;
        config.sandbox.long_delay_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_plain_http_marketplace_warns() {
        let mut config = BastionConfig::default();
        config.marketplace.url = "http://localhost:8080".into();
        let warnings = config.validate().unwrap();
        assert!(warnings
            .iter()
            .any(|w| w.field == "marketplace.url" && w.severity == WarningSeverity::Warning));
    }

    #[test]
    fn test_non_http_marketplace_is_error() {
        let mut config = BastionConfig::default();
        config.marketplace.url = "ftp://example.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_warning_display() {
        let w = ConfigWarning {
            field: "logging.format".into(),
            message: "unknown log format 'xml'".into(),
            severity: WarningSeverity::Warning,
            hint: Some("Valid values: pretty, json".into()),
        };
        let s = w.to_string();
        assert!(s.starts_with("warning: logging.format"));
        assert!(s.contains("pretty, json"));
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[extensions]
host_version = "2.3.0"

[sandbox]
extra_globals = ["__HOST_BRIDGE__"]
"#;
        let config: BastionConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.extensions.host_version, "2.3.0");
        assert_eq!(config.sandbox.extra_globals, vec!["__HOST_BRIDGE__"]);
        assert_eq!(config.sandbox.short_delay_ms, 50);
        assert_eq!(config.marketplace.timeout_secs, 30);
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("bastion.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[extensions]
dir = "/srv/ext"
state_file = "/srv/ext.json"

[marketplace]
url = "https://market.example.com"
timeout_secs = 5
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.extensions.dir, std::path::PathBuf::from("/srv/ext"));
        assert_eq!(config.marketplace.timeout_secs, 5);
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("bastion.toml");
        std::fs::write(&config_path, "[extensions]\nhost_version = \"latest\"\n").unwrap();
        assert!(ConfigLoader::load(Some(config_path.as_path())).is_err());
    }

    #[test]
    fn test_config_loader_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("bastion.toml");
        std::fs::write(&config_path, "[logging]\nlevel = \"warn\"\n").unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let before = loader.get().logging.level;

        std::fs::write(&config_path, "[logging]\nlevel = \"debug\"\n").unwrap();
        loader.reload().unwrap();

        // An exported BASTION_LOG_LEVEL would override both reads equally.
        if std::env::var("BASTION_LOG_LEVEL").is_err() {
            assert_eq!(before, "warn");
            assert_eq!(loader.get().logging.level, "debug");
        }
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = BastionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: BastionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.marketplace.url, config.marketplace.url);
        assert_eq!(restored.permissions.grants_file, config.permissions.grants_file);
    }
}
