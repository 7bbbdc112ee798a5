use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use bastion_config::{BastionConfig, ConfigLoader, LoggingConfig};
use bastion_core::{BastionError, Result};

mod extensions;
mod grants;

/// Bastion: verify, install, and gate third-party extensions
#[derive(Parser)]
#[command(name = "bastion", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to bastion.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download, verify, and install an extension
    Install {
        id: String,
        /// Exact version (defaults to the marketplace's latest)
        #[arg(id = "pkg_version", value_name = "VERSION")]
        version: Option<String>,
    },
    /// Move an extension to the marketplace's latest version if it is newer
    Update { id: String },
    /// Remove an extension and its permission grants
    Uninstall { id: String },
    /// List installed extensions
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show installed extensions with a newer version upstream
    Outdated,
    /// Reinstall an extension at its recorded version (or latest if that is gone)
    Repair { id: String },
    /// Re-check installed files against their integrity manifest
    Verify {
        /// Extension to check (defaults to all)
        id: Option<String>,
    },
    /// Manage permission grants
    Grants {
        #[command(subcommand)]
        action: GrantAction,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the in-context hardening script for webview hosts
    SandboxScript,
}

#[derive(Subcommand)]
enum GrantAction {
    /// List persisted grants
    List {
        /// Only grants of this extension
        extension: Option<String>,
    },
    /// Ask for consent to one or more permissions on behalf of an extension
    Request {
        extension: String,
        #[arg(required = true)]
        permissions: Vec<String>,
        /// Display name shown in the prompt (defaults to the id)
        #[arg(long)]
        name: Option<String>,
        /// Permission context as key=value pairs (e.g. host=api.example.com)
        #[arg(long, value_parser = parse_key_val)]
        context: Vec<(String, String)>,
    },
    /// Revoke a single grant
    Revoke {
        extension: String,
        permission: String,
    },
    /// Remove all grants of one extension, or every grant with --all
    Reset {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        extension: Option<String>,
        #[arg(long)]
        all: bool,
    },
}

/// Parse "key=value" CLI arguments.
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{s}`"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_tracing(level: &str, logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (writer, ansi) = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);
    if logging.format == "json" {
        builder.json().with_target(true).init();
    } else {
        builder.with_target(false).init();
    }
    Ok(())
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // --verbose > --quiet > --log-level > config (RUST_LOG beats all)
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level
                .as_deref()
                .unwrap_or(config.logging.level.as_str())
        };
        init_tracing(log_level, &config.logging)?;

        match self.command {
            Commands::Install { id, version } => {
                extensions::cmd_install(&config, &id, version.as_deref()).await
            }
            Commands::Update { id } => extensions::cmd_update(&config, &id).await,
            Commands::Uninstall { id } => extensions::cmd_uninstall(&config, &id).await,
            Commands::List { json } => extensions::cmd_list(&config, json),
            Commands::Outdated => extensions::cmd_outdated(&config).await,
            Commands::Repair { id } => extensions::cmd_repair(&config, &id).await,
            Commands::Verify { id } => extensions::cmd_verify(&config, id.as_deref()),
            Commands::Grants { action } => grants::cmd_grants(&config, action).await,
            Commands::Config { json } => Self::cmd_config(&config, config_loader.path(), json),
            Commands::SandboxScript => Self::cmd_sandbox_script(&config),
        }
    }

    fn cmd_config(config: &BastionConfig, path: &std::path::Path, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(config)?);
            return Ok(());
        }
        println!("# {}", path.display());
        println!(
            "{}",
            toml::to_string_pretty(config).map_err(|e| BastionError::Config(e.to_string()))?
        );
        if let Ok(warnings) = config.validate() {
            for w in warnings {
                println!("# {w}");
            }
        }
        Ok(())
    }

    fn cmd_sandbox_script(config: &BastionConfig) -> Result<()> {
        let names = bastion_sandbox::privileged_globals(&config.sandbox.extra_globals);
        let schedule = bastion_sandbox::HardeningSchedule::from(&config.sandbox);
        print!("{}", bastion_sandbox::hardening_script(&names, schedule));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_install_with_version() {
        let cli = Cli::try_parse_from(["bastion", "install", "acme.widgets", "1.0.0"]).unwrap();
        match cli.command {
            Commands::Install { id, version } => {
                assert_eq!(id, "acme.widgets");
                assert_eq!(version.as_deref(), Some("1.0.0"));
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn parses_grant_request_context() {
        let cli = Cli::try_parse_from([
            "bastion",
            "grants",
            "request",
            "acme.widgets",
            "network",
            "--context",
            "host=api.acme.dev",
        ])
        .unwrap();
        match cli.command {
            Commands::Grants {
                action:
                    GrantAction::Request {
                        permissions,
                        context,
                        ..
                    },
            } => {
                assert_eq!(permissions, ["network"]);
                assert_eq!(context, [("host".to_string(), "api.acme.dev".to_string())]);
            }
            _ => panic!("expected grants request"),
        }
    }

    #[test]
    fn grant_reset_needs_target() {
        assert!(Cli::try_parse_from(["bastion", "grants", "reset"]).is_err());
        assert!(Cli::try_parse_from(["bastion", "grants", "reset", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["bastion", "grants", "reset", "a.b", "--all"]).is_err());
    }

    #[test]
    fn verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["bastion", "-v", "-q", "list"]).is_err());
    }

    #[test]
    fn key_val_parsing() {
        assert_eq!(
            parse_key_val("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
    }
}
