use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use bastion_config::BastionConfig;
use bastion_core::{BastionError, ChangeAction, Result, VerifyOutcome};
use bastion_package::{BundleFormat, ExtensionManager, HttpMarketplace};
use bastion_store::{GrantStore, JsonRecordStore};

/// Wired-up manager plus the grant store it cleans on uninstall.
pub(super) struct Context {
    pub manager: ExtensionManager,
    pub grants: Arc<GrantStore>,
}

pub(super) fn open(config: &BastionConfig) -> Result<Context> {
    let timeout = match config.marketplace.timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let marketplace = HttpMarketplace::new(
        &config.marketplace.url,
        timeout,
        &config.marketplace.user_agent,
    )?;
    let manager = ExtensionManager::builder()
        .marketplace(Arc::new(marketplace))
        .format(Arc::new(BundleFormat))
        .store(Arc::new(JsonRecordStore::open(&config.extensions.state_file)))
        .install_root(&config.extensions.dir)
        .host_version(config.extensions.host_version.clone())
        .ignore_extra_paths(config.extensions.ignore_extra_paths.clone())
        .build()?;

    let grants = Arc::new(GrantStore::open(&config.permissions.grants_file));
    let cleanup = grants.clone();
    manager.subscribe(move |change| {
        if change.action != ChangeAction::Uninstall {
            return;
        }
        match cleanup.reset_extension(&change.id) {
            Ok(0) => {}
            Ok(n) => info!(extension = %change.id, removed = n, "permission grants cleared"),
            Err(e) => warn!(extension = %change.id, error = %e, "failed to clear permission grants"),
        }
    });

    Ok(Context { manager, grants })
}

pub(super) async fn cmd_install(
    config: &BastionConfig,
    id: &str,
    version: Option<&str>,
) -> Result<()> {
    let ctx = open(config)?;
    let record = ctx.manager.install(id, version).await?;
    println!(
        "✅ Installed {}@{} ({} files)",
        record.id,
        record.version,
        record.files.len()
    );
    Ok(())
}

pub(super) async fn cmd_update(config: &BastionConfig, id: &str) -> Result<()> {
    let ctx = open(config)?;
    let before = ctx.manager.record(id).map(|r| r.version);
    let record = ctx.manager.update(id).await?;
    match before {
        Some(prev) if prev != record.version => {
            println!("✅ Updated {id}: {prev} → {}", record.version)
        }
        _ => println!("{id} is up to date ({})", record.version),
    }
    Ok(())
}

pub(super) async fn cmd_uninstall(config: &BastionConfig, id: &str) -> Result<()> {
    let ctx = open(config)?;
    match ctx.manager.uninstall(id).await? {
        Some(record) => println!("✅ Uninstalled {}@{}", record.id, record.version),
        None => println!("{id} was not installed."),
    }
    Ok(())
}

pub(super) fn cmd_list(config: &BastionConfig, json: bool) -> Result<()> {
    let ctx = open(config)?;
    let records = ctx.manager.installed();
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No extensions installed.");
        return Ok(());
    }
    for r in records {
        let status = if r.corrupted {
            format!(
                "  [quarantined: {}]",
                r.corrupted_reason.as_deref().unwrap_or("unknown")
            )
        } else {
            String::new()
        };
        println!(
            "  {} v{} (format {}, {} files, installed {}){status}",
            r.id,
            r.version,
            r.format_version,
            r.files.len(),
            r.installed_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub(super) async fn cmd_outdated(config: &BastionConfig) -> Result<()> {
    let ctx = open(config)?;
    let updates = ctx.manager.check_for_updates().await;
    if updates.is_empty() {
        println!("All extensions are up to date.");
    }
    for u in updates {
        println!("  {} {} → {}", u.id, u.current_version, u.latest_version);
    }
    Ok(())
}

pub(super) async fn cmd_repair(config: &BastionConfig, id: &str) -> Result<()> {
    let ctx = open(config)?;
    let record = ctx.manager.repair(id).await?;
    println!("✅ Repaired {}@{}", record.id, record.version);
    Ok(())
}

fn print_outcome(id: &str, outcome: &VerifyOutcome) {
    match outcome.failure() {
        None => println!("  ✅ {id}"),
        Some(reason) => println!(
            "  ❌ {id}: {reason} ({}: bastion {} {id})",
            reason.remedy().label(),
            reason.remedy().action()
        ),
    }
}

pub(super) fn cmd_verify(config: &BastionConfig, id: Option<&str>) -> Result<()> {
    let ctx = open(config)?;
    let outcomes = match id {
        Some(id) => {
            let outcome = ctx.manager.verify_installed(id)?;
            vec![(id.to_string(), outcome)]
        }
        None => ctx.manager.verify_all_installed().into_iter().collect(),
    };
    if outcomes.is_empty() {
        println!("No extensions installed.");
        return Ok(());
    }

    let mut failed = 0;
    for (id, outcome) in &outcomes {
        print_outcome(id, outcome);
        if !outcome.is_ok() {
            failed += 1;
        }
    }
    if failed > 0 {
        return Err(BastionError::Other(anyhow::anyhow!(
            "{failed} of {} extension(s) failed verification",
            outcomes.len()
        )));
    }
    Ok(())
}
