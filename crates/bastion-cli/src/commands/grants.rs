use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use bastion_config::BastionConfig;
use bastion_core::{BastionError, Permission, Result};
use bastion_permissions::{ChannelSurface, PermissionBroker, PermissionRequest, SurfaceEvent};

use super::GrantAction;
use super::extensions;

pub(super) async fn cmd_grants(config: &BastionConfig, action: GrantAction) -> Result<()> {
    let ctx = extensions::open(config)?;
    let grants = ctx.grants;

    match action {
        GrantAction::List { extension } => {
            let list = match extension.as_deref() {
                Some(ext) => grants.list(ext),
                None => grants.list_all(),
            };
            if list.is_empty() {
                println!("No permission grants.");
            }
            for g in list {
                println!(
                    "  {} {} (granted {})",
                    g.extension_id,
                    g.permission,
                    g.granted_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        GrantAction::Request {
            extension,
            permissions,
            name,
            context,
        } => {
            let permissions: Vec<Permission> =
                permissions.iter().map(|p| Permission::new(p.as_str())).collect();
            let display_name = name.unwrap_or_else(|| extension.clone());
            let context: BTreeMap<String, String> = context.into_iter().collect();

            let (surface, mut events) = ChannelSurface::new();
            let broker = Arc::new(PermissionBroker::new(Arc::new(surface), grants));
            let requester = broker.clone();
            let ext = extension.clone();
            let mut pending = tokio::spawn(async move {
                requester
                    .request(&ext, &display_name, &permissions, context)
                    .await
            });

            let allowed = tokio::select! {
                done = &mut pending => done.map_err(|e| BastionError::Other(e.into()))?,
                Some(SurfaceEvent::Attached(request)) = events.recv() => {
                    render(&request);
                    let answer = read_answer().await;
                    if answer {
                        broker.allow();
                    } else {
                        broker.deny();
                    }
                    pending.await.map_err(|e| BastionError::Other(e.into()))?
                }
            };
            if allowed {
                println!("✅ Granted for {extension}");
            } else {
                println!("❌ Denied for {extension}");
            }
        }
        GrantAction::Revoke {
            extension,
            permission,
        } => {
            if grants.revoke(&extension, &Permission::new(permission.as_str()))? {
                println!("✅ Revoked {permission} from {extension}");
            } else {
                println!("{extension} had no {permission} grant.");
            }
        }
        GrantAction::Reset { extension, all } => {
            let removed = match extension.as_deref() {
                Some(ext) if !all => grants.reset_extension(ext)?,
                _ => grants.reset_all()?,
            };
            println!("✅ Removed {removed} grant(s)");
        }
    }
    Ok(())
}

fn render(request: &PermissionRequest) {
    eprintln!();
    eprintln!(
        "\x1b[1m{}\x1b[0m ({}) requests:",
        request.display_name, request.extension_id
    );
    for p in &request.permissions {
        eprintln!("   • {p}");
    }
    for (key, value) in &request.context {
        eprintln!("\x1b[90m   {key}: {value}\x1b[0m");
    }
}

/// Anything but an explicit yes, including EOF, is a denial.
async fn read_answer() -> bool {
    use std::io::Write;

    eprint!("\x1b[33m   Allow? [y/n]>\x1b[0m ");
    std::io::stderr().flush().ok();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    match lines.next_line().await {
        Ok(Some(answer)) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        _ => false,
    }
}
