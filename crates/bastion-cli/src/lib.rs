//! # bastion-cli
//!
//! Command-line interface for the Bastion extension trust boundary.
//!
//! ## Commands
//!
//! - `bastion install <id> [version]` / `update` / `uninstall` / `repair`
//! - `bastion list` / `outdated` / `verify [id]`
//! - `bastion grants list|request|revoke|reset`
//! - `bastion config [--json]`
//! - `bastion sandbox-script`

pub mod commands;

pub use commands::Cli;
