//! # bastion-config
//!
//! Configuration system for Bastion. Reads from `bastion.toml` and environment
//! variables, in that precedence order.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::BastionConfig;
pub use schema::{
    ConfigWarning, ExtensionsConfig, LoggingConfig, MarketplaceConfig, PermissionsConfig,
    SandboxConfig, WarningSeverity,
};
