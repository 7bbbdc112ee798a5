//! # bastion-core
//!
//! Core types and primitives for Bastion, the trust boundary between a host
//! application and third-party extension packages. This crate defines the
//! shared vocabulary used by every other crate in the workspace.

pub mod error;
pub mod event;
pub mod types;

pub use error::{BastionError, Result};
pub use event::{ListenerRegistry, Subscription};
pub use types::*;
