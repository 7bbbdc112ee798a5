//! # bastion-sandbox
//!
//! Scrubs privileged host-bridge globals (the `__TAURI_*` family and any
//! configured extras) from an extension's execution context before extension
//! code runs, then again on a fixed schedule to catch late injection.
//!
//! This is defense in depth inside a shared context. It is not process
//! isolation: a global the host locks down before the first pass cannot be
//! scrubbed, and a global injected between passes is reachable until the
//! next one.
//!
//! [`Hardener`] runs the algorithm against any [`GlobalScope`];
//! [`hardening_script`] emits the same algorithm as JavaScript for webview
//! hosts that inject an initialization script.

pub mod harden;
pub mod scope;
pub mod script;

pub use harden::{
    Hardener, HardeningHandle, HardeningSchedule, PRIVILEGED_GLOBALS, SandboxStatus,
    privileged_globals,
};
pub use scope::{DefineError, GlobalScope, InMemoryScope, JsValue, PropertyDescriptor};
pub use script::hardening_script;
