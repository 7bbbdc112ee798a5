//! # bastion-permissions
//!
//! Gates extension capability requests behind a single-at-a-time consent
//! surface and persists what the user allowed.
//!
//! Every request moves `Queued → Showing → Resolved(allow | deny)`. One FIFO
//! queue is shared by all extensions, and at most one request is showing at
//! any instant. Denial is an ordinary `false`, never an error.

pub mod broker;
pub mod surface;

pub use broker::{PermissionBroker, PromptState};
pub use surface::{ChannelSurface, ConsentSurface, PermissionRequest, SurfaceEvent};
