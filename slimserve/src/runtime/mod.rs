//! Server assembly.
//!
//! This module wires the pieces of the reactor together:
//! - [`ServerBuilder`] validates settings, binds the listener and spawns
//!   the worker pool,
//! - [`Server`] runs the event loop on the calling thread,
//! - [`ServerHandle`] observes and stops a running server.

mod builder;
mod core;

pub(crate) mod pool;

pub use builder::{ServerBuilder, TriggerMode};
pub use core::{Server, ServerHandle};
