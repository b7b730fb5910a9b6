//! Reactor core and connection lifecycle.
//!
//! The reactor thread is responsible for:
//! - accepting clients and enforcing the connection ceiling,
//! - evicting idle connections through the [`HeapTimer`](timer::HeapTimer),
//! - turning readiness events into read/write tasks on the worker pool.
//!
//! Worker threads never touch the connection table; they re-arm their
//! own connection through the poller and post [`Command`]s back.

mod connection;
mod context;
mod core;
mod listener;

pub(crate) mod command;
pub(crate) mod poller;
pub(crate) mod timer;

pub(crate) use command::Command;
pub(crate) use context::Context;
pub(crate) use core::{Reactor, ReactorSettings};
pub(crate) use listener::Listener;
