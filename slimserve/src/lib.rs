//! # SlimServe
//!
//! **SlimServe** is a small multi-threaded TCP server built around a single
//! `epoll` reactor. It accepts many short-lived connections, evicts idle
//! ones through a heap timer and hands protocol work to a fixed pool of
//! worker threads, so the reactor thread never blocks on application code.
//!
//! The crate offers:
//!
//! - A **reactor** with level- or edge-triggered readiness and one-shot
//!   connection interest, so each connection has at most one task in flight
//! - A **heap timer** evicting idle connections
//! - A **worker pool** and a **bounded queue** feeding the asynchronous log
//!   writer
//! - A pluggable [`Handler`] contract, with an HTTP/1.1 static-file
//!   implementation in [`http`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slimserve::{HttpHandler, MemoryStore, ServerBuilder};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let server = ServerBuilder::new()
//!     .port(1316)
//!     .timeout(Some(Duration::from_secs(60)))
//!     .build(HttpHandler::factory("resources", Arc::new(MemoryStore::default())))?;
//!
//! let handle = server.handle();
//! std::thread::spawn(move || {
//!     std::thread::sleep(Duration::from_secs(30));
//!     handle.shutdown();
//! });
//!
//! server.run()?;
//! # Ok::<(), slimserve::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: Credential store and pooled sessions
//! - [`config`]: TOML configuration
//! - [`http`]: HTTP/1.1 request parsing and static responses
//! - [`logging`]: `tracing` subscriber with synchronous or queued sinks
//! - [`utils`]: Byte buffer and bounded blocking queue

mod error;
mod handler;
mod reactor;
mod runtime;

pub mod auth;
pub mod config;
pub mod http;
pub mod logging;
pub mod utils;

pub use auth::{CredentialStore, MemoryStore, Verdict};
pub use config::Config;
pub use error::{Error, Result};
pub use handler::{Handler, HandlerFactory, Outcome};
pub use http::HttpHandler;
pub use runtime::{Server, ServerBuilder, ServerHandle, TriggerMode};
pub use utils::Buffer;
