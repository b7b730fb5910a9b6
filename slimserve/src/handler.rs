//! Protocol handler contract.
//!
//! The reactor is protocol-agnostic: every connection owns one [`Handler`]
//! that turns buffered input into a response. The handler runs on a worker
//! thread and is never invoked concurrently for the same connection.

use crate::utils::Buffer;

use bytes::Bytes;
use std::net::SocketAddr;

/// Result of one [`Handler::handle`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// More input is needed before a response can be produced.
    Incomplete,

    /// A response is ready.
    ///
    /// The head has been appended to the output buffer; `body` is sent
    /// after it as the second scatter-gather segment.
    Response {
        /// Payload written after the output buffer.
        body: Bytes,

        /// Whether the connection stays open once the response is sent.
        keep_alive: bool,
    },
}

/// Per-connection protocol state machine.
///
/// `handle` consumes whatever it can from `input` and appends the response
/// head to `output`. It is called again on the same connection for every
/// request of a keep-alive pipeline.
pub trait Handler: Send + 'static {
    fn handle(&mut self, input: &mut Buffer, output: &mut Buffer) -> Outcome;
}

/// Builds the handler for a newly accepted client.
pub trait HandlerFactory<H>: Fn(SocketAddr) -> H + Send + Sync + 'static {}

impl<H, F> HandlerFactory<H> for F where F: Fn(SocketAddr) -> H + Send + Sync + 'static {}
