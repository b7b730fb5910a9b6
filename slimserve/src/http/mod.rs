//! HTTP/1.1 static-file handler.
//!
//! Plugs into the reactor as a [`Handler`](crate::Handler):
//! requests are parsed out of the connection's read buffer, the response
//! head goes to its write buffer and the file contents become the body
//! segment.

mod handler;
mod request;
mod response;

pub use handler::HttpHandler;
pub use request::{Parse, Request, parse, parse_urlencoded};
pub use response::{Status, content_type, render};
