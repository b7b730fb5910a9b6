//! Byte and queue containers shared by the server and the log writer.
//!
//! - [`Buffer`]: growable byte buffer with read/write cursors, used for
//!   every connection's inbound and outbound bytes.
//! - [`BoundedQueue`]: blocking, capacity-bounded deque handing log lines
//!   to the background writer thread.

mod buffer;
mod queue;

pub use buffer::Buffer;
pub use queue::{BoundedQueue, Closed, PopError};
