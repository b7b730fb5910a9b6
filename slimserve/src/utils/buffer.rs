use crate::reactor::poller::platform::{sys_readv, sys_send};

use std::io;
use std::os::fd::RawFd;

/// Initial storage size of a [`Buffer`] created with [`Buffer::new`].
const INITIAL_SIZE: usize = 1024;

/// Size of the on-stack overflow area used by [`Buffer::read_fd`].
const OVERFLOW_SIZE: usize = 65536;

/// Growable byte buffer with independent read and write cursors.
///
/// The storage is split into three regions:
///
/// ```text
/// +-------------------+------------------+------------------+
/// | prependable bytes |  readable bytes  |  writable bytes  |
/// +-------------------+------------------+------------------+
/// 0      <=      read_pos     <=     write_pos     <=    capacity
/// ```
///
/// Consuming data advances `read_pos`; producing data advances `write_pos`.
/// When the buffer is fully consumed both cursors snap back to zero.
///
/// A buffer is owned by exactly one connection at a time and performs no
/// internal locking.
#[derive(Debug, Clone)]
pub struct Buffer {
    /// Backing storage; its length is the buffer capacity.
    storage: Vec<u8>,

    /// Start of the readable region.
    read_pos: usize,

    /// End of the readable region, start of the writable region.
    write_pos: usize,
}

impl Buffer {
    /// Creates an empty buffer with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_SIZE)
    }

    /// Creates an empty buffer with `capacity` writable bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Number of bytes available to read.
    pub fn readable_bytes(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Number of bytes that can be written without growing.
    pub fn writable_bytes(&self) -> usize {
        self.storage.len() - self.write_pos
    }

    /// Number of already-consumed bytes in front of the readable region.
    pub fn prependable_bytes(&self) -> usize {
        self.read_pos
    }

    /// Total size of the backing storage.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Returns `true` when there is nothing left to read.
    pub fn is_empty(&self) -> bool {
        self.readable_bytes() == 0
    }

    /// The readable region.
    pub fn peek(&self) -> &[u8] {
        &self.storage[self.read_pos..self.write_pos]
    }

    /// The writable region.
    ///
    /// Bytes written here become readable once committed with
    /// [`has_written`](Self::has_written).
    pub fn begin_write(&mut self) -> &mut [u8] {
        &mut self.storage[self.write_pos..]
    }

    /// Makes sure at least `len` bytes are writable.
    ///
    /// Existing readable bytes are shifted to the front when the consumed
    /// prefix plus the writable tail is large enough; otherwise the
    /// storage grows.
    pub fn ensure_writable(&mut self, len: usize) {
        if self.writable_bytes() < len {
            self.make_space(len);
        }
        debug_assert!(self.writable_bytes() >= len);
    }

    /// Commits `len` bytes written into [`begin_write`](Self::begin_write).
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the writable region.
    pub fn has_written(&mut self, len: usize) {
        assert!(len <= self.writable_bytes(), "has_written past capacity");
        self.write_pos += len;
        self.check();
    }

    /// Consumes `len` readable bytes.
    ///
    /// Consuming everything (or more) resets the buffer.
    pub fn retrieve(&mut self, len: usize) {
        if len < self.readable_bytes() {
            self.read_pos += len;
        } else {
            self.retrieve_all();
        }
        self.check();
    }

    /// Consumes readable bytes up to offset `end` of [`peek`](Self::peek).
    pub fn retrieve_until(&mut self, end: usize) {
        self.retrieve(end);
    }

    /// Discards all readable bytes and resets both cursors.
    pub fn retrieve_all(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Takes every readable byte as a string, then resets the buffer.
    ///
    /// Invalid UTF-8 sequences are replaced.
    pub fn retrieve_all_to_string(&mut self) -> String {
        let text = String::from_utf8_lossy(self.peek()).into_owned();
        self.retrieve_all();
        text
    }

    /// Appends raw bytes, growing as needed.
    pub fn append(&mut self, data: &[u8]) {
        self.ensure_writable(data.len());
        self.storage[self.write_pos..self.write_pos + data.len()].copy_from_slice(data);
        self.write_pos += data.len();
        self.check();
    }

    /// Appends a UTF-8 string.
    pub fn append_str(&mut self, text: &str) {
        self.append(text.as_bytes());
    }

    /// Appends the readable region of another buffer without consuming it.
    pub fn append_buffer(&mut self, other: &Buffer) {
        self.append(other.peek());
    }

    /// Finds the first occurrence of `needle` in the readable region.
    ///
    /// Returns its offset relative to [`peek`](Self::peek).
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(0);
        }

        self.peek()
            .windows(needle.len())
            .position(|window| window == needle)
    }

    /// Reads once from a non-blocking descriptor.
    ///
    /// A single `readv(2)` scatters into the writable region and a 64 KiB
    /// stack area; whatever lands in the overflow area is appended, so one
    /// call can absorb far more than the current free space.
    ///
    /// Returns the number of bytes read. `Ok(0)` signals end of stream and
    /// a drained socket surfaces as [`io::ErrorKind::WouldBlock`].
    pub fn read_fd(&mut self, fd: RawFd) -> io::Result<usize> {
        let mut overflow = [0u8; OVERFLOW_SIZE];
        let writable = self.writable_bytes();

        let n = sys_readv(fd, &mut self.storage[self.write_pos..], &mut overflow)?;

        if n <= writable {
            self.write_pos += n;
        } else {
            self.write_pos = self.storage.len();
            self.append(&overflow[..n - writable]);
        }

        self.check();
        Ok(n)
    }

    /// Sends the readable region on a non-blocking socket once.
    ///
    /// The sent bytes are consumed.
    pub fn write_fd(&mut self, fd: RawFd) -> io::Result<usize> {
        let n = sys_send(fd, self.peek())?;
        self.retrieve(n);
        Ok(n)
    }

    fn make_space(&mut self, len: usize) {
        if self.writable_bytes() + self.prependable_bytes() < len {
            self.storage.resize(self.write_pos + len, 0);
        } else {
            let readable = self.readable_bytes();
            self.storage.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = readable;
        }
    }

    #[inline]
    fn check(&self) {
        debug_assert!(self.read_pos <= self.write_pos);
        debug_assert!(self.write_pos <= self.storage.len());
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
