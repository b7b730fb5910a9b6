use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Returned by a push on a closed queue; hands the rejected item back.
#[derive(Debug, PartialEq, Eq)]
pub struct Closed<T>(pub T);

impl<T> fmt::Display for Closed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is closed")
    }
}

/// Reason a timed pop returned without an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// The timeout elapsed while the queue stayed empty.
    Timeout,

    /// The queue was closed.
    Closed,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Thread-safe, capacity-bounded deque with blocking push and pop.
///
/// Producers block while the queue is full; consumers block while it is
/// empty. Closing the queue discards pending items and releases every
/// blocked caller: pushes fail with [`Closed`] and pops return `None`.
///
/// Used to hand formatted log lines to the background log writer.
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    capacity: usize,

    /// Signalled when an item becomes available (or on close).
    consumer: Condvar,

    /// Signalled when a slot frees up (or on close).
    producer: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be > 0");

        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            consumer: Condvar::new(),
            producer: Condvar::new(),
        }
    }

    /// Appends an item, blocking while the queue is full.
    pub fn push_back(&self, item: T) -> Result<(), Closed<T>> {
        self.push(item, VecDeque::push_back)
    }

    /// Prepends an item, blocking while the queue is full.
    pub fn push_front(&self, item: T) -> Result<(), Closed<T>> {
        self.push(item, VecDeque::push_front)
    }

    fn push(&self, item: T, insert: fn(&mut VecDeque<T>, T)) -> Result<(), Closed<T>> {
        let mut state = self.state.lock();

        while state.items.len() >= self.capacity && !state.closed {
            self.producer.wait(&mut state);
        }

        if state.closed {
            return Err(Closed(item));
        }

        insert(&mut state.items, item);
        drop(state);

        self.consumer.notify_one();
        Ok(())
    }

    /// Removes the front item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed.
    pub fn pop_front(&self) -> Option<T> {
        let mut state = self.state.lock();

        while state.items.is_empty() && !state.closed {
            self.consumer.wait(&mut state);
        }

        let item = state.items.pop_front()?;
        let now_empty = state.items.is_empty();
        drop(state);

        self.notify_producers(now_empty);
        Some(item)
    }

    /// Removes the front item, waiting at most `timeout` for one to arrive.
    pub fn pop_front_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        while state.items.is_empty() {
            if state.closed {
                return Err(PopError::Closed);
            }
            if self.consumer.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }

        if state.closed {
            return Err(PopError::Closed);
        }

        let item = state.items.pop_front().ok_or(PopError::Timeout)?;
        let now_empty = state.items.is_empty();
        drop(state);

        self.notify_producers(now_empty);
        Ok(item)
    }

    // Waiters in `wait_until_empty` share the producer condvar, so the
    // last removal wakes everyone.
    fn notify_producers(&self, now_empty: bool) {
        if now_empty {
            self.producer.notify_all();
        } else {
            self.producer.notify_one();
        }
    }

    /// Closes the queue, discarding pending items and waking all waiters.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            state.items.clear();
            state.closed = true;
        }

        self.consumer.notify_all();
        self.producer.notify_all();
    }

    /// Wakes one consumer without changing the contents.
    pub fn flush(&self) {
        self.consumer.notify_one();
    }

    /// Drops every pending item.
    pub fn clear(&self) {
        self.state.lock().items.clear();
        self.producer.notify_all();
    }

    /// Blocks until every pending item has been popped or the queue closes.
    pub fn wait_until_empty(&self) {
        let mut state = self.state.lock();

        while !state.items.is_empty() && !state.closed {
            self.producer.wait(&mut state);
        }
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns `true` when no item is pending.
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Returns `true` when a push would block.
    pub fn is_full(&self) -> bool {
        self.state.lock().items.len() >= self.capacity
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Maximum number of pending items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(4);
        queue.push_back(1).unwrap();
        queue.push_back(2).unwrap();
        queue.push_front(0).unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop_front(), Some(0));
        assert_eq!(queue.pop_front(), Some(1));
        assert_eq!(queue.pop_front(), Some(2));
        assert!(queue.is_empty());
    }

    #[test]
    #[should_panic(expected = "queue capacity must be > 0")]
    fn test_zero_capacity_panics() {
        let _ = BoundedQueue::<u8>::new(0);
    }

    #[test]
    fn test_push_blocks_while_full() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push_back("a").unwrap();
        assert!(queue.is_full());

        let pushed = Arc::new(AtomicBool::new(false));
        let producer = {
            let queue = queue.clone();
            let pushed = pushed.clone();
            thread::spawn(move || {
                queue.push_back("b").unwrap();
                pushed.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!pushed.load(Ordering::SeqCst));
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.pop_front(), Some("a"));
        producer.join().unwrap();

        assert!(pushed.load(Ordering::SeqCst));
        assert_eq!(queue.pop_front(), Some("b"));
    }

    #[test]
    fn test_close_discards_and_rejects() {
        let queue = BoundedQueue::new(4);
        queue.push_back(1).unwrap();
        queue.push_back(2).unwrap();

        queue.close();

        assert!(queue.is_closed());
        assert!(queue.is_empty());
        assert_eq!(queue.push_back(3), Err(Closed(3)));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn test_close_releases_blocked_consumer() {
        let queue = Arc::new(BoundedQueue::<u32>::new(2));

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop_front())
        };

        thread::sleep(Duration::from_millis(30));
        queue.close();

        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_close_releases_blocked_producer() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push_back(1).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push_back(2))
        };

        thread::sleep(Duration::from_millis(30));
        queue.close();

        assert_eq!(producer.join().unwrap(), Err(Closed(2)));
    }

    #[test]
    fn test_pop_timeout() {
        let queue = BoundedQueue::<u8>::new(1);

        assert_eq!(
            queue.pop_front_timeout(Duration::from_millis(20)),
            Err(PopError::Timeout)
        );

        queue.push_back(7).unwrap();
        assert_eq!(queue.pop_front_timeout(Duration::from_millis(20)), Ok(7));

        queue.close();
        assert_eq!(
            queue.pop_front_timeout(Duration::from_millis(20)),
            Err(PopError::Closed)
        );
    }

    #[test]
    fn test_wait_until_empty() {
        let queue = Arc::new(BoundedQueue::new(8));
        for i in 0..5 {
            queue.push_back(i).unwrap();
        }

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(item) = queue.pop_front() {
                    seen.push(item);
                }
                seen
            })
        };

        queue.wait_until_empty();
        assert!(queue.is_empty());

        queue.close();
        assert_eq!(consumer.join().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_many_producers_single_consumer() {
        let queue = Arc::new(BoundedQueue::new(3));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        queue.push_back(p * 100 + i).unwrap();
                    }
                })
            })
            .collect();

        let mut received = Vec::new();
        while received.len() < 200 {
            assert!(queue.len() <= queue.capacity());
            received.extend(queue.pop_front());
        }

        for producer in producers {
            producer.join().unwrap();
        }

        received.sort_unstable();
        let expected: Vec<_> = (0..4).flat_map(|p| (0..50).map(move |i| p * 100 + i)).collect();
        assert_eq!(received, expected);
    }
}
