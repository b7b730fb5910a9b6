//! Idle-connection timer.
//!
//! A binary min-heap of deadlines stored in a dense `Vec`, plus a side
//! index from id to heap position so that any entry can be refreshed or
//! removed in `O(log n)`. Removal swaps the victim with the last slot,
//! pops it and re-sifts whatever landed in its place.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Callback run when a timer entry expires.
pub(crate) type OnExpire = Box<dyn FnOnce() + Send>;

/// A scheduled deadline and the callback to run when it passes.
struct TimerNode<K> {
    id: K,
    deadline: Instant,
    on_expire: OnExpire,
}

/// Indexed min-heap of per-id deadlines.
///
/// Invariants, re-established after every mutation:
/// - every non-root node's deadline is at least its parent's,
/// - `index[heap[i].id] == i` for every position `i`, and the index holds
///   no other keys.
pub(crate) struct HeapTimer<K> {
    heap: Vec<TimerNode<K>>,
    index: HashMap<K, usize>,
}

impl<K> HeapTimer<K>
where
    K: Copy + Eq + Hash,
{
    pub(crate) fn new() -> Self {
        Self {
            heap: Vec::with_capacity(64),
            index: HashMap::new(),
        }
    }

    /// Number of pending entries.
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: K) -> bool {
        self.index.contains_key(&id)
    }

    /// Schedules `on_expire` to run `timeout` from now.
    ///
    /// An id that is already scheduled gets its deadline and callback
    /// replaced; the previous callback is dropped without running.
    pub(crate) fn add(&mut self, id: K, timeout: Duration, on_expire: OnExpire) {
        let deadline = Instant::now() + timeout;

        match self.index.get(&id).copied() {
            Some(i) => {
                self.heap[i].on_expire = on_expire;
                self.reschedule(i, deadline);
            }
            None => {
                let i = self.heap.len();
                self.index.insert(id, i);
                self.heap.push(TimerNode {
                    id,
                    deadline,
                    on_expire,
                });
                self.sift_up(i);
            }
        }
    }

    /// Pushes an existing entry's deadline to `timeout` from now.
    ///
    /// Unknown ids are ignored.
    pub(crate) fn adjust(&mut self, id: K, timeout: Duration) {
        if let Some(i) = self.index.get(&id).copied() {
            self.reschedule(i, Instant::now() + timeout);
        }
    }

    /// Removes an entry and runs its callback immediately.
    ///
    /// Returns `false` if the id was not scheduled.
    pub(crate) fn expire(&mut self, id: K) -> bool {
        match self.index.get(&id).copied() {
            Some(i) => {
                let node = self.remove(i);
                (node.on_expire)();
                true
            }
            None => false,
        }
    }

    /// Removes an entry without running its callback.
    ///
    /// Returns `false` if the id was not scheduled.
    pub(crate) fn cancel(&mut self, id: K) -> bool {
        match self.index.get(&id).copied() {
            Some(i) => {
                drop(self.remove(i));
                true
            }
            None => false,
        }
    }

    /// Runs the callback of every entry whose deadline has passed.
    ///
    /// Returns the number of callbacks run.
    pub(crate) fn tick(&mut self) -> usize {
        let now = Instant::now();
        let mut fired = 0;

        while let Some(root) = self.heap.first() {
            if root.deadline > now {
                break;
            }

            let node = self.remove(0);
            (node.on_expire)();
            fired += 1;
        }

        fired
    }

    /// Expires overdue entries, then returns the delay until the next one.
    ///
    /// `None` means nothing is scheduled and the caller may block
    /// indefinitely.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        self.tick();

        self.heap
            .first()
            .map(|root| root.deadline.saturating_duration_since(Instant::now()))
    }

    /// Drops every entry without running callbacks.
    pub(crate) fn clear(&mut self) {
        self.heap.clear();
        self.index.clear();
    }

    fn reschedule(&mut self, i: usize, deadline: Instant) {
        let previous = self.heap[i].deadline;
        self.heap[i].deadline = deadline;

        if deadline < previous {
            self.sift_up(i);
        } else if deadline > previous {
            self.sift_down(i);
        }
    }

    fn remove(&mut self, i: usize) -> TimerNode<K> {
        let node = self.heap.swap_remove(i);
        self.index.remove(&node.id);

        if i < self.heap.len() {
            self.index.insert(self.heap[i].id, i);
            if !self.sift_down(i) {
                self.sift_up(i);
            }
        }

        node
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].deadline <= self.heap[i].deadline {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    /// Returns `true` if the node moved.
    fn sift_down(&mut self, start: usize) -> bool {
        let len = self.heap.len();
        let mut i = start;

        loop {
            let mut child = 2 * i + 1;
            if child >= len {
                break;
            }
            if child + 1 < len && self.heap[child + 1].deadline < self.heap[child].deadline {
                child += 1;
            }
            if self.heap[i].deadline <= self.heap[child].deadline {
                break;
            }
            self.swap(i, child);
            i = child;
        }

        i > start
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.index.insert(self.heap[a].id, a);
        self.index.insert(self.heap[b].id, b);
    }
}

impl<K> Default for HeapTimer<K>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    impl<K: Copy + Eq + Hash + std::fmt::Debug> HeapTimer<K> {
        fn assert_invariants(&self) {
            assert_eq!(self.heap.len(), self.index.len());

            for (i, node) in self.heap.iter().enumerate() {
                assert_eq!(self.index.get(&node.id), Some(&i));
                if i > 0 {
                    assert!(self.heap[(i - 1) / 2].deadline <= node.deadline);
                }
            }
        }
    }

    fn noop() -> OnExpire {
        Box::new(|| {})
    }

    fn recorder(log: &Arc<Mutex<Vec<u32>>>, id: u32) -> OnExpire {
        let log = log.clone();
        Box::new(move || log.lock().unwrap().push(id))
    }

    #[test]
    fn test_tick_fires_in_deadline_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut timer = HeapTimer::new();

        timer.add(3, Duration::from_millis(3), recorder(&log, 3));
        timer.add(1, Duration::from_millis(1), recorder(&log, 1));
        timer.add(2, Duration::from_millis(2), recorder(&log, 2));
        timer.add(9, Duration::from_secs(60), recorder(&log, 9));

        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(timer.tick(), 3);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(timer.len(), 1);
        assert!(timer.contains(9));
    }

    #[test]
    fn test_add_existing_replaces_callback() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut timer = HeapTimer::new();

        timer.add(1, Duration::from_secs(60), recorder(&log, 100));
        timer.add(1, Duration::ZERO, recorder(&log, 200));

        assert_eq!(timer.len(), 1);
        assert_eq!(timer.tick(), 1);
        assert_eq!(*log.lock().unwrap(), vec![200]);
    }

    #[test]
    fn test_adjust_postpones_expiry() {
        let mut timer = HeapTimer::new();
        timer.add(1, Duration::ZERO, noop());
        timer.add(2, Duration::ZERO, noop());

        timer.adjust(1, Duration::from_secs(60));
        timer.assert_invariants();

        assert_eq!(timer.tick(), 1);
        assert!(timer.contains(1));
        assert!(!timer.contains(2));
    }

    #[test]
    fn test_adjust_unknown_is_noop() {
        let mut timer: HeapTimer<u32> = HeapTimer::new();
        timer.adjust(42, Duration::from_secs(1));

        assert!(timer.is_empty());
        assert!(timer.next_delay().is_none());
    }

    #[test]
    fn test_expire_runs_callback_regardless_of_deadline() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = HeapTimer::new();
        let counter = fired.clone();
        timer.add(
            7,
            Duration::from_secs(3600),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(timer.expire(7));
        assert!(!timer.expire(7));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(timer.is_empty());
    }

    #[test]
    fn test_cancel_skips_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = HeapTimer::new();
        let counter = fired.clone();
        timer.add(
            7,
            Duration::ZERO,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(timer.cancel(7));
        assert!(!timer.cancel(7));
        assert_eq!(timer.tick(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_next_delay_expires_overdue_first() {
        let mut timer = HeapTimer::new();
        timer.add(1, Duration::ZERO, noop());
        timer.add(2, Duration::from_secs(5), noop());

        let delay = timer.next_delay().unwrap();

        assert!(!timer.contains(1));
        assert!(delay <= Duration::from_secs(5));
        assert!(delay > Duration::from_secs(4));
    }

    #[test]
    fn test_remove_last_position() {
        let mut timer = HeapTimer::new();
        timer.add(1, Duration::from_secs(1), noop());
        timer.add(2, Duration::from_secs(2), noop());

        assert!(timer.cancel(2));
        timer.assert_invariants();
        assert!(timer.contains(1));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8, u16),
        Adjust(u8, u16),
        Expire(u8),
        Cancel(u8),
        Tick,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0u8..32, 0u16..500).prop_map(|(id, ms)| Op::Add(id, ms)),
            2 => (0u8..32, 0u16..500).prop_map(|(id, ms)| Op::Adjust(id, ms)),
            1 => (0u8..32).prop_map(Op::Expire),
            1 => (0u8..32).prop_map(Op::Cancel),
            1 => Just(Op::Tick),
        ]
    }

    proptest! {
        #[test]
        fn prop_heap_and_index_stay_consistent(ops in prop::collection::vec(op(), 1..200)) {
            let mut timer = HeapTimer::new();
            let fired = Arc::new(AtomicUsize::new(0));

            for op in ops {
                match op {
                    Op::Add(id, ms) => {
                        let fired = fired.clone();
                        timer.add(id, Duration::from_millis(ms.into()), Box::new(move || {
                            fired.fetch_add(1, Ordering::SeqCst);
                        }));
                        prop_assert!(timer.contains(id));
                    }
                    Op::Adjust(id, ms) => timer.adjust(id, Duration::from_millis(ms.into())),
                    Op::Expire(id) => {
                        let known = timer.contains(id);
                        let before = fired.load(Ordering::SeqCst);
                        prop_assert_eq!(timer.expire(id), known);
                        prop_assert_eq!(fired.load(Ordering::SeqCst), before + usize::from(known));
                    }
                    Op::Cancel(id) => {
                        timer.cancel(id);
                        prop_assert!(!timer.contains(id));
                    }
                    Op::Tick => {
                        timer.tick();
                    }
                }

                timer.assert_invariants();
            }

            let before = Instant::now();
            if let Some(delay) = timer.next_delay() {
                prop_assert!(delay <= Duration::from_millis(500));
            }
            for node in &timer.heap {
                prop_assert!(node.deadline > before);
            }
            timer.assert_invariants();
        }
    }
}
