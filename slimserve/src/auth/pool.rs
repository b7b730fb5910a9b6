use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

/// Fixed set of reusable sessions.
///
/// [`acquire`](Self::acquire) blocks until a session is free and returns a
/// guard that puts it back when dropped, on every exit path.
pub struct SessionPool<T> {
    idle: Mutex<VecDeque<T>>,
    available: Condvar,
    size: usize,
}

impl<T> SessionPool<T> {
    /// Builds a pool owning `sessions`.
    ///
    /// # Panics
    ///
    /// Panics if `sessions` is empty.
    pub fn new(sessions: impl IntoIterator<Item = T>) -> Self {
        let idle: VecDeque<T> = sessions.into_iter().collect();
        assert!(!idle.is_empty(), "session pool must not be empty");

        Self {
            size: idle.len(),
            idle: Mutex::new(idle),
            available: Condvar::new(),
        }
    }

    /// Takes a session, waiting for one to be returned if all are in use.
    pub fn acquire(&self) -> Pooled<'_, T> {
        let mut idle = self.idle.lock();

        loop {
            if let Some(session) = idle.pop_front() {
                return Pooled {
                    pool: self,
                    session: Some(session),
                };
            }
            self.available.wait(&mut idle);
        }
    }

    /// Takes a session only if one is free right now.
    pub fn try_acquire(&self) -> Option<Pooled<'_, T>> {
        let session = self.idle.lock().pop_front()?;

        Some(Pooled {
            pool: self,
            session: Some(session),
        })
    }

    /// Number of sessions currently free.
    pub fn available(&self) -> usize {
        self.idle.lock().len()
    }

    /// Total number of sessions owned by the pool.
    pub fn size(&self) -> usize {
        self.size
    }

    fn release(&self, session: T) {
        self.idle.lock().push_back(session);
        self.available.notify_one();
    }
}

/// A session borrowed from a [`SessionPool`].
pub struct Pooled<'a, T> {
    pool: &'a SessionPool<T>,
    session: Option<T>,
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.session {
            Some(session) => session,
            None => unreachable!("session taken before drop"),
        }
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.session {
            Some(session) => session,
            None => unreachable!("session taken before drop"),
        }
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guard_returns_session_on_drop() {
        let pool = SessionPool::new([1, 2]);

        {
            let a = pool.acquire();
            let b = pool.acquire();
            assert_eq!(*a + *b, 3);
            assert_eq!(pool.available(), 0);
            assert!(pool.try_acquire().is_none());
        }

        assert_eq!(pool.available(), 2);
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_guard_returns_session_on_panic() {
        let pool = SessionPool::new(["only"]);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _session = pool.acquire();
            panic!("query failed");
        }));

        assert!(result.is_err());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let pool = Arc::new(SessionPool::new([0u32]));
        let held = pool.acquire();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut session = pool.acquire();
                *session += 1;
            })
        };

        thread::sleep(Duration::from_millis(30));
        assert!(!waiter.is_finished());

        drop(held);
        waiter.join().unwrap();

        assert_eq!(*pool.acquire(), 1);
    }

    #[test]
    #[should_panic(expected = "session pool must not be empty")]
    fn test_empty_pool_panics() {
        let _ = SessionPool::<u8>::new([]);
    }
}
