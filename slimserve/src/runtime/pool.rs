use crate::error::{Error, Result};

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// A unit of work executed by the pool.
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    tasks: VecDeque<Task>,
    closed: bool,
}

/// State shared between the pool handle and its worker threads.
struct Shared {
    /// Pending tasks and the closed flag, guarded together.
    queue: Mutex<Queue>,

    /// Condition variable used to wake idle workers.
    condvar: Condvar,
}

/// Fixed-size pool of worker threads.
///
/// Tasks are pulled in FIFO order from one shared queue. Closing the pool
/// lets workers drain everything already submitted before they exit;
/// tasks submitted afterwards are rejected.
///
/// A panicking task is caught and logged, so the pool never loses a
/// worker.
pub(crate) struct WorkerPool {
    shared: Arc<Shared>,

    /// Join handles for worker threads, emptied by [`close`](Self::close).
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `threads` workers.
    ///
    /// # Arguments
    ///
    /// * `threads` - Number of worker threads
    ///
    /// # Panics
    ///
    /// Panics if `threads == 0`.
    pub(crate) fn new(threads: usize) -> Result<Self> {
        assert!(threads > 0, "worker_threads must be > 0");

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
                closed: false,
            }),
            condvar: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(threads);

        for id in 0..threads {
            let worker = shared.clone();

            let spawned = thread::Builder::new()
                .name(format!("slimserve-worker-{id}"))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shared.queue.lock().closed = true;
                    shared.condvar.notify_all();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(Error::Io(e));
                }
            }
        }

        Ok(Self {
            shared,
            handles: Mutex::new(handles),
        })
    }

    /// Queues a task and wakes one idle worker.
    ///
    /// Fails with [`Error::PoolClosed`] once the pool has been closed.
    pub(crate) fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut queue = self.shared.queue.lock();
            if queue.closed {
                return Err(Error::PoolClosed);
            }
            queue.tasks.push_back(Box::new(task));
        }

        self.shared.condvar.notify_one();
        Ok(())
    }

    /// Number of worker threads still attached to the pool.
    pub(crate) fn threads(&self) -> usize {
        self.handles.lock().len()
    }

    /// Stops accepting tasks, drains the queue and joins every worker.
    ///
    /// Calling `close` more than once is harmless.
    pub(crate) fn close(&self) {
        self.shared.queue.lock().closed = true;
        self.shared.condvar.notify_all();

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Shared {
    fn run(&self) {
        loop {
            let task = {
                let mut queue = self.queue.lock();
                loop {
                    if let Some(task) = queue.tasks.pop_front() {
                        break Some(task);
                    }
                    if queue.closed {
                        break None;
                    }
                    self.condvar.wait(&mut queue);
                }
            };

            let Some(task) = task else {
                debug!(thread = ?thread::current().name(), "worker exiting");
                return;
            };

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(%reason, "worker task panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_runs_every_task_once() {
        let pool = WorkerPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..1000 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.close();
        assert_eq!(counter.load(Ordering::SeqCst), 1000);
    }

    #[test]
    fn test_single_worker_preserves_fifo() {
        let pool = WorkerPool::new(1).unwrap();
        let order = Arc::new(StdMutex::new(Vec::new()));

        for i in 0..20 {
            let order = order.clone();
            pool.submit(move || order.lock().unwrap().push(i)).unwrap();
        }

        pool.close();
        assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_close_drains_pending_tasks() {
        let pool = WorkerPool::new(1).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let done = done.clone();
            pool.submit(move || {
                std::thread::sleep(Duration::from_millis(5));
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.close();
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(pool.threads(), 0);
    }

    #[test]
    fn test_submit_after_close_is_rejected() {
        let pool = WorkerPool::new(2).unwrap();
        pool.close();

        assert!(matches!(pool.submit(|| {}), Err(Error::PoolClosed)));
        pool.close();
    }

    #[test]
    fn test_panicking_task_keeps_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let ran = Arc::new(AtomicBool::new(false));

        pool.submit(|| panic!("boom")).unwrap();

        let flag = ran.clone();
        pool.submit(move || flag.store(true, Ordering::SeqCst)).unwrap();

        pool.close();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    #[should_panic(expected = "worker_threads must be > 0")]
    fn test_zero_threads_panics() {
        let _ = WorkerPool::new(0);
    }
}
