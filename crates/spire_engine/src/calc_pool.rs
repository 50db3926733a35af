//! Bounded worker pool for per-row join work.
//!
//! At most `workers` tasks run at once. `run` is a full barrier: it returns
//! after every task finished, with results in task order regardless of which
//! worker ran what.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use spire_common::SpireError;

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct CalcPool {
    workers: usize,
}

impl Default for CalcPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl CalcPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `task(i)` for `i in 0..n`.
    pub fn run<T, F>(&self, n: usize, task: F) -> Result<Vec<T>, SpireError>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        let threads = self.workers.min(n);
        if threads <= 1 {
            return Ok((0..n).map(task).collect());
        }

        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<T>>> = Mutex::new((0..n).map(|_| None).collect());
        let panicked = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        if i >= n {
                            break;
                        }
                        let out = task(i);
                        slots.lock()[i] = Some(out);
                    })
                })
                .collect();
            handles.into_iter().any(|h| h.join().is_err())
        });
        if panicked {
            return Err(SpireError::internal_bug(
                "E-CALCPOOL-001",
                "calc pool worker panicked",
                format!("workers={threads}, tasks={n}"),
            ));
        }

        slots
            .into_inner()
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| {
                    SpireError::internal_bug(
                        "E-CALCPOOL-002",
                        "calc pool task produced no result",
                        format!("task={i}, tasks={n}"),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_in_task_order() {
        let pool = CalcPool::new(4);
        let out = pool.run(100, |i| i * 2).unwrap();
        assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let pool = CalcPool::new(3);
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        pool.run(50, |_| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(1));
            running.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_small_batches_run_inline() {
        let pool = CalcPool::default();
        assert_eq!(pool.workers(), 4);
        let caller = std::thread::current().id();
        let ids = pool.run(1, |_| std::thread::current().id()).unwrap();
        assert_eq!(ids, vec![caller]);
        assert!(pool.run(0, |i| i).unwrap().is_empty());
    }
}
