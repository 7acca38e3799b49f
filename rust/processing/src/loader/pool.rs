// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-size worker pool
//!
//! A dedicated rayon pool runs the fetch and decode jobs. Slots are handed
//! out by index so the loader always knows which worker holds which
//! request; a slot is busy from `acquire` until `release`.

use std::collections::VecDeque;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{LoadError, Result};

pub struct WorkerPool {
    pool: ThreadPool,
    free: VecDeque<usize>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self> {
        let size = size.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("cadview-worker-{}", i))
            .build()
            .map_err(|e| LoadError::Pool(e.to_string()))?;
        Ok(Self {
            pool,
            free: (0..size).collect(),
            size,
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers currently holding a request
    #[inline]
    pub fn busy(&self) -> usize {
        self.size - self.free.len()
    }

    #[inline]
    pub fn has_free(&self) -> bool {
        !self.free.is_empty()
    }

    /// Take the longest-idle worker slot
    pub fn acquire(&mut self) -> Option<usize> {
        self.free.pop_front()
    }

    /// Return a slot; unknown or already free slots are ignored
    pub fn release(&mut self, worker: usize) -> bool {
        if worker >= self.size || self.free.contains(&worker) {
            return false;
        }
        self.free.push_back(worker);
        true
    }

    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        self.pool.spawn(job);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("busy", &self.busy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release() {
        let mut pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.busy(), 0);
        assert_eq!(pool.acquire(), Some(0));
        assert_eq!(pool.acquire(), Some(1));
        assert_eq!(pool.acquire(), None);
        assert_eq!(pool.busy(), 2);

        assert!(pool.release(1));
        assert!(!pool.release(1));
        assert!(!pool.release(7));
        assert_eq!(pool.busy(), 1);
        assert_eq!(pool.acquire(), Some(1));
    }

    #[test]
    fn test_spawn_runs_on_pool() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        pool.spawn(move || {
            let name = std::thread::current().name().map(str::to_string);
            tx.send(name).ok();
        });
        let name = rx.recv().unwrap();
        assert_eq!(name.as_deref(), Some("cadview-worker-0"));
    }
}
