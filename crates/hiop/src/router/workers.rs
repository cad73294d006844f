// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-size worker pool for inbound request dispatch.
//!
//! Each worker owns one [`ThreadToken`] for its whole lifetime, so
//! thread-scope slots written while handling one request are visible to the
//! next request handled on the same worker. Jobs are closures queued over a
//! crossbeam channel; dropping the pool closes the queue and joins the
//! workers.

use crate::current::{CurrentManager, ThreadToken};
use crossbeam::channel::{unbounded, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

pub(crate) type Job = Box<dyn FnOnce(ThreadToken) + Send>;

pub(crate) struct WorkerPool {
    queue: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(workers: usize, current: &Arc<CurrentManager>) -> Self {
        let (tx, rx) = unbounded::<Job>();
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers.max(1) {
            let rx = rx.clone();
            let token = current.allocate_token();
            let handle = std::thread::Builder::new()
                .name(format!("hiop-worker-{i}"))
                .spawn(move || {
                    for job in rx.iter() {
                        job(token);
                    }
                })
                .expect("spawn worker thread");
            handles.push(handle);
        }
        Self {
            queue: Some(tx),
            handles,
        }
    }

    /// Queue a job; runs on some worker with that worker's token.
    pub fn submit(&self, job: Job) {
        if let Some(queue) = &self.queue {
            // Send only fails once the pool is shut down.
            if queue.send(job).is_err() {
                log::warn!("worker pool is shut down, dropping job");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.queue.take());
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_jobs_run_and_pool_joins_on_drop() {
        let current = Arc::new(CurrentManager::new());
        let pool = WorkerPool::new(2, &current);
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let ran = ran.clone();
            pool.submit(Box::new(move |_token| {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        drop(pool);
        assert_eq!(ran.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_each_worker_keeps_its_token() {
        let current = Arc::new(CurrentManager::new());
        let pool = WorkerPool::new(1, &current);
        let tokens = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for _ in 0..3 {
            let tokens = tokens.clone();
            pool.submit(Box::new(move |token| {
                tokens.lock().push(token);
            }));
        }
        drop(pool);
        let tokens = tokens.lock();
        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(|t| *t == tokens[0]));
    }
}
