//! Background worker pool
//!
//! A fixed set of worker threads pulling boxed jobs from a shared queue
//! guarded by a mutex and condition variable. Used for background work such
//! as asset decoding or physics stepping; the render graph never submits
//! here, GPU work stays on the context-owning thread.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct JobQueue {
    jobs: VecDeque<Job>,
    shutting_down: bool,
}

struct Shared {
    queue: Mutex<JobQueue>,
    available: Condvar,
}

/// Fixed-size pool of worker threads.
///
/// Dropping the pool finishes queued jobs, then joins every worker.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(JobQueue {
                jobs: VecDeque::new(),
                shutting_down: false,
            }),
            available: Condvar::new(),
        });

        log::info!("starting worker pool with {num_threads} threads");
        let workers = (0..num_threads)
            .map(|index| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("worker-{index}"))
                    .spawn(move || worker_loop(&shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { shared, workers }
    }

    /// Queue a job for the workers to execute.
    pub fn push<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        if queue.shutting_down {
            log::warn!("job pushed to a shutting-down worker pool, dropping it");
            return;
        }
        queue.jobs.push_back(Box::new(job));
        drop(queue);
        self.shared.available.notify_one();
    }

    /// Number of jobs waiting for a worker.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.queue.lock().shutting_down = true;
        self.shared.available.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("worker thread panicked");
            }
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if queue.shutting_down {
                    return;
                }
                shared.available.wait(&mut queue);
            }
        };
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_all_jobs_run_before_join() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(4);
            for _ in 0..100 {
                let counter = Arc::clone(&counter);
                pool.push(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        // Drop joined the workers after draining the queue.
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_jobs_run_off_the_caller_thread() {
        let caller = std::thread::current().id();
        let saw_other_thread = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(2);
            let flag = Arc::clone(&saw_other_thread);
            pool.push(move || {
                if std::thread::current().id() != caller {
                    flag.store(1, Ordering::SeqCst);
                }
            });
        }
        assert_eq!(saw_other_thread.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_thread_request_clamped() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.worker_count(), 1);
    }
}
