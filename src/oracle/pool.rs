//! Worker pool owned by a single verification call
//!
//! Jobs run on dedicated threads so the caller can wait on a result
//! channel with a deadline. Dropping the pool closes the job queue and
//! joins every worker.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one)
    pub fn new(name: &str, size: usize) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(size.max(1));
        for id in 0..size.max(1) {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, id))
                .spawn(move || worker_loop(&receiver))?;
            workers.push(handle);
        }

        Ok(WorkerPool {
            sender: Some(sender),
            workers,
        })
    }

    /// Run `job` on the pool; the result arrives on the returned channel
    pub fn submit<F, T>(&self, job: F) -> Receiver<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        if let Some(sender) = &self.sender {
            // a closed receiver means the caller gave up waiting
            let _ = sender.send(Box::new(move || {
                let _ = tx.send(job());
            }));
        }
        rx
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue and wait for running jobs to finish
    pub fn shutdown(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("Worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: &Mutex<Receiver<Job>>) {
    loop {
        let job = match receiver.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => return,
        };
        match job {
            Ok(job) => job(),
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_jobs_return_results() {
        let pool = WorkerPool::new("test", 2).unwrap();
        let rx = pool.submit(|| 40 + 2);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_shutdown_joins_running_jobs() {
        let done = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new("test", 2).unwrap();
            for _ in 0..4 {
                let done = Arc::clone(&done);
                drop(pool.submit(move || {
                    thread::sleep(Duration::from_millis(10));
                    done.fetch_add(1, Ordering::SeqCst);
                }));
            }
        }
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_zero_size_gets_one_worker() {
        let pool = WorkerPool::new("test", 0).unwrap();
        assert_eq!(pool.size(), 1);
    }
}
