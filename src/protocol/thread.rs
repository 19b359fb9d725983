use std::{
    sync::{Arc, Mutex, PoisonError, mpsc},
    thread,
};

use log::{debug, warn};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of worker threads, each serving one connection at a time.
#[derive(Debug)]
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::Sender<Job>>,
}

impl ThreadPool {
    /// Spawns `size` workers; at least one is always started.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let mut workers = Vec::with_capacity(size);
        let (sender, receiver) = mpsc::channel();

        let receiver = Arc::new(Mutex::new(receiver));
        let sender = Some(sender);

        for i in 0..size {
            workers.push(Worker::new(i, Arc::clone(&receiver)));
        }

        Self { workers, sender }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job = Box::new(f);
        let sent = match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        };
        if !sent {
            warn!("thread pool is shut down, dropping job");
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        drop(self.sender.take());

        for worker in self.workers.drain(..) {
            debug!("shutting down worker {}", worker.id);

            if worker.thread.join().is_err() {
                warn!("worker {} panicked", worker.id);
            }
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> Self {
        let thread = thread::spawn(move || {
            loop {
                let msg = receiver
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .recv();
                match msg {
                    Ok(job) => {
                        debug!("worker {id} handling a connection");
                        job();
                    }
                    Err(_) => {
                        debug!("worker {id} disconnected");
                        break;
                    }
                }
            }
        });

        Self { id, thread }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn runs_every_job_before_shutdown() {
        let done = Arc::new(AtomicUsize::new(0));
        {
            let pool = ThreadPool::new(3);
            for _ in 0..10 {
                let done = Arc::clone(&done);
                pool.execute(move || {
                    done.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn zero_size_pool_still_has_a_worker() {
        assert_eq!(ThreadPool::new(0).size(), 1);
    }
}
