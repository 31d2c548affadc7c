//! Thread fixtures for confinement and handoff tests.
//!
//! - [`foreign_thread_id`] returns the id of a thread that is not the caller.
//! - [`Worker`] is a thread that runs closures sent to it, so a test can
//!   hand values to a known thread id and act on them there.

use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{unbounded, Sender};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// The id of a freshly spawned (and already exited) thread.
pub fn foreign_thread_id() -> ThreadId {
    thread::spawn(|| thread::current().id())
        .join()
        .expect("id counter thread panicked")
}

/// Run `f` on a new thread and return its result.
pub fn on_other_thread<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::spawn(f).join().expect("worker thread panicked")
}

/// A long-lived thread that executes jobs in submission order.
pub struct Worker {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    id: ThreadId,
}

impl Worker {
    pub fn spawn() -> Self {
        let (jobs, rx) = unbounded::<Job>();
        let handle = thread::spawn(move || {
            for job in rx {
                job();
            }
        });
        let id = handle.thread().id();
        Self {
            jobs: Some(jobs),
            handle: Some(handle),
            id,
        }
    }

    /// The worker's thread id.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Run `f` on the worker and wait for its result.
    pub fn run<T, F>(&self, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.jobs
            .as_ref()
            .expect("worker already shut down")
            .send(Box::new(move || {
                let _ = tx.send(f());
            }))
            .expect("worker thread exited");
        rx.recv().expect("worker job panicked")
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        drop(self.jobs.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
