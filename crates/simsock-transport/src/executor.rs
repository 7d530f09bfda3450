use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, error};

use crate::error::{Result, TransportError};
use crate::sync::lock;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Single-threaded FIFO task runner.
///
/// Tasks may be posted from any thread; they run one at a time on a single
/// dedicated thread, strictly in the order they were posted. Every listener
/// callback in simsock runs here.
///
/// The worker runs until [`shutdown`](Self::shutdown) is called. Dropping
/// handles does not stop it: brokers keep clones inside pending accept and
/// connect callbacks, so the last handle is usually never dropped.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl Executor {
    /// Start an executor on a new thread with the given name.
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Task>();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(receiver))?;
        let worker_id = worker.thread().id();

        debug!(executor = %name, "executor started");

        Ok(Self {
            inner: Arc::new(ExecutorInner {
                name,
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(worker)),
                worker_id,
            }),
        })
    }

    /// Queue a task. Never blocks, never reorders.
    pub fn post<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = lock(&self.inner.sender);
        match sender.as_ref() {
            Some(sender) => sender
                .send(Box::new(task))
                .map_err(|_| TransportError::Shutdown),
            None => Err(TransportError::Shutdown),
        }
    }

    /// Post a task whose loss after shutdown only needs a trace.
    pub(crate) fn post_or_log<F>(&self, what: &'static str, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.post(task).is_err() {
            debug!(executor = %self.inner.name, what, "dropped task posted after shutdown");
        }
    }

    /// Whether the calling thread is this executor's worker.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.worker_id
    }

    /// Executor thread name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Stop accepting tasks, run the ones already queued, then join the worker.
    ///
    /// Called from the worker itself, this only closes the queue.
    pub fn shutdown(&self) {
        lock(&self.inner.sender).take();

        if self.is_current() {
            return;
        }

        let worker = lock(&self.inner.worker).take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!(executor = %self.inner.name, "executor thread panicked");
            }
            debug!(executor = %self.inner.name, "executor stopped");
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.inner.name)
            .finish()
    }
}

fn run(receiver: Receiver<Task>) {
    while let Ok(task) = receiver.recv() {
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("executor task panicked");
        }
    }
}
