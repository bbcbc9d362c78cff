//! Off-dispatch-thread execution of backend work.
//!
//! Two kinds of threads run backend calls:
//!
//! - the [`WorkerPool`], a fixed set of general workers, and
//! - the [`ExclusiveThread`], the single thread allowed to mutate editor
//!   buffers. Every document mutation and every editor lookup goes through
//!   it, so a request never resolves an editor halfway through an edit.
//!
//! [`AsyncExecutor`] combines them: it resolves the request's editor on the
//! exclusive thread, then runs the work on whichever thread the command
//! asked for, threading the request's [`CancellationToken`] through.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use harbor_core::{
    BackendError, CancellationToken, ExecutorContext, LineCol, LineIndex, NormalizedPath, Project,
};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::CommandError;

type Job = Box<dyn FnOnce() + Send + 'static>;

fn run_guarded<R>(f: impl FnOnce() -> R) -> Result<R, CommandError> {
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| CommandError::Backend(BackendError::from_panic(payload)))
}

// ── Worker pool ───────────────────────────────────────────────────────

/// A fixed number of threads draining one job queue.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    closed: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> std::io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads.max(1));
        for n in 0..threads.max(1) {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("harbor-worker-{n}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        if let Err(e) = run_guarded(job) {
                            error!("worker job panicked: {e}");
                        }
                    }
                })?;
            workers.push(handle);
        }
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            closed: AtomicBool::new(false),
            workers: Mutex::new(workers),
        })
    }

    /// Queue `job`. A closed pool hands the job back.
    pub fn spawn(&self, job: Job) -> Result<(), Job> {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting jobs, let queued ones finish and join the workers.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        let current = std::thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Exclusive coordination thread ─────────────────────────────────────

/// The single thread that owns editor mutation.
pub struct ExclusiveThread {
    sender: Mutex<Option<Sender<Job>>>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ExclusiveThread {
    pub fn spawn() -> std::io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let handle = std::thread::Builder::new()
            .name("harbor-exclusive".into())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if let Err(e) = run_guarded(job) {
                        error!("exclusive job panicked: {e}");
                    }
                }
            })?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Whether the caller is running on the exclusive thread.
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Run `f` on the exclusive thread and wait for its result. Called from
    /// the exclusive thread itself, `f` runs inline.
    pub fn invoke_and_wait<R, F>(&self, f: F) -> Result<R, CommandError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return run_guarded(f);
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        let job: Job = Box::new(move || {
            let _ = tx.send(run_guarded(f));
        });
        {
            let sender = self.sender.lock();
            let sender = sender.as_ref().ok_or(CommandError::ExecutorUnavailable)?;
            sender
                .send(job)
                .map_err(|_| CommandError::ExecutorUnavailable)?;
        }
        rx.recv().map_err(|_| CommandError::ExecutorUnavailable)?
    }

    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        if self.is_current() {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ExclusiveThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Requests and results ──────────────────────────────────────────────

/// Where and how one unit of work runs.
#[derive(Clone)]
pub struct ExecutionRequest {
    pub project: Arc<dyn Project>,
    pub path: NormalizedPath,
    /// Caret position to resolve before running, if any.
    pub position: Option<LineCol>,
    /// Whether the token below reaches the backend.
    pub cancellable: bool,
    /// Run the work on the exclusive thread instead of a worker.
    pub run_on_exclusive: bool,
    /// The request's token, registered for `$/cancelRequest`.
    pub token: CancellationToken,
}

impl ExecutionRequest {
    pub fn new(project: Arc<dyn Project>, path: NormalizedPath, position: Option<LineCol>) -> Self {
        Self {
            project,
            path,
            position,
            cancellable: false,
            run_on_exclusive: true,
            token: CancellationToken::new(),
        }
    }
}

impl std::fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("path", &self.path)
            .field("position", &self.position)
            .field("cancellable", &self.cancellable)
            .field("run_on_exclusive", &self.run_on_exclusive)
            .finish()
    }
}

/// The pending result of [`AsyncExecutor::compute`].
pub struct Completion<T> {
    receiver: Receiver<Result<T, CommandError>>,
}

impl<T> Completion<T> {
    pub fn wait(self) -> Result<T, CommandError> {
        self.receiver
            .recv()
            .map_err(|_| CommandError::ExecutorUnavailable)?
    }

    /// `None` if the result is not ready within `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, CommandError>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(CommandError::ExecutorUnavailable)),
        }
    }
}

// ── Executor ──────────────────────────────────────────────────────────

/// Runs commands against freshly built [`ExecutorContext`]s.
#[derive(Clone)]
pub struct AsyncExecutor {
    pool: Arc<WorkerPool>,
    exclusive: Arc<ExclusiveThread>,
}

impl AsyncExecutor {
    pub fn new(worker_threads: usize) -> std::io::Result<Self> {
        Ok(Self {
            pool: Arc::new(WorkerPool::new(worker_threads)?),
            exclusive: Arc::new(ExclusiveThread::spawn()?),
        })
    }

    pub fn exclusive(&self) -> &Arc<ExclusiveThread> {
        &self.exclusive
    }

    /// Run `job` on a worker. A closed pool runs it on the caller's thread
    /// so completion callbacks still fire.
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        if let Err(job) = self.pool.spawn(Box::new(job)) {
            warn!("worker pool is closed; running job inline");
            job();
        }
    }

    /// Queue `work` for `request` and return a handle to its result.
    /// `Ok(None)` means nothing could be resolved for the path.
    pub fn compute<T, F>(&self, request: ExecutionRequest, work: F) -> Completion<Option<T>>
    where
        F: FnOnce(&ExecutorContext) -> Result<T, BackendError> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.compute_then(request, work, move |result| {
            let _ = tx.send(result);
        });
        Completion { receiver: rx }
    }

    /// Like [`compute`](Self::compute), handing the result to `on_complete`
    /// on the worker that produced it.
    pub fn compute_then<T, F, C>(&self, request: ExecutionRequest, work: F, on_complete: C)
    where
        F: FnOnce(&ExecutorContext) -> Result<T, BackendError> + Send + 'static,
        T: Send + 'static,
        C: FnOnce(Result<Option<T>, CommandError>) + Send + 'static,
    {
        let executor = self.clone();
        self.spawn(move || on_complete(executor.run(request, work)));
    }

    fn run<T, F>(&self, request: ExecutionRequest, work: F) -> Result<Option<T>, CommandError>
    where
        F: FnOnce(&ExecutorContext) -> Result<T, BackendError> + Send + 'static,
        T: Send + 'static,
    {
        if self.pool.is_closed() {
            return Err(CommandError::ExecutorUnavailable);
        }
        if request.token.is_cancelled() {
            return Err(CommandError::Cancelled);
        }
        let started = Instant::now();
        let cancel = if request.cancellable {
            request.token.clone()
        } else {
            CancellationToken::new()
        };

        let project = Arc::clone(&request.project);
        let path = request.path.clone();
        let position = request.position;
        let resolved = self.exclusive.invoke_and_wait(move || {
            let editor = project.open_editor(&path)?;
            let text = editor.text();
            let caret = match position {
                Some(pos) => LineIndex::new(&text).offset_of(&text, pos),
                None => editor.caret(),
            };
            editor.move_caret(caret);
            Some((editor, caret))
        })?;
        let Some((editor, caret)) = resolved else {
            debug!("nothing to resolve for {}", request.path);
            return Ok(None);
        };

        let ctx = ExecutorContext {
            path: request.path.clone(),
            editor,
            caret,
            cancel: cancel.clone(),
        };
        let outcome = if request.run_on_exclusive {
            self.exclusive.invoke_and_wait(move || work(&ctx))?
        } else {
            run_guarded(|| work(&ctx))?
        };
        let value = outcome?;
        if request.cancellable && cancel.is_cancelled() {
            debug!("late cancellation for {}", request.path);
            return Err(CommandError::Cancelled);
        }
        debug!(
            path = %request.path,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "command finished"
        );
        Ok(Some(value))
    }

    /// Stop both thread kinds. Queued work finishes first.
    pub fn shutdown(&self) {
        self.pool.shutdown();
        self.exclusive.shutdown();
    }
}
