//! Command dispatcher: the single thread allowed to call into the backend.
//!
//! Any thread can hand a unit of work to the dispatcher. Work runs in strict
//! submission order on one dedicated worker thread that owns the backend for
//! its whole life, which satisfies apartment-style thread affinity.
//!
//! * `submit` blocks the caller until the work has run and returns its result.
//! * `submit_async` enqueues and returns; failures are only logged.
//!
//! Every unit of work runs behind `catch_unwind`, so a panicking command is
//! reported to its caller as [`EngineError::CommandPanicked`] and the worker
//! keeps serving the queue.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc as std_mpsc;
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use crate::config::DispatcherConfig;
use crate::engine::backend::{AudioBackend, BackendFactory};
use crate::error::{log_engine_error, EngineError};

type Job = Box<dyn FnOnce(&mut dyn AudioBackend) + Send + 'static>;

enum WorkerMessage {
    Run { operation: &'static str, job: Job },
    /// Terminal command: everything queued before it has already run.
    Shutdown,
}

struct WorkerThread {
    handle: JoinHandle<()>,
    finished_rx: std_mpsc::Receiver<()>,
}

/// Handle to a running dispatcher thread.
pub struct Dispatcher {
    sender: Mutex<Option<mpsc::UnboundedSender<WorkerMessage>>>,
    worker: Mutex<Option<WorkerThread>>,
    thread_id: ThreadId,
    backend_name: &'static str,
    shutdown_timeout: Duration,
}

impl Dispatcher {
    /// Spawn the worker, build and initialize the backend on it, and wait
    /// for the readiness signal.
    ///
    /// # Arguments
    /// * `factory` - Builds the backend on the worker thread
    /// * `config` - Thread name and startup/shutdown timeouts
    ///
    /// # Returns
    /// The running dispatcher, or `EngineStartup` when backend construction
    /// or `initialize()` fails, panics, or does not finish within the
    /// startup timeout.
    pub fn start(factory: BackendFactory, config: &DispatcherConfig) -> Result<Self, EngineError> {
        let (sender, receiver) = mpsc::unbounded_channel::<WorkerMessage>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<&'static str, String>>(1);
        let (finished_tx, finished_rx) = std_mpsc::sync_channel::<()>(1);

        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                worker_main(factory, receiver, ready_tx);
                let _ = finished_tx.send(());
            })
            .map_err(|e| EngineError::EngineStartup {
                reason: format!("Failed to spawn dispatcher thread: {}", e),
            })?;
        let thread_id = handle.thread().id();

        let timeout = config.startup_timeout();
        match ready_rx.recv_timeout(timeout) {
            Ok(Ok(backend_name)) => {
                log::info!(
                    "[Dispatcher] Worker ready on thread {:?} with backend '{}'",
                    config.thread_name,
                    backend_name
                );
                Ok(Self {
                    sender: Mutex::new(Some(sender)),
                    worker: Mutex::new(Some(WorkerThread {
                        handle,
                        finished_rx,
                    })),
                    thread_id,
                    backend_name,
                    shutdown_timeout: config.shutdown_timeout(),
                })
            }
            Ok(Err(reason)) => {
                let _ = handle.join();
                Err(EngineError::EngineStartup { reason })
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                // The worker notices the dropped readiness receiver once
                // initialize() returns, shuts the backend down and exits.
                log::error!(
                    "[Dispatcher] Worker not ready after {} ms, abandoning it",
                    timeout.as_millis()
                );
                Err(EngineError::EngineStartup {
                    reason: format!(
                        "Backend did not become ready within {} ms",
                        timeout.as_millis()
                    ),
                })
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                Err(EngineError::EngineStartup {
                    reason: "Dispatcher thread exited during startup".to_string(),
                })
            }
        }
    }

    /// Run `work` on the dispatcher thread and wait for its result.
    ///
    /// Errors returned by `work` propagate unchanged; a panic inside it
    /// becomes `CommandPanicked`. Fails with `EngineNotStarted` once the
    /// dispatcher has been shut down.
    ///
    /// Must not be called from inside an async runtime: the reply wait is a
    /// plain blocking receive.
    pub fn submit<R, F>(&self, operation: &'static str, work: F) -> Result<R, EngineError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn AudioBackend) -> Result<R, EngineError> + Send + 'static,
    {
        // Blocking on our own queue would never return.
        if self.is_dispatcher_thread() {
            return Err(EngineError::Backend {
                code: 0,
                message: format!(
                    "{} submitted synchronously from the dispatcher thread",
                    operation
                ),
            });
        }

        let (reply_tx, reply_rx) = oneshot::channel::<Result<R, EngineError>>();
        let job: Job = Box::new(move |backend| {
            let result = match catch_unwind(AssertUnwindSafe(|| work(backend))) {
                Ok(result) => result,
                Err(payload) => Err(panicked(operation, payload)),
            };
            // Receiver gone means the caller stopped waiting; nothing to do.
            let _ = reply_tx.send(result);
        });
        self.enqueue(operation, job)?;

        reply_rx
            .blocking_recv()
            .map_err(|_| EngineError::EngineNotStarted { operation })?
    }

    /// Enqueue `work` without waiting. Failures and panics are logged.
    pub fn submit_async<F>(&self, operation: &'static str, work: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut dyn AudioBackend) -> Result<(), EngineError> + Send + 'static,
    {
        let job: Job = Box::new(move |backend| {
            let result = match catch_unwind(AssertUnwindSafe(|| work(backend))) {
                Ok(result) => result,
                Err(payload) => Err(panicked(operation, payload)),
            };
            if let Err(err) = result {
                log_engine_error(&err, operation);
            }
        });
        self.enqueue(operation, job)
    }

    fn enqueue(&self, operation: &'static str, job: Job) -> Result<(), EngineError> {
        let sender = self.lock_sender()?;
        let sender = sender
            .as_ref()
            .ok_or(EngineError::EngineNotStarted { operation })?;
        sender
            .send(WorkerMessage::Run { operation, job })
            .map_err(|_| EngineError::EngineNotStarted { operation })
    }

    /// Stop accepting work, let the worker drain its queue, and join it.
    ///
    /// Waits at most the configured shutdown timeout; a worker still busy
    /// after that is detached with a warning. Idempotent.
    pub fn shutdown(&self) {
        let sender = match self.lock_sender() {
            Ok(mut guard) => guard.take(),
            Err(err) => {
                log_engine_error(&err, "Dispatcher::shutdown");
                return;
            }
        };
        let Some(sender) = sender else {
            return;
        };
        if sender.send(WorkerMessage::Shutdown).is_err() {
            log::warn!("[Dispatcher] Worker already gone at shutdown");
        }
        drop(sender);

        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                log::error!("[Dispatcher] Worker lock poisoned during shutdown");
                return;
            }
        };
        let Some(worker) = worker else {
            return;
        };

        let started = Instant::now();
        match worker.finished_rx.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    log::error!("[Dispatcher] Worker thread panicked");
                }
                log::info!(
                    "[Dispatcher] Worker stopped after {} ms",
                    started.elapsed().as_millis()
                );
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                log::warn!(
                    "[Dispatcher] Worker did not finish within {} ms; detaching it",
                    self.shutdown_timeout.as_millis()
                );
            }
        }
    }

    /// True until `shutdown()` has been called.
    pub fn is_running(&self) -> bool {
        self.lock_sender().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Id of the worker thread that owns the backend.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    fn is_dispatcher_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn lock_sender(
        &self,
    ) -> Result<MutexGuard<'_, Option<mpsc::UnboundedSender<WorkerMessage>>>, EngineError> {
        self.sender.lock().map_err(|_| EngineError::LockPoisoned {
            component: "dispatcher sender".to_string(),
        })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("thread_id", &self.thread_id)
            .field("backend_name", &self.backend_name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_main(
    factory: BackendFactory,
    mut receiver: mpsc::UnboundedReceiver<WorkerMessage>,
    ready_tx: std_mpsc::SyncSender<Result<&'static str, String>>,
) {
    let span = tracing::info_span!("audio_dispatcher");
    let _entered = span.enter();

    let init = catch_unwind(AssertUnwindSafe(|| {
        let mut backend = factory()?;
        backend.initialize()?;
        Ok::<_, crate::error::BackendError>(backend)
    }));
    let mut backend = match init {
        Ok(Ok(backend)) => backend,
        Ok(Err(err)) => {
            log::error!("[Dispatcher] Backend initialization failed: {}", err);
            let _ = ready_tx.send(Err(format!("Backend initialization failed: {}", err)));
            return;
        }
        Err(payload) => {
            let details = panic_message(payload.as_ref());
            log::error!("[Dispatcher] Backend initialization panicked: {}", details);
            let _ = ready_tx.send(Err(format!("Backend initialization panicked: {}", details)));
            return;
        }
    };

    if ready_tx.send(Ok(backend.name())).is_err() {
        log::warn!("[Dispatcher] Startup was abandoned; releasing backend");
        if let Err(err) = backend.shutdown() {
            log::warn!("[Dispatcher] Backend shutdown failed: {}", err);
        }
        return;
    }
    drop(ready_tx);

    let mut processed: u64 = 0;
    while let Some(message) = receiver.blocking_recv() {
        match message {
            WorkerMessage::Run { operation, job } => {
                log::trace!("[Dispatcher] Running '{}'", operation);
                job(backend.as_mut());
                processed += 1;
            }
            WorkerMessage::Shutdown => break,
        }
    }
    log::debug!("[Dispatcher] Worker loop exited after {} command(s)", processed);
}

fn panicked(operation: &'static str, payload: Box<dyn Any + Send>) -> EngineError {
    let details = format!("{} panicked: {}", operation, panic_message(payload.as_ref()));
    log::error!("[Dispatcher] {}", details);
    EngineError::CommandPanicked { details }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
