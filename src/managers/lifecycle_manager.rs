// EngineLifecycleManager: Focused manager for engine startup and teardown
//
// Single Responsibility: Engine state machine and dispatcher ownership

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::config::DispatcherConfig;
use crate::engine::backend::BackendFactory;
use crate::engine::dispatcher::Dispatcher;
use crate::error::{log_engine_error, EngineError};

/// Engine lifecycle state
///
/// Transitions only move forward:
/// Uninitialized → Starting → Running → ShuttingDown → Stopped.
/// A failed start goes straight to Stopped. A stopped engine cannot be
/// restarted; build a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Uninitialized,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Starting => "starting",
            EngineState::Running => "running",
            EngineState::ShuttingDown => "shutting down",
            EngineState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

struct Current {
    state: EngineState,
    dispatcher: Option<Arc<Dispatcher>>,
}

/// Manages the engine state machine and the dispatcher it owns
///
/// This manager handles:
/// - Spawning the dispatcher and initializing the backend on it
/// - Handing the running dispatcher to playback operations
/// - Ordered teardown: drain playbacks, release the device, join the worker
///
/// Start and shutdown are serialized by one transition lock; readers only
/// take the short state lock, so they never wait on a transition in progress.
pub struct EngineLifecycleManager {
    config: DispatcherConfig,
    /// Holds the backend factory until the first start.
    transition: Mutex<Option<BackendFactory>>,
    current: RwLock<Current>,
}

impl EngineLifecycleManager {
    /// Create a new manager in the Uninitialized state
    ///
    /// # Arguments
    /// * `factory` - Builds the backend on the dispatcher thread at start
    /// * `config` - Dispatcher thread name and timeouts
    pub fn new(factory: BackendFactory, config: DispatcherConfig) -> Self {
        Self {
            config,
            transition: Mutex::new(Some(factory)),
            current: RwLock::new(Current {
                state: EngineState::Uninitialized,
                dispatcher: None,
            }),
        }
    }

    /// Start the engine
    ///
    /// Blocks until the backend reports ready or the startup timeout
    /// elapses. Nothing observes a partially started engine: the state goes
    /// from Starting straight to Running or Stopped.
    ///
    /// # Returns
    /// * `Ok(())` - Engine running (also when it already was)
    /// * `Err(EngineError::EngineStartup)` - Init failure, timeout, or the
    ///   engine was already stopped
    pub fn start(&self) -> Result<(), EngineError> {
        let mut factory_slot = self.lock_transition()?;

        match self.state() {
            EngineState::Running => {
                log::info!("[Lifecycle] start() called while already running; ignoring");
                return Ok(());
            }
            EngineState::Uninitialized => {}
            other => {
                let err = EngineError::EngineStartup {
                    reason: format!("Engine is {}; create a new engine to start again", other),
                };
                log_engine_error(&err, "start");
                return Err(err);
            }
        }

        let factory = factory_slot.take().ok_or_else(|| EngineError::EngineStartup {
            reason: "Backend factory already consumed".to_string(),
        })?;

        self.set_state(EngineState::Starting, None)?;
        log::info!("[Lifecycle] Starting engine");

        match Dispatcher::start(factory, &self.config) {
            Ok(dispatcher) => {
                self.set_state(EngineState::Running, Some(Arc::new(dispatcher)))?;
                log::info!("[Lifecycle] Engine running");
                Ok(())
            }
            Err(err) => {
                self.set_state(EngineState::Stopped, None)?;
                log_engine_error(&err, "start");
                Err(err)
            }
        }
    }

    /// Shut the engine down
    ///
    /// `drain` runs first, with the dispatcher still accepting work, so
    /// active playbacks can be stopped before the backend's own `shutdown()`
    /// runs as the last unit of work. A no-op unless the engine is Running.
    pub fn shutdown(&self, drain: impl FnOnce(&Dispatcher)) -> Result<(), EngineError> {
        let _transition = self.lock_transition()?;

        let dispatcher = {
            let mut current = self.write_current()?;
            if current.state != EngineState::Running {
                log::debug!("[Lifecycle] shutdown() while {}; nothing to do", current.state);
                return Ok(());
            }
            current.state = EngineState::ShuttingDown;
            current.dispatcher.take()
        };
        log::info!("[Lifecycle] Shutting down engine");

        if let Some(dispatcher) = dispatcher {
            drain(&dispatcher);

            let result = dispatcher.submit("backend_shutdown", |backend| {
                backend.shutdown().map_err(EngineError::from)
            });
            if let Err(err) = result {
                log_engine_error(&err, "shutdown");
            }
            dispatcher.shutdown();
        }

        self.set_state(EngineState::Stopped, None)?;
        log::info!("[Lifecycle] Engine stopped");
        Ok(())
    }

    /// Dispatcher of a running engine
    ///
    /// # Returns
    /// * `Ok(Arc<Dispatcher>)` - Engine is Running
    /// * `Err(EngineError::EngineNotStarted)` - Any other state
    pub fn running_dispatcher(
        &self,
        operation: &'static str,
    ) -> Result<Arc<Dispatcher>, EngineError> {
        let current = self.read_current()?;
        match (&current.state, &current.dispatcher) {
            (EngineState::Running, Some(dispatcher)) => Ok(Arc::clone(dispatcher)),
            _ => Err(EngineError::EngineNotStarted { operation }),
        }
    }

    pub fn state(&self) -> EngineState {
        // Current holds plain data, so a poisoned lock is still readable.
        match self.current.read() {
            Ok(current) => current.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }

    // ========================================================================
    // Lock helpers
    // ========================================================================

    fn set_state(
        &self,
        state: EngineState,
        dispatcher: Option<Arc<Dispatcher>>,
    ) -> Result<(), EngineError> {
        let mut current = self.write_current()?;
        current.state = state;
        current.dispatcher = dispatcher;
        Ok(())
    }

    fn lock_transition(&self) -> Result<MutexGuard<'_, Option<BackendFactory>>, EngineError> {
        self.transition.lock().map_err(|_| {
            let err = EngineError::LockPoisoned {
                component: "engine_lifecycle".to_string(),
            };
            log_engine_error(&err, "lock_transition");
            err
        })
    }

    fn read_current(&self) -> Result<std::sync::RwLockReadGuard<'_, Current>, EngineError> {
        self.current.read().map_err(|_| EngineError::LockPoisoned {
            component: "engine_state".to_string(),
        })
    }

    fn write_current(&self) -> Result<std::sync::RwLockWriteGuard<'_, Current>, EngineError> {
        self.current.write().map_err(|_| EngineError::LockPoisoned {
            component: "engine_state".to_string(),
        })
    }
}
