// Engine error types and constants

use crate::error::{BackendError, ErrorCode};
use crate::playback::PlaybackHandle;
use log::error;
use std::fmt;

/// Engine error code constants
///
/// Single source of truth for the numeric codes attached to every
/// [`EngineError`] variant.
///
/// Error code range: 2001-2009
pub struct EngineErrorCodes {}

impl EngineErrorCodes {
    /// A parameter (volume, pan, ...) is outside its accepted range
    pub const VALIDATION: i32 = 2001;

    /// Operation attempted while the engine is not running
    pub const ENGINE_NOT_STARTED: i32 = 2002;

    /// Playback handle is unknown or was already stopped
    pub const PLAYBACK_NOT_FOUND: i32 = 2003;

    /// Native backend call reported a failure
    pub const BACKEND: i32 = 2004;

    /// Audio file format is not supported or cannot be decoded
    pub const AUDIO_FORMAT: i32 = 2005;

    /// Backend initialization failed or the worker did not become ready in time
    pub const ENGINE_STARTUP: i32 = 2006;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 2007;

    /// Underlying I/O failure (file missing, unreadable, ...)
    pub const IO: i32 = 2008;

    /// A unit of work panicked on the dispatcher thread
    pub const COMMAND_PANICKED: i32 = 2009;
}

/// Log an engine error with structured context
///
/// Logs the error code, the component and the human-readable message.
/// The logging is non-blocking and will not panic on failure.
pub fn log_engine_error(err: &EngineError, context: &str) {
    error!(
        "Engine error in {}: code={}, component=AudioEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors surfaced by the public engine API
///
/// Validation and lookup errors are raised on the calling thread before any
/// cross-thread work. Backend errors are captured on the dispatcher thread
/// and re-raised to the blocking caller.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Parameter outside its accepted range
    Validation {
        parameter: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    /// Engine is not in the Running state
    EngineNotStarted { operation: &'static str },

    /// Handle never issued, or already stopped
    PlaybackNotFound { handle: PlaybackHandle },

    /// Native backend failure
    Backend { code: u32, message: String },

    /// Unsupported or undecodable audio data
    AudioFormat { reason: String },

    /// Backend init failure or readiness timeout
    EngineStartup { reason: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// I/O failure while reading audio input
    Io { details: String },

    /// A unit of work panicked on the dispatcher thread
    CommandPanicked { details: String },
}

impl ErrorCode for EngineError {
    fn code(&self) -> i32 {
        match self {
            EngineError::Validation { .. } => EngineErrorCodes::VALIDATION,
            EngineError::EngineNotStarted { .. } => EngineErrorCodes::ENGINE_NOT_STARTED,
            EngineError::PlaybackNotFound { .. } => EngineErrorCodes::PLAYBACK_NOT_FOUND,
            EngineError::Backend { .. } => EngineErrorCodes::BACKEND,
            EngineError::AudioFormat { .. } => EngineErrorCodes::AUDIO_FORMAT,
            EngineError::EngineStartup { .. } => EngineErrorCodes::ENGINE_STARTUP,
            EngineError::LockPoisoned { .. } => EngineErrorCodes::LOCK_POISONED,
            EngineError::Io { .. } => EngineErrorCodes::IO,
            EngineError::CommandPanicked { .. } => EngineErrorCodes::COMMAND_PANICKED,
        }
    }

    fn message(&self) -> String {
        match self {
            EngineError::Validation {
                parameter,
                value,
                min,
                max,
            } => {
                format!(
                    "{} must be within [{}, {}] (got {})",
                    parameter, min, max, value
                )
            }
            EngineError::EngineNotStarted { operation } => {
                format!("Engine not running. Call start() before {}().", operation)
            }
            EngineError::PlaybackNotFound { handle } => {
                format!("Playback handle not found: {}", handle)
            }
            EngineError::Backend { code, message } => {
                if *code != 0 {
                    format!("Backend error (0x{:08X}): {}", code, message)
                } else {
                    format!("Backend error: {}", message)
                }
            }
            EngineError::AudioFormat { reason } => {
                format!("Unsupported audio format: {}", reason)
            }
            EngineError::EngineStartup { reason } => {
                format!("Engine failed to start: {}", reason)
            }
            EngineError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            EngineError::Io { details } => {
                format!("I/O error: {}", details)
            }
            EngineError::CommandPanicked { details } => {
                format!("Dispatcher command panicked: {}", details)
            }
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EngineError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io {
            details: err.to_string(),
        }
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        EngineError::Backend {
            code: err.code,
            message: err.message,
        }
    }
}
