// Error types for the polyvoice engine
//
// This module defines the engine error taxonomy and the native backend error
// kind, providing structured error handling with stable error codes.

mod backend;
mod engine;

pub use backend::BackendError;
pub use engine::{log_engine_error, EngineError, EngineErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, so callers can log or display failures
/// without matching on every variant.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
