// Native backend error kind

use std::fmt;

/// Failure reported by an audio backend call.
///
/// `code` carries the native status value (an HRESULT on COM-style APIs,
/// an errno-like value elsewhere, 0 when the backend has none) so the
/// root cause can be logged alongside `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub code: u32,
    pub message: String,
}

impl BackendError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Backend failure without a native status code.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }

    /// Native code rendered as an unsigned 32-bit hex string, e.g. `0x88890008`.
    pub fn code_hex(&self) -> String {
        format!("0x{:08X}", self.code)
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code != 0 {
            write!(f, "Backend error ({}): {}", self.code_hex(), self.message)
        } else {
            write!(f, "Backend error: {}", self.message)
        }
    }
}

impl std::error::Error for BackendError {}
