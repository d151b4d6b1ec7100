//! Engine module housing the playback core.
//!
//! `backend` defines the device capability contract and its implementations,
//! `dispatcher` the thread that owns the backend, and `core` the
//! `AudioEngine` facade composing them.

pub mod backend;
pub mod core;
pub mod dispatcher;

#[cfg(feature = "cpal-output")]
pub use backend::CpalBackend;
pub use backend::{
    factory_from, AudioBackend, BackendFactory, ManualTimeSource, NullBackend, NullBackendProbe,
    SystemTimeSource, TimeSource, VoiceId,
};
pub use core::{AudioEngine, EngineGuard};
pub use dispatcher::Dispatcher;
