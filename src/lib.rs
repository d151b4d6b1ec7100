// polyvoice - multi-voice audio playback over a thread-affine backend
//
// Every native device call runs on one dispatcher thread; the public API is
// thread-safe and tracks playbacks in a registry on the caller's side.

// Module declarations
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod managers;
pub mod playback;

// Re-exports for convenience
pub use audio::{AudioFormat, FormatRegistry, Sound, SoundData, SoundLoader};
pub use config::EngineConfig;
pub use engine::{AudioBackend, AudioEngine, EngineGuard, NullBackend};
pub use error::{BackendError, EngineError, ErrorCode};
pub use managers::{EngineState, PlayOptions};
pub use playback::{PlaybackHandle, PlaybackState};
