// Managers Module
//
// Focused managers composed by the AudioEngine facade.
//
// Each manager handles one specific concern:
// - EngineLifecycleManager: Engine state machine and dispatcher ownership
// - PlaybackManager: Per-handle playback operations over the registry

pub mod lifecycle_manager;
pub mod playback_manager;

pub use lifecycle_manager::{EngineLifecycleManager, EngineState};
pub use playback_manager::{PlayOptions, PlaybackManager};
