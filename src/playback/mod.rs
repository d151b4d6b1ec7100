// Playback module - handles, records and the registry that tracks them

pub mod registry;
pub mod validation;

pub use registry::{
    NewPlayback, PlaybackHandle, PlaybackRecord, PlaybackRegistry, PlaybackState,
};
pub use validation::ParamValidator;
