// Audio module - decoded sound data and the format loaders that produce it

pub mod loader;
pub mod mp3;
pub mod sound;
pub mod wav;

// Re-export commonly used types for convenience
pub use loader::{FormatRegistry, SoundLoader};
pub use mp3::Mp3Loader;
pub use sound::{AudioFormat, Sound, SoundData};
pub use wav::WavLoader;
