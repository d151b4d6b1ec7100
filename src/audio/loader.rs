//! Format loader collaborator: turns files into [`SoundData`].

use std::path::Path;

use crate::error::EngineError;

use super::mp3::Mp3Loader;
use super::sound::SoundData;
use super::wav::WavLoader;

/// A decoder for one container format.
pub trait SoundLoader: Send + Sync {
    /// Short format name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Lower-case file extensions including the dot, e.g. `".wav"`.
    fn extensions(&self) -> &'static [&'static str];

    /// Cheap content check (header sniffing); must not decode the file.
    fn can_load(&self, path: &Path) -> bool;

    fn load(&self, path: &Path) -> Result<SoundData, EngineError>;
}

/// Picks the loader for a file: by extension first, then by sniffing the
/// content with every registered loader.
pub struct FormatRegistry {
    loaders: Vec<Box<dyn SoundLoader>>,
}

impl FormatRegistry {
    pub fn empty() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    /// Registry with the bundled WAV and MP3 loaders.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(WavLoader));
        registry.register(Box::new(Mp3Loader));
        registry
    }

    /// Add a loader. Later registrations win on extension conflicts.
    pub fn register(&mut self, loader: Box<dyn SoundLoader>) {
        for ext in loader.extensions() {
            if self.loaders.iter().any(|l| l.extensions().contains(ext)) {
                log::warn!(
                    "[Formats] Extension {} already registered, {} takes precedence",
                    ext,
                    loader.name()
                );
            }
        }
        log::debug!(
            "[Formats] Registered {} for {:?}",
            loader.name(),
            loader.extensions()
        );
        self.loaders.insert(0, loader);
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut exts: Vec<&'static str> = self
            .loaders
            .iter()
            .flat_map(|l| l.extensions().iter().copied())
            .collect();
        exts.sort_unstable();
        exts.dedup();
        exts
    }

    pub fn loader_for(&self, path: &Path) -> Option<&dyn SoundLoader> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()));

        if let Some(ext) = ext.as_deref() {
            let by_ext = self
                .loaders
                .iter()
                .find(|l| l.extensions().contains(&ext) && l.can_load(path));
            if let Some(loader) = by_ext {
                return Some(loader.as_ref());
            }
        }

        self.loaders
            .iter()
            .find(|l| l.can_load(path))
            .map(|l| l.as_ref())
    }

    /// Load a file with the matching loader.
    ///
    /// # Errors
    /// * `Io` - the file does not exist or cannot be read
    /// * `AudioFormat` - no loader accepts the file, or decoding failed
    pub fn load(&self, path: &Path) -> Result<SoundData, EngineError> {
        if !path.exists() {
            return Err(EngineError::Io {
                details: format!("audio file not found: {}", path.display()),
            });
        }

        let loader = self.loader_for(path).ok_or_else(|| EngineError::AudioFormat {
            reason: format!(
                "no loader accepts {} (supported extensions: {})",
                path.display(),
                self.supported_extensions().join(", ")
            ),
        })?;

        let data = loader.load(path)?;
        log::info!(
            "[Formats] Loaded {} via {}: {}ch, {}Hz, {}bit, {:.2}s",
            path.display(),
            loader.name(),
            data.format().channels,
            data.format().sample_rate,
            data.format().bits_per_sample,
            data.duration().as_secs_f64()
        );
        Ok(data)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sound::AudioFormat;
    use std::io::Write;

    struct RawLoader;

    impl SoundLoader for RawLoader {
        fn name(&self) -> &'static str {
            "raw"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &[".raw"]
        }

        fn can_load(&self, path: &Path) -> bool {
            path.extension().is_some_and(|e| e == "raw")
        }

        fn load(&self, path: &Path) -> Result<SoundData, EngineError> {
            let bytes = std::fs::read(path)?;
            SoundData::new(AudioFormat::pcm(8000, 1, 16), bytes)
        }
    }

    #[test]
    fn test_supported_extensions_include_defaults() {
        let registry = FormatRegistry::with_defaults();
        let exts = registry.supported_extensions();
        assert!(exts.contains(&".wav"));
        assert!(exts.contains(&".mp3"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let registry = FormatRegistry::with_defaults();
        let err = registry
            .load(Path::new("/definitely/not/here.wav"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }

    #[test]
    fn test_unknown_format_is_audio_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"just some text")
            .unwrap();

        let registry = FormatRegistry::with_defaults();
        match registry.load(&path).unwrap_err() {
            EngineError::AudioFormat { reason } => assert!(reason.contains(".wav")),
            other => panic!("Expected AudioFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_loader_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.raw");
        std::fs::write(&path, vec![0u8; 1600]).unwrap();

        let mut registry = FormatRegistry::empty();
        registry.register(Box::new(RawLoader));
        let data = registry.load(&path).unwrap();
        assert_eq!(data.num_frames(), 800);
    }
}
