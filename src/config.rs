//! Configuration management for the engine
//!
//! This module provides runtime configuration loading from JSON files so
//! dispatcher timeouts and output format can be adjusted without a rebuild.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Command dispatcher thread parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// How long `start()` waits for the worker readiness signal
    pub startup_timeout_ms: u64,
    /// How long `shutdown()` waits for the worker thread to finish
    pub shutdown_timeout_ms: u64,
    /// OS thread name of the dispatcher worker
    pub thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: 5000,
            shutdown_timeout_ms: 5000,
            thread_name: "polyvoice-dispatcher".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Requested output device format
///
/// Backends treat these as preferences; the device may negotiate something
/// else and convert internally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Target sample rate in Hz
    pub sample_rate: u32,
    /// Number of output channels (1=mono, 2=stereo)
    pub channels: u16,
    /// Preferred device buffer size in frames (0 = device default)
    pub buffer_frames: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_frames: 0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults when the file is missing or
    /// contains invalid JSON (a warning is logged in both cases).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the conventional location
    pub fn load() -> Self {
        Self::load_from_file("assets/polyvoice.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.dispatcher.startup_timeout_ms, 5000);
        assert_eq!(config.dispatcher.startup_timeout(), Duration::from_secs(5));
        assert_eq!(config.output.sample_rate, 48000);
        assert_eq!(config.output.channels, 2);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = EngineConfig::default();
        config.dispatcher.thread_name = "audio".to_string();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.dispatcher.thread_name, "audio");
        assert_eq!(parsed.output.sample_rate, config.output.sample_rate);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let parsed: EngineConfig =
            serde_json::from_str(r#"{"output": {"sample_rate": 44100, "channels": 1, "buffer_frames": 256}}"#)
                .unwrap();
        assert_eq!(parsed.output.sample_rate, 44100);
        assert_eq!(parsed.dispatcher.shutdown_timeout_ms, 5000);
    }

    #[test]
    fn test_load_from_missing_file_falls_back() {
        let config = EngineConfig::load_from_file("/nonexistent/polyvoice.json");
        assert_eq!(config.dispatcher.startup_timeout_ms, 5000);
    }
}
