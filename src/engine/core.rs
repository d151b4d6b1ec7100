//! AudioEngine: the public entry point of the crate.
//!
//! Composes the lifecycle manager (dispatcher thread + backend), the
//! playback manager (registry + per-handle operations) and the format
//! registry used by `load`. Every method is safe to call from any thread.

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use crate::audio::{FormatRegistry, Sound};
use crate::config::EngineConfig;
use crate::engine::backend::{
    factory_from, AudioBackend, BackendFactory, SystemTimeSource, TimeSource,
};
use crate::error::{log_engine_error, EngineError};
use crate::managers::{EngineLifecycleManager, EngineState, PlayOptions, PlaybackManager};
use crate::playback::{ParamValidator, PlaybackHandle, PlaybackRecord, PlaybackState};


/// Multi-voice playback engine over a thread-affine audio backend.
pub struct AudioEngine {
    lifecycle: EngineLifecycleManager,
    playback: PlaybackManager,
    formats: FormatRegistry,
}

impl AudioEngine {
    /// Engine over `backend` with default configuration.
    pub fn new<B>(backend: B) -> Self
    where
        B: AudioBackend + Send + 'static,
    {
        Self::with_config(backend, EngineConfig::default())
    }

    pub fn with_config<B>(backend: B, config: EngineConfig) -> Self
    where
        B: AudioBackend + Send + 'static,
    {
        Self::with_factory(factory_from(backend), config)
    }

    /// Engine whose backend is constructed on the dispatcher thread.
    ///
    /// Required for backends holding thread-affine resources that are not
    /// `Send`, such as an open output stream.
    pub fn with_factory(factory: BackendFactory, config: EngineConfig) -> Self {
        Self {
            lifecycle: EngineLifecycleManager::new(factory, config.dispatcher),
            playback: PlaybackManager::new(Arc::new(SystemTimeSource::default())),
            formats: FormatRegistry::with_defaults(),
        }
    }

    /// Replace the clock used for playback timing.
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.playback = PlaybackManager::new(time_source);
        self
    }

    /// Replace the loaders used by `load`.
    pub fn with_formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = formats;
        self
    }

    /// Run `f` against a started engine and always shut it down afterwards,
    /// whether `f` returns normally, fails or panics.
    pub fn scoped<B, R>(
        backend: B,
        config: EngineConfig,
        f: impl FnOnce(&AudioEngine) -> Result<R, EngineError>,
    ) -> Result<R, EngineError>
    where
        B: AudioBackend + Send + 'static,
    {
        let engine = Self::with_config(backend, config);
        let guard = engine.start_guarded()?;
        f(&guard)
    }

    /// Start the engine and return a guard that shuts it down on drop.
    pub fn start_guarded(&self) -> Result<EngineGuard<'_>, EngineError> {
        self.start()?;
        Ok(EngineGuard { engine: self })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Spawn the dispatcher and initialize the backend on it.
    ///
    /// No-op when already running; fails with `EngineStartup` on init
    /// failure, startup timeout, or when the engine was already stopped.
    pub fn start(&self) -> Result<(), EngineError> {
        self.lifecycle.start()
    }

    /// Stop every active playback, release the backend and join the
    /// dispatcher thread. Idempotent.
    pub fn shutdown(&self) -> Result<(), EngineError> {
        self.lifecycle.shutdown(|dispatcher| {
            let stopped = self.playback.stop_all(dispatcher);
            if stopped > 0 {
                log::info!("[Lifecycle] Stopped {} playback(s) before shutdown", stopped);
            }
        })?;

        // Playbacks started concurrently with shutdown, or whose stop failed.
        if self.lifecycle.state() == EngineState::Stopped {
            self.playback.forget_all();
        }
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    // ========================================================================
    // Sounds
    // ========================================================================

    /// Decode a sound file with the registered loaders.
    ///
    /// Works in any engine state; decoding never touches the backend.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Sound, EngineError> {
        let path = path.as_ref();
        let data = self.formats.load(path)?;
        Ok(Sound::new(data, path))
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    // ========================================================================
    // Playback
    // ========================================================================

    pub fn play(&self, sound: &Sound, options: PlayOptions) -> Result<PlaybackHandle, EngineError> {
        let dispatcher = self.lifecycle.running_dispatcher("play")?;
        self.playback.play(&dispatcher, sound, options)
    }

    pub fn stop(&self, handle: PlaybackHandle) -> Result<(), EngineError> {
        let dispatcher = self.lifecycle.running_dispatcher("stop")?;
        self.playback.stop(&dispatcher, handle)
    }

    pub fn pause(&self, handle: PlaybackHandle) -> Result<(), EngineError> {
        let dispatcher = self.lifecycle.running_dispatcher("pause")?;
        self.playback.pause(&dispatcher, handle)
    }

    pub fn resume(&self, handle: PlaybackHandle) -> Result<(), EngineError> {
        let dispatcher = self.lifecycle.running_dispatcher("resume")?;
        self.playback.resume(&dispatcher, handle)
    }

    pub fn set_volume(&self, handle: PlaybackHandle, volume: f32) -> Result<(), EngineError> {
        let dispatcher = self.lifecycle.running_dispatcher("set_volume")?;
        self.playback.set_volume(&dispatcher, handle, volume)
    }

    pub fn set_pan(&self, handle: PlaybackHandle, pan: f32) -> Result<(), EngineError> {
        let dispatcher = self.lifecycle.running_dispatcher("set_pan")?;
        self.playback.set_pan(&dispatcher, handle, pan)
    }

    /// Gain applied to the mix of every voice.
    pub fn set_master_volume(&self, volume: f32) -> Result<(), EngineError> {
        let dispatcher = self.lifecycle.running_dispatcher("set_master_volume")?;
        ParamValidator::volume(volume)?;
        dispatcher.submit("set_master_volume", move |backend| {
            Ok(backend.set_master_volume(volume)?)
        })
    }

    pub fn is_playing(&self, handle: PlaybackHandle) -> Result<bool, EngineError> {
        self.lifecycle.running_dispatcher("is_playing")?;
        self.playback.is_playing(handle)
    }

    pub fn playback_state(&self, handle: PlaybackHandle) -> Result<PlaybackState, EngineError> {
        self.lifecycle.running_dispatcher("playback_state")?;
        self.playback.playback_state(handle)
    }

    /// Snapshot of the record behind `handle`.
    pub fn playback_info(&self, handle: PlaybackHandle) -> Result<PlaybackRecord, EngineError> {
        self.lifecycle.running_dispatcher("playback_info")?;
        self.playback.record(handle)
    }

    /// Handles of every playback not yet stopped, oldest first.
    pub fn active_playbacks(&self) -> Result<Vec<PlaybackHandle>, EngineError> {
        self.lifecycle.running_dispatcher("active_playbacks")?;
        self.playback.active_handles()
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log_engine_error(&err, "AudioEngine::drop");
        }
    }
}

/// Running engine that shuts down when dropped.
pub struct EngineGuard<'a> {
    engine: &'a AudioEngine,
}

impl Deref for EngineGuard<'_> {
    type Target = AudioEngine;

    fn deref(&self) -> &AudioEngine {
        self.engine
    }
}

impl Drop for EngineGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.engine.shutdown() {
            log_engine_error(&err, "EngineGuard::drop");
        }
    }
}
