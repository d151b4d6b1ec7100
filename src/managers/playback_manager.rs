// PlaybackManager: Focused manager for per-sound playback control
//
// Single Responsibility: validate → run backend work on the dispatcher →
// update the playback registry

use std::sync::Arc;

use crate::audio::{AudioFormat, Sound, SoundData};
use crate::engine::backend::{AudioBackend, TimeSource, VoiceId};
use crate::engine::dispatcher::Dispatcher;
use crate::error::{log_engine_error, BackendError, EngineError};
use crate::playback::{
    NewPlayback, ParamValidator, PlaybackHandle, PlaybackRecord, PlaybackRegistry, PlaybackState,
};

/// Per-playback parameters for `play`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    /// Linear gain in [0.0, 1.0]
    pub volume: f32,
    /// Stereo position in [-1.0, 1.0]
    pub pan: f32,
    /// Repeat until stopped
    pub looping: bool,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            looping: false,
        }
    }
}

impl PlayOptions {
    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn pan(mut self, pan: f32) -> Self {
        self.pan = pan;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

/// Manages playback records and the backend voices behind them
///
/// Every mutating operation takes the dispatcher of a running engine. The
/// registry is only updated after the backend confirmed the change, and
/// read-only queries (`is_playing`, `playback_state`) never reach the
/// backend at all.
pub struct PlaybackManager {
    registry: Arc<PlaybackRegistry>,
    time_source: Arc<dyn TimeSource>,
}

impl PlaybackManager {
    pub fn new(time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            registry: Arc::new(PlaybackRegistry::new()),
            time_source,
        }
    }

    /// Start playing a sound
    ///
    /// Voice creation, buffer submission, initial volume/pan and start run
    /// as one unit of work on the dispatcher. If any step fails the voice is
    /// released before the error propagates.
    ///
    /// # Returns
    /// * `Ok(PlaybackHandle)` - Handle for the new playback
    /// * `Err(EngineError::Validation)` - Volume or pan out of range
    /// * `Err(EngineError::Backend)` - Backend rejected one of the steps
    pub fn play(
        &self,
        dispatcher: &Dispatcher,
        sound: &Sound,
        options: PlayOptions,
    ) -> Result<PlaybackHandle, EngineError> {
        ParamValidator::volume(options.volume)?;
        ParamValidator::pan(options.pan)?;

        let format = *sound.format();
        let data = Arc::clone(sound.data());
        let voice = dispatcher.submit("play", move |backend| {
            start_voice(backend, &format, &data, options)
        })?;
        let started_at = self.time_source.now();

        let inserted = self.registry.insert(NewPlayback {
            voice,
            started_at,
            duration: sound.duration(),
            looping: options.looping,
            volume: options.volume,
            pan: options.pan,
        });
        match inserted {
            // Shutdown won the race: its final sweep may already have run,
            // and the backend shutdown releases the voice.
            Ok(handle) if !dispatcher.is_running() => {
                let _ = self.registry.remove(handle);
                log::warn!("[Playback] {} discarded; engine shut down during play", handle);
                Err(EngineError::EngineNotStarted { operation: "play" })
            }
            Ok(handle) => {
                log::info!(
                    "[Playback] {} started on {} ({:.3}s, loop={})",
                    handle,
                    voice,
                    sound.duration().as_secs_f64(),
                    options.looping
                );
                Ok(handle)
            }
            Err(err) => {
                // No handle will ever reference this voice; give it back.
                release_orphan(dispatcher, voice);
                Err(err)
            }
        }
    }

    /// Stop a playback and release its voice
    ///
    /// The record is removed only after the backend confirmed the release;
    /// on failure it stays registered and `stop` can be retried.
    pub fn stop(&self, dispatcher: &Dispatcher, handle: PlaybackHandle) -> Result<(), EngineError> {
        self.registry.remove_with(handle, |record| {
            let voice = record.voice;
            dispatcher.submit("stop", move |backend| {
                backend.stop(voice)?;
                backend.release_voice(voice)?;
                Ok(())
            })
        })?;
        log::info!("[Playback] {} stopped", handle);
        Ok(())
    }

    /// Pause a playback. Pausing a paused playback does nothing.
    pub fn pause(&self, dispatcher: &Dispatcher, handle: PlaybackHandle) -> Result<(), EngineError> {
        self.registry.update(handle, |record| {
            if record.is_paused() {
                return Ok(());
            }
            let voice = record.voice;
            dispatcher.submit("pause", move |backend| Ok(backend.pause(voice)?))?;
            record.mark_paused(self.time_source.now());
            log::debug!("[Playback] {} paused", handle);
            Ok(())
        })
    }

    /// Resume a paused playback. Resuming a playing one does nothing.
    pub fn resume(&self, dispatcher: &Dispatcher, handle: PlaybackHandle) -> Result<(), EngineError> {
        self.registry.update(handle, |record| {
            if !record.is_paused() {
                return Ok(());
            }
            let voice = record.voice;
            dispatcher.submit("resume", move |backend| Ok(backend.resume(voice)?))?;
            record.mark_resumed(self.time_source.now());
            log::debug!("[Playback] {} resumed", handle);
            Ok(())
        })
    }

    pub fn set_volume(
        &self,
        dispatcher: &Dispatcher,
        handle: PlaybackHandle,
        volume: f32,
    ) -> Result<(), EngineError> {
        ParamValidator::volume(volume)?;
        self.registry.update(handle, |record| {
            let voice = record.voice;
            dispatcher.submit("set_volume", move |backend| {
                Ok(backend.set_voice_volume(voice, volume)?)
            })?;
            record.volume = volume;
            Ok(())
        })
    }

    pub fn set_pan(
        &self,
        dispatcher: &Dispatcher,
        handle: PlaybackHandle,
        pan: f32,
    ) -> Result<(), EngineError> {
        ParamValidator::pan(pan)?;
        self.registry.update(handle, |record| {
            let voice = record.voice;
            dispatcher.submit("set_pan", move |backend| Ok(backend.set_voice_pan(voice, pan)?))?;
            record.pan = pan;
            Ok(())
        })
    }

    /// Inferred from the record and the clock; no backend call.
    pub fn is_playing(&self, handle: PlaybackHandle) -> Result<bool, EngineError> {
        let record = self.registry.get(handle)?;
        Ok(record.is_playing(self.time_source.now()))
    }

    pub fn playback_state(&self, handle: PlaybackHandle) -> Result<PlaybackState, EngineError> {
        let record = self.registry.get(handle)?;
        Ok(record.state(self.time_source.now()))
    }

    pub fn record(&self, handle: PlaybackHandle) -> Result<PlaybackRecord, EngineError> {
        self.registry.get(handle)
    }

    pub fn active_handles(&self) -> Result<Vec<PlaybackHandle>, EngineError> {
        self.registry.list_active()
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    /// Stop every active playback, continuing past individual failures
    ///
    /// # Returns
    /// Number of playbacks stopped.
    pub fn stop_all(&self, dispatcher: &Dispatcher) -> usize {
        let handles = match self.registry.list_active() {
            Ok(handles) => handles,
            Err(err) => {
                log_engine_error(&err, "stop_all");
                return 0;
            }
        };

        let mut stopped = 0;
        for handle in handles {
            match self.stop(dispatcher, handle) {
                Ok(()) => stopped += 1,
                // raced with a concurrent stop
                Err(EngineError::PlaybackNotFound { .. }) => {}
                Err(err) => log_engine_error(&err, "stop_all"),
            }
        }
        stopped
    }

    /// Drop records whose voices can no longer be released (engine gone).
    pub(crate) fn forget_all(&self) -> usize {
        match self.registry.drain_all() {
            Ok(records) => {
                for record in &records {
                    log::warn!(
                        "[Playback] Discarding {} ({}) left after shutdown",
                        record.handle,
                        record.voice
                    );
                }
                records.len()
            }
            Err(err) => {
                log_engine_error(&err, "forget_all");
                0
            }
        }
    }
}

/// Queue release of a voice no record owns. Enqueue failures are logged.
fn release_orphan(dispatcher: &Dispatcher, voice: VoiceId) {
    let rollback = dispatcher.submit_async("play_rollback", move |backend| {
        backend.stop(voice)?;
        backend.release_voice(voice)?;
        Ok(())
    });
    if let Err(err) = rollback {
        log_engine_error(&err, "play_rollback");
    }
}

/// Create and start a voice; release it again if any later step fails.
fn start_voice(
    backend: &mut dyn AudioBackend,
    format: &AudioFormat,
    data: &Arc<SoundData>,
    options: PlayOptions,
) -> Result<VoiceId, EngineError> {
    let voice = backend.create_voice(format)?;
    if let Err(err) = configure_and_start(backend, voice, data, options) {
        if let Err(release_err) = backend.release_voice(voice) {
            log::warn!(
                "[Playback] Failed to release {} after failed start: {}",
                voice,
                release_err
            );
        }
        return Err(err.into());
    }
    Ok(voice)
}

fn configure_and_start(
    backend: &mut dyn AudioBackend,
    voice: VoiceId,
    data: &Arc<SoundData>,
    options: PlayOptions,
) -> Result<(), BackendError> {
    backend.submit_buffer(voice, data, options.looping)?;
    backend.set_voice_volume(voice, options.volume)?;
    backend.set_voice_pan(voice, options.pan)?;
    backend.start(voice)
}
