use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::audio::{AudioFormat, SoundData};
use crate::error::BackendError;

use super::{AudioBackend, VoiceId};

/// Native-style code reported for calls on an unknown voice or before init.
pub const NULL_E_INVALID_CALL: u32 = 0x8896_0001;

/// Null backend used for deterministic testing and headless runs.
///
/// No audio is produced. Voices and their state live in memory and every
/// call is recorded (operation, voice, calling thread) in a shared
/// [`NullBackendProbe`] that tests keep after the backend has been moved
/// onto the dispatcher thread.
pub struct NullBackend {
    probe: NullBackendProbe,
    next_voice: u64,
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            probe: NullBackendProbe::default(),
            next_voice: 1,
        }
    }

    /// Backend plus a probe observing it.
    pub fn with_probe() -> (Self, NullBackendProbe) {
        let backend = Self::new();
        let probe = backend.probe();
        (backend, probe)
    }

    pub fn probe(&self) -> NullBackendProbe {
        self.probe.clone()
    }

    /// Record the call, then apply any injected failure for `op`.
    fn enter(&self, op: &'static str, voice: Option<VoiceId>) -> Result<(), BackendError> {
        let mut state = self.probe.state();
        state.calls.push(BackendCall {
            op,
            voice,
            thread: thread::current().id(),
        });
        if let Some(code) = state.failures.get(op) {
            return Err(BackendError::new(*code, format!("injected failure in {}", op)));
        }
        if op != "initialize" && !state.initialized {
            return Err(BackendError::new(
                NULL_E_INVALID_CALL,
                format!("{} called before initialize", op),
            ));
        }
        Ok(())
    }

    fn with_voice<R>(
        &self,
        op: &'static str,
        voice: VoiceId,
        f: impl FnOnce(&mut NullVoiceSnapshot) -> R,
    ) -> Result<R, BackendError> {
        self.enter(op, Some(voice))?;
        let mut state = self.probe.state();
        let entry = state.voices.get_mut(&voice).ok_or_else(|| {
            BackendError::new(NULL_E_INVALID_CALL, format!("{} on unknown {}", op, voice))
        })?;
        Ok(f(entry))
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn initialize(&mut self) -> Result<(), BackendError> {
        self.enter("initialize", None)?;
        let delay = self.probe.state().init_delay;
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let mut state = self.probe.state();
        state.initialized = true;
        log::info!("[NullBackend] Initialized");
        Ok(())
    }

    fn create_voice(&mut self, format: &AudioFormat) -> Result<VoiceId, BackendError> {
        self.enter("create_voice", None)?;
        let voice = VoiceId::new(self.next_voice);
        self.next_voice += 1;
        self.probe.state().voices.insert(
            voice,
            NullVoiceSnapshot {
                format: *format,
                state: NullVoiceState::Created,
                volume: 1.0,
                pan: 0.0,
                looping: false,
                queued_bytes: 0,
            },
        );
        log::debug!("[NullBackend] Created {}", voice);
        Ok(voice)
    }

    fn submit_buffer(
        &mut self,
        voice: VoiceId,
        sound: &Arc<SoundData>,
        looping: bool,
    ) -> Result<(), BackendError> {
        let bytes = sound.pcm().len();
        self.with_voice("submit_buffer", voice, |v| {
            v.queued_bytes += bytes;
            v.looping = looping;
        })
    }

    fn start(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.with_voice("start", voice, |v| v.state = NullVoiceState::Playing)
    }

    fn stop(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.with_voice("stop", voice, |v| {
            v.state = NullVoiceState::Stopped;
            v.queued_bytes = 0;
        })
    }

    fn pause(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.with_voice("pause", voice, |v| {
            if v.state == NullVoiceState::Playing {
                v.state = NullVoiceState::Paused;
            }
        })
    }

    fn resume(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.with_voice("resume", voice, |v| {
            if v.state == NullVoiceState::Paused {
                v.state = NullVoiceState::Playing;
            }
        })
    }

    fn set_voice_volume(&mut self, voice: VoiceId, volume: f32) -> Result<(), BackendError> {
        self.with_voice("set_voice_volume", voice, |v| v.volume = volume)
    }

    fn set_voice_pan(&mut self, voice: VoiceId, pan: f32) -> Result<(), BackendError> {
        self.with_voice("set_voice_pan", voice, |v| v.pan = pan)
    }

    fn set_master_volume(&mut self, volume: f32) -> Result<(), BackendError> {
        self.enter("set_master_volume", None)?;
        self.probe.state().master_volume = Some(volume);
        Ok(())
    }

    fn release_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.enter("release_voice", Some(voice))?;
        let removed = self.probe.state().voices.remove(&voice);
        match removed {
            Some(_) => {
                log::debug!("[NullBackend] Released {}", voice);
                Ok(())
            }
            None => Err(BackendError::new(
                NULL_E_INVALID_CALL,
                format!("release_voice on unknown {}", voice),
            )),
        }
    }

    fn shutdown(&mut self) -> Result<(), BackendError> {
        self.enter("shutdown", None)?;
        let mut state = self.probe.state();
        let leaked = state.voices.len();
        if leaked > 0 {
            log::warn!("[NullBackend] Shutting down with {} live voice(s)", leaked);
        }
        state.voices.clear();
        state.initialized = false;
        state.shut_down = true;
        log::info!("[NullBackend] Shut down");
        Ok(())
    }
}

/// Lifecycle state of a simulated voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullVoiceState {
    Created,
    Playing,
    Paused,
    Stopped,
}

/// Observable state of one simulated voice.
#[derive(Debug, Clone, PartialEq)]
pub struct NullVoiceSnapshot {
    pub format: AudioFormat,
    pub state: NullVoiceState,
    pub volume: f32,
    pub pan: f32,
    pub looping: bool,
    pub queued_bytes: usize,
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub op: &'static str,
    pub voice: Option<VoiceId>,
    pub thread: ThreadId,
}

#[derive(Default)]
struct ProbeState {
    calls: Vec<BackendCall>,
    voices: HashMap<VoiceId, NullVoiceSnapshot>,
    failures: HashMap<&'static str, u32>,
    master_volume: Option<f32>,
    init_delay: Option<Duration>,
    initialized: bool,
    shut_down: bool,
}

/// Shared view into a [`NullBackend`], usable from any thread.
#[derive(Clone, Default)]
pub struct NullBackendProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl NullBackendProbe {
    // The probe only holds plain data, so a poisoned lock is still usable.
    fn state(&self) -> MutexGuard<'_, ProbeState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every future call of `op` fail with `code`.
    pub fn fail_on(&self, op: &'static str, code: u32) {
        self.state().failures.insert(op, code);
    }

    pub fn clear_failure(&self, op: &'static str) {
        self.state().failures.remove(op);
    }

    /// Delay `initialize()` to simulate a slow device.
    pub fn set_init_delay(&self, delay: Duration) {
        self.state().init_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.state().calls.iter().map(|c| c.op).collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| c.op == op).count()
    }

    pub fn call_threads(&self) -> HashSet<ThreadId> {
        self.state().calls.iter().map(|c| c.thread).collect()
    }

    pub fn voice(&self, voice: VoiceId) -> Option<NullVoiceSnapshot> {
        self.state().voices.get(&voice).cloned()
    }

    pub fn live_voices(&self) -> usize {
        self.state().voices.len()
    }

    pub fn master_volume(&self) -> Option<f32> {
        self.state().master_volume
    }

    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    pub fn is_shut_down(&self) -> bool {
        self.state().shut_down
    }
}
