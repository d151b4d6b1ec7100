//! Backend abstractions for the engine core.
//!
//! A backend wraps a native audio device and its voices. Every method is
//! called from the dispatcher thread only, so implementations may hold
//! thread-affine resources (COM objects, `cpal::Stream`, ...) and need not be
//! `Send` themselves: they are built on the dispatcher thread by a
//! [`BackendFactory`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{AudioFormat, SoundData};
use crate::error::BackendError;

/// Backend-owned identifier of a native voice.
///
/// Playback records only refer to voices through this id; allocation and
/// release stay with the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl VoiceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Capability set every audio backend provides.
///
/// All calls happen on the dispatcher thread. Failures carry a native code
/// and are never retried by the engine.
pub trait AudioBackend {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Open the device. Runs once, before any other call.
    fn initialize(&mut self) -> Result<(), BackendError>;

    fn create_voice(&mut self, format: &AudioFormat) -> Result<VoiceId, BackendError>;

    /// Queue the whole sound on the voice; `looping` repeats it until stopped.
    fn submit_buffer(
        &mut self,
        voice: VoiceId,
        sound: &Arc<SoundData>,
        looping: bool,
    ) -> Result<(), BackendError>;

    fn start(&mut self, voice: VoiceId) -> Result<(), BackendError>;

    /// Stop playback and flush queued buffers.
    fn stop(&mut self, voice: VoiceId) -> Result<(), BackendError>;

    fn pause(&mut self, voice: VoiceId) -> Result<(), BackendError>;

    fn resume(&mut self, voice: VoiceId) -> Result<(), BackendError>;

    fn set_voice_volume(&mut self, voice: VoiceId, volume: f32) -> Result<(), BackendError>;

    /// Pan in [-1.0, 1.0] (left to right).
    fn set_voice_pan(&mut self, voice: VoiceId, pan: f32) -> Result<(), BackendError>;

    fn set_master_volume(&mut self, volume: f32) -> Result<(), BackendError>;

    /// Free the voice. The id is invalid afterwards.
    fn release_voice(&mut self, voice: VoiceId) -> Result<(), BackendError>;

    /// Release the device and every remaining voice.
    fn shutdown(&mut self) -> Result<(), BackendError>;
}

/// Builds the backend on the dispatcher thread.
pub type BackendFactory =
    Box<dyn FnOnce() -> Result<Box<dyn AudioBackend>, BackendError> + Send + 'static>;

/// Wrap an already constructed, sendable backend into a factory.
pub fn factory_from<B>(backend: B) -> BackendFactory
where
    B: AudioBackend + Send + 'static,
{
    Box::new(move || Ok(Box::new(backend) as Box<dyn AudioBackend>))
}

/// Trait representing a monotonic time source used for playback timing.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic time source for tests.
///
/// Time only moves when [`ManualTimeSource::advance`] is called, so elapsed
/// playback time can be asserted exactly.
pub struct ManualTimeSource {
    start: Instant,
    offset_ns: AtomicU64,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_ns: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ns
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.start + Duration::from_nanos(self.offset_ns.load(Ordering::SeqCst))
    }
}

#[cfg_attr(not(feature = "cpal-output"), allow(dead_code))]
mod mixer;

#[cfg(feature = "cpal-output")]
mod cpal;
#[cfg(feature = "cpal-output")]
pub use self::cpal::CpalBackend;

mod null;
pub use null::{BackendCall, NullBackend, NullBackendProbe, NullVoiceSnapshot, NullVoiceState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_time_source_only_moves_when_advanced() {
        let clock = ManualTimeSource::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - t0, Duration::from_millis(250));
    }

    #[test]
    fn test_factory_from_builds_backend() {
        let factory = factory_from(NullBackend::new());
        let backend = factory().unwrap();
        assert_eq!(backend.name(), "null");
    }
}
