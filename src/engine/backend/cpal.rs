//! CPAL output backend for desktop platforms (Linux, macOS, Windows).
//!
//! Opens the default output device and renders every voice through a shared
//! software [`Mixer`]. `cpal::Stream` is not `Send`, so the backend must be
//! built on the dispatcher thread (see [`CpalBackend::factory`]).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use ::cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::{AudioFormat, SoundData};
use crate::config::OutputConfig;
use crate::error::BackendError;

use super::mixer::Mixer;
use super::{AudioBackend, BackendFactory, VoiceId};

/// Code used when the device or stream cannot be opened.
pub const CPAL_E_DEVICE: u32 = 0x8889_0004;
/// Code used for calls on unknown voices or before `initialize`.
pub const CPAL_E_INVALID_CALL: u32 = 0x8889_0001;

pub struct CpalBackend {
    config: OutputConfig,
    stream: Option<::cpal::Stream>,
    mixer: Arc<Mutex<Mixer>>,
    next_voice: AtomicU64,
}

impl CpalBackend {
    pub fn new(config: OutputConfig) -> Self {
        Self {
            mixer: Arc::new(Mutex::new(Mixer::new(config.sample_rate, config.channels as usize))),
            config,
            stream: None,
            next_voice: AtomicU64::new(1),
        }
    }

    /// Factory that constructs the backend on the dispatcher thread.
    pub fn factory(config: OutputConfig) -> BackendFactory {
        Box::new(move || Ok(Box::new(CpalBackend::new(config)) as Box<dyn AudioBackend>))
    }

    fn mixer(&self) -> Result<MutexGuard<'_, Mixer>, BackendError> {
        self.mixer
            .lock()
            .map_err(|_| BackendError::message("mixer lock poisoned"))
    }

    fn ensure_open(&self, op: &str) -> Result<(), BackendError> {
        if self.stream.is_none() {
            return Err(BackendError::new(
                CPAL_E_INVALID_CALL,
                format!("{} called before initialize", op),
            ));
        }
        Ok(())
    }

    fn voice_op(
        &self,
        op: &str,
        voice: VoiceId,
        f: impl FnOnce(&mut Mixer) -> bool,
    ) -> Result<(), BackendError> {
        self.ensure_open(op)?;
        if f(&mut self.mixer()?) {
            Ok(())
        } else {
            Err(BackendError::new(
                CPAL_E_INVALID_CALL,
                format!("{} on unknown {}", op, voice),
            ))
        }
    }

    fn open_stream(&self) -> Result<::cpal::Stream, BackendError> {
        let host = ::cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            BackendError::new(CPAL_E_DEVICE, "No default output device found")
        })?;

        let supported = self.choose_output_config(&device)?;

        let mut stream_config: ::cpal::StreamConfig = supported.config();
        if self.config.buffer_frames > 0 {
            stream_config.buffer_size = ::cpal::BufferSize::Fixed(self.config.buffer_frames);
        }

        // The mixer renders at the device's actual layout.
        *self.mixer()? = Mixer::new(
            stream_config.sample_rate.0,
            stream_config.channels as usize,
        );
        log::info!(
            "[CpalBackend] Output device: {} Hz, {} channel(s)",
            stream_config.sample_rate.0,
            stream_config.channels
        );

        let mixer = Arc::clone(&self.mixer);
        let err_fn = |err| log::error!("[CpalBackend] Output stream error: {}", err);

        let stream = match supported.sample_format() {
            ::cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &::cpal::OutputCallbackInfo| {
                    // Never block the device thread; emit silence on contention.
                    match mixer.try_lock() {
                        Ok(mut mixer) => mixer.render(data),
                        Err(_) => data.iter_mut().for_each(|s| *s = 0.0),
                    }
                },
                err_fn,
                None,
            ),
            other => {
                return Err(BackendError::new(
                    CPAL_E_DEVICE,
                    format!("Unsupported output sample format: {:?}", other),
                ))
            }
        }
        .map_err(|e| BackendError::new(CPAL_E_DEVICE, format!("{:?}", e)))?;

        stream
            .play()
            .map_err(|e| BackendError::new(CPAL_E_DEVICE, format!("{:?}", e)))?;
        Ok(stream)
    }

    /// F32 config matching the requested rate and channel count, or the
    /// device default when the device offers no such layout.
    fn choose_output_config(
        &self,
        device: &::cpal::Device,
    ) -> Result<::cpal::SupportedStreamConfig, BackendError> {
        let wanted_rate = ::cpal::SampleRate(self.config.sample_rate);
        let matching = device
            .supported_output_configs()
            .ok()
            .and_then(|mut ranges| ranges.find(|range| layout_matches(range, &self.config)));
        if let Some(range) = matching {
            return Ok(range.with_sample_rate(wanted_rate));
        }

        log::warn!(
            "[CpalBackend] Device offers no f32 layout at {} Hz / {} channel(s); using its default",
            self.config.sample_rate,
            self.config.channels
        );
        device.default_output_config().map_err(|e| {
            BackendError::new(
                CPAL_E_DEVICE,
                format!("Failed to get default output config: {:?}", e),
            )
        })
    }
}

fn layout_matches(range: &::cpal::SupportedStreamConfigRange, config: &OutputConfig) -> bool {
    let rate = ::cpal::SampleRate(config.sample_rate);
    range.sample_format() == ::cpal::SampleFormat::F32
        && range.channels() == config.channels
        && range.min_sample_rate() <= rate
        && rate <= range.max_sample_rate()
}

fn check_format(op: &str, format: &AudioFormat) -> Result<(), BackendError> {
    if Mixer::supports(format) {
        return Ok(());
    }
    Err(BackendError::new(
        CPAL_E_INVALID_CALL,
        format!(
            "{}: unsupported format {}-bit / {} channel(s); expected 16-bit mono or stereo",
            op, format.bits_per_sample, format.channels
        ),
    ))
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn initialize(&mut self) -> Result<(), BackendError> {
        if self.stream.is_some() {
            return Ok(());
        }
        self.stream = Some(self.open_stream()?);
        Ok(())
    }

    fn create_voice(&mut self, format: &AudioFormat) -> Result<VoiceId, BackendError> {
        self.ensure_open("create_voice")?;
        check_format("create_voice", format)?;
        let voice = VoiceId::new(self.next_voice.fetch_add(1, Ordering::Relaxed));
        self.mixer()?.add_voice(voice);
        Ok(voice)
    }

    fn submit_buffer(
        &mut self,
        voice: VoiceId,
        sound: &Arc<SoundData>,
        looping: bool,
    ) -> Result<(), BackendError> {
        check_format("submit_buffer", sound.format())?;
        let sound = Arc::clone(sound);
        self.voice_op("submit_buffer", voice, |m| m.submit(voice, sound, looping))
    }

    fn start(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.voice_op("start", voice, |m| m.set_playing(voice, true))
    }

    fn stop(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.voice_op("stop", voice, |m| m.flush(voice))
    }

    fn pause(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.voice_op("pause", voice, |m| m.set_playing(voice, false))
    }

    fn resume(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.voice_op("resume", voice, |m| m.set_playing(voice, true))
    }

    fn set_voice_volume(&mut self, voice: VoiceId, volume: f32) -> Result<(), BackendError> {
        self.voice_op("set_voice_volume", voice, |m| m.set_volume(voice, volume))
    }

    fn set_voice_pan(&mut self, voice: VoiceId, pan: f32) -> Result<(), BackendError> {
        self.voice_op("set_voice_pan", voice, |m| m.set_pan(voice, pan))
    }

    fn set_master_volume(&mut self, volume: f32) -> Result<(), BackendError> {
        self.ensure_open("set_master_volume")?;
        self.mixer()?.set_master_volume(volume);
        Ok(())
    }

    fn release_voice(&mut self, voice: VoiceId) -> Result<(), BackendError> {
        self.voice_op("release_voice", voice, |m| m.remove_voice(voice))
    }

    fn shutdown(&mut self) -> Result<(), BackendError> {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("[CpalBackend] Failed to pause stream on shutdown: {:?}", e);
            }
            drop(stream);
        }
        self.mixer()?.clear();
        log::info!("[CpalBackend] Shut down");
        Ok(())
    }
}
