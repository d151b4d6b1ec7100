//! Software voice mixer used by output-stream backends.
//!
//! Voices hold a shared reference to decoded 16-bit PCM. `render` runs on the
//! device callback thread and resamples every playing voice to the device
//! rate with linear interpolation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::audio::{AudioFormat, SoundData};

use super::VoiceId;

#[derive(Debug, Default)]
struct MixVoice {
    sound: Option<Arc<SoundData>>,
    /// Fractional read position in source frames
    position: f64,
    looping: bool,
    playing: bool,
    volume: f32,
    pan: f32,
}

impl MixVoice {
    fn new() -> Self {
        Self {
            volume: 1.0,
            ..Default::default()
        }
    }
}

/// Per-voice mixing state shared between a backend and its device callback.
#[derive(Debug)]
pub(crate) struct Mixer {
    voices: HashMap<VoiceId, MixVoice>,
    master_volume: f32,
    device_rate: u32,
    device_channels: usize,
}

impl Mixer {
    pub(crate) fn new(device_rate: u32, device_channels: usize) -> Self {
        Self {
            voices: HashMap::new(),
            master_volume: 1.0,
            device_rate: device_rate.max(1),
            device_channels: device_channels.max(1),
        }
    }

    /// Formats `render` can read: 16-bit PCM, mono or stereo.
    pub(crate) fn supports(format: &AudioFormat) -> bool {
        format.bits_per_sample == 16 && (1..=2).contains(&format.channels)
    }

    pub(crate) fn add_voice(&mut self, voice: VoiceId) {
        self.voices.insert(voice, MixVoice::new());
    }

    /// Returns false when the voice is unknown or the sound's format is
    /// not one `render` can read.
    pub(crate) fn submit(&mut self, voice: VoiceId, sound: Arc<SoundData>, looping: bool) -> bool {
        if !Self::supports(sound.format()) {
            return false;
        }
        self.with_voice(voice, |v| {
            v.sound = Some(sound);
            v.position = 0.0;
            v.looping = looping;
        })
    }

    pub(crate) fn set_playing(&mut self, voice: VoiceId, playing: bool) -> bool {
        self.with_voice(voice, |v| v.playing = playing && v.sound.is_some())
    }

    /// Stop and flush the queued buffer.
    pub(crate) fn flush(&mut self, voice: VoiceId) -> bool {
        self.with_voice(voice, |v| {
            v.playing = false;
            v.sound = None;
            v.position = 0.0;
        })
    }

    pub(crate) fn set_volume(&mut self, voice: VoiceId, volume: f32) -> bool {
        self.with_voice(voice, |v| v.volume = volume)
    }

    pub(crate) fn set_pan(&mut self, voice: VoiceId, pan: f32) -> bool {
        self.with_voice(voice, |v| v.pan = pan)
    }

    pub(crate) fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume;
    }

    pub(crate) fn remove_voice(&mut self, voice: VoiceId) -> bool {
        self.voices.remove(&voice).is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.voices.clear();
    }

    pub(crate) fn is_playing(&self, voice: VoiceId) -> bool {
        self.voices.get(&voice).is_some_and(|v| v.playing)
    }

    fn with_voice(&mut self, voice: VoiceId, f: impl FnOnce(&mut MixVoice)) -> bool {
        match self.voices.get_mut(&voice) {
            Some(v) => {
                f(v);
                true
            }
            None => false,
        }
    }

    /// Mix every playing voice into `out` (interleaved, device channel count).
    pub(crate) fn render(&mut self, out: &mut [f32]) {
        out.iter_mut().for_each(|s| *s = 0.0);
        let channels = self.device_channels;
        let frames = out.len() / channels;

        for voice in self.voices.values_mut() {
            if !voice.playing {
                continue;
            }
            let Some(sound) = voice.sound.clone() else {
                continue;
            };
            let total = sound.num_frames();
            if total == 0 {
                voice.playing = false;
                continue;
            }

            let step = sound.format().sample_rate as f64 / self.device_rate as f64;
            // Balance law: centre leaves both channels at full gain.
            let left_gain = (1.0 - voice.pan).min(1.0) * voice.volume;
            let right_gain = (1.0 + voice.pan).min(1.0) * voice.volume;

            for frame in 0..frames {
                if voice.position >= total as f64 {
                    if voice.looping {
                        voice.position %= total as f64;
                    } else {
                        voice.playing = false;
                        break;
                    }
                }

                let index = voice.position as usize;
                let frac = (voice.position - index as f64) as f32;
                let next = if index + 1 < total {
                    index + 1
                } else if voice.looping {
                    0
                } else {
                    index
                };

                let (l0, r0) = read_frame(&sound, index);
                let (l1, r1) = read_frame(&sound, next);
                let left = (l0 + (l1 - l0) * frac) * left_gain;
                let right = (r0 + (r1 - r0) * frac) * right_gain;

                let base = frame * channels;
                if channels == 1 {
                    out[base] += (left + right) * 0.5;
                } else {
                    out[base] += left;
                    out[base + 1] += right;
                }

                voice.position += step;
            }
        }

        for sample in out.iter_mut() {
            *sample = (*sample * self.master_volume).clamp(-1.0, 1.0);
        }
    }
}

/// Stereo frame of normalized samples; mono sources feed both sides.
fn read_frame(sound: &SoundData, frame: usize) -> (f32, f32) {
    let format = sound.format();
    let offset = frame * format.frame_size();
    let pcm = sound.pcm();
    let sample_at = |at: usize| -> f32 {
        match pcm.get(at..at + 2) {
            Some(bytes) => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
            None => 0.0,
        }
    };
    let left = sample_at(offset);
    if format.channels >= 2 {
        (left, sample_at(offset + 2))
    } else {
        (left, left)
    }
}
