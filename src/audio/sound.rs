//! Decoded sound data shared across playbacks.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::EngineError;

/// PCM layout of a decoded sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels (1=mono, 2=stereo)
    pub channels: u16,
    /// Bits per sample (16 for everything the bundled loaders produce)
    pub bits_per_sample: u16,
    /// Bytes per frame (all channels of one sample instant)
    pub block_align: u16,
    /// Average bytes per second
    pub avg_bytes_per_sec: u32,
}

impl AudioFormat {
    /// Interleaved integer PCM with the block align and byte rate derived.
    pub fn pcm(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        let block_align = channels * (bits_per_sample / 8);
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            block_align,
            avg_bytes_per_sec: sample_rate * block_align as u32,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.block_align as usize
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.sample_rate == 0 {
            return Err(EngineError::AudioFormat {
                reason: "sample rate must be greater than 0".to_string(),
            });
        }
        if self.channels == 0 {
            return Err(EngineError::AudioFormat {
                reason: "channel count must be greater than 0".to_string(),
            });
        }
        if self.bits_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(EngineError::AudioFormat {
                reason: format!(
                    "bits per sample must be a non-zero multiple of 8 (got {})",
                    self.bits_per_sample
                ),
            });
        }
        let expected = self.channels as usize * self.bytes_per_sample();
        if self.frame_size() != expected {
            return Err(EngineError::AudioFormat {
                reason: format!(
                    "block align {} does not match {} channels of {}-bit samples",
                    self.block_align, self.channels, self.bits_per_sample
                ),
            });
        }
        Ok(())
    }
}

/// Immutable decoded audio: raw PCM bytes plus their format.
///
/// Produced once by a loader and never mutated afterwards.
#[derive(Clone, PartialEq)]
pub struct SoundData {
    format: AudioFormat,
    pcm: Vec<u8>,
    duration: Duration,
}

impl SoundData {
    /// Wrap PCM bytes, computing the duration from the frame count.
    ///
    /// Trailing bytes that do not fill a whole frame are ignored for the
    /// duration but kept in the buffer.
    pub fn new(format: AudioFormat, pcm: Vec<u8>) -> Result<Self, EngineError> {
        format.validate()?;
        let frames = pcm.len() / format.frame_size();
        let duration = Duration::from_secs_f64(frames as f64 / format.sample_rate as f64);
        Ok(Self {
            format,
            pcm,
            duration,
        })
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn pcm(&self) -> &[u8] {
        &self.pcm
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn num_frames(&self) -> usize {
        self.pcm.len() / self.format.frame_size()
    }
}

impl fmt::Debug for SoundData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundData")
            .field("format", &self.format)
            .field("pcm_bytes", &self.pcm.len())
            .field("duration", &self.duration)
            .finish()
    }
}

/// A loaded sound, cheap to clone and share between threads.
#[derive(Debug, Clone)]
pub struct Sound {
    data: Arc<SoundData>,
    path: Option<PathBuf>,
}

impl Sound {
    pub fn new(data: SoundData, path: impl AsRef<Path>) -> Self {
        Self {
            data: Arc::new(data),
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Sound built from in-memory PCM rather than a file.
    pub fn from_data(data: SoundData) -> Self {
        Self {
            data: Arc::new(data),
            path: None,
        }
    }

    pub fn data(&self) -> &Arc<SoundData> {
        &self.data
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn duration(&self) -> Duration {
        self.data.duration()
    }

    pub fn format(&self) -> &AudioFormat {
        self.data.format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_format_derives_layout() {
        let format = AudioFormat::pcm(44100, 2, 16);
        assert_eq!(format.block_align, 4);
        assert_eq!(format.avg_bytes_per_sec, 176_400);
        assert_eq!(format.bytes_per_sample(), 2);
    }

    #[test]
    fn test_duration_from_frame_count() {
        // 48000 frames of 16-bit stereo = 1 second
        let data = SoundData::new(AudioFormat::pcm(48000, 2, 16), vec![0u8; 48000 * 4]).unwrap();
        assert_eq!(data.num_frames(), 48000);
        assert_eq!(data.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_frame_ignored_for_duration() {
        let data = SoundData::new(AudioFormat::pcm(1000, 1, 16), vec![0u8; 201]).unwrap();
        assert_eq!(data.num_frames(), 100);
        assert_eq!(data.duration(), Duration::from_millis(100));
        assert_eq!(data.pcm().len(), 201);
    }

    #[test]
    fn test_rejects_inconsistent_block_align() {
        let mut format = AudioFormat::pcm(44100, 2, 16);
        format.block_align = 3;
        let err = SoundData::new(format, vec![]).unwrap_err();
        assert!(matches!(err, EngineError::AudioFormat { .. }));
    }

    #[test]
    fn test_rejects_zero_sample_rate() {
        let err = SoundData::new(AudioFormat::pcm(0, 1, 16), vec![]).unwrap_err();
        assert!(matches!(err, EngineError::AudioFormat { .. }));
    }

    #[test]
    fn test_sound_clone_shares_data() {
        let data = SoundData::new(AudioFormat::pcm(8000, 1, 16), vec![0u8; 16]).unwrap();
        let sound = Sound::from_data(data);
        let copy = sound.clone();
        assert!(Arc::ptr_eq(sound.data(), copy.data()));
        assert!(sound.path().is_none());
    }
}
