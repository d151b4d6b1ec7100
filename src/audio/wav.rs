//! RIFF/WAVE loader backed by `hound`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::error::EngineError;

use super::loader::SoundLoader;
use super::sound::{AudioFormat, SoundData};

const SUPPORTED_RATES: [u32; 2] = [44100, 48000];

/// Loads 16-bit integer PCM WAV files, mono or stereo, at 44.1 or 48 kHz.
pub struct WavLoader;

impl SoundLoader for WavLoader {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".wav", ".wave"]
    }

    fn can_load(&self, path: &Path) -> bool {
        let mut header = [0u8; 12];
        match File::open(path).and_then(|mut f| f.read_exact(&mut header)) {
            Ok(()) => &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE",
            Err(_) => false,
        }
    }

    fn load(&self, path: &Path) -> Result<SoundData, EngineError> {
        let mut reader = WavReader::open(path).map_err(map_hound_error)?;
        let spec = reader.spec();

        if spec.sample_format != SampleFormat::Int {
            return Err(EngineError::AudioFormat {
                reason: "only integer PCM WAV data is supported".to_string(),
            });
        }
        if spec.bits_per_sample != 16 {
            return Err(EngineError::AudioFormat {
                reason: format!(
                    "unsupported bits per sample: {} (only 16-bit is supported)",
                    spec.bits_per_sample
                ),
            });
        }
        if !(1..=2).contains(&spec.channels) {
            return Err(EngineError::AudioFormat {
                reason: format!(
                    "unsupported channel count: {} (only mono or stereo)",
                    spec.channels
                ),
            });
        }
        if !SUPPORTED_RATES.contains(&spec.sample_rate) {
            return Err(EngineError::AudioFormat {
                reason: format!(
                    "unsupported sample rate: {} Hz (only 44100 or 48000)",
                    spec.sample_rate
                ),
            });
        }

        let mut pcm = Vec::with_capacity(reader.len() as usize * 2);
        for sample in reader.samples::<i16>() {
            let sample = sample.map_err(map_hound_error)?;
            pcm.extend_from_slice(&sample.to_le_bytes());
        }

        SoundData::new(
            AudioFormat::pcm(spec.sample_rate, spec.channels, spec.bits_per_sample),
            pcm,
        )
    }
}

fn map_hound_error(err: hound::Error) -> EngineError {
    match err {
        hound::Error::IoError(io) => io.into(),
        other => EngineError::AudioFormat {
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::path::PathBuf;
    use std::time::Duration;

    fn write_wav(dir: &Path, name: &str, spec: WavSpec, frames: usize) -> PathBuf {
        let path = dir.join(name);
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for i in 0..frames * spec.channels as usize {
            match spec.sample_format {
                SampleFormat::Int if spec.bits_per_sample == 16 => {
                    writer.write_sample((i % 100) as i16).unwrap()
                }
                SampleFormat::Int => writer.write_sample((i % 100) as i32).unwrap(),
                SampleFormat::Float => writer.write_sample(0.25f32).unwrap(),
            }
        }
        writer.finalize().unwrap();
        path
    }

    fn spec(channels: u16, sample_rate: u32, bits: u16, format: SampleFormat) -> WavSpec {
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: bits,
            sample_format: format,
        }
    }

    #[test]
    fn test_load_stereo_16bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "a.wav", spec(2, 44100, 16, SampleFormat::Int), 44100);

        assert!(WavLoader.can_load(&path));
        let data = WavLoader.load(&path).unwrap();
        assert_eq!(data.format().channels, 2);
        assert_eq!(data.format().block_align, 4);
        assert_eq!(data.num_frames(), 44100);
        assert_eq!(data.duration(), Duration::from_secs(1));
        // first sample is 0, second is 1 (little-endian)
        assert_eq!(&data.pcm()[0..4], &[0, 0, 1, 0]);
    }

    #[test]
    fn test_rejects_unsupported_sample_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "b.wav", spec(1, 22050, 16, SampleFormat::Int), 100);
        match WavLoader.load(&path).unwrap_err() {
            EngineError::AudioFormat { reason } => assert!(reason.contains("22050")),
            other => panic!("Expected AudioFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_24bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "c.wav", spec(1, 48000, 24, SampleFormat::Int), 100);
        assert!(matches!(
            WavLoader.load(&path),
            Err(EngineError::AudioFormat { .. })
        ));
    }

    #[test]
    fn test_rejects_float_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "d.wav", spec(1, 48000, 32, SampleFormat::Float), 10);
        assert!(matches!(
            WavLoader.load(&path),
            Err(EngineError::AudioFormat { .. })
        ));
    }

    #[test]
    fn test_can_load_rejects_non_riff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.wav");
        std::fs::write(&path, b"ID3\x03\x00\x00\x00\x00\x00\x00\x00\x00").unwrap();
        assert!(!WavLoader.can_load(&path));
    }
}
