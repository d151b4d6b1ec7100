//! MP3 loader backed by `symphonia`; decodes to interleaved 16-bit PCM.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::EngineError;

use super::loader::SoundLoader;
use super::sound::{AudioFormat, SoundData};

/// Decodes MP3 files, keeping the source channel count and sample rate.
pub struct Mp3Loader;

impl SoundLoader for Mp3Loader {
    fn name(&self) -> &'static str {
        "mp3"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".mp3"]
    }

    // MP3 streams have no reliable magic number (ID3 tags are optional), so
    // acceptance is by extension; decoding errors surface from `load`.
    fn can_load(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("mp3"))
    }

    fn load(&self, path: &Path) -> Result<SoundData, EngineError> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        hint.with_extension("mp3");

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(map_symphonia_error)?;
        let mut format = probed.format;

        let track = format.default_track().ok_or_else(|| EngineError::AudioFormat {
            reason: "MP3 stream contains no audio track".to_string(),
        })?;
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(map_symphonia_error)?;

        let mut pcm: Vec<u8> = Vec::new();
        let mut layout: Option<(u32, u16)> = None;
        let mut sample_buf: Option<SampleBuffer<i16>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(err) => return Err(map_symphonia_error(err)),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(reason)) => {
                    log::debug!("[Formats] Skipping corrupt MP3 frame: {}", reason);
                    continue;
                }
                Err(err) => return Err(map_symphonia_error(err)),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count() as u16;
            match layout {
                None => layout = Some((spec.rate, channels)),
                Some((rate, count)) if rate != spec.rate || count != channels => {
                    return Err(EngineError::AudioFormat {
                        reason: "MP3 stream changes format mid-stream".to_string(),
                    });
                }
                Some(_) => {}
            }

            let frames = decoded.capacity() as u64;
            let too_small = sample_buf
                .as_ref()
                .map_or(true, |buf| (buf.capacity() as u64) < frames * channels as u64);
            if too_small {
                sample_buf = Some(SampleBuffer::<i16>::new(frames, spec));
            }
            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                for sample in buf.samples() {
                    pcm.extend_from_slice(&sample.to_le_bytes());
                }
            }
        }

        let (sample_rate, channels) = layout.ok_or_else(|| EngineError::AudioFormat {
            reason: "MP3 stream contains no decodable frames".to_string(),
        })?;
        if !(1..=2).contains(&channels) {
            return Err(EngineError::AudioFormat {
                reason: format!(
                    "unsupported channel count: {} (only mono or stereo)",
                    channels
                ),
            });
        }

        SoundData::new(AudioFormat::pcm(sample_rate, channels, 16), pcm)
    }
}

fn map_symphonia_error(err: SymphoniaError) -> EngineError {
    match err {
        SymphoniaError::IoError(io) => io.into(),
        other => EngineError::AudioFormat {
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_load_by_extension_only() {
        let dir = tempfile::tempdir().unwrap();
        let mp3 = dir.path().join("song.MP3");
        let other = dir.path().join("song.ogg");
        std::fs::write(&mp3, b"x").unwrap();
        std::fs::write(&other, b"x").unwrap();

        assert!(Mp3Loader.can_load(&mp3));
        assert!(!Mp3Loader.can_load(&other));
        assert!(!Mp3Loader.can_load(&dir.path().join("missing.mp3")));
    }

    #[test]
    fn test_garbage_mp3_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        match Mp3Loader.load(&path) {
            Err(EngineError::AudioFormat { .. }) | Err(EngineError::Io { .. }) => {}
            other => panic!("Expected decode failure, got {:?}", other),
        }
    }
}
