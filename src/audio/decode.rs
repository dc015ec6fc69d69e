// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decoding of audio files (WAV, FLAC, MP3, OGG, etc.) into in-memory buffers.
//!
//! Decoding is all-or-nothing: a file that fails part way through produces an error and
//! no buffer, so nothing partially decoded ever reaches the sample store.

use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::buffer::AudioBuffer;

/// Errors produced while decoding audio data.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio decode error in {source_name}: {error}")]
    Audio {
        source_name: String,
        error: SymphoniaError,
    },

    #[error("no audio track found in {0}")]
    NoAudioTrack(String),

    #[error("sample rate not specified in {0}")]
    UnknownSampleRate(String),

    #[error("{0} decoded to zero frames")]
    Empty(String),

    #[error("decode task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Decodes an audio file into memory.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<AudioBuffer, DecodeError> {
    let path = path.as_ref();
    // Include the path in the error so the user sees which file failed.
    let file = File::open(path).map_err(|e| {
        DecodeError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    decode_source(Box::new(file), hint, &path.display().to_string())
}

/// Decodes audio held in memory. The extension, if known, helps the format probe.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioBuffer, DecodeError> {
    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    decode_source(Box::new(Cursor::new(bytes)), hint, "<memory>")
}

/// Decodes an audio file on the blocking thread pool, suspending the caller until the
/// codec has finished.
pub async fn decode_file_async(path: PathBuf) -> Result<AudioBuffer, DecodeError> {
    tokio::task::spawn_blocking(move || decode_file(path)).await?
}

fn decode_source(
    source: Box<dyn MediaSource>,
    hint: Hint,
    source_name: &str,
) -> Result<AudioBuffer, DecodeError> {
    let audio_error = |error: SymphoniaError| DecodeError::Audio {
        source_name: source_name.to_string(),
        error,
    };

    let mss = MediaSourceStream::new(source, Default::default());
    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(audio_error)?;
    let mut format_reader = probed.format;

    // Find the first audio track.
    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::NoAudioTrack(source_name.to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| DecodeError::UnknownSampleRate(source_name.to_string()))?;

    let mut decoder = get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(audio_error)?;

    let mut channels: Vec<Vec<f32>> = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(audio_error(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet).map_err(audio_error)?;
        let spec = *decoded.spec();
        let channel_count = spec.channels.count();
        if channel_count == 0 {
            continue;
        }
        if channels.is_empty() {
            channels = vec![Vec::new(); channel_count];
        }

        let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buffer.copy_interleaved_ref(decoded);
        for frame in sample_buffer.samples().chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
    }

    let buffer = AudioBuffer::from_planar(channels, sample_rate);
    if buffer.frames() == 0 {
        return Err(DecodeError::Empty(source_name.to_string()));
    }

    debug!(
        source = source_name,
        channels = buffer.channel_count(),
        frames = buffer.frames(),
        sample_rate,
        "Decoded audio"
    );

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{generate_sine, write_wav};

    #[test]
    fn test_decode_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let left = generate_sine(440.0, 44100, 4410);
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        write_wav(&path, &[left.clone(), right], 44100).unwrap();

        let buffer = decode_file(&path).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.sample_rate(), 44100);
        assert_eq!(buffer.frames(), 4410);

        let decoded_left = buffer.channel(0).unwrap();
        let decoded_right = buffer.channel(1).unwrap();
        for i in [0, 100, 2000, 4409] {
            assert!((decoded_left[i] - left[i]).abs() < 1e-6);
            assert!((decoded_right[i] + left[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode_bytes(b"definitely not audio data".to_vec(), Some("wav"));
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_missing_file_names_path() {
        let err = decode_file("/nonexistent/keyzone/missing.wav").unwrap_err();
        assert!(err.to_string().contains("missing.wav"));
    }

    #[tokio::test]
    async fn test_decode_file_async() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, &[generate_sine(220.0, 48000, 960)], 48000).unwrap();

        let buffer = decode_file_async(path).await.unwrap();
        assert_eq!(buffer.channel_count(), 1);
        assert_eq!(buffer.frames(), 960);
    }
}
