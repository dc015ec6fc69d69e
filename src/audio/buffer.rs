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

//! Decoded PCM audio held in memory.

use std::sync::Arc;
use std::time::Duration;

/// Reasons a decoded buffer cannot be played.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BufferError {
    #[error("buffer has no channels")]
    NoChannels,

    #[error("buffer has a sample rate of zero")]
    ZeroSampleRate,

    #[error("buffer contains no frames")]
    Empty,

    #[error("channel {channel} has {actual} frames, expected {expected}")]
    MismatchedChannels {
        channel: usize,
        expected: usize,
        actual: usize,
    },

    #[error("non-finite sample in channel {channel} at frame {frame}")]
    NonFinite { channel: usize, frame: usize },
}

/// Decoded multi-channel PCM audio in planar format.
///
/// The channel data lives behind an `Arc`, so cloning a buffer is cheap and every voice
/// playing a sample reads the same memory.
#[derive(Clone)]
pub struct AudioBuffer {
    /// One Vec per channel.
    channels: Arc<Vec<Vec<f32>>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Creates a buffer from planar channel data.
    pub fn from_planar(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels: Arc::new(channels),
            sample_rate,
        }
    }

    /// Creates a buffer from interleaved samples, converting to planar internally.
    pub fn from_interleaved(interleaved: &[f32], channel_count: u16, sample_rate: u32) -> Self {
        let num_channels = channel_count as usize;
        let num_frames = if num_channels > 0 {
            interleaved.len() / num_channels
        } else {
            0
        };

        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in interleaved.chunks_exact(num_channels.max(1)).take(num_frames) {
            for (ch, sample) in frame.iter().enumerate() {
                planar[ch].push(*sample);
            }
        }

        Self::from_planar(planar, sample_rate)
    }

    /// Creates a single-channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::from_planar(vec![samples], sample_rate)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the samples of one channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.channels
            .iter()
            .map(|c| c.len() * std::mem::size_of::<f32>())
            .sum()
    }

    /// Checks that the buffer is playable.
    pub fn validate(&self) -> Result<(), BufferError> {
        if self.channels.is_empty() {
            return Err(BufferError::NoChannels);
        }
        if self.sample_rate == 0 {
            return Err(BufferError::ZeroSampleRate);
        }

        let expected = self.frames();
        if expected == 0 {
            return Err(BufferError::Empty);
        }

        for (channel, data) in self.channels.iter().enumerate() {
            if data.len() != expected {
                return Err(BufferError::MismatchedChannels {
                    channel,
                    expected,
                    actual: data.len(),
                });
            }
            if let Some(frame) = data.iter().position(|s| !s.is_finite()) {
                return Err(BufferError::NonFinite { channel, frame });
            }
        }

        Ok(())
    }

    /// Reads a stereo frame at a fractional position using linear interpolation.
    ///
    /// Mono buffers are duplicated to both sides. Channels beyond the second are ignored.
    /// Positions outside the buffer read as silence.
    pub fn read_stereo(&self, position: f64) -> (f32, f32) {
        let left = match self.channels.first() {
            Some(data) => read_interpolated(data, position),
            None => return (0.0, 0.0),
        };
        let right = match self.channels.get(1) {
            Some(data) => read_interpolated(data, position),
            None => left,
        };
        (left, right)
    }
}

fn read_interpolated(data: &[f32], position: f64) -> f32 {
    if data.is_empty() || position < 0.0 {
        return 0.0;
    }

    let idx = position as usize;
    if idx + 1 >= data.len() {
        return data.get(idx).copied().unwrap_or(0.0);
    }

    let frac = (position - idx as f64) as f32;
    data[idx] + (data[idx + 1] - data[idx]) * frac
}

impl std::fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("channels", &self.channel_count())
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
