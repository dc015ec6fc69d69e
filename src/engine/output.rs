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

//! Streaming the master output to recorders.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info};

/// One rendered block of the master bus.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputBlock {
    /// Engine clock frame of the first sample.
    pub start_frame: u64,
    /// Interleaved stereo samples.
    pub samples: Vec<f32>,
}

impl OutputBlock {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Fans rendered blocks out to every subscriber.
#[derive(Default)]
pub(crate) struct OutputStreams {
    senders: Vec<Sender<OutputBlock>>,
    dropped: u64,
}

impl OutputStreams {
    pub fn subscribe(&mut self, capacity: usize) -> Receiver<OutputBlock> {
        let (tx, rx) = bounded(capacity.max(1));
        self.senders.push(tx);
        rx
    }

    pub fn has_subscribers(&self) -> bool {
        !self.senders.is_empty()
    }

    /// Sends a block to every subscriber. The render path never waits: a subscriber that
    /// has fallen behind misses the block, one that has gone away is forgotten.
    pub fn publish(&mut self, start_frame: u64, left: &[f32], right: &[f32]) {
        if !self.has_subscribers() {
            return;
        }

        let samples = left
            .iter()
            .zip(right)
            .flat_map(|(l, r)| [*l, *r])
            .collect();
        let block = OutputBlock {
            start_frame,
            samples,
        };

        let mut dropped = 0;
        self.senders.retain(|tx| match tx.try_send(block.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Output stream subscriber went away");
                false
            }
        });

        if dropped > 0 {
            self.dropped += dropped;
            debug!(
                start_frame,
                total_dropped = self.dropped,
                "Output stream full, block dropped"
            );
        }
    }
}

/// Writes stereo output to a 32-bit float WAV file.
pub struct WavRecorder {
    writer: WavWriter<BufWriter<File>>,
    frames: u64,
}

impl WavRecorder {
    pub fn create<P: AsRef<Path>>(path: P, sample_rate: u32) -> Result<Self, hound::Error> {
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        Ok(Self {
            writer: WavWriter::create(path, spec)?,
            frames: 0,
        })
    }

    /// Appends planar stereo frames.
    pub fn write_stereo(&mut self, left: &[f32], right: &[f32]) -> Result<(), hound::Error> {
        for (l, r) in left.iter().zip(right) {
            self.writer.write_sample(*l)?;
            self.writer.write_sample(*r)?;
            self.frames += 1;
        }
        Ok(())
    }

    pub fn write_block(&mut self, block: &OutputBlock) -> Result<(), hound::Error> {
        for frame in block.samples.chunks_exact(2) {
            self.writer.write_sample(frame[0])?;
            self.writer.write_sample(frame[1])?;
            self.frames += 1;
        }
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flushes the header and closes the file, returning the number of frames written.
    pub fn finalize(self) -> Result<u64, hound::Error> {
        let frames = self.frames;
        self.writer.finalize()?;
        info!(frames, "Recording finalized");
        Ok(frames)
    }

    /// Records a stream on a background thread until every sender is gone.
    pub fn spawn(
        mut self,
        stream: Receiver<OutputBlock>,
    ) -> JoinHandle<Result<u64, hound::Error>> {
        thread::spawn(move || {
            for block in stream.iter() {
                self.write_block(&block)?;
            }
            self.finalize()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_interleaves() {
        let mut streams = OutputStreams::default();
        let rx = streams.subscribe(4);
        streams.publish(128, &[1.0, 2.0], &[-1.0, -2.0]);

        let block = rx.try_recv().unwrap();
        assert_eq!(block.start_frame, 128);
        assert_eq!(block.samples, vec![1.0, -1.0, 2.0, -2.0]);
        assert_eq!(block.frames(), 2);
    }

    #[test]
    fn test_full_stream_drops_blocks() {
        let mut streams = OutputStreams::default();
        let rx = streams.subscribe(1);
        streams.publish(0, &[0.1], &[0.1]);
        streams.publish(1, &[0.2], &[0.2]);

        assert_eq!(rx.try_recv().unwrap().start_frame, 0);
        assert!(rx.try_recv().is_err());
        assert!(streams.has_subscribers());
    }

    #[test]
    fn test_disconnected_subscribers_pruned() {
        let mut streams = OutputStreams::default();
        drop(streams.subscribe(1));
        let rx = streams.subscribe(1);
        streams.publish(0, &[0.0], &[0.0]);

        assert_eq!(streams.senders.len(), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_recorder_thread_writes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let mut streams = OutputStreams::default();
        let rx = streams.subscribe(16);
        let handle = WavRecorder::create(&path, 48000).unwrap().spawn(rx);

        streams.publish(0, &[0.5; 64], &[-0.5; 64]);
        streams.publish(64, &[0.25; 64], &[-0.25; 64]);
        drop(streams);

        assert_eq!(handle.join().unwrap().unwrap(), 128);

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 256);
        assert_eq!(&samples[..2], &[0.5, -0.5]);
        assert_eq!(&samples[254..], &[0.25, -0.25]);
    }
}
