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

//! Convolution reverb shared by every voice.
//!
//! The impulse response is synthetic: stereo white noise under a power-law decay. It is
//! generated once, on the first voice that sends to the reverb, and reused after that.

use fft_convolver::FFTConvolver;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Overall gain applied to a normalized impulse response.
const GAIN_CALIBRATION: f32 = 0.00125;

/// The sample rate the calibration gain was chosen for.
const CALIBRATION_SAMPLE_RATE: f32 = 44100.0;

/// Shape of the generated impulse response.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct ReverbSettings {
    /// Length of the tail in seconds.
    pub length_secs: f32,
    /// Exponent of the amplitude decay. Higher values die away faster.
    pub decay: f32,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            length_secs: 2.5,
            decay: 2.0,
        }
    }
}

/// A stereo impulse response.
#[derive(Clone, Debug)]
pub struct ImpulseResponse {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl ImpulseResponse {
    /// Generates decaying noise: `(noise) * (1 - i / len) ^ decay` for each channel.
    pub fn generate<R: Rng>(settings: &ReverbSettings, sample_rate: u32, rng: &mut R) -> Self {
        let length = ((settings.length_secs.max(0.01) * sample_rate as f32) as usize).max(1);
        let decay = settings.decay.max(0.0);

        let channel = |rng: &mut R| -> Vec<f32> {
            (0..length)
                .map(|i| {
                    let envelope = (1.0 - i as f32 / length as f32).powf(decay);
                    (rng.gen::<f32>() * 2.0 - 1.0) * envelope
                })
                .collect()
        };
        let left = channel(rng);
        let right = channel(rng);

        let mut ir = Self { left, right };
        ir.normalize(sample_rate);
        ir
    }

    /// Scales the response to a fixed power so that loudness does not depend on the tail's
    /// length or the noise that was drawn.
    fn normalize(&mut self, sample_rate: u32) {
        let count = (self.left.len() + self.right.len()) as f32;
        let power: f32 = self
            .left
            .iter()
            .chain(self.right.iter())
            .map(|s| s * s)
            .sum::<f32>()
            / count;
        let rms = power.sqrt();
        if rms <= f32::EPSILON || !rms.is_finite() {
            return;
        }

        let scale = GAIN_CALIBRATION * (CALIBRATION_SAMPLE_RATE / sample_rate as f32) / rms;
        for sample in self.left.iter_mut().chain(self.right.iter_mut()) {
            *sample *= scale;
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }
}

/// A stereo convolution bus.
pub struct ReverbBus {
    left: FFTConvolver<f32>,
    right: FFTConvolver<f32>,
    enabled: bool,
}

impl ReverbBus {
    pub fn new(ir: &ImpulseResponse, block_size: usize) -> Self {
        let mut left = FFTConvolver::<f32>::default();
        let mut right = FFTConvolver::<f32>::default();
        let enabled = left.init(block_size, ir.left()).is_ok()
            && right.init(block_size, ir.right()).is_ok();

        if enabled {
            info!(
                frames = ir.len(),
                block_size, "Reverb impulse response loaded"
            );
        } else {
            warn!(
                frames = ir.len(),
                block_size, "Failed to initialize reverb, output will be dry"
            );
        }

        Self {
            left,
            right,
            enabled,
        }
    }

    /// Convolves the send buffers into the wet buffers. All four must be the same length.
    pub fn process(
        &mut self,
        send_left: &[f32],
        send_right: &[f32],
        wet_left: &mut [f32],
        wet_right: &mut [f32],
    ) {
        if !self.enabled {
            wet_left.fill(0.0);
            wet_right.fill(0.0);
            return;
        }

        let processed = self.left.process(send_left, wet_left).is_ok()
            && self.right.process(send_right, wet_right).is_ok();
        if !processed {
            warn!("Reverb convolution failed, disabling reverb");
            self.enabled = false;
            wet_left.fill(0.0);
            wet_right.fill(0.0);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn short_settings() -> ReverbSettings {
        ReverbSettings {
            length_secs: 0.1,
            decay: 2.0,
        }
    }

    #[test]
    fn test_impulse_response_decays() {
        let mut rng = StdRng::seed_from_u64(3);
        let ir = ImpulseResponse::generate(&ReverbSettings::default(), 48000, &mut rng);
        assert_eq!(ir.len(), 120000);

        let energy = |data: &[f32]| data.iter().map(|s| s * s).sum::<f32>();
        let head = energy(&ir.left()[..12000]);
        let tail = energy(&ir.left()[108000..]);
        assert!(head > tail * 100.0);
        assert_ne!(&ir.left()[..100], &ir.right()[..100]);
    }

    #[test]
    fn test_impulse_response_is_seeded() {
        let a = ImpulseResponse::generate(&short_settings(), 48000, &mut StdRng::seed_from_u64(9));
        let b = ImpulseResponse::generate(&short_settings(), 48000, &mut StdRng::seed_from_u64(9));
        assert_eq!(a.left(), b.left());
    }

    #[test]
    fn test_bus_convolves_impulse() {
        let ir = ImpulseResponse::generate(&short_settings(), 48000, &mut StdRng::seed_from_u64(1));
        let mut bus = ReverbBus::new(&ir, 128);
        assert!(bus.is_enabled());

        let mut send = vec![0.0f32; 128];
        send[0] = 1.0;
        let mut wet_left = vec![0.0f32; 128];
        let mut wet_right = vec![0.0f32; 128];
        bus.process(&send, &send, &mut wet_left, &mut wet_right);

        for i in 0..128 {
            assert!((wet_left[i] - ir.left()[i]).abs() < 1e-4);
            assert!((wet_right[i] - ir.right()[i]).abs() < 1e-4);
        }
    }
}
