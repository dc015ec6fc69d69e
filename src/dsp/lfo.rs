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

//! The shared modulation oscillator.

use std::f64::consts::TAU;

pub const MIN_RATE_HZ: f32 = 0.1;
pub const MAX_RATE_HZ: f32 = 12.0;

/// A sine low-frequency oscillator. One instance per engine drives every voice's tremolo.
#[derive(Clone, Debug)]
pub struct Lfo {
    rate: f32,
    phase: f64,
    sample_rate: u32,
}

impl Lfo {
    pub fn new(rate: f32, sample_rate: u32) -> Self {
        Self {
            rate: rate.clamp(MIN_RATE_HZ, MAX_RATE_HZ),
            phase: 0.0,
            sample_rate,
        }
    }

    /// Changes the rate without resetting the phase, so there is no discontinuity.
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate.clamp(MIN_RATE_HZ, MAX_RATE_HZ);
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Returns the current value in [-1, 1] and advances one frame.
    pub fn next_value(&mut self) -> f32 {
        let value = (self.phase * TAU).sin() as f32;
        self.phase = (self.phase + self.rate as f64 / self.sample_rate as f64).fract();
        value
    }

    /// Fills `out` with consecutive values.
    pub fn fill(&mut self, out: &mut [f32]) {
        for value in out.iter_mut() {
            *value = self.next_value();
        }
    }
}
