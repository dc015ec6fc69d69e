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

//! Feedback delay for the per-voice echo send.

use serde::{Deserialize, Serialize};

/// Longest supported delay time in seconds.
pub const MAX_DELAY_SECS: f32 = 2.0;

/// Echo settings captured by each voice when it starts.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct DelaySettings {
    /// Delay time in seconds.
    pub time: f32,
    pub feedback: f32,
    /// Level of the echoes mixed back into the master bus.
    pub mix: f32,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            time: 0.3,
            feedback: 0.3,
            mix: 0.0,
        }
    }
}

/// A stereo delay line whose output is fed back into its input.
///
/// The ring holds exactly one delay period, so the slot about to be overwritten is the
/// sample written one period ago.
pub struct FeedbackDelay {
    left: Vec<f32>,
    right: Vec<f32>,
    write_pos: usize,
    feedback: f32,
}

impl FeedbackDelay {
    pub fn new(settings: &DelaySettings, sample_rate: u32) -> Self {
        let time = settings.time.clamp(0.0, MAX_DELAY_SECS);
        let delay_samples = ((time * sample_rate as f32).round() as usize).max(1);
        Self {
            left: vec![0.0; delay_samples],
            right: vec![0.0; delay_samples],
            write_pos: 0,
            feedback: settings.feedback,
        }
    }

    /// Pushes one frame in and returns the delayed (wet) frame.
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let pos = self.write_pos;
        let delayed = (self.left[pos], self.right[pos]);
        self.left[pos] = left + delayed.0 * self.feedback;
        self.right[pos] = right + delayed.1 * self.feedback;
        self.write_pos = (pos + 1) % self.left.len();
        delayed
    }

    pub fn delay_samples(&self) -> usize {
        self.left.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delay(time: f32, feedback: f32) -> FeedbackDelay {
        FeedbackDelay::new(
            &DelaySettings {
                time,
                feedback,
                mix: 1.0,
            },
            1000,
        )
    }

    #[test]
    fn test_impulse_echoes() {
        let mut line = delay(0.01, 0.5);
        assert_eq!(line.delay_samples(), 10);

        let mut output = Vec::new();
        output.push(line.process(1.0, -1.0));
        for _ in 0..30 {
            output.push(line.process(0.0, 0.0));
        }

        assert_eq!(output[0], (0.0, 0.0));
        assert_eq!(output[10], (1.0, -1.0));
        assert_eq!(output[20], (0.5, -0.5));
        assert_eq!(output[30], (0.25, -0.25));
        assert_eq!(output[15], (0.0, 0.0));
    }

    #[test]
    fn test_time_is_clamped() {
        assert_eq!(delay(10.0, 0.0).delay_samples(), 2000);
        assert_eq!(delay(0.0, 0.0).delay_samples(), 1);
    }
}
