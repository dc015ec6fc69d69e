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

//! Second-order filters for the per-voice tone stage.

use std::f32::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// The response of a voice filter.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Allpass,
}

impl FilterType {
    /// Parses a filter type name, falling back to lowpass for anything unrecognized.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "lowpass" => FilterType::Lowpass,
            "highpass" => FilterType::Highpass,
            "bandpass" => FilterType::Bandpass,
            "notch" => FilterType::Notch,
            "allpass" => FilterType::Allpass,
            other => {
                warn!(filter = other, "Unknown filter type, using lowpass");
                FilterType::Lowpass
            }
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterType::Lowpass => "lowpass",
            FilterType::Highpass => "highpass",
            FilterType::Bandpass => "bandpass",
            FilterType::Notch => "notch",
            FilterType::Allpass => "allpass",
        };
        f.write_str(name)
    }
}

/// Filter state captured by each voice when it starts.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct FilterSettings {
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    pub cutoff: f32,
    pub q: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            filter_type: FilterType::Lowpass,
            cutoff: 20000.0,
            q: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    /// Computes normalized biquad coefficients from the audio EQ cookbook formulas.
    fn new(settings: &FilterSettings, sample_rate: u32) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        let cutoff = settings.cutoff.min(nyquist * 0.99).max(1.0);
        let q = settings.q.max(0.0001);

        let w0 = 2.0 * PI * cutoff / sample_rate as f32;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2) = match settings.filter_type {
            FilterType::Lowpass => ((1.0 - cos_w0) / 2.0, 1.0 - cos_w0, (1.0 - cos_w0) / 2.0),
            FilterType::Highpass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
            ),
            FilterType::Bandpass => (alpha, 0.0, -alpha),
            FilterType::Notch => (1.0, -2.0 * cos_w0, 1.0),
            FilterType::Allpass => (1.0 - alpha, -2.0 * cos_w0, 1.0 + alpha),
        };

        let a0 = 1.0 + alpha;
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha) / a0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct ChannelState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl ChannelState {
    fn process(&mut self, c: &Coefficients, x: f32) -> f32 {
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// A biquad filter running on a stereo pair.
#[derive(Clone, Debug)]
pub struct StereoBiquad {
    coefficients: Coefficients,
    left: ChannelState,
    right: ChannelState,
}

impl StereoBiquad {
    pub fn new(settings: &FilterSettings, sample_rate: u32) -> Self {
        Self {
            coefficients: Coefficients::new(settings, sample_rate),
            left: ChannelState::default(),
            right: ChannelState::default(),
        }
    }

    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        (
            self.left.process(&self.coefficients, left),
            self.right.process(&self.coefficients, right),
        )
    }
}
