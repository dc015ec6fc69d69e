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

//! Velocity response curves.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Quietest peak gain any velocity maps to.
pub const MIN_PEAK: f32 = 0.05;

/// Shapes how MIDI velocity maps onto a voice's peak gain.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VelocityCurve {
    #[default]
    Linear,
    Soft,
    Hard,
    Log,
    Exp,
}

impl VelocityCurve {
    pub const ALL: [VelocityCurve; 5] = [
        VelocityCurve::Linear,
        VelocityCurve::Soft,
        VelocityCurve::Hard,
        VelocityCurve::Log,
        VelocityCurve::Exp,
    ];

    /// Parses a curve name, falling back to linear for anything unrecognized.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "linear" => VelocityCurve::Linear,
            "soft" => VelocityCurve::Soft,
            "hard" => VelocityCurve::Hard,
            "log" => VelocityCurve::Log,
            "exp" => VelocityCurve::Exp,
            other => {
                warn!(curve = other, "Unknown velocity curve, using linear");
                VelocityCurve::Linear
            }
        }
    }

    /// Shapes a normalized velocity in [0, 1].
    pub fn shape(&self, v: f32) -> f32 {
        match self {
            VelocityCurve::Linear => v,
            VelocityCurve::Soft => v.sqrt(),
            VelocityCurve::Hard => v * v,
            VelocityCurve::Log => (1.0 + 9.0 * v).ln() / 10f32.ln(),
            VelocityCurve::Exp => (v.exp() - 1.0) / (std::f32::consts::E - 1.0),
        }
    }

    /// The envelope peak for a MIDI velocity.
    pub fn peak_gain(&self, velocity: u8) -> f32 {
        let v = velocity.min(127) as f32 / 127.0;
        self.shape(v).clamp(MIN_PEAK, 1.0)
    }
}

impl fmt::Display for VelocityCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VelocityCurve::Linear => "linear",
            VelocityCurve::Soft => "soft",
            VelocityCurve::Hard => "hard",
            VelocityCurve::Log => "log",
            VelocityCurve::Exp => "exp",
        };
        f.write_str(name)
    }
}
