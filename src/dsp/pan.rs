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

//! Equal-power stereo panning.

use std::f32::consts::FRAC_PI_2;

/// Pans a stereo frame. `pan` runs from -1 (hard left) to 1 (hard right) and is clamped.
///
/// Centered input passes through untouched. Panning to one side folds the opposite channel
/// into it with an equal-power law.
pub fn pan_stereo(left: f32, right: f32, pan: f32) -> (f32, f32) {
    let pan = if pan.is_finite() {
        pan.clamp(-1.0, 1.0)
    } else {
        0.0
    };

    if pan <= 0.0 {
        let x = (pan + 1.0) * FRAC_PI_2;
        (left + right * x.cos(), right * x.sin())
    } else {
        let x = pan * FRAC_PI_2;
        (left * x.cos(), right + left * x.sin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-6 && (a.1 - b.1).abs() < 1e-6
    }

    #[test]
    fn test_center_is_identity() {
        assert!(approx(pan_stereo(0.3, -0.7, 0.0), (0.3, -0.7)));
    }

    #[test]
    fn test_hard_sides() {
        assert!(approx(pan_stereo(0.5, 0.5, -1.0), (1.0, 0.0)));
        assert!(approx(pan_stereo(0.5, 0.5, 1.0), (0.0, 1.0)));
        // Out of range is clamped.
        assert!(approx(pan_stereo(0.5, 0.5, 7.0), (0.0, 1.0)));
        assert!(approx(pan_stereo(0.5, 0.5, f32::NAN), (0.5, 0.5)));
    }
}
