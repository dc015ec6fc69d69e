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

//! Signal processing building blocks for the voice graph.
//!
//! Everything here runs sample by sample on the render thread.

pub mod delay;
pub mod filter;
pub mod lfo;
pub mod pan;
pub mod param;
pub mod reverb;
pub mod velocity;

pub use delay::{DelaySettings, FeedbackDelay};
pub use filter::{FilterSettings, FilterType, StereoBiquad};
pub use lfo::Lfo;
pub use pan::pan_stereo;
pub use param::AutomationParam;
pub use reverb::{ImpulseResponse, ReverbBus, ReverbSettings};
pub use velocity::VelocityCurve;
