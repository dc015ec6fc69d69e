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

//! A zone-mapped sample playback engine.
//!
//! Samples are grouped by category and articulation, spread across the keyboard by their root
//! notes and layered by velocity. [`engine::SampleEngine`] picks a zone for each note, builds
//! a voice with its own envelope, filter, delay and pan, and mixes everything down to stereo
//! with a shared reverb bus. Sustain, sostenuto, glide and panic stops behave the way a
//! keyboard player expects.

pub mod audio;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod naming;
pub mod samples;
#[cfg(test)]
mod testutil;
