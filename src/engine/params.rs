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

//! The engine parameter state.
//!
//! New voices read these values when they start and keep what they captured. The one
//! exception is the modulation depth, which the engine pushes to every active voice when it
//! changes. Setters never fail: out-of-range input is clamped, non-finite input is ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dsp::delay::MAX_DELAY_SECS;
use crate::dsp::lfo::{MAX_RATE_HZ, MIN_RATE_HZ};
use crate::dsp::{DelaySettings, FilterSettings, FilterType, VelocityCurve};
use crate::samples::RoundRobinMode;

pub const MAX_TRANSPOSE: i32 = 48;
pub const MAX_GLIDE_SECS: f32 = 10.0;

/// Attack, decay, sustain and release. Times are in seconds, sustain is a level.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.8,
            release: 0.3,
        }
    }
}

impl Envelope {
    fn clamped(self) -> Self {
        Self {
            attack: self.attack.clamp(0.001, 10.0),
            decay: self.decay.clamp(0.001, 10.0),
            sustain: self.sustain.clamp(0.0, 1.0),
            release: self.release.clamp(0.005, 30.0),
        }
    }

    fn is_finite(&self) -> bool {
        [self.attack, self.decay, self.sustain, self.release]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Which articulation, mic and round-robin mode a category plays with when a note does not
/// override them.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct CategorySelection {
    pub articulation: Option<String>,
    pub mic: Option<String>,
    pub round_robin: RoundRobinMode,
}

/// Process-wide playback parameters.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineParameters {
    master_gain: f32,
    envelope: Envelope,
    filter: FilterSettings,
    delay: DelaySettings,
    reverb_mix: f32,
    velocity_curve: VelocityCurve,
    transpose: i32,
    glide_time: f32,
    mod_rate: f32,
    mod_depth: f32,
    /// Selection for notes played without a category.
    selection: CategorySelection,
    categories: HashMap<String, CategorySelection>,
}

impl Default for EngineParameters {
    fn default() -> Self {
        Self {
            master_gain: 0.8,
            envelope: Envelope::default(),
            filter: FilterSettings::default(),
            delay: DelaySettings::default(),
            reverb_mix: 0.0,
            velocity_curve: VelocityCurve::Linear,
            transpose: 0,
            glide_time: 0.0,
            mod_rate: 5.0,
            mod_depth: 0.0,
            selection: CategorySelection::default(),
            categories: HashMap::new(),
        }
    }
}

/// Returns `value` if it is finite, otherwise logs and returns `None`.
fn finite(name: &'static str, value: f32) -> Option<f32> {
    if value.is_finite() {
        Some(value)
    } else {
        warn!(parameter = name, value, "Ignoring non-finite parameter value");
        None
    }
}

impl EngineParameters {
    /// Runs every value through its setter, so deserialized parameters obey the same bounds
    /// as runtime changes.
    pub fn clamped(self) -> Self {
        let mut params = Self::default();
        params.set_master_gain(self.master_gain);
        params.set_envelope(self.envelope);
        params.set_filter(self.filter);
        params.set_delay(self.delay);
        params.set_reverb_mix(self.reverb_mix);
        params.set_velocity_curve(self.velocity_curve);
        params.set_transpose(self.transpose);
        params.set_glide_time(self.glide_time);
        params.set_mod_rate(self.mod_rate);
        params.set_mod_depth(self.mod_depth);
        params.selection = self.selection;
        params.categories = self.categories;
        params
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        if let Some(gain) = finite("master_gain", gain) {
            self.master_gain = gain.clamp(0.0, 1.0);
        }
    }

    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    pub fn set_envelope(&mut self, envelope: Envelope) {
        if envelope.is_finite() {
            self.envelope = envelope.clamped();
        } else {
            warn!(?envelope, "Ignoring non-finite envelope");
        }
    }

    pub fn filter(&self) -> FilterSettings {
        self.filter
    }

    pub fn set_filter(&mut self, filter: FilterSettings) {
        let (Some(cutoff), Some(q)) = (
            finite("filter_cutoff", filter.cutoff),
            finite("filter_q", filter.q),
        ) else {
            return;
        };
        self.filter = FilterSettings {
            filter_type: filter.filter_type,
            cutoff: cutoff.clamp(10.0, 20000.0),
            q: q.clamp(0.0001, 30.0),
        };
    }

    /// Sets the filter type by name, falling back to lowpass.
    pub fn set_filter_type_name(&mut self, name: &str) {
        self.filter.filter_type = FilterType::from_name(name);
    }

    pub fn delay(&self) -> DelaySettings {
        self.delay
    }

    pub fn set_delay(&mut self, delay: DelaySettings) {
        let (Some(time), Some(feedback), Some(mix)) = (
            finite("delay_time", delay.time),
            finite("delay_feedback", delay.feedback),
            finite("delay_mix", delay.mix),
        ) else {
            return;
        };
        self.delay = DelaySettings {
            time: time.clamp(0.001, MAX_DELAY_SECS),
            feedback: feedback.clamp(0.0, 0.95),
            mix: mix.clamp(0.0, 1.0),
        };
    }

    pub fn reverb_mix(&self) -> f32 {
        self.reverb_mix
    }

    pub fn set_reverb_mix(&mut self, mix: f32) {
        if let Some(mix) = finite("reverb_mix", mix) {
            self.reverb_mix = mix.clamp(0.0, 1.0);
        }
    }

    pub fn velocity_curve(&self) -> VelocityCurve {
        self.velocity_curve
    }

    pub fn set_velocity_curve(&mut self, curve: VelocityCurve) {
        self.velocity_curve = curve;
    }

    /// Sets the velocity curve by name, falling back to linear.
    pub fn set_velocity_curve_name(&mut self, name: &str) {
        self.velocity_curve = VelocityCurve::from_name(name);
    }

    pub fn transpose(&self) -> i32 {
        self.transpose
    }

    pub fn set_transpose(&mut self, semitones: i32) {
        self.transpose = semitones.clamp(-MAX_TRANSPOSE, MAX_TRANSPOSE);
    }

    pub fn glide_time(&self) -> f32 {
        self.glide_time
    }

    pub fn set_glide_time(&mut self, seconds: f32) {
        if let Some(seconds) = finite("glide_time", seconds) {
            self.glide_time = seconds.clamp(0.0, MAX_GLIDE_SECS);
        }
    }

    pub fn mod_rate(&self) -> f32 {
        self.mod_rate
    }

    pub fn set_mod_rate(&mut self, rate: f32) {
        if let Some(rate) = finite("mod_rate", rate) {
            self.mod_rate = rate.clamp(MIN_RATE_HZ, MAX_RATE_HZ);
        }
    }

    pub fn mod_depth(&self) -> f32 {
        self.mod_depth
    }

    /// Sets the modulation depth. Values above 1 are read as a 0-127 controller value.
    pub fn set_mod_depth(&mut self, depth: f32) {
        if let Some(depth) = finite("mod_depth", depth) {
            let depth = if depth > 1.0 { depth / 127.0 } else { depth };
            self.mod_depth = depth.clamp(0.0, 1.0);
        }
    }

    /// The selection that applies to notes in `category`.
    pub fn selection(&self, category: Option<&str>) -> CategorySelection {
        match category {
            None => self.selection.clone(),
            Some(category) => self.categories.get(category).cloned().unwrap_or_default(),
        }
    }

    fn selection_mut(&mut self, category: Option<&str>) -> &mut CategorySelection {
        match category {
            None => &mut self.selection,
            Some(category) => self.categories.entry(category.to_string()).or_default(),
        }
    }

    pub fn set_articulation(&mut self, category: Option<&str>, articulation: Option<String>) {
        debug!(?category, ?articulation, "Articulation selected");
        self.selection_mut(category).articulation = articulation;
    }

    pub fn set_mic(&mut self, category: Option<&str>, mic: Option<String>) {
        debug!(?category, ?mic, "Mic selected");
        self.selection_mut(category).mic = mic;
    }

    pub fn set_round_robin_mode(&mut self, category: Option<&str>, mode: RoundRobinMode) {
        self.selection_mut(category).round_robin = mode;
    }

    /// Sets the round-robin mode by name, falling back to cycle.
    pub fn set_round_robin_mode_name(&mut self, category: Option<&str>, name: &str) {
        self.set_round_robin_mode(category, RoundRobinMode::from_name(name));
    }
}
