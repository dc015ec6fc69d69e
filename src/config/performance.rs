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
use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;

use super::ConfigError;
use crate::engine::{MixOptions, NoteOptions};
use crate::samples::RoundRobinMode;

const DEFAULT_TAIL_SECS: f64 = 2.0;
const DEFAULT_VELOCITY: u8 = 100;

/// Something a performance does to the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum PerformanceAction {
    NoteOn {
        note: u8,
        velocity: u8,
        options: NoteOptions,
    },
    NoteOff {
        note: u8,
    },
    Sustain(bool),
    Sostenuto(bool),
    StopAll {
        immediate: bool,
    },
    ModDepth(f32),
}

/// An action and the time it happens at, in seconds from the start of the performance.
#[derive(Clone, Debug, PartialEq)]
pub struct TimedAction {
    pub time: f64,
    pub action: PerformanceAction,
}

/// A YAML representation of a single performance event.
#[derive(Deserialize, Clone, Debug)]
struct Event {
    time: f64,
    action: String,
    note: Option<u8>,
    velocity: Option<u8>,
    category: Option<String>,
    articulation: Option<String>,
    mic: Option<String>,
    round_robin: Option<String>,
    gain: Option<f32>,
    pan: Option<f32>,
    on: Option<bool>,
    immediate: Option<bool>,
    value: Option<f32>,
}

impl Event {
    fn to_timed_action(&self, index: usize) -> Result<TimedAction, ConfigError> {
        let field = |name: &str| format!("events[{index}].{name}");

        if !self.time.is_finite() || self.time < 0.0 {
            return Err(ConfigError::invalid(
                field("time"),
                format!("{} is not a non-negative time", self.time),
            ));
        }

        let note = || -> Result<u8, ConfigError> {
            match self.note {
                Some(note) if note <= 127 => Ok(note),
                Some(note) => Err(ConfigError::invalid(
                    field("note"),
                    format!("{note} is outside 0-127"),
                )),
                None => Err(ConfigError::invalid(
                    field("note"),
                    format!("required for {}", self.action),
                )),
            }
        };
        let on = || {
            self.on.ok_or_else(|| {
                ConfigError::invalid(field("on"), format!("required for {}", self.action))
            })
        };

        let action = match self.action.as_str() {
            "note_on" => {
                let velocity = self.velocity.unwrap_or(DEFAULT_VELOCITY);
                if velocity > 127 {
                    return Err(ConfigError::invalid(
                        field("velocity"),
                        format!("{velocity} is outside 0-127"),
                    ));
                }
                PerformanceAction::NoteOn {
                    note: note()?,
                    velocity,
                    options: self.note_options(),
                }
            }
            "note_off" => PerformanceAction::NoteOff { note: note()? },
            "sustain" => PerformanceAction::Sustain(on()?),
            "sostenuto" => PerformanceAction::Sostenuto(on()?),
            "stop_all" => PerformanceAction::StopAll {
                immediate: self.immediate.unwrap_or(false),
            },
            "mod_depth" => match self.value {
                Some(value) if value.is_finite() => PerformanceAction::ModDepth(value),
                _ => {
                    return Err(ConfigError::invalid(
                        field("value"),
                        "mod_depth needs a finite value",
                    ))
                }
            },
            other => {
                return Err(ConfigError::invalid(
                    field("action"),
                    format!("unknown action {other}"),
                ))
            }
        };

        Ok(TimedAction {
            time: self.time,
            action,
        })
    }

    fn note_options(&self) -> NoteOptions {
        let mix = match (self.gain, self.pan) {
            (None, None) => None,
            (gain, pan) => {
                let defaults = MixOptions::default();
                Some(MixOptions {
                    gain: gain.unwrap_or(defaults.gain),
                    pan: pan.unwrap_or(defaults.pan),
                })
            }
        };

        NoteOptions {
            category: self.category.clone(),
            articulation: self.articulation.clone(),
            mic: self.mic.clone(),
            round_robin: self.round_robin.as_deref().map(RoundRobinMode::from_name),
            mix,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
struct PerformanceFile {
    events: Vec<Event>,
    /// How long to keep rendering after the last event (default: 2s)
    tail_secs: Option<f64>,
}

/// A timed sequence of engine actions, ordered by time.
#[derive(Clone, Debug, PartialEq)]
pub struct Performance {
    events: Vec<TimedAction>,
    tail_secs: f64,
}

impl Performance {
    /// Reads and validates a performance file.
    pub fn deserialize(path: &Path) -> Result<Performance, ConfigError> {
        Performance::from_file(
            Config::builder()
                .add_source(File::from(path))
                .build()?
                .try_deserialize::<PerformanceFile>()?,
        )
    }

    /// Parses and validates a performance from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Performance, ConfigError> {
        Performance::from_file(
            Config::builder()
                .add_source(File::from_str(yaml, FileFormat::Yaml))
                .build()?
                .try_deserialize::<PerformanceFile>()?,
        )
    }

    /// Builds a performance from already-typed actions.
    pub fn new(mut events: Vec<TimedAction>, tail_secs: f64) -> Performance {
        events.retain(|event| event.time.is_finite() && event.time >= 0.0);
        // Stable, so simultaneous events keep their order.
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Performance {
            events,
            tail_secs: if tail_secs.is_finite() {
                tail_secs.max(0.0)
            } else {
                DEFAULT_TAIL_SECS
            },
        }
    }

    fn from_file(file: PerformanceFile) -> Result<Performance, ConfigError> {
        let tail_secs = file.tail_secs.unwrap_or(DEFAULT_TAIL_SECS);
        if !tail_secs.is_finite() || tail_secs < 0.0 {
            return Err(ConfigError::invalid(
                "tail_secs",
                format!("{tail_secs} is not a non-negative time"),
            ));
        }

        let events = file
            .events
            .iter()
            .enumerate()
            .map(|(index, event)| event.to_timed_action(index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Performance::new(events, tail_secs))
    }

    pub fn events(&self) -> &[TimedAction] {
        &self.events
    }

    pub fn tail_secs(&self) -> f64 {
        self.tail_secs
    }

    /// Time of the last event plus the tail.
    pub fn duration(&self) -> f64 {
        self.events.last().map(|event| event.time).unwrap_or(0.0) + self.tail_secs
    }
}
