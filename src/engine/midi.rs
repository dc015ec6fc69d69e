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

//! Raw MIDI input for the engine.

use midly::live::LiveEvent;
use midly::MidiMessage;
use tracing::debug;

use super::{NoteOptions, SampleEngine};

const CC_MOD_WHEEL: u8 = 1;
const CC_SUSTAIN: u8 = 64;
const CC_SOSTENUTO: u8 = 66;
const CC_ALL_SOUND_OFF: u8 = 120;
const CC_ALL_NOTES_OFF: u8 = 123;

/// Pedal values at or above this count as down.
const PEDAL_THRESHOLD: u8 = 64;

impl SampleEngine {
    /// Applies a raw MIDI message at the current clock position.
    ///
    /// Channels mapped with [`SampleEngine::set_channel_category`] play their category,
    /// the rest play from the whole store. Unparseable and unhandled messages are ignored.
    pub fn process_midi_event(&mut self, raw_event: &[u8]) {
        let event = match LiveEvent::parse(raw_event) {
            Ok(event) => event,
            Err(e) => {
                debug!(err = %e, "Ignoring unparseable MIDI event");
                return;
            }
        };

        let LiveEvent::Midi { channel, message } = event else {
            return;
        };
        // Channels are numbered 1-16 in configuration.
        let channel = channel.as_int() + 1;

        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                let options = NoteOptions {
                    category: self.channel_categories.get(&channel).cloned(),
                    ..Default::default()
                };
                self.note_on(key.as_int(), vel.as_int(), &options);
            }
            // Note on with zero velocity is a note off.
            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                self.note_off(key.as_int());
            }
            MidiMessage::Controller { controller, value } => {
                let value = value.as_int();
                match controller.as_int() {
                    CC_MOD_WHEEL => self.set_mod_depth(value as f32 / 127.0),
                    CC_SUSTAIN => self.set_sustain(value >= PEDAL_THRESHOLD),
                    CC_SOSTENUTO => self.set_sostenuto(value >= PEDAL_THRESHOLD),
                    CC_ALL_SOUND_OFF => self.stop_all_voices(true),
                    CC_ALL_NOTES_OFF => self.stop_all_voices(false),
                    other => debug!(channel, controller = other, value, "Unhandled controller"),
                }
            }
            other => debug!(channel, message = ?other, "Unhandled MIDI message"),
        }
    }
}
