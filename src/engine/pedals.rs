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

//! Performance state: where every voice lives and what the pedals are doing.
//!
//! A voice is in exactly one place. Voices for keys that are down sit in a held slot, voices
//! whose key came up while a pedal held them sit in a sustained slot, and released voices sit
//! in the releasing list until the sweep drops them.

use std::collections::{HashMap, HashSet};

use super::voice::Voice;

/// A bucket in the voice map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoiceSlot {
    /// The key is down.
    Held(u8),
    /// The key is up but a pedal keeps the voice sounding.
    Sustained(u8),
}

/// Voices that are held or parked, keyed by slot, plus voices that are fading out.
#[derive(Debug, Default)]
pub(crate) struct VoiceMap {
    slots: HashMap<VoiceSlot, Vec<Voice>>,
    releasing: Vec<Voice>,
}

impl VoiceMap {
    pub fn push(&mut self, slot: VoiceSlot, voice: Voice) {
        self.slots.entry(slot).or_default().push(voice);
    }

    /// Removes the most recently pushed voice in the slot.
    pub fn pop(&mut self, slot: VoiceSlot) -> Option<Voice> {
        let voices = self.slots.get_mut(&slot)?;
        let voice = voices.pop();
        if voices.is_empty() {
            self.slots.remove(&slot);
        }
        voice
    }

    /// Removes every voice in every sustained slot.
    pub fn drain_sustained(&mut self) -> Vec<Voice> {
        let keys: Vec<VoiceSlot> = self
            .slots
            .keys()
            .filter(|slot| matches!(slot, VoiceSlot::Sustained(_)))
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|slot| self.slots.remove(&slot))
            .flatten()
            .collect()
    }

    /// Removes every held and sustained voice.
    pub fn drain_all(&mut self) -> Vec<Voice> {
        self.slots.drain().flat_map(|(_, voices)| voices).collect()
    }

    /// Removes the oldest held or sustained voice.
    pub fn take_oldest(&mut self) -> Option<Voice> {
        let (slot, index) = self
            .slots
            .iter()
            .flat_map(|(slot, voices)| voices.iter().enumerate().map(move |(i, v)| (*slot, i, v.id())))
            .min_by_key(|(_, _, id)| *id)
            .map(|(slot, index, _)| (slot, index))?;

        let voices = self.slots.get_mut(&slot)?;
        let voice = voices.remove(index);
        if voices.is_empty() {
            self.slots.remove(&slot);
        }
        Some(voice)
    }

    pub fn push_releasing(&mut self, voice: Voice) {
        self.releasing.push(voice);
    }

    /// The oldest releasing voice that has not already been cut short.
    pub fn oldest_unstolen_releasing(&mut self) -> Option<&mut Voice> {
        self.releasing
            .iter_mut()
            .filter(|v| !v.is_stolen())
            .min_by_key(|v| v.id())
    }

    pub fn releasing_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.releasing.iter_mut()
    }

    /// Keys with at least one held voice.
    pub fn held_keys(&self) -> HashSet<u8> {
        self.slots
            .iter()
            .filter_map(|(slot, voices)| match slot {
                VoiceSlot::Held(key) if !voices.is_empty() => Some(*key),
                _ => None,
            })
            .collect()
    }

    /// Every voice, in no particular order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.slots
            .values_mut()
            .flat_map(|voices| voices.iter_mut())
            .chain(self.releasing.iter_mut())
    }

    /// Held and sustained voices.
    pub fn mapped(&self) -> impl Iterator<Item = &Voice> {
        self.slots.values().flatten()
    }

    pub fn mapped_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.slots.values_mut().flatten()
    }

    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|(slot, _)| matches!(slot, VoiceSlot::Held(_)))
            .map(|(_, voices)| voices.len())
            .sum()
    }

    pub fn parked_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|(slot, _)| matches!(slot, VoiceSlot::Sustained(_)))
            .map(|(_, voices)| voices.len())
            .sum()
    }

    pub fn releasing_count(&self) -> usize {
        self.releasing.len()
    }

    /// Voices that count against the voice cap.
    pub fn sounding_count(&self) -> usize {
        self.active_count()
            + self.parked_count()
            + self.releasing.iter().filter(|v| !v.is_stolen()).count()
    }

    /// Number of slots in the map, empty or not.
    #[cfg(test)]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Drops finished voices. Held and sustained voices only finish when their sample runs
    /// out, releasing voices also finish when their stop time passes.
    pub fn sweep(&mut self, now: f64) -> usize {
        let before = self.releasing.len() + self.mapped().count();
        self.releasing.retain(|v| !v.is_done(now));
        self.slots.retain(|_, voices| {
            voices.retain(|v| !v.is_done(now));
            !voices.is_empty()
        });
        before - (self.releasing.len() + self.mapped().count())
    }
}

/// Sustain and sostenuto pedal state.
#[derive(Debug, Default)]
pub(crate) struct PedalState {
    pub sustain: bool,
    pub sostenuto: bool,
    /// Keys that were down when sostenuto engaged.
    pub sostenuto_keys: HashSet<u8>,
}

impl PedalState {
    /// Whether a key coming up should park its voice instead of releasing it.
    pub fn holds(&self, key: u8) -> bool {
        self.sustain || (self.sostenuto && self.sostenuto_keys.contains(&key))
    }
}
