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

//! Zone resolution: picking the sample to play for a note.
//!
//! Resolution is two-tiered. First the exact zone: samples whose note and velocity ranges
//! contain the played note, filtered by category, articulation and mic. Among those, the
//! samples nearest in pitch are tied candidates and the round-robin mode picks one. If no
//! sample covers the note, the nearest-pitch sample in the category (or the whole store)
//! plays instead, so a note never goes silent while any sample exists.

use std::collections::HashMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::store::Sample;

/// How tied candidates are chosen between.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundRobinMode {
    /// Always play the lowest round-robin slot.
    Off,
    /// Pick uniformly at random.
    Random,
    /// Step through the round-robin slots in order, wrapping around.
    #[default]
    Cycle,
}

impl RoundRobinMode {
    /// Parses a mode name, falling back to `Cycle` for anything unrecognized.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "off" => RoundRobinMode::Off,
            "random" => RoundRobinMode::Random,
            "cycle" => RoundRobinMode::Cycle,
            other => {
                warn!(mode = other, "Unknown round-robin mode, using cycle");
                RoundRobinMode::Cycle
            }
        }
    }
}

impl fmt::Display for RoundRobinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundRobinMode::Off => "off",
            RoundRobinMode::Random => "random",
            RoundRobinMode::Cycle => "cycle",
        };
        f.write_str(name)
    }
}

/// What to resolve. `None` filters are wildcards.
#[derive(Clone, Copy, Debug)]
pub struct ResolveRequest<'a> {
    pub midi: u8,
    pub velocity: u8,
    pub category: Option<&'a str>,
    pub articulation: Option<&'a str>,
    pub mic: Option<&'a str>,
    pub mode: RoundRobinMode,
}

impl<'a> ResolveRequest<'a> {
    /// A category-agnostic request with no articulation or mic filter in cycle mode.
    pub fn new(midi: u8, velocity: u8) -> Self {
        Self {
            midi,
            velocity,
            category: None,
            articulation: None,
            mic: None,
            mode: RoundRobinMode::default(),
        }
    }

    pub fn category(mut self, category: Option<&'a str>) -> Self {
        self.category = category;
        self
    }

    pub fn articulation(mut self, articulation: Option<&'a str>) -> Self {
        self.articulation = articulation;
        self
    }

    pub fn mic(mut self, mic: Option<&'a str>) -> Self {
        self.mic = mic;
        self
    }

    pub fn mode(mut self, mode: RoundRobinMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Identifies one round-robin rotation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct RoundRobinKey {
    category: Option<String>,
    articulation: Option<String>,
    mic: Option<String>,
    root_midi: u8,
    vel_low: u8,
    vel_high: u8,
}

/// Picks samples for notes and keeps the round-robin rotation state.
pub struct ZoneResolver {
    /// Last position in the sorted round-robin slots, per rotation.
    counters: HashMap<RoundRobinKey, usize>,
    rng: StdRng,
}

impl ZoneResolver {
    /// Creates a resolver. A seed makes random round-robin reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            counters: HashMap::new(),
            rng: match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
        }
    }

    /// Resolves the sample to play, or `None` only when nothing in scope exists at all.
    pub fn resolve<'s>(
        &mut self,
        samples: &'s [Sample],
        request: &ResolveRequest,
    ) -> Option<&'s Sample> {
        let in_category = |s: &&Sample| request.category.map_or(true, |c| s.category() == c);

        let mut candidates: Vec<&Sample> = samples
            .iter()
            .filter(in_category)
            .filter(|s| s.contains(request.midi, request.velocity))
            .filter(|s| request.articulation.map_or(true, |a| s.articulation() == Some(a)))
            .filter(|s| request.mic.map_or(true, |m| s.mic() == Some(m)))
            .collect();

        if candidates.is_empty() {
            let fallback = samples
                .iter()
                .filter(in_category)
                .min_by_key(|s| (s.distance(request.midi), s.rr_index(), s.id()));
            if let Some(sample) = fallback {
                debug!(
                    midi = request.midi,
                    velocity = request.velocity,
                    sample = sample.name(),
                    "No zone covers note, using nearest root"
                );
            }
            return fallback;
        }

        candidates.sort_by_key(|s| (s.distance(request.midi), s.rr_index(), s.id()));
        let nearest = candidates[0].distance(request.midi);
        candidates.retain(|s| s.distance(request.midi) == nearest);

        if candidates.len() == 1 {
            return Some(candidates[0]);
        }

        let chosen = match request.mode {
            RoundRobinMode::Off => candidates[0],
            RoundRobinMode::Random => candidates[self.rng.gen_range(0..candidates.len())],
            RoundRobinMode::Cycle => self.next_in_cycle(&candidates, request),
        };
        Some(chosen)
    }

    /// Advances the rotation for the tied candidates and returns the sample in the new slot.
    fn next_in_cycle<'s>(&mut self, tied: &[&'s Sample], request: &ResolveRequest) -> &'s Sample {
        let first = tied[0];
        let (vel_low, vel_high) = first.velocity_range();
        let key = RoundRobinKey {
            category: request.category.map(str::to_string),
            articulation: request.articulation.map(str::to_string),
            mic: request.mic.map(str::to_string),
            root_midi: first.root_midi(),
            vel_low,
            vel_high,
        };

        let mut slots: Vec<u32> = tied.iter().map(|s| s.rr_index()).collect();
        slots.sort_unstable();
        slots.dedup();

        let counter = self.counters.entry(key).or_insert(0);
        *counter = (*counter + 1) % slots.len();
        let slot = slots[*counter];

        tied.iter()
            .find(|s| s.rr_index() == slot)
            .copied()
            .unwrap_or(first)
    }

    /// Forgets every rotation so the next cycle starts from the beginning.
    pub fn reset_round_robin(&mut self) {
        self.counters.clear();
        debug!("Round-robin counters reset");
    }
}

impl fmt::Debug for ZoneResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoneResolver")
            .field("rotations", &self.counters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::store::SampleMetadata;

    fn sample(id: u64, metadata: SampleMetadata, range: (u8, u8)) -> Sample {
        Sample::for_test(id, metadata, range)
    }

    fn round_robin_set() -> Vec<Sample> {
        (1..=3)
            .map(|rr| {
                sample(
                    rr as u64,
                    SampleMetadata::new(format!("rr{}", rr), 60)
                        .with_category("Piano")
                        .with_rr_index(rr),
                    (0, 127),
                )
            })
            .collect()
    }

    #[test]
    fn test_exact_zone_preferred() {
        let samples = vec![
            sample(1, SampleMetadata::new("low", 48), (0, 54)),
            sample(2, SampleMetadata::new("mid", 60), (55, 66)),
            sample(3, SampleMetadata::new("high", 72), (67, 127)),
        ];
        let mut resolver = ZoneResolver::new(Some(1));

        for (midi, expected) in [(0, "low"), (54, "low"), (55, "mid"), (66, "mid"), (90, "high")] {
            let resolved = resolver
                .resolve(&samples, &ResolveRequest::new(midi, 100))
                .unwrap();
            assert_eq!(resolved.name(), expected, "note {}", midi);
            assert!(resolved.contains(midi, 100));
        }
    }

    #[test]
    fn test_velocity_layers() {
        let samples = vec![
            sample(
                1,
                SampleMetadata::new("soft", 60).with_velocity_range(0, 63),
                (0, 127),
            ),
            sample(
                2,
                SampleMetadata::new("loud", 60).with_velocity_range(64, 127),
                (0, 127),
            ),
        ];
        let mut resolver = ZoneResolver::new(Some(1));

        let soft = resolver.resolve(&samples, &ResolveRequest::new(60, 20));
        let loud = resolver.resolve(&samples, &ResolveRequest::new(60, 64));
        assert_eq!(soft.map(|s| s.name()), Some("soft"));
        assert_eq!(loud.map(|s| s.name()), Some("loud"));
    }

    #[test]
    fn test_nearest_pitch_fallback() {
        let samples = vec![sample(1, SampleMetadata::new("c4", 60), (48, 72))];
        let mut resolver = ZoneResolver::new(Some(1));

        let resolved = resolver.resolve(&samples, &ResolveRequest::new(90, 100));
        assert_eq!(resolved.map(|s| s.name()), Some("c4"));
    }

    #[test]
    fn test_fallback_picks_nearest_root() {
        let samples = vec![
            sample(
                1,
                SampleMetadata::new("c3", 48).with_velocity_range(0, 10),
                (0, 54),
            ),
            sample(
                2,
                SampleMetadata::new("c5", 72).with_velocity_range(0, 10),
                (55, 127),
            ),
        ];
        let mut resolver = ZoneResolver::new(Some(1));

        // Velocity 100 is outside every zone.
        let resolved = resolver.resolve(&samples, &ResolveRequest::new(70, 100));
        assert_eq!(resolved.map(|s| s.name()), Some("c5"));
        let resolved = resolver.resolve(&samples, &ResolveRequest::new(50, 100));
        assert_eq!(resolved.map(|s| s.name()), Some("c3"));
    }

    #[test]
    fn test_empty_scope_returns_none() {
        let mut resolver = ZoneResolver::new(Some(1));
        assert!(resolver.resolve(&[], &ResolveRequest::new(60, 100)).is_none());

        let samples = vec![sample(
            1,
            SampleMetadata::new("kick", 36).with_category("Drums"),
            (0, 127),
        )];
        let request = ResolveRequest::new(60, 100).category(Some("Piano"));
        assert!(resolver.resolve(&samples, &request).is_none());
    }

    #[test]
    fn test_category_isolation() {
        let samples = vec![
            sample(
                1,
                SampleMetadata::new("drum", 60).with_category("Drums"),
                (0, 127),
            ),
            sample(
                2,
                SampleMetadata::new("piano", 60).with_category("Piano"),
                (0, 127),
            ),
        ];
        let mut resolver = ZoneResolver::new(Some(1));

        for mode in [RoundRobinMode::Off, RoundRobinMode::Random, RoundRobinMode::Cycle] {
            for _ in 0..10 {
                let request = ResolveRequest::new(60, 100)
                    .category(Some("Piano"))
                    .mode(mode);
                let resolved = resolver.resolve(&samples, &request).unwrap();
                assert_eq!(resolved.name(), "piano");
            }
        }
    }

    #[test]
    fn test_articulation_and_mic_filters() {
        let samples = vec![
            sample(
                1,
                SampleMetadata::new("sus-close", 60)
                    .with_articulation("sustain")
                    .with_mic("close"),
                (0, 127),
            ),
            sample(
                2,
                SampleMetadata::new("sus-room", 60)
                    .with_articulation("sustain")
                    .with_mic("room"),
                (0, 127),
            ),
            sample(
                3,
                SampleMetadata::new("stac-close", 60)
                    .with_articulation("staccato")
                    .with_mic("close"),
                (0, 127),
            ),
        ];
        let mut resolver = ZoneResolver::new(Some(1));

        let request = ResolveRequest::new(60, 100)
            .articulation(Some("sustain"))
            .mic(Some("room"));
        assert_eq!(
            resolver.resolve(&samples, &request).map(|s| s.name()),
            Some("sus-room")
        );

        let request = ResolveRequest::new(60, 100)
            .articulation(Some("staccato"))
            .mode(RoundRobinMode::Off);
        assert_eq!(
            resolver.resolve(&samples, &request).map(|s| s.name()),
            Some("stac-close")
        );

        // Unknown mic falls back to the nearest sample, ignoring the filters.
        let request = ResolveRequest::new(60, 100)
            .mic(Some("overhead"))
            .mode(RoundRobinMode::Off);
        assert_eq!(
            resolver.resolve(&samples, &request).map(|s| s.name()),
            Some("sus-close")
        );
    }

    #[test]
    fn test_round_robin_cycle_order() {
        let samples = round_robin_set();
        let mut resolver = ZoneResolver::new(Some(1));
        let request = ResolveRequest::new(60, 100).category(Some("Piano"));

        let order: Vec<u32> = (0..4)
            .map(|_| resolver.resolve(&samples, &request).unwrap().rr_index())
            .collect();
        assert_eq!(order, vec![2, 3, 1, 2]);
    }

    #[test]
    fn test_round_robin_reset() {
        let samples = round_robin_set();
        let mut resolver = ZoneResolver::new(Some(1));
        let request = ResolveRequest::new(60, 100).category(Some("Piano"));

        resolver.resolve(&samples, &request);
        resolver.resolve(&samples, &request);
        resolver.reset_round_robin();
        assert_eq!(resolver.resolve(&samples, &request).unwrap().rr_index(), 2);
    }

    #[test]
    fn test_round_robin_rotations_are_independent() {
        let mut samples = round_robin_set();
        samples.extend((1..=2).map(|rr| {
            sample(
                10 + rr as u64,
                SampleMetadata::new(format!("quiet-rr{}", rr), 60)
                    .with_category("Piano")
                    .with_velocity_range(0, 10)
                    .with_rr_index(rr),
                (0, 127),
            )
        }));
        // Make the loud set exclude low velocities.
        let samples: Vec<Sample> = samples
            .into_iter()
            .map(|s| {
                if s.velocity_range() == (0, 127) {
                    let meta = SampleMetadata::new(s.name(), 60)
                        .with_category("Piano")
                        .with_velocity_range(11, 127)
                        .with_rr_index(s.rr_index());
                    sample(s.id(), meta, (0, 127))
                } else {
                    s
                }
            })
            .collect();
        let mut resolver = ZoneResolver::new(Some(1));

        let loud = ResolveRequest::new(60, 100).category(Some("Piano"));
        let quiet = ResolveRequest::new(60, 5).category(Some("Piano"));
        assert_eq!(resolver.resolve(&samples, &loud).unwrap().rr_index(), 2);
        assert_eq!(resolver.resolve(&samples, &quiet).unwrap().rr_index(), 2);
        assert_eq!(resolver.resolve(&samples, &quiet).unwrap().rr_index(), 1);
        assert_eq!(resolver.resolve(&samples, &loud).unwrap().rr_index(), 3);
    }

    #[test]
    fn test_round_robin_off_and_random() {
        let samples = round_robin_set();
        let mut resolver = ZoneResolver::new(Some(7));

        let off = ResolveRequest::new(60, 100).mode(RoundRobinMode::Off);
        for _ in 0..5 {
            assert_eq!(resolver.resolve(&samples, &off).unwrap().rr_index(), 1);
        }

        let random = ResolveRequest::new(60, 100).mode(RoundRobinMode::Random);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(resolver.resolve(&samples, &random).unwrap().rr_index());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(RoundRobinMode::from_name("off"), RoundRobinMode::Off);
        assert_eq!(RoundRobinMode::from_name("Random"), RoundRobinMode::Random);
        assert_eq!(RoundRobinMode::from_name("cycle"), RoundRobinMode::Cycle);
        assert_eq!(RoundRobinMode::from_name("shuffle"), RoundRobinMode::Cycle);
        assert_eq!(RoundRobinMode::Random.to_string(), "random");
    }
}
