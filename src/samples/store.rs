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

//! The sample store: decoded buffers plus the metadata that maps them onto the keyboard.
//!
//! Samples are grouped by (category, articulation). Within a group the note ranges are
//! always a partition of 0..=127: each distinct root owns the span from the midpoint with
//! its lower neighbour to the midpoint with its upper neighbour. The ranges are derived,
//! never supplied, and [`SampleStore::recalculate_ranges`] is the only place they change.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::SampleError;
use crate::audio::AudioBuffer;

/// Category used when a sample doesn't name one.
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Highest MIDI note or velocity value.
pub const MIDI_MAX: u8 = 127;

/// Unique identifier of an ingested sample.
pub type SampleId = u64;

/// Caller-supplied description of a sample to ingest.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SampleMetadata {
    pub name: String,
    pub root_midi: u8,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub articulation: Option<String>,
    #[serde(default)]
    pub mic: Option<String>,
    #[serde(default)]
    pub vel_low: u8,
    #[serde(default = "default_vel_high")]
    pub vel_high: u8,
    #[serde(default = "default_rr_index")]
    pub rr_index: u32,
}

fn default_vel_high() -> u8 {
    MIDI_MAX
}

fn default_rr_index() -> u32 {
    1
}

impl SampleMetadata {
    /// Creates metadata covering the full velocity range in round-robin slot 1.
    pub fn new(name: impl Into<String>, root_midi: u8) -> Self {
        Self {
            name: name.into(),
            root_midi,
            category: None,
            articulation: None,
            mic: None,
            vel_low: 0,
            vel_high: MIDI_MAX,
            rr_index: 1,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_articulation(mut self, articulation: impl Into<String>) -> Self {
        self.articulation = Some(articulation.into());
        self
    }

    pub fn with_mic(mut self, mic: impl Into<String>) -> Self {
        self.mic = Some(mic.into());
        self
    }

    pub fn with_velocity_range(mut self, vel_low: u8, vel_high: u8) -> Self {
        self.vel_low = vel_low;
        self.vel_high = vel_high;
        self
    }

    pub fn with_rr_index(mut self, rr_index: u32) -> Self {
        self.rr_index = rr_index;
        self
    }

    /// Checks the ranges a sample must respect.
    fn validate(&self) -> Result<(), SampleError> {
        let invalid = |reason: String| SampleError::InvalidMetadata {
            name: self.name.clone(),
            reason,
        };

        if self.root_midi > MIDI_MAX {
            return Err(invalid(format!("root note {} is above 127", self.root_midi)));
        }
        if self.vel_high > MIDI_MAX {
            return Err(invalid(format!("velocity {} is above 127", self.vel_high)));
        }
        if self.vel_low > self.vel_high {
            return Err(invalid(format!(
                "velocity range {}-{} is inverted",
                self.vel_low, self.vel_high
            )));
        }
        if self.rr_index == 0 {
            return Err(invalid("round-robin index must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// An ingested sample. Immutable apart from its derived note range.
#[derive(Clone, Debug)]
pub struct Sample {
    id: SampleId,
    name: String,
    buffer: AudioBuffer,
    root_midi: u8,
    category: String,
    articulation: Option<String>,
    mic: Option<String>,
    note_low: u8,
    note_high: u8,
    vel_low: u8,
    vel_high: u8,
    rr_index: u32,
}

impl Sample {
    fn new(id: SampleId, metadata: SampleMetadata, buffer: AudioBuffer) -> Self {
        Self {
            id,
            name: metadata.name,
            buffer,
            root_midi: metadata.root_midi,
            category: metadata
                .category
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            articulation: metadata.articulation,
            mic: metadata.mic,
            note_low: 0,
            note_high: MIDI_MAX,
            vel_low: metadata.vel_low,
            vel_high: metadata.vel_high,
            rr_index: metadata.rr_index,
        }
    }

    pub fn id(&self) -> SampleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn root_midi(&self) -> u8 {
        self.root_midi
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn articulation(&self) -> Option<&str> {
        self.articulation.as_deref()
    }

    pub fn mic(&self) -> Option<&str> {
        self.mic.as_deref()
    }

    pub fn note_range(&self) -> (u8, u8) {
        (self.note_low, self.note_high)
    }

    pub fn velocity_range(&self) -> (u8, u8) {
        (self.vel_low, self.vel_high)
    }

    pub fn rr_index(&self) -> u32 {
        self.rr_index
    }

    /// Returns true if the note and velocity fall inside this sample's zone.
    pub fn contains(&self, midi: u8, velocity: u8) -> bool {
        (self.note_low..=self.note_high).contains(&midi)
            && (self.vel_low..=self.vel_high).contains(&velocity)
    }

    /// Pitch distance between the played note and the root.
    pub fn distance(&self, midi: u8) -> u8 {
        self.root_midi.abs_diff(midi)
    }

    fn in_group(&self, category: &str, articulation: Option<&str>) -> bool {
        self.category == category && self.articulation.as_deref() == articulation
    }

    /// Returns a read-only description of this sample.
    pub fn info(&self) -> SampleInfo {
        SampleInfo {
            id: self.id,
            name: self.name.clone(),
            root_midi: self.root_midi,
            category: self.category.clone(),
            articulation: self.articulation.clone(),
            mic: self.mic.clone(),
            note_low: self.note_low,
            note_high: self.note_high,
            vel_low: self.vel_low,
            vel_high: self.vel_high,
            rr_index: self.rr_index,
            channels: self.buffer.channel_count(),
            sample_rate: self.buffer.sample_rate(),
            frames: self.buffer.frames(),
        }
    }
}

#[cfg(test)]
impl Sample {
    /// Creates a sample with an explicit note range (test only).
    pub(crate) fn for_test(id: SampleId, metadata: SampleMetadata, note_range: (u8, u8)) -> Self {
        let mut sample = Sample::new(id, metadata, crate::testutil::test_buffer());
        sample.note_low = note_range.0;
        sample.note_high = note_range.1;
        sample
    }
}

/// A snapshot of a sample's metadata for listing and display.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SampleInfo {
    pub id: SampleId,
    pub name: String,
    pub root_midi: u8,
    pub category: String,
    pub articulation: Option<String>,
    pub mic: Option<String>,
    pub note_low: u8,
    pub note_high: u8,
    pub vel_low: u8,
    pub vel_high: u8,
    pub rr_index: u32,
    pub channels: usize,
    pub sample_rate: u32,
    pub frames: usize,
}

impl std::fmt::Display for SampleInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}{}] root={} notes={}-{} vel={}-{} rr={}",
            self.name,
            self.category,
            self.articulation
                .as_deref()
                .map(|a| format!("/{}", a))
                .unwrap_or_default(),
            self.root_midi,
            self.note_low,
            self.note_high,
            self.vel_low,
            self.vel_high,
            self.rr_index
        )?;
        if let Some(mic) = &self.mic {
            write!(f, " mic={}", mic)?;
        }
        Ok(())
    }
}

/// Owns every ingested sample and its decoded audio.
#[derive(Default)]
pub struct SampleStore {
    samples: Vec<Sample>,
    next_id: SampleId,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sample to the store and re-derives the note ranges of its group.
    ///
    /// Invalid metadata or an unplayable buffer is rejected and leaves the store unchanged.
    pub fn ingest(
        &mut self,
        metadata: SampleMetadata,
        buffer: AudioBuffer,
    ) -> Result<SampleId, SampleError> {
        metadata.validate()?;
        buffer
            .validate()
            .map_err(|source| SampleError::InvalidBuffer {
                name: metadata.name.clone(),
                source,
            })?;

        self.next_id += 1;
        let id = self.next_id;
        let sample = Sample::new(id, metadata, buffer);
        let category = sample.category.clone();
        let articulation = sample.articulation.clone();

        info!(
            id,
            sample = %sample.name,
            root = sample.root_midi,
            category = %category,
            memory_kb = sample.buffer.memory_size() / 1024,
            "Sample ingested"
        );

        self.samples.push(sample);
        self.recalculate_ranges(&category, articulation.as_deref());
        Ok(id)
    }

    /// Removes a sample and re-derives the note ranges of the group it left.
    pub fn remove(&mut self, id: SampleId) -> Result<Sample, SampleError> {
        let index = self
            .samples
            .iter()
            .position(|s| s.id == id)
            .ok_or(SampleError::NotFound(id))?;

        let sample = self.samples.remove(index);
        self.recalculate_ranges(&sample.category, sample.articulation.as_deref());
        debug!(id, sample = %sample.name, "Sample removed");
        Ok(sample)
    }

    /// Re-derives the note ranges of every sample in the (category, articulation) group.
    ///
    /// Samples sharing a root share a span. Between neighbouring roots `a < b` the lower
    /// root ends at `floor((a + b) / 2)` and the upper root starts one note later; the lowest
    /// root starts at 0 and the highest ends at 127.
    pub fn recalculate_ranges(&mut self, category: &str, articulation: Option<&str>) {
        let mut roots: Vec<u8> = self
            .samples
            .iter()
            .filter(|s| s.in_group(category, articulation))
            .map(|s| s.root_midi)
            .collect();
        roots.sort_unstable();
        roots.dedup();

        if roots.is_empty() {
            return;
        }

        let spans: Vec<(u8, u8)> = roots
            .iter()
            .enumerate()
            .map(|(i, &root)| {
                let low = match i.checked_sub(1).map(|p| roots[p]) {
                    Some(prev) => midpoint(prev, root) + 1,
                    None => 0,
                };
                let high = match roots.get(i + 1) {
                    Some(&next) => midpoint(root, next),
                    None => MIDI_MAX,
                };
                (low, high)
            })
            .collect();

        for sample in self
            .samples
            .iter_mut()
            .filter(|s| s.in_group(category, articulation))
        {
            // The root is always present, since the list was built from these samples.
            if let Ok(i) = roots.binary_search(&sample.root_midi) {
                (sample.note_low, sample.note_high) = spans[i];
            }
        }

        debug!(
            category,
            articulation,
            roots = roots.len(),
            "Note ranges recalculated"
        );
    }

    /// Drops every sample. Sounding voices keep their own reference to the audio, so stopping
    /// them first is the caller's responsibility.
    pub fn clear(&mut self) {
        let count = self.samples.len();
        self.samples.clear();
        if count > 0 {
            info!(count, "Sample store cleared");
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn get(&self, id: SampleId) -> Option<&Sample> {
        self.samples.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns a read-only snapshot of every sample.
    pub fn snapshot(&self) -> Vec<SampleInfo> {
        self.samples.iter().map(Sample::info).collect()
    }

    /// Returns the total memory used by the decoded audio.
    pub fn memory_usage(&self) -> usize {
        self.samples.iter().map(|s| s.buffer.memory_size()).sum()
    }
}

fn midpoint(low: u8, high: u8) -> u8 {
    ((low as u16 + high as u16) / 2) as u8
}

impl std::fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStore")
            .field("samples", &self.samples.len())
            .field("memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_buffer;

    fn ingest(store: &mut SampleStore, metadata: SampleMetadata) -> SampleId {
        store.ingest(metadata, test_buffer()).unwrap()
    }

    /// Asserts that the group's ranges are contiguous, non-overlapping and cover 0..=127.
    fn assert_partition(store: &SampleStore, category: &str, articulation: Option<&str>) {
        let mut spans: Vec<(u8, u8)> = store
            .samples()
            .iter()
            .filter(|s| s.in_group(category, articulation))
            .map(|s| s.note_range())
            .collect();
        spans.sort_unstable();
        spans.dedup();

        assert_eq!(spans.first().map(|s| s.0), Some(0));
        assert_eq!(spans.last().map(|s| s.1), Some(MIDI_MAX));
        for pair in spans.windows(2) {
            assert!(pair[0].0 <= pair[0].1);
            assert_eq!(pair[0].1 + 1, pair[1].0, "gap or overlap in {:?}", spans);
        }
    }

    #[test]
    fn test_single_sample_covers_keyboard() {
        let mut store = SampleStore::new();
        let id = ingest(&mut store, SampleMetadata::new("c4", 60));

        let sample = store.get(id).unwrap();
        assert_eq!(sample.note_range(), (0, 127));
        assert_eq!(sample.category(), DEFAULT_CATEGORY);
    }

    #[test]
    fn test_midpoint_ranges() {
        let mut store = SampleStore::new();
        let c3 = ingest(&mut store, SampleMetadata::new("c3", 48));
        let c5 = ingest(&mut store, SampleMetadata::new("c5", 72));
        let c4 = ingest(&mut store, SampleMetadata::new("c4", 60));
        let d4 = ingest(&mut store, SampleMetadata::new("d4", 63));

        assert_eq!(store.get(c3).unwrap().note_range(), (0, 54));
        assert_eq!(store.get(c4).unwrap().note_range(), (55, 61));
        assert_eq!(store.get(d4).unwrap().note_range(), (62, 67));
        assert_eq!(store.get(c5).unwrap().note_range(), (68, 127));
        assert_partition(&store, DEFAULT_CATEGORY, None);
    }

    #[test]
    fn test_shared_roots_share_span() {
        let mut store = SampleStore::new();
        ingest(&mut store, SampleMetadata::new("low", 36));
        let soft = ingest(
            &mut store,
            SampleMetadata::new("soft", 60).with_velocity_range(0, 63),
        );
        let loud = ingest(
            &mut store,
            SampleMetadata::new("loud", 60).with_velocity_range(64, 127),
        );
        let rr2 = ingest(&mut store, SampleMetadata::new("rr2", 60).with_rr_index(2));

        let span = store.get(soft).unwrap().note_range();
        assert_eq!(span, (49, 127));
        assert_eq!(store.get(loud).unwrap().note_range(), span);
        assert_eq!(store.get(rr2).unwrap().note_range(), span);
        assert_partition(&store, DEFAULT_CATEGORY, None);
    }

    #[test]
    fn test_groups_are_independent() {
        let mut store = SampleStore::new();
        let piano = ingest(
            &mut store,
            SampleMetadata::new("piano", 60).with_category("Piano"),
        );
        let piano_high = ingest(
            &mut store,
            SampleMetadata::new("piano-high", 84).with_category("Piano"),
        );
        let stac = ingest(
            &mut store,
            SampleMetadata::new("stac", 60)
                .with_category("Piano")
                .with_articulation("staccato"),
        );
        let drums = ingest(
            &mut store,
            SampleMetadata::new("kick", 36).with_category("Drums"),
        );

        assert_eq!(store.get(piano).unwrap().note_range(), (0, 72));
        assert_eq!(store.get(piano_high).unwrap().note_range(), (73, 127));
        assert_eq!(store.get(stac).unwrap().note_range(), (0, 127));
        assert_eq!(store.get(drums).unwrap().note_range(), (0, 127));
        assert_partition(&store, "Piano", None);
        assert_partition(&store, "Piano", Some("staccato"));
    }

    #[test]
    fn test_partition_holds_for_many_roots() {
        let mut store = SampleStore::new();
        for root in [0u8, 1, 2, 17, 40, 41, 64, 99, 100, 126, 127, 64, 17] {
            ingest(&mut store, SampleMetadata::new(format!("n{}", root), root));
            assert_partition(&store, DEFAULT_CATEGORY, None);
        }
    }

    #[test]
    fn test_remove_recalculates() {
        let mut store = SampleStore::new();
        let low = ingest(&mut store, SampleMetadata::new("low", 48));
        let high = ingest(&mut store, SampleMetadata::new("high", 72));
        assert_eq!(store.get(low).unwrap().note_range(), (0, 60));

        let removed = store.remove(high).unwrap();
        assert_eq!(removed.name(), "high");
        assert_eq!(store.get(low).unwrap().note_range(), (0, 127));
        assert!(matches!(store.remove(high), Err(SampleError::NotFound(_))));
    }

    #[test]
    fn test_invalid_input_leaves_store_unchanged() {
        let mut store = SampleStore::new();

        let bad_buffer = AudioBuffer::mono(vec![], 48000);
        assert!(matches!(
            store.ingest(SampleMetadata::new("empty", 60), bad_buffer),
            Err(SampleError::InvalidBuffer { .. })
        ));

        for metadata in [
            SampleMetadata::new("high-root", 128),
            SampleMetadata::new("inverted", 60).with_velocity_range(100, 10),
            SampleMetadata::new("loud", 60).with_velocity_range(0, 200),
            SampleMetadata::new("rr0", 60).with_rr_index(0),
        ] {
            assert!(matches!(
                store.ingest(metadata, test_buffer()),
                Err(SampleError::InvalidMetadata { .. })
            ));
        }

        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_and_snapshot() {
        let mut store = SampleStore::new();
        ingest(
            &mut store,
            SampleMetadata::new("a", 60)
                .with_category("Keys")
                .with_mic("close"),
        );
        ingest(&mut store, SampleMetadata::new("b", 62));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].category, "Keys");
        assert_eq!(snapshot[0].mic.as_deref(), Some("close"));
        assert_eq!(
            snapshot[0].to_string(),
            "a [Keys] root=60 notes=0-127 vel=0-127 rr=1 mic=close"
        );

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.memory_usage(), 0);
    }
}
