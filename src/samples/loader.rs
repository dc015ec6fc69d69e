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

//! Loading sample libraries from disk.
//!
//! A library is a directory of audio files. The first subdirectory below the library root
//! names the category (`Piano/C4_v1-64_rr2.wav` is a Piano sample); files directly in the
//! root are uncategorized. Everything else comes from the file name.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::store::{SampleId, SampleMetadata, SampleStore};
use super::SampleError;
use crate::audio::{decode_file, AudioBuffer, DecodeError};
use crate::naming::parse_file_name;

/// File extensions treated as audio.
const AUDIO_EXTENSIONS: &[&str] = &["wav", "flac", "mp3", "ogg", "aiff", "aif", "m4a"];

/// Root note for files whose name carries no pitch.
const DEFAULT_ROOT: u8 = 60;

/// The outcome of loading a directory. A bad file never aborts the rest of the load.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Files that made it into the store, in load order.
    pub loaded: Vec<(PathBuf, SampleId)>,
    /// Files that were skipped, with the reason.
    pub failed: Vec<(PathBuf, SampleError)>,
}

impl LoadReport {
    fn record(&mut self, path: PathBuf, result: Result<SampleId, SampleError>) {
        match result {
            Ok(id) => self.loaded.push((path, id)),
            Err(e) => {
                warn!(path = ?path, err = %e, "Skipping sample");
                self.failed.push((path, e));
            }
        }
    }
}

/// Lists every audio file below `dir`, recursively, in sorted order.
pub fn collect_audio_files(dir: &Path) -> Result<Vec<PathBuf>, SampleError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_audio_file(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Derives sample metadata from a file's location below the library root.
pub fn metadata_for_path(root: &Path, path: &Path) -> SampleMetadata {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let hints = parse_file_name(file_name);

    let mut metadata = SampleMetadata::new(hints.name, hints.root_midi.unwrap_or(DEFAULT_ROOT));

    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut components = relative.components();
    // Only a file inside a subdirectory has a category.
    if components.clone().count() > 1 {
        if let Some(category) = components.next().and_then(|c| c.as_os_str().to_str()) {
            metadata = metadata.with_category(category);
        }
    }
    if let Some((low, high)) = hints.velocity_range {
        metadata = metadata.with_velocity_range(low, high);
    }
    if let Some(rr) = hints.rr_index {
        metadata = metadata.with_rr_index(rr);
    }
    if let Some(mic) = hints.mic {
        metadata = metadata.with_mic(mic);
    }
    if let Some(articulation) = hints.articulation {
        metadata = metadata.with_articulation(articulation);
    }
    metadata
}

fn ingest_decoded(
    store: &mut SampleStore,
    root: &Path,
    path: &Path,
    decoded: Result<AudioBuffer, DecodeError>,
) -> Result<SampleId, SampleError> {
    let buffer = decoded.map_err(|source| SampleError::Decode {
        path: path.display().to_string(),
        source,
    })?;
    store.ingest(metadata_for_path(root, path), buffer)
}

/// Decodes and ingests every audio file below `dir`.
pub fn load_directory(store: &mut SampleStore, dir: &Path) -> Result<LoadReport, SampleError> {
    let files = collect_audio_files(dir)?;
    info!(dir = ?dir, files = files.len(), "Loading sample library");

    let mut report = LoadReport::default();
    for path in files {
        let result = ingest_decoded(store, dir, &path, decode_file(&path));
        report.record(path, result);
    }

    log_summary(dir, &report, store);
    Ok(report)
}

/// Like [`load_directory`], but decodes every file concurrently on the blocking pool.
///
/// Files are still ingested in sorted order, so ids match the synchronous loader.
pub async fn load_directory_async(
    store: &mut SampleStore,
    dir: &Path,
) -> Result<LoadReport, SampleError> {
    let files = collect_audio_files(dir)?;
    info!(dir = ?dir, files = files.len(), "Loading sample library");

    let tasks: Vec<_> = files
        .iter()
        .cloned()
        .map(|path| tokio::task::spawn_blocking(move || decode_file(path)))
        .collect();

    let mut report = LoadReport::default();
    for (path, task) in files.into_iter().zip(tasks) {
        let decoded = match task.await {
            Ok(decoded) => decoded,
            Err(e) => Err(DecodeError::from(e)),
        };
        let result = ingest_decoded(store, dir, &path, decoded);
        report.record(path, result);
    }

    log_summary(dir, &report, store);
    Ok(report)
}

fn log_summary(dir: &Path, report: &LoadReport, store: &SampleStore) {
    info!(
        dir = ?dir,
        loaded = report.loaded.len(),
        failed = report.failed.len(),
        memory_kb = store.memory_usage() / 1024,
        "Sample library loaded"
    );
}
