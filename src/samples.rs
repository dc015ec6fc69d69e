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

//! Sample storage and zone resolution.
//!
//! This module provides:
//! - The sample store, which owns decoded audio and keeps every group's note ranges
//!   partitioned across the keyboard
//! - The zone resolver, which picks a sample for a note and velocity with round-robin
//! - Directory loading, which derives sample metadata from folder and file names

pub mod loader;
pub mod resolver;
pub mod store;

pub use loader::{load_directory, load_directory_async, metadata_for_path, LoadReport};
pub use resolver::{ResolveRequest, RoundRobinMode, ZoneResolver};
pub use store::{
    Sample, SampleId, SampleInfo, SampleMetadata, SampleStore, DEFAULT_CATEGORY, MIDI_MAX,
};

use crate::audio::{BufferError, DecodeError};

/// Errors raised while loading or managing samples.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("invalid metadata for sample {name}: {reason}")]
    InvalidMetadata { name: String, reason: String },

    #[error("sample {name} has unplayable audio: {source}")]
    InvalidBuffer {
        name: String,
        #[source]
        source: BufferError,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: DecodeError,
    },

    #[error("no sample with id {0}")]
    NotFound(SampleId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
