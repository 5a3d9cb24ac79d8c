//! Cadence persistence adapters.
//!
//! Implements the [`pipeline::MemoryStore`] trait over a JSON document on disk
//! ([`FileMemoryStore`]) and in process memory ([`InMemoryMemoryStore`]), and
//! writes the boundary records of finished runs ([`OutputWriter`]).
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File layout, atomic replacement and writer
//! serialisation live here. The [`pipeline`] crate sees only
//! [`pipeline::MemoryStore`].
//!
//! ## Crash safety
//!
//! Every document is written to a sibling `*.tmp` file, synced, and renamed
//! over the target. A crash mid-write leaves the previous document intact.

mod atomic;
pub mod memory_store;
pub mod records;

use std::path::PathBuf;

use thiserror::Error;

pub use memory_store::{FileMemoryStore, InMemoryMemoryStore};
pub use records::OutputWriter;

/// Failures writing workflow records.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialise record: {0}")]
    Serialization(#[from] serde_json::Error),
}
