//! Loading OpenStreetMap extracts into snapshot databases.
//!
//! Responsibilities:
//! - Decode `.osm.pbf` files with `osmpbf` and convert their elements into
//!   snapshot entities.
//! - Feed those entities through a [`SnapshotWriter`] in batches.
//! - Prepare database paths on disk before the store opens them.
//!
//! Boundaries:
//! - Entity types, reading and closure queries live in `snapshot-core`.
//! - No logger is installed here; the host binary decides where logs go.
//!
//! [`SnapshotWriter`]: snapshot_core::SnapshotWriter
#![forbid(unsafe_code)]

pub mod fs;
mod import;

pub use import::{
    ImportError, ImportOptions, ImportSummary, import_into_database, import_osm_pbf,
};
