//! Facade crate for OSM graph snapshots.
//!
//! This crate re-exports the entity model, the streaming reader and the
//! bounding-box closure resolver, and exposes the SQLite store and the PBF
//! importer behind feature flags.

#![forbid(unsafe_code)]

pub use snapshot_core::{
    BoundingBox, Categories, Closure, ClosureSource, ClosureSummary, Coordinate, CoordinateError,
    Entity, EntityKey, EntityKind, EntityMeta, EntityStream, InvalidInput, Member, MergedEntities,
    Node, ReadError, Relation, SnapshotStore, StreamState, Tags, Way, resolve_bbox,
};

#[cfg(feature = "store-sqlite")]
pub use snapshot_core::{
    SchemaError, SnapshotWriter, SqliteSnapshotDb, SqliteStoreError, StoreOptions, WriteError,
    WriteSummary, WriterOptions,
};

#[cfg(feature = "import-pbf")]
pub use snapshot_data::{
    ImportError, ImportOptions, ImportSummary, import_into_database, import_osm_pbf,
};
