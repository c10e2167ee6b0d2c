//! Core types and algorithms for reading and writing graph snapshots.
//!
//! A snapshot stores nodes, ways and relations across a parent table per
//! category plus child tables for tags, way nodes and relation members.
//! This crate rebuilds entities from those tables without loading them
//! whole ([`EntityStream`]), answers bounding-box queries with a
//! referentially complete result ([`resolve_bbox`]) and, with the
//! `store-sqlite` feature, persists snapshots to SQLite.
#![forbid(unsafe_code)]

pub mod builder;
pub mod closure;
pub mod coordinate;
pub mod cursor;
pub mod entity;
mod error;
pub mod merge;
pub mod reader;
pub mod rows;
pub mod store;
pub mod tile;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use closure::{Closure, ClosureSource, ClosureSummary, resolve_bbox};
pub use coordinate::{BoundingBox, Coordinate, CoordinateError};
pub use cursor::{Cursor, RowSource, VecSource};
pub use entity::{
    Entity, EntityKey, EntityKind, EntityMeta, Member, Node, Relation, Tags, UnknownEntityKind,
    Way,
};
pub use error::{InvalidInput, ReadError, SourceError};
pub use merge::{MergedEntities, MergedIter};
pub use reader::{Categories, EntityStream, SnapshotSources, StreamState};
pub use store::SnapshotStore;
#[cfg(feature = "store-sqlite")]
pub use store::{
    SchemaError, SnapshotWriter, SqliteSnapshotDb, SqliteStoreError, StoreOptions, WriteError,
    WriteSummary, WriterOptions,
};
