//! SQLite-backed snapshot store.
//!
//! [`SqliteSnapshotDb`] owns a connection to a database laid out by
//! [`schema`]. Reads page through the tables with keyset queries so a full
//! stream never holds more than one page per table in memory; writes go
//! through a [`SnapshotWriter`] session.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::debug;
use rusqlite::{Connection, Error as SqliteError, OpenFlags};
use thiserror::Error;

use crate::closure::ClosureSource;
use crate::coordinate::BoundingBox;
use crate::entity::{Entity, EntityKey, EntityKind, Node, Relation, Way};
use crate::error::ReadError;
use crate::reader::{
    Categories, EntityStream, NodeReader, NodeSources, RelationReader, RelationSources,
    SnapshotSources, WayReader, WaySources,
};
use crate::store::SnapshotStore;

mod queries;
mod scan;
pub mod schema;
mod writer;

pub use schema::{SCHEMA_VERSION, SchemaError};
pub use writer::{SnapshotWriter, WriteError, WriteSummary, WriterOptions};

use scan::{
    MAX_FILTER_IDS, NODE, NODE_TAGS, RELATION, RELATION_MEMBERS, RELATION_TAGS, WAY, WAY_NODES,
    WAY_TAGS, scan,
};

/// How a [`SqliteSnapshotDb`] opens its database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StoreOptions {
    /// Open without write access; the schema must already exist.
    pub read_only: bool,
    /// Create the schema when it is missing.
    pub create_schema: bool,
    /// Rows fetched per table page while streaming.
    pub page_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            create_schema: true,
            page_size: 1024,
        }
    }
}

impl StoreOptions {
    /// Options for opening an existing snapshot without write access.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            create_schema: false,
            ..Self::default()
        }
    }
}

/// Errors raised by [`SqliteSnapshotDb`].
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Opening the database failed.
    #[error("failed to open snapshot database at {path:?}")]
    Open {
        /// Database path.
        path: PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// The database holds no snapshot tables and creation was not allowed.
    #[error("database contains no snapshot schema")]
    SchemaMissing,
    /// Inspecting or creating the schema failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// An id query failed.
    #[error("failed while {operation}")]
    Query {
        /// Query that failed.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Reassembling entities from rows failed.
    #[error(transparent)]
    Read(#[from] ReadError),
    /// Writing entities failed.
    #[error(transparent)]
    Write(#[from] WriteError),
}

fn query_failed(operation: &'static str) -> impl FnOnce(SqliteError) -> ReadError {
    move |source| ReadError::Source {
        operation,
        source: Box::new(source),
    }
}

/// Snapshot persisted in an SQLite database.
///
/// # Examples
/// ```
/// use snapshot_core::{
///     BoundingBox, Coordinate, Entity, EntityKey, EntityMeta, Node, SnapshotStore,
///     SqliteSnapshotDb,
/// };
///
/// let db = SqliteSnapshotDb::open_in_memory().expect("open store");
/// let location = Coordinate::from_degrees(2.0, 3.0).expect("valid coordinate");
/// db.add_or_update([Entity::Node(Node::new(EntityMeta::new(1), location))])
///     .expect("write node");
///
/// assert!(db.get(EntityKey::node(1)).expect("lookup").is_some());
/// let bbox = BoundingBox::from_degrees(1.0, 2.0, 3.0, 4.0).expect("valid box");
/// assert_eq!(db.bbox(&bbox).expect("closure").summary.nodes_in_box, 1);
/// ```
#[derive(Debug)]
pub struct SqliteSnapshotDb {
    connection: Connection,
    options: StoreOptions,
}

impl SqliteSnapshotDb {
    /// Open the database at `path`.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, SqliteStoreError> {
        let path = path.as_ref();
        let flags = if options.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::default()
        };
        let connection =
            Connection::open_with_flags(path, flags).map_err(|source| SqliteStoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_connection(connection, options)
    }

    /// Open a private in-memory database with the schema in place.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let connection =
            Connection::open_in_memory().map_err(|source| SqliteStoreError::Open {
                path: PathBuf::from(":memory:"),
                source,
            })?;
        Self::from_connection(connection, StoreOptions::default())
    }

    /// Wrap an existing connection.
    ///
    /// The schema is created when it is missing and `options` allow it;
    /// otherwise a missing schema is an error.
    pub fn from_connection(
        connection: Connection,
        options: StoreOptions,
    ) -> Result<Self, SqliteStoreError> {
        if options.create_schema && !options.read_only {
            schema::create_and_detect(&connection)?;
        } else if !schema::detect(&connection)? {
            return Err(SqliteStoreError::SchemaMissing);
        }
        Ok(Self {
            connection,
            options,
        })
    }

    /// Underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Options the store was opened with.
    #[must_use]
    pub const fn options(&self) -> StoreOptions {
        self.options
    }

    /// Start a writer session on this store.
    pub fn writer(&self, options: WriterOptions) -> Result<SnapshotWriter<'_>, WriteError> {
        if self.options.read_only {
            return Err(WriteError::ReadOnly);
        }
        SnapshotWriter::new(&self.connection, options)
    }

    /// Persist `entities` in one transaction with replace semantics.
    pub fn add_or_update<I>(&self, entities: I) -> Result<WriteSummary, WriteError>
    where
        I: IntoIterator<Item = Entity>,
    {
        let mut writer = self.writer(WriterOptions { batch_size: 0 })?;
        writer.extend(entities)?;
        writer.finish()
    }

    /// Delete the entities stored under `keys`.
    ///
    /// The result reports, per key, whether an entity was removed.
    pub fn delete(&self, keys: &[EntityKey]) -> Result<Vec<bool>, WriteError> {
        let mut writer = self.writer(WriterOptions { batch_size: 0 })?;
        let removed = keys
            .iter()
            .map(|key| writer.delete(*key))
            .collect::<Result<Vec<_>, _>>()?;
        writer.finish()?;
        Ok(removed)
    }

    /// Remove every entity, keeping the schema.
    pub fn clear(&self) -> Result<(), WriteError> {
        if self.options.read_only {
            return Err(WriteError::ReadOnly);
        }
        Ok(schema::delete_all(&self.connection)?)
    }

    /// Drop the snapshot tables.
    pub fn drop_schema(&self) -> Result<(), WriteError> {
        if self.options.read_only {
            return Err(WriteError::ReadOnly);
        }
        Ok(schema::drop_schema(&self.connection)?)
    }

    /// Ways referencing any of `node_ids`, ordered by id.
    pub fn ways_for_nodes(&self, node_ids: &BTreeSet<i64>) -> Result<Vec<Way>, SqliteStoreError> {
        let way_ids = self.way_ids_for_nodes(node_ids)?;
        Ok(self.ways_by_id(&way_ids)?)
    }

    /// Relations with a member matching any of `members`, ordered by id.
    pub fn relations_for_members(
        &self,
        members: &[EntityKey],
    ) -> Result<Vec<Relation>, SqliteStoreError> {
        let mut relation_ids = BTreeSet::new();
        for kind in EntityKind::ALL {
            let ids: BTreeSet<i64> = members
                .iter()
                .filter(|key| key.kind == kind)
                .map(|key| key.id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            relation_ids.extend(
                queries::relation_ids_for_members(&self.connection, kind, &ids).map_err(
                    |source| SqliteStoreError::Query {
                        operation: "finding relations for members",
                        source,
                    },
                )?,
            );
        }
        Ok(self.relations_by_id(&relation_ids)?)
    }

    fn page_size(&self) -> usize {
        self.options.page_size
    }

    fn node_sources(&self, filter: Vec<i64>) -> NodeSources<'_> {
        NodeSources {
            nodes: scan(&self.connection, NODE, filter.clone(), self.page_size()),
            tags: scan(&self.connection, NODE_TAGS, filter, self.page_size()),
        }
    }

    fn way_sources(&self, filter: Vec<i64>) -> WaySources<'_> {
        WaySources {
            ways: scan(&self.connection, WAY, filter.clone(), self.page_size()),
            tags: scan(&self.connection, WAY_TAGS, filter.clone(), self.page_size()),
            nodes: scan(&self.connection, WAY_NODES, filter, self.page_size()),
        }
    }

    fn relation_sources(&self, filter: Vec<i64>) -> RelationSources<'_> {
        RelationSources {
            relations: scan(&self.connection, RELATION, filter.clone(), self.page_size()),
            tags: scan(&self.connection, RELATION_TAGS, filter.clone(), self.page_size()),
            members: scan(&self.connection, RELATION_MEMBERS, filter, self.page_size()),
        }
    }
}

/// Read the entities for `ids` in chunks small enough to bind.
fn read_chunked<T>(
    ids: &BTreeSet<i64>,
    mut read: impl FnMut(Vec<i64>) -> Result<Vec<T>, ReadError>,
) -> Result<Vec<T>, ReadError> {
    let ids: Vec<i64> = ids.iter().copied().collect();
    let mut entities = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_FILTER_IDS) {
        entities.extend(read(chunk.to_vec())?);
    }
    Ok(entities)
}

impl ClosureSource for SqliteSnapshotDb {
    fn node_ids_in_box(&self, bbox: &BoundingBox) -> Result<BTreeSet<i64>, ReadError> {
        let ids = queries::node_ids_in_box(&self.connection, bbox)
            .map_err(query_failed("finding nodes in box"))?;
        debug!("{} nodes inside {bbox:?}", ids.len());
        Ok(ids)
    }

    fn way_ids_for_nodes(&self, node_ids: &BTreeSet<i64>) -> Result<BTreeSet<i64>, ReadError> {
        queries::way_ids_for_nodes(&self.connection, node_ids)
            .map_err(query_failed("finding ways for nodes"))
    }

    fn relation_ids_for_members(
        &self,
        node_ids: &BTreeSet<i64>,
        way_ids: &BTreeSet<i64>,
    ) -> Result<BTreeSet<i64>, ReadError> {
        let mut ids =
            queries::relation_ids_for_members(&self.connection, EntityKind::Node, node_ids)
                .map_err(query_failed("finding relations for node members"))?;
        ids.extend(
            queries::relation_ids_for_members(&self.connection, EntityKind::Way, way_ids)
                .map_err(query_failed("finding relations for way members"))?,
        );
        Ok(ids)
    }

    fn nodes_by_id(&self, ids: &BTreeSet<i64>) -> Result<Vec<Node>, ReadError> {
        read_chunked(ids, |chunk| {
            NodeReader::open(self.node_sources(chunk))?.read_all()
        })
    }

    fn ways_by_id(&self, ids: &BTreeSet<i64>) -> Result<Vec<Way>, ReadError> {
        read_chunked(ids, |chunk| WayReader::open(self.way_sources(chunk))?.read_all())
    }

    fn relations_by_id(&self, ids: &BTreeSet<i64>) -> Result<Vec<Relation>, ReadError> {
        read_chunked(ids, |chunk| {
            RelationReader::open(self.relation_sources(chunk))?.read_all()
        })
    }
}

impl SnapshotStore for SqliteSnapshotDb {
    type Error = SqliteStoreError;

    fn stream(&self, categories: Categories) -> Result<EntityStream<'_>, SqliteStoreError> {
        let sources = SnapshotSources {
            nodes: self.node_sources(Vec::new()),
            ways: self.way_sources(Vec::new()),
            relations: self.relation_sources(Vec::new()),
        };
        Ok(EntityStream::open(sources, categories)?)
    }
}

#[cfg(test)]
mod tests;
