//! Batched replace-semantics persistence of entities.

use log::{debug, info};
use rusqlite::{Connection, Error as SqliteError, Transaction};
use thiserror::Error;

use super::schema::{SchemaError, create_and_detect};
use crate::entity::{Entity, EntityKey, EntityKind};
use crate::error::InvalidInput;
use crate::rows::EntityRows;
use crate::tile::tile_id;

/// Tuning for [`SnapshotWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriterOptions {
    /// Entities written per transaction; `0` keeps one transaction open
    /// until [`SnapshotWriter::finish`].
    pub batch_size: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self { batch_size: 10_000 }
    }
}

/// Entities persisted by a writer session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriteSummary {
    /// Nodes written.
    pub nodes: usize,
    /// Ways written.
    pub ways: usize,
    /// Relations written.
    pub relations: usize,
    /// Transactions committed.
    pub batches: usize,
}

impl WriteSummary {
    /// Entities written across every category.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.nodes + self.ways + self.relations
    }

    fn record(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Node => self.nodes += 1,
            EntityKind::Way => self.ways += 1,
            EntityKind::Relation => self.relations += 1,
        }
    }
}

/// Errors raised while writing entities.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The entity cannot be represented in the snapshot tables.
    #[error("cannot persist {key}")]
    InvalidInput {
        /// Rejected entity.
        key: EntityKey,
        /// Reason for the rejection.
        #[source]
        reason: InvalidInput,
    },
    /// The store was opened read-only.
    #[error("snapshot store is read-only")]
    ReadOnly,
    /// Creating or verifying the schema failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// An SQLite statement failed.
    #[error("failed to {operation}")]
    Sqlite {
        /// Action that failed.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
}

fn sqlite(operation: &'static str) -> impl FnOnce(SqliteError) -> WriteError {
    move |source| WriteError::Sqlite { operation, source }
}

/// Session that persists entities with replace semantics.
///
/// Every entity replaces whatever the snapshot holds under its key: the
/// previous child rows are deleted, the parent row is upserted and the new
/// child rows are inserted. Writes accumulate in a transaction that is
/// committed every [`WriterOptions::batch_size`] entities and by
/// [`finish`](Self::finish). Dropping the writer rolls back the open batch.
///
/// # Examples
/// ```
/// use rusqlite::Connection;
/// use snapshot_core::{Coordinate, Entity, EntityMeta, Node, SnapshotWriter, WriterOptions};
///
/// let connection = Connection::open_in_memory().expect("open database");
/// let mut writer =
///     SnapshotWriter::new(&connection, WriterOptions::default()).expect("open writer");
/// let location = Coordinate::from_degrees(2.0, 3.0).expect("valid coordinate");
/// writer
///     .push(&Entity::Node(Node::new(EntityMeta::new(1), location)))
///     .expect("write node");
/// let summary = writer.finish().expect("commit");
/// assert_eq!(summary.nodes, 1);
/// ```
pub struct SnapshotWriter<'conn> {
    connection: &'conn Connection,
    transaction: Option<Transaction<'conn>>,
    options: WriterOptions,
    pending: usize,
    summary: WriteSummary,
}

impl<'conn> SnapshotWriter<'conn> {
    /// Open a writer, creating the snapshot schema when it is absent.
    pub fn new(connection: &'conn Connection, options: WriterOptions) -> Result<Self, WriteError> {
        create_and_detect(connection)?;
        Ok(Self {
            connection,
            transaction: None,
            options,
            pending: 0,
            summary: WriteSummary::default(),
        })
    }

    /// Counts written so far, including the uncommitted batch.
    #[must_use]
    pub const fn summary(&self) -> WriteSummary {
        self.summary
    }

    /// Persist `entity`, replacing any stored entity with the same key.
    ///
    /// Invalid entities are rejected before any statement runs. A failing
    /// statement undoes the partial write of this entity only; earlier
    /// writes in the batch are kept.
    pub fn push(&mut self, entity: &Entity) -> Result<(), WriteError> {
        let rows = EntityRows::from_entity(entity).map_err(|reason| WriteError::InvalidInput {
            key: entity.key(),
            reason,
        })?;
        let transaction = self.transaction()?;
        let savepoint = transaction
            .savepoint()
            .map_err(sqlite("open entity savepoint"))?;
        clear_children(&savepoint, rows.kind, rows.entity.id)?;
        upsert_parent(&savepoint, &rows)?;
        append_children(&savepoint, &rows)?;
        savepoint
            .commit()
            .map_err(sqlite("release entity savepoint"))?;

        self.summary.record(rows.kind);
        self.pending += 1;
        if self.options.batch_size > 0 && self.pending >= self.options.batch_size {
            self.commit_batch()?;
        }
        Ok(())
    }

    /// Persist every entity yielded by `entities`.
    pub fn extend<I>(&mut self, entities: I) -> Result<(), WriteError>
    where
        I: IntoIterator<Item = Entity>,
    {
        for entity in entities {
            self.push(&entity)?;
        }
        Ok(())
    }

    /// Delete the entity stored under `key`, returning whether it existed.
    pub fn delete(&mut self, key: EntityKey) -> Result<bool, WriteError> {
        let transaction = self.transaction()?;
        clear_children(transaction, key.kind, key.id)?;
        let sql = match key.kind {
            EntityKind::Node => "DELETE FROM node WHERE id = ?1",
            EntityKind::Way => "DELETE FROM way WHERE id = ?1",
            EntityKind::Relation => "DELETE FROM relation WHERE id = ?1",
        };
        let removed = transaction
            .prepare_cached(sql)
            .and_then(|mut statement| statement.execute([key.id]))
            .map_err(sqlite("delete parent row"))?;
        Ok(removed > 0)
    }

    /// Commit outstanding writes and return the session totals.
    pub fn finish(mut self) -> Result<WriteSummary, WriteError> {
        self.commit_batch()?;
        info!(
            "wrote {} nodes, {} ways and {} relations in {} batches",
            self.summary.nodes, self.summary.ways, self.summary.relations, self.summary.batches
        );
        Ok(self.summary)
    }

    fn transaction(&mut self) -> Result<&mut Transaction<'conn>, WriteError> {
        if let Some(open) = self.transaction.take() {
            return Ok(self.transaction.insert(open));
        }
        let begun = self
            .connection
            .unchecked_transaction()
            .map_err(sqlite("begin write transaction"))?;
        Ok(self.transaction.insert(begun))
    }

    fn commit_batch(&mut self) -> Result<(), WriteError> {
        if let Some(transaction) = self.transaction.take() {
            transaction
                .commit()
                .map_err(sqlite("commit write transaction"))?;
            self.summary.batches += 1;
            debug!("committed batch of {} entities", self.pending);
        }
        self.pending = 0;
        Ok(())
    }
}

/// Delete every child row owned by `(kind, id)`.
fn clear_children(connection: &Connection, kind: EntityKind, id: i64) -> Result<(), WriteError> {
    let statements: &[&str] = match kind {
        EntityKind::Node => &["DELETE FROM node_tags WHERE node_id = ?1"],
        EntityKind::Way => &[
            "DELETE FROM way_tags WHERE way_id = ?1",
            "DELETE FROM way_nodes WHERE way_id = ?1",
        ],
        EntityKind::Relation => &[
            "DELETE FROM relation_tags WHERE relation_id = ?1",
            "DELETE FROM relation_members WHERE relation_id = ?1",
        ],
    };
    for sql in statements {
        connection
            .prepare_cached(sql)
            .and_then(|mut statement| statement.execute([id]))
            .map_err(sqlite("clear child rows"))?;
    }
    Ok(())
}

fn upsert_parent(connection: &Connection, rows: &EntityRows) -> Result<(), WriteError> {
    let entity = &rows.entity;
    let result = match (rows.kind, rows.location) {
        (EntityKind::Node, Some(location)) => connection
            .prepare_cached(
                "INSERT OR REPLACE INTO node
                 (id, latitude, longitude, changeset_id, visible, timestamp, tile, version, usr, usr_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .and_then(|mut statement| {
                statement.execute((
                    entity.id,
                    location.lat_e7(),
                    location.lon_e7(),
                    entity.changeset_id,
                    entity.visible,
                    entity.timestamp,
                    tile_id(&location),
                    entity.version,
                    &entity.user_name,
                    entity.user_id,
                ))
            }),
        (EntityKind::Node, None) => {
            return Err(WriteError::InvalidInput {
                key: EntityKey::node(entity.id),
                reason: InvalidInput::MissingCoordinates { id: entity.id },
            });
        }
        (kind, _) => {
            let sql = if kind == EntityKind::Way {
                "INSERT OR REPLACE INTO way
                 (id, changeset_id, visible, timestamp, version, usr, usr_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            } else {
                "INSERT OR REPLACE INTO relation
                 (id, changeset_id, visible, timestamp, version, usr, usr_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            };
            connection.prepare_cached(sql).and_then(|mut statement| {
                statement.execute((
                    entity.id,
                    entity.changeset_id,
                    entity.visible,
                    entity.timestamp,
                    entity.version,
                    &entity.user_name,
                    entity.user_id,
                ))
            })
        }
    };
    result.map(|_| ()).map_err(sqlite("upsert parent row"))
}

fn append_children(connection: &Connection, rows: &EntityRows) -> Result<(), WriteError> {
    if !rows.tags.is_empty() {
        let sql = match rows.kind {
            EntityKind::Node => {
                "INSERT OR REPLACE INTO node_tags (node_id, key, value) VALUES (?1, ?2, ?3)"
            }
            EntityKind::Way => {
                "INSERT OR REPLACE INTO way_tags (way_id, key, value) VALUES (?1, ?2, ?3)"
            }
            EntityKind::Relation => {
                "INSERT OR REPLACE INTO relation_tags (relation_id, key, value) VALUES (?1, ?2, ?3)"
            }
        };
        let mut statement = connection
            .prepare_cached(sql)
            .map_err(sqlite("prepare tag insert"))?;
        for tag in &rows.tags {
            statement
                .execute((tag.owner.id, &tag.key, &tag.value))
                .map_err(sqlite("insert tag row"))?;
        }
    }

    if !rows.way_nodes.is_empty() {
        let mut statement = connection
            .prepare_cached(
                "INSERT OR REPLACE INTO way_nodes (way_id, node_id, sequence_id)
                 VALUES (?1, ?2, ?3)",
            )
            .map_err(sqlite("prepare way node insert"))?;
        for way_node in &rows.way_nodes {
            statement
                .execute((way_node.owner.id, way_node.node_id, way_node.sequence_id))
                .map_err(sqlite("insert way node row"))?;
        }
    }

    if !rows.members.is_empty() {
        let mut statement = connection
            .prepare_cached(
                "INSERT OR REPLACE INTO relation_members
                 (relation_id, member_type, member_id, member_role, sequence_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(sqlite("prepare member insert"))?;
        for member in &rows.members {
            statement
                .execute((
                    member.owner.id,
                    member.member_type,
                    member.member_id,
                    &member.member_role,
                    member.sequence_id,
                ))
                .map_err(sqlite("insert member row"))?;
        }
    }
    Ok(())
}
