//! Read access to persisted snapshots.
//!
//! The [`SnapshotStore`] trait exposes the three read paths callers need: a
//! full category-filtered stream, keyed lookups and bounding-box closures.
//! Backends implement [`ClosureSource`] for the id-set queries and
//! [`SnapshotStore::stream`] for the full scan; keyed lookups and closures
//! are derived from those.

use std::collections::{BTreeSet, HashMap};

use crate::closure::{Closure, ClosureSource, resolve_bbox};
use crate::coordinate::BoundingBox;
use crate::entity::{Entity, EntityKey, EntityKind};
use crate::error::ReadError;
use crate::reader::{Categories, EntityStream};

#[cfg(feature = "store-sqlite")]
pub mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::{
    SchemaError, SnapshotWriter, SqliteSnapshotDb, SqliteStoreError, StoreOptions, WriteError,
    WriteSummary, WriterOptions,
};

/// Read-only access to a persisted snapshot.
///
/// # Examples
///
/// ```rust
/// use snapshot_core::{Categories, EntityKey, SnapshotStore};
///
/// fn count_ways<S: SnapshotStore>(store: &S) -> Result<usize, S::Error> {
///     let categories = Categories::default().skip_nodes().skip_relations();
///     let mut count = 0;
///     for entity in store.stream(categories)? {
///         entity?;
///         count += 1;
///     }
///     Ok(count)
/// }
///
/// fn has_node<S: SnapshotStore>(store: &S, id: i64) -> Result<bool, S::Error> {
///     Ok(store.get(EntityKey::node(id))?.is_some())
/// }
/// ```
pub trait SnapshotStore: ClosureSource {
    /// Backend error type.
    type Error: std::error::Error + From<ReadError>;

    /// Stream every entity not excluded by `categories`.
    ///
    /// Nodes come first, then ways, then relations, each ordered by id.
    fn stream(&self, categories: Categories) -> Result<EntityStream<'_>, Self::Error>;

    /// Look up a single entity.
    fn get(&self, key: EntityKey) -> Result<Option<Entity>, Self::Error> {
        Ok(self.get_many(&[key])?.into_iter().next())
    }

    /// Look up several entities.
    ///
    /// Entities are returned in the order their keys first appear in `keys`;
    /// keys with no stored entity are left out.
    fn get_many(&self, keys: &[EntityKey]) -> Result<Vec<Entity>, Self::Error> {
        let ids_of = |kind: EntityKind| -> BTreeSet<i64> {
            keys.iter()
                .filter(|key| key.kind == kind)
                .map(|key| key.id)
                .collect()
        };
        let mut found: HashMap<EntityKey, Entity> = HashMap::new();
        let nodes = ids_of(EntityKind::Node);
        if !nodes.is_empty() {
            found.extend(
                self.nodes_by_id(&nodes)?
                    .into_iter()
                    .map(|node| (EntityKey::node(node.meta.id), Entity::Node(node))),
            );
        }
        let ways = ids_of(EntityKind::Way);
        if !ways.is_empty() {
            found.extend(
                self.ways_by_id(&ways)?
                    .into_iter()
                    .map(|way| (EntityKey::way(way.meta.id), Entity::Way(way))),
            );
        }
        let relations = ids_of(EntityKind::Relation);
        if !relations.is_empty() {
            found.extend(self.relations_by_id(&relations)?.into_iter().map(|relation| {
                (
                    EntityKey::relation(relation.meta.id),
                    Entity::Relation(relation),
                )
            }));
        }
        Ok(keys.iter().filter_map(|key| found.remove(key)).collect())
    }

    /// Resolve the referential closure of `bbox`.
    fn bbox(&self, bbox: &BoundingBox) -> Result<Closure, Self::Error> {
        Ok(resolve_bbox(self, bbox)?)
    }
}
