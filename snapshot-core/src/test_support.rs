//! In-memory snapshot backend used by unit and behaviour tests.
//!
//! [`MemoryStore`] keeps entities in ordered maps and serves them to the
//! reader through [`VecSource`] cursors, so the streaming, lookup and
//! closure paths run exactly as they do against SQLite. [`MemoryRows`]
//! exposes the flat rows directly for tests that need to corrupt them.

use std::collections::{BTreeMap, BTreeSet};

use rstar::{AABB, RTree, RTreeObject};

use crate::closure::ClosureSource;
use crate::coordinate::BoundingBox;
use crate::cursor::{BoxedSource, VecSource};
use crate::entity::{Entity, EntityKey, EntityKind, Node, Relation, Way};
use crate::error::{InvalidInput, ReadError};
use crate::reader::{
    Categories, EntityStream, NodeReader, NodeSources, RelationReader, RelationSources,
    SnapshotSources, WayReader, WaySources,
};
use crate::rows::{EntityRow, EntityRows, MemberRow, NodeRow, TagRow, WayNodeRow};
use crate::store::SnapshotStore;

/// Node position stored in the spatial index.
#[derive(Debug, Clone, PartialEq)]
struct IndexedNode {
    id: i64,
    point: [f64; 2],
}

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

/// Snapshot held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes: BTreeMap<i64, Node>,
    ways: BTreeMap<i64, Way>,
    relations: BTreeMap<i64, Relation>,
    index: RTree<IndexedNode>,
}

impl MemoryStore {
    /// Build a store from `entities`; later entities replace earlier ones
    /// with the same key.
    pub fn from_entities<I>(entities: I) -> Result<Self, InvalidInput>
    where
        I: IntoIterator<Item = Entity>,
    {
        let mut store = Self::default();
        for entity in entities {
            store.insert(entity)?;
        }
        Ok(store)
    }

    /// Insert or replace a single entity.
    pub fn insert(&mut self, entity: Entity) -> Result<(), InvalidInput> {
        entity.validate()?;
        match entity {
            Entity::Node(node) => {
                if let Some(previous) = self.nodes.remove(&node.meta.id) {
                    self.index.remove(&indexed(&previous));
                }
                self.index.insert(indexed(&node));
                self.nodes.insert(node.meta.id, node);
            }
            Entity::Way(way) => {
                self.ways.insert(way.meta.id, way);
            }
            Entity::Relation(relation) => {
                self.relations.insert(relation.meta.id, relation);
            }
        }
        Ok(())
    }

    /// Remove an entity, returning whether it existed.
    pub fn remove(&mut self, key: EntityKey) -> bool {
        match key.kind {
            EntityKind::Node => self.nodes.remove(&key.id).is_some_and(|node| {
                self.index.remove(&indexed(&node));
                true
            }),
            EntityKind::Way => self.ways.remove(&key.id).is_some(),
            EntityKind::Relation => self.relations.remove(&key.id).is_some(),
        }
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }

    /// Whether the store holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat rows of every stored entity, in table order.
    #[must_use]
    pub fn rows(&self) -> MemoryRows {
        let mut rows = MemoryRows::default();
        for node in self.nodes.values() {
            rows.push(&Entity::Node(node.clone()));
        }
        for way in self.ways.values() {
            rows.push(&Entity::Way(way.clone()));
        }
        for relation in self.relations.values() {
            rows.push(&Entity::Relation(relation.clone()));
        }
        rows
    }
}

fn indexed(node: &Node) -> IndexedNode {
    let (lon, lat) = node
        .location
        .map_or((0.0, 0.0), |location| (location.longitude(), location.latitude()));
    IndexedNode {
        id: node.meta.id,
        point: [lon, lat],
    }
}

fn pick<T: Clone>(map: &BTreeMap<i64, T>, ids: &BTreeSet<i64>) -> Vec<T> {
    ids.iter().filter_map(|id| map.get(id)).cloned().collect()
}

impl ClosureSource for MemoryStore {
    fn node_ids_in_box(&self, bbox: &BoundingBox) -> Result<BTreeSet<i64>, ReadError> {
        let min = bbox.min();
        let max = bbox.max();
        let envelope = AABB::from_corners(
            [min.longitude(), min.latitude()],
            [max.longitude(), max.latitude()],
        );
        Ok(self
            .index
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.id)
            .filter(|id| {
                self.nodes
                    .get(id)
                    .and_then(|node| node.location)
                    .is_some_and(|location| bbox.contains(&location))
            })
            .collect())
    }

    fn way_ids_for_nodes(&self, node_ids: &BTreeSet<i64>) -> Result<BTreeSet<i64>, ReadError> {
        Ok(self
            .ways
            .values()
            .filter(|way| way.nodes.iter().any(|id| node_ids.contains(id)))
            .map(|way| way.meta.id)
            .collect())
    }

    fn relation_ids_for_members(
        &self,
        node_ids: &BTreeSet<i64>,
        way_ids: &BTreeSet<i64>,
    ) -> Result<BTreeSet<i64>, ReadError> {
        Ok(self
            .relations
            .values()
            .filter(|relation| {
                relation.members.iter().any(|member| match member.kind {
                    EntityKind::Node => node_ids.contains(&member.id),
                    EntityKind::Way => way_ids.contains(&member.id),
                    EntityKind::Relation => false,
                })
            })
            .map(|relation| relation.meta.id)
            .collect())
    }

    fn nodes_by_id(&self, ids: &BTreeSet<i64>) -> Result<Vec<Node>, ReadError> {
        Ok(pick(&self.nodes, ids))
    }

    fn ways_by_id(&self, ids: &BTreeSet<i64>) -> Result<Vec<Way>, ReadError> {
        Ok(pick(&self.ways, ids))
    }

    fn relations_by_id(&self, ids: &BTreeSet<i64>) -> Result<Vec<Relation>, ReadError> {
        Ok(pick(&self.relations, ids))
    }
}

impl SnapshotStore for MemoryStore {
    type Error = ReadError;

    fn stream(&self, categories: Categories) -> Result<EntityStream<'_>, ReadError> {
        EntityStream::open(self.rows().into_sources(), categories)
    }
}

/// Flat table rows, editable before they are streamed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRows {
    /// Node table.
    pub nodes: Vec<NodeRow>,
    /// Node tag table.
    pub node_tags: Vec<TagRow>,
    /// Way table.
    pub ways: Vec<EntityRow>,
    /// Way tag table.
    pub way_tags: Vec<TagRow>,
    /// Way-node table.
    pub way_nodes: Vec<WayNodeRow>,
    /// Relation table.
    pub relations: Vec<EntityRow>,
    /// Relation tag table.
    pub relation_tags: Vec<TagRow>,
    /// Relation member table.
    pub relation_members: Vec<MemberRow>,
}

impl MemoryRows {
    /// Append the rows of `entity`. Entities must be pushed in table order.
    ///
    /// # Panics
    ///
    /// Panics when `entity` fails validation.
    pub fn push(&mut self, entity: &Entity) {
        let rows = EntityRows::from_entity(entity).expect("test entities are valid");
        match rows.kind {
            EntityKind::Node => {
                self.nodes.extend(rows.node_row());
                self.node_tags.extend(rows.tags);
            }
            EntityKind::Way => {
                self.ways.push(rows.entity);
                self.way_tags.extend(rows.tags);
                self.way_nodes.extend(rows.way_nodes);
            }
            EntityKind::Relation => {
                self.relations.push(rows.entity);
                self.relation_tags.extend(rows.tags);
                self.relation_members.extend(rows.members);
            }
        }
    }

    /// Cursor sources over the rows.
    #[must_use]
    pub fn into_sources(self) -> SnapshotSources<'static> {
        SnapshotSources {
            nodes: NodeSources {
                nodes: boxed(self.nodes),
                tags: boxed(self.node_tags),
            },
            ways: WaySources {
                ways: boxed(self.ways),
                tags: boxed(self.way_tags),
                nodes: boxed(self.way_nodes),
            },
            relations: RelationSources {
                relations: boxed(self.relations),
                tags: boxed(self.relation_tags),
                members: boxed(self.relation_members),
            },
        }
    }

    /// Stream the rows through the aligned reader.
    pub fn stream(self, categories: Categories) -> Result<EntityStream<'static>, ReadError> {
        EntityStream::open(self.into_sources(), categories)
    }

    /// Read every node through a [`NodeReader`].
    pub fn read_nodes(self) -> Result<Vec<Node>, ReadError> {
        NodeReader::open(self.into_sources().nodes)?.read_all()
    }

    /// Read every way through a [`WayReader`].
    pub fn read_ways(self) -> Result<Vec<Way>, ReadError> {
        WayReader::open(self.into_sources().ways)?.read_all()
    }

    /// Read every relation through a [`RelationReader`].
    pub fn read_relations(self) -> Result<Vec<Relation>, ReadError> {
        RelationReader::open(self.into_sources().relations)?.read_all()
    }
}

fn boxed<R: Clone + 'static>(rows: Vec<R>) -> BoxedSource<'static, R> {
    Box::new(VecSource::new(rows))
}
