//! Bounding-box queries that return a referentially complete result.
//!
//! A way touching the box pulls in every node it references, including
//! nodes outside the box, so callers can draw the way in full. Relations
//! are included when any member is a node or way already in the result.

use std::collections::BTreeSet;

use log::{debug, warn};

use crate::coordinate::BoundingBox;
use crate::entity::{Entity, Node, Relation, Way};
use crate::error::ReadError;
use crate::merge::MergedEntities;

/// Index of the in-box node group in a closure result.
pub const NODES_IN_BOX: usize = 0;
/// Index of the out-of-box node group in a closure result.
pub const MISSING_NODES: usize = 1;
/// Index of the way group in a closure result.
pub const WAYS: usize = 2;
/// Index of the relation group in a closure result.
pub const RELATIONS: usize = 3;

/// Lookups a backend provides for [`resolve_bbox`].
///
/// Id sets are passed and returned in ascending order. Body lookups return
/// only the entities that exist; unknown ids are not an error.
pub trait ClosureSource {
    /// Ids of nodes whose coordinates fall inside `bbox`, edges included.
    fn node_ids_in_box(&self, bbox: &BoundingBox) -> Result<BTreeSet<i64>, ReadError>;

    /// Ids of ways that reference at least one of `node_ids`.
    fn way_ids_for_nodes(&self, node_ids: &BTreeSet<i64>) -> Result<BTreeSet<i64>, ReadError>;

    /// Ids of relations with a node member in `node_ids` or a way member in
    /// `way_ids`.
    fn relation_ids_for_members(
        &self,
        node_ids: &BTreeSet<i64>,
        way_ids: &BTreeSet<i64>,
    ) -> Result<BTreeSet<i64>, ReadError>;

    /// Node bodies for `ids`, ordered by id.
    fn nodes_by_id(&self, ids: &BTreeSet<i64>) -> Result<Vec<Node>, ReadError>;

    /// Way bodies for `ids`, ordered by id.
    fn ways_by_id(&self, ids: &BTreeSet<i64>) -> Result<Vec<Way>, ReadError>;

    /// Relation bodies for `ids`, ordered by id.
    fn relations_by_id(&self, ids: &BTreeSet<i64>) -> Result<Vec<Relation>, ReadError>;
}

/// Counts describing one closure query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClosureSummary {
    /// Nodes inside the box.
    pub nodes_in_box: usize,
    /// Nodes outside the box referenced by returned ways.
    pub missing_nodes: usize,
    /// Ways touching the box.
    pub ways: usize,
    /// Relations with a returned node or way member.
    pub relations: usize,
    /// Way node references that resolved to no stored node.
    pub dangling_node_refs: usize,
}

/// Result of [`resolve_bbox`].
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    /// Nodes in the box, missing nodes, ways and relations, in that group
    /// order.
    pub entities: MergedEntities<Entity>,
    /// Counts for each group.
    pub summary: ClosureSummary,
}

/// Resolve everything needed to describe `bbox` completely.
///
/// The result has four groups, addressed by [`NODES_IN_BOX`],
/// [`MISSING_NODES`], [`WAYS`] and [`RELATIONS`]. The groups are disjoint.
/// Way node references that point at nodes absent from the store are left
/// out and counted in [`ClosureSummary::dangling_node_refs`].
pub fn resolve_bbox<S>(source: &S, bbox: &BoundingBox) -> Result<Closure, ReadError>
where
    S: ClosureSource + ?Sized,
{
    let nodes_in_box = source.node_ids_in_box(bbox)?;
    if nodes_in_box.is_empty() {
        debug!("bounding box {bbox:?} contains no nodes");
        return Ok(Closure {
            entities: MergedEntities::from_groups(vec![Vec::new(); 4]),
            summary: ClosureSummary::default(),
        });
    }

    let way_ids = source.way_ids_for_nodes(&nodes_in_box)?;
    let relation_ids = source.relation_ids_for_members(&nodes_in_box, &way_ids)?;

    let ways = source.ways_by_id(&way_ids)?;
    let missing_ids: BTreeSet<i64> = ways
        .iter()
        .flat_map(|way| way.nodes.iter().copied())
        .filter(|id| !nodes_in_box.contains(id))
        .collect();

    let box_nodes = source.nodes_by_id(&nodes_in_box)?;
    let missing_nodes = source.nodes_by_id(&missing_ids)?;
    let relations = source.relations_by_id(&relation_ids)?;

    let dangling = missing_ids.len().saturating_sub(missing_nodes.len());
    if dangling > 0 {
        warn!("{dangling} way node references in the closure of {bbox:?} point at missing nodes");
    }

    let summary = ClosureSummary {
        nodes_in_box: box_nodes.len(),
        missing_nodes: missing_nodes.len(),
        ways: ways.len(),
        relations: relations.len(),
        dangling_node_refs: dangling,
    };
    debug!("resolved closure {summary:?}");

    let entities = MergedEntities::from_groups(vec![
        box_nodes.into_iter().map(Entity::Node).collect(),
        missing_nodes.into_iter().map(Entity::Node).collect(),
        ways.into_iter().map(Entity::Way).collect(),
        relations.into_iter().map(Entity::Relation).collect(),
    ]);
    Ok(Closure { entities, summary })
}
