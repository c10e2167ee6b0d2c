//! Flat rows as they come out of the snapshot tables.
//!
//! Parent rows (`NodeRow`, `EntityRow`) arrive ordered by id; child rows
//! arrive ordered by owner id and then by their own ordering column. The
//! reader aligns the two streams through [`OwnerKey`].

use std::cmp::Ordering;

use crate::coordinate::Coordinate;
use crate::entity::{Entity, EntityKind, EntityMeta, Tags};
use crate::error::InvalidInput;

/// Identity of the parent a child row belongs to.
///
/// `version` is only populated by history-aware backends that key child
/// rows by `(id, version)`; a `None` version matches every revision of the
/// parent id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerKey {
    /// Owning entity id.
    pub id: i64,
    /// Owning revision, when the backend tracks history.
    pub version: Option<i32>,
}

impl OwnerKey {
    /// Key matching any revision of `id`.
    #[must_use]
    pub const fn id(id: i64) -> Self {
        Self { id, version: None }
    }

    /// Key matching one revision of `id`.
    #[must_use]
    pub const fn versioned(id: i64, version: i32) -> Self {
        Self {
            id,
            version: Some(version),
        }
    }

    /// Position of a child row relative to the parent `(id, version)`.
    ///
    /// `Less` means the child belongs to a parent the reader has already
    /// passed, `Equal` that it belongs to this parent and `Greater` that it
    /// belongs to a parent still ahead.
    #[must_use]
    pub fn align(&self, parent_id: i64, parent_version: i32) -> Ordering {
        match self.id.cmp(&parent_id) {
            Ordering::Equal => self
                .version
                .map_or(Ordering::Equal, |version| version.cmp(&parent_version)),
            other => other,
        }
    }
}

/// Metadata columns shared by every parent table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRow {
    /// Entity id.
    pub id: i64,
    /// Revision number.
    pub version: i32,
    /// Changeset id.
    pub changeset_id: i64,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Author id.
    pub user_id: i32,
    /// Author display name.
    pub user_name: String,
    /// Visibility flag.
    pub visible: bool,
}

/// A row of the node table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRow {
    /// Metadata columns.
    pub entity: EntityRow,
    /// Latitude scaled by `10^7`.
    pub latitude: i32,
    /// Longitude scaled by `10^7`.
    pub longitude: i32,
}

/// A row of one of the tag tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    /// Owning entity.
    pub owner: OwnerKey,
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// A row of the way-node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WayNodeRow {
    /// Owning way.
    pub owner: OwnerKey,
    /// Referenced node id.
    pub node_id: i64,
    /// Zero-based position within the way.
    pub sequence_id: i32,
}

/// A row of the relation member table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRow {
    /// Owning relation.
    pub owner: OwnerKey,
    /// Referenced entity id.
    pub member_id: i64,
    /// Referenced entity kind code (0 node, 1 way, 2 relation).
    pub member_type: i32,
    /// Role of the member.
    pub member_role: String,
    /// Zero-based position within the relation.
    pub sequence_id: i32,
}

/// Child rows expose the parent they belong to.
pub trait ChildRow {
    /// Owning parent.
    fn owner(&self) -> OwnerKey;
}

impl ChildRow for TagRow {
    fn owner(&self) -> OwnerKey {
        self.owner
    }
}

impl ChildRow for WayNodeRow {
    fn owner(&self) -> OwnerKey {
        self.owner
    }
}

impl ChildRow for MemberRow {
    fn owner(&self) -> OwnerKey {
        self.owner
    }
}

impl From<&EntityMeta> for EntityRow {
    fn from(meta: &EntityMeta) -> Self {
        Self {
            id: meta.id,
            version: meta.version,
            changeset_id: meta.changeset_id,
            timestamp: meta.timestamp,
            user_id: meta.user_id,
            user_name: meta.user_name.clone(),
            visible: meta.visible,
        }
    }
}

/// Every row a single entity occupies across the snapshot tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRows {
    /// Category, selecting the parent and child tables.
    pub kind: EntityKind,
    /// Parent row metadata.
    pub entity: EntityRow,
    /// Node position; `Some` exactly when `kind` is a node.
    pub location: Option<Coordinate>,
    /// Tag rows ordered by key.
    pub tags: Vec<TagRow>,
    /// Way-node rows in sequence order.
    pub way_nodes: Vec<WayNodeRow>,
    /// Member rows in sequence order.
    pub members: Vec<MemberRow>,
}

impl EntityRows {
    /// Split `entity` into rows, numbering ordered children from zero.
    pub fn from_entity(entity: &Entity) -> Result<Self, InvalidInput> {
        entity.validate()?;
        let entity_row = EntityRow::from(entity.meta());
        let owner = OwnerKey::id(entity_row.id);
        let mut rows = Self {
            kind: entity.kind(),
            entity: entity_row,
            location: None,
            tags: tag_rows(owner, entity.tags()),
            way_nodes: Vec::new(),
            members: Vec::new(),
        };
        match entity {
            Entity::Node(node) => rows.location = node.location,
            Entity::Way(way) => {
                rows.way_nodes = way
                    .nodes
                    .iter()
                    .zip(sequence_ids())
                    .map(|(node_id, sequence_id)| WayNodeRow {
                        owner,
                        node_id: *node_id,
                        sequence_id,
                    })
                    .collect();
            }
            Entity::Relation(relation) => {
                rows.members = relation
                    .members
                    .iter()
                    .zip(sequence_ids())
                    .map(|(member, sequence_id)| MemberRow {
                        owner,
                        member_id: member.id,
                        member_type: member.kind.code(),
                        member_role: member.role.clone(),
                        sequence_id,
                    })
                    .collect();
            }
        }
        Ok(rows)
    }

    /// Node table row, when the entity is a node.
    #[must_use]
    pub fn node_row(&self) -> Option<NodeRow> {
        self.location.map(|location| NodeRow {
            entity: self.entity.clone(),
            latitude: location.lat_e7(),
            longitude: location.lon_e7(),
        })
    }
}

/// Sequence ids `0, 1, 2, ...`; callers validate the child count first.
fn sequence_ids() -> impl Iterator<Item = i32> {
    0_i32..
}

fn tag_rows(owner: OwnerKey, tags: &Tags) -> Vec<TagRow> {
    let mut rows: Vec<TagRow> = tags
        .iter()
        .map(|(key, value)| TagRow {
            owner,
            key: key.clone(),
            value: value.clone(),
        })
        .collect();
    rows.sort_by(|left, right| left.key.cmp(&right.key));
    rows
}
