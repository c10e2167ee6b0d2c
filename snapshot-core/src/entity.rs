//! Graph entities reconstructed from and persisted to a snapshot.
//!
//! Nodes, ways and relations share the same metadata envelope
//! ([`EntityMeta`]) and a free-form tag map. Ways reference nodes by id and
//! relations reference typed members; neither reference is required to
//! resolve inside the same snapshot.

use std::collections::HashMap;
use std::fmt;

use crate::coordinate::Coordinate;
use crate::error::InvalidInput;

/// Free-form key/value annotations attached to an entity.
pub type Tags = HashMap<String, String>;

/// Category of a graph entity.
///
/// The discriminants are the values persisted in the `member_type` column
/// of the relation member table and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EntityKind {
    /// A point with coordinates.
    Node = 0,
    /// An ordered list of node references.
    Way = 1,
    /// An ordered list of typed member references.
    Relation = 2,
}

impl EntityKind {
    /// All kinds in the order a full snapshot stream emits them.
    pub const ALL: [Self; 3] = [Self::Node, Self::Way, Self::Relation];

    /// Integer code stored in the snapshot tables.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Node => 0,
            Self::Way => 1,
            Self::Relation => 2,
        }
    }

    /// Human-readable table stem, e.g. `"node"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a persisted member type code is not recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity kind code {0}")]
pub struct UnknownEntityKind(pub i32);

impl TryFrom<i32> for EntityKind {
    type Error = UnknownEntityKind;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Node),
            1 => Ok(Self::Way),
            2 => Ok(Self::Relation),
            other => Err(UnknownEntityKind(other)),
        }
    }
}

/// Identity of an entity across the whole snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityKey {
    /// Category of the entity.
    pub kind: EntityKind,
    /// Identifier, unique within its category.
    pub id: i64,
}

impl EntityKey {
    /// Key for a node.
    #[must_use]
    pub const fn node(id: i64) -> Self {
        Self {
            kind: EntityKind::Node,
            id,
        }
    }

    /// Key for a way.
    #[must_use]
    pub const fn way(id: i64) -> Self {
        Self {
            kind: EntityKind::Way,
            id,
        }
    }

    /// Key for a relation.
    #[must_use]
    pub const fn relation(id: i64) -> Self {
        Self {
            kind: EntityKind::Relation,
            id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Metadata shared by every entity category.
///
/// # Examples
///
/// ```
/// use snapshot_core::EntityMeta;
///
/// let meta = EntityMeta::new(42).with_version(3);
/// assert_eq!(meta.id, 42);
/// assert_eq!(meta.version, 3);
/// assert!(meta.visible);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityMeta {
    /// Identifier, unique within the entity's category.
    pub id: i64,
    /// Revision number.
    pub version: i32,
    /// Changeset that produced this revision.
    pub changeset_id: i64,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Author identifier.
    pub user_id: i32,
    /// Author display name.
    pub user_name: String,
    /// Whether the entity is live at this revision.
    pub visible: bool,
}

impl EntityMeta {
    /// Metadata for `id` with every other field at its neutral value.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self {
            id,
            version: 1,
            changeset_id: 0,
            timestamp: 0,
            user_id: 0,
            user_name: String::new(),
            visible: true,
        }
    }

    /// Replace the revision number.
    #[must_use]
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Replace the changeset identifier.
    #[must_use]
    pub fn with_changeset(mut self, changeset_id: i64) -> Self {
        self.changeset_id = changeset_id;
        self
    }

    /// Replace the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Replace the author identity.
    #[must_use]
    pub fn with_user(mut self, user_id: i32, user_name: impl Into<String>) -> Self {
        self.user_id = user_id;
        self.user_name = user_name.into();
        self
    }

    /// Replace the visibility flag.
    #[must_use]
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

/// A point in the graph.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Shared metadata.
    pub meta: EntityMeta,
    /// Annotations.
    pub tags: Tags,
    /// Position. Nodes read back from a snapshot always carry one; the
    /// writer rejects nodes without it.
    pub location: Option<Coordinate>,
}

impl Node {
    /// Construct a node at `location` with no tags.
    #[must_use]
    pub fn new(meta: EntityMeta, location: Coordinate) -> Self {
        Self {
            meta,
            tags: Tags::new(),
            location: Some(location),
        }
    }
}

/// An ordered list of node references.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Way {
    /// Shared metadata.
    pub meta: EntityMeta,
    /// Annotations.
    pub tags: Tags,
    /// Referenced node ids in sequence order. Duplicates are allowed.
    pub nodes: Vec<i64>,
}

impl Way {
    /// Construct a way over `nodes` with no tags.
    #[must_use]
    pub fn new(meta: EntityMeta, nodes: Vec<i64>) -> Self {
        Self {
            meta,
            tags: Tags::new(),
            nodes,
        }
    }
}

/// A typed reference from a relation to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Member {
    /// Referenced entity id.
    pub id: i64,
    /// Referenced entity category.
    pub kind: EntityKind,
    /// Role of the member within the relation, possibly empty.
    pub role: String,
}

impl Member {
    /// Construct a member reference.
    #[must_use]
    pub fn new(kind: EntityKind, id: i64, role: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            role: role.into(),
        }
    }

    /// Key of the referenced entity.
    #[must_use]
    pub const fn key(&self) -> EntityKey {
        EntityKey {
            kind: self.kind,
            id: self.id,
        }
    }
}

/// An ordered list of typed members.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relation {
    /// Shared metadata.
    pub meta: EntityMeta,
    /// Annotations.
    pub tags: Tags,
    /// Members in sequence order.
    pub members: Vec<Member>,
}

impl Relation {
    /// Construct a relation over `members` with no tags.
    #[must_use]
    pub fn new(meta: EntityMeta, members: Vec<Member>) -> Self {
        Self {
            meta,
            tags: Tags::new(),
            members,
        }
    }
}

/// Any graph entity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "lowercase"))]
pub enum Entity {
    /// A node.
    Node(Node),
    /// A way.
    Way(Way),
    /// A relation.
    Relation(Relation),
}

impl Entity {
    /// Category of this entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Node(_) => EntityKind::Node,
            Self::Way(_) => EntityKind::Way,
            Self::Relation(_) => EntityKind::Relation,
        }
    }

    /// Shared metadata.
    #[must_use]
    pub const fn meta(&self) -> &EntityMeta {
        match self {
            Self::Node(node) => &node.meta,
            Self::Way(way) => &way.meta,
            Self::Relation(relation) => &relation.meta,
        }
    }

    /// Identifier within the entity's category.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.meta().id
    }

    /// Snapshot-wide identity.
    #[must_use]
    pub const fn key(&self) -> EntityKey {
        EntityKey {
            kind: self.kind(),
            id: self.id(),
        }
    }

    /// Check the entity can be persisted.
    ///
    /// Nodes need coordinates and ordered children must fit in an `i32`
    /// sequence id.
    pub fn validate(&self) -> Result<(), InvalidInput> {
        let children = match self {
            Self::Node(node) => {
                return node
                    .location
                    .map(|_| ())
                    .ok_or(InvalidInput::MissingCoordinates { id: node.meta.id });
            }
            Self::Way(way) => way.nodes.len(),
            Self::Relation(relation) => relation.members.len(),
        };
        if i32::try_from(children).is_err() {
            return Err(InvalidInput::TooManyChildren {
                kind: self.kind(),
                id: self.id(),
                count: children,
            });
        }
        Ok(())
    }

    /// Annotations.
    #[must_use]
    pub const fn tags(&self) -> &Tags {
        match self {
            Self::Node(node) => &node.tags,
            Self::Way(way) => &way.tags,
            Self::Relation(relation) => &relation.tags,
        }
    }
}

impl From<Node> for Entity {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<Way> for Entity {
    fn from(way: Way) -> Self {
        Self::Way(way)
    }
}

impl From<Relation> for Entity {
    fn from(relation: Relation) -> Self {
        Self::Relation(relation)
    }
}
