//! Streaming reassembly of entities from aligned parent and child cursors.
//!
//! Each category is read by a group reader that walks its parent cursor in
//! id order and pulls the matching rows from every child cursor before it
//! moves on. Child rows for a parent the parent cursor never produced are
//! reported as [`ReadError::OrphanedChild`]; the reader never skips them.
//!
//! [`EntityStream`] chains the three group readers through the states
//! `Node -> Way -> Relation -> Exhausted`. A failed step moves the stream to
//! `Exhausted`; [`EntityStream::reset`] restarts it from the first node.

use std::cmp::Ordering;

use log::debug;

use crate::builder::{add_member, add_tag, add_way_node, build_node, build_relation, build_way};
use crate::cursor::{BoxedSource, Cursor, RowSource};
use crate::entity::{Entity, EntityKind, Node, Relation, Way};
use crate::error::ReadError;
use crate::rows::{ChildRow, EntityRow, MemberRow, NodeRow, TagRow, WayNodeRow};

/// Row sources for the node category.
pub struct NodeSources<'a> {
    /// Node rows ordered by id.
    pub nodes: BoxedSource<'a, NodeRow>,
    /// Node tag rows ordered by owner id.
    pub tags: BoxedSource<'a, TagRow>,
}

/// Row sources for the way category.
pub struct WaySources<'a> {
    /// Way rows ordered by id.
    pub ways: BoxedSource<'a, EntityRow>,
    /// Way tag rows ordered by owner id.
    pub tags: BoxedSource<'a, TagRow>,
    /// Way-node rows ordered by owner id then sequence.
    pub nodes: BoxedSource<'a, WayNodeRow>,
}

/// Row sources for the relation category.
pub struct RelationSources<'a> {
    /// Relation rows ordered by id.
    pub relations: BoxedSource<'a, EntityRow>,
    /// Relation tag rows ordered by owner id.
    pub tags: BoxedSource<'a, TagRow>,
    /// Member rows ordered by owner id then sequence.
    pub members: BoxedSource<'a, MemberRow>,
}

/// Row sources for a whole snapshot.
pub struct SnapshotSources<'a> {
    /// Node category.
    pub nodes: NodeSources<'a>,
    /// Way category.
    pub ways: WaySources<'a>,
    /// Relation category.
    pub relations: RelationSources<'a>,
}

/// Reads nodes with their tags.
pub struct NodeReader<'a> {
    nodes: Cursor<BoxedSource<'a, NodeRow>>,
    tags: Cursor<BoxedSource<'a, TagRow>>,
}

impl<'a> NodeReader<'a> {
    /// Open every cursor of the category.
    pub fn open(sources: NodeSources<'a>) -> Result<Self, ReadError> {
        Ok(Self {
            nodes: Cursor::open(sources.nodes)?,
            tags: Cursor::open(sources.tags)?,
        })
    }

    /// Assemble the next node.
    pub fn next_node(&mut self) -> Result<Option<Node>, ReadError> {
        let Some(row) = self.nodes.advance()? else {
            ensure_consumed(&self.tags, EntityKind::Node, "node_tags")?;
            return Ok(None);
        };
        let mut node = build_node(&row)?;
        attach(&mut self.tags, EntityKind::Node, "node_tags", &row.entity, |tag| {
            add_tag(&mut node.tags, tag);
            Ok(())
        })?;
        Ok(Some(node))
    }

    /// Assemble every remaining node.
    pub fn read_all(mut self) -> Result<Vec<Node>, ReadError> {
        let mut nodes = Vec::new();
        while let Some(node) = self.next_node()? {
            nodes.push(node);
        }
        Ok(nodes)
    }
}

/// Reads ways with their tags and node references.
pub struct WayReader<'a> {
    ways: Cursor<BoxedSource<'a, EntityRow>>,
    tags: Cursor<BoxedSource<'a, TagRow>>,
    nodes: Cursor<BoxedSource<'a, WayNodeRow>>,
}

impl<'a> WayReader<'a> {
    /// Open every cursor of the category.
    pub fn open(sources: WaySources<'a>) -> Result<Self, ReadError> {
        Ok(Self {
            ways: Cursor::open(sources.ways)?,
            tags: Cursor::open(sources.tags)?,
            nodes: Cursor::open(sources.nodes)?,
        })
    }

    /// Assemble the next way.
    pub fn next_way(&mut self) -> Result<Option<Way>, ReadError> {
        let Some(row) = self.ways.advance()? else {
            ensure_consumed(&self.tags, EntityKind::Way, "way_tags")?;
            ensure_consumed(&self.nodes, EntityKind::Way, "way_nodes")?;
            return Ok(None);
        };
        let mut way = build_way(&row);
        attach(&mut self.tags, EntityKind::Way, "way_tags", &row, |tag| {
            add_tag(&mut way.tags, tag);
            Ok(())
        })?;
        attach(&mut self.nodes, EntityKind::Way, "way_nodes", &row, |node| {
            add_way_node(&mut way, &node)
        })?;
        Ok(Some(way))
    }

    /// Assemble every remaining way.
    pub fn read_all(mut self) -> Result<Vec<Way>, ReadError> {
        let mut ways = Vec::new();
        while let Some(way) = self.next_way()? {
            ways.push(way);
        }
        Ok(ways)
    }
}

/// Reads relations with their tags and members.
pub struct RelationReader<'a> {
    relations: Cursor<BoxedSource<'a, EntityRow>>,
    tags: Cursor<BoxedSource<'a, TagRow>>,
    members: Cursor<BoxedSource<'a, MemberRow>>,
}

impl<'a> RelationReader<'a> {
    /// Open every cursor of the category.
    pub fn open(sources: RelationSources<'a>) -> Result<Self, ReadError> {
        Ok(Self {
            relations: Cursor::open(sources.relations)?,
            tags: Cursor::open(sources.tags)?,
            members: Cursor::open(sources.members)?,
        })
    }

    /// Assemble the next relation.
    pub fn next_relation(&mut self) -> Result<Option<Relation>, ReadError> {
        let Some(row) = self.relations.advance()? else {
            ensure_consumed(&self.tags, EntityKind::Relation, "relation_tags")?;
            ensure_consumed(&self.members, EntityKind::Relation, "relation_members")?;
            return Ok(None);
        };
        let mut relation = build_relation(&row);
        attach(
            &mut self.tags,
            EntityKind::Relation,
            "relation_tags",
            &row,
            |tag| {
                add_tag(&mut relation.tags, tag);
                Ok(())
            },
        )?;
        attach(
            &mut self.members,
            EntityKind::Relation,
            "relation_members",
            &row,
            |member| add_member(&mut relation, member),
        )?;
        Ok(Some(relation))
    }

    /// Assemble every remaining relation.
    pub fn read_all(mut self) -> Result<Vec<Relation>, ReadError> {
        let mut relations = Vec::new();
        while let Some(relation) = self.next_relation()? {
            relations.push(relation);
        }
        Ok(relations)
    }
}

/// Operations the stream needs from every group reader.
trait GroupReader {
    fn next_entity(&mut self) -> Result<Option<Entity>, ReadError>;
    fn skip_rest(&mut self) -> Result<usize, ReadError>;
    fn reset(&mut self) -> Result<(), ReadError>;
}

impl GroupReader for NodeReader<'_> {
    fn next_entity(&mut self) -> Result<Option<Entity>, ReadError> {
        Ok(self.next_node()?.map(Entity::Node))
    }

    fn skip_rest(&mut self) -> Result<usize, ReadError> {
        let skipped = self.nodes.drain()?;
        self.tags.drain()?;
        Ok(skipped)
    }

    fn reset(&mut self) -> Result<(), ReadError> {
        self.nodes.reset()?;
        self.tags.reset()
    }
}

impl GroupReader for WayReader<'_> {
    fn next_entity(&mut self) -> Result<Option<Entity>, ReadError> {
        Ok(self.next_way()?.map(Entity::Way))
    }

    fn skip_rest(&mut self) -> Result<usize, ReadError> {
        let skipped = self.ways.drain()?;
        self.tags.drain()?;
        self.nodes.drain()?;
        Ok(skipped)
    }

    fn reset(&mut self) -> Result<(), ReadError> {
        self.ways.reset()?;
        self.tags.reset()?;
        self.nodes.reset()
    }
}

impl GroupReader for RelationReader<'_> {
    fn next_entity(&mut self) -> Result<Option<Entity>, ReadError> {
        Ok(self.next_relation()?.map(Entity::Relation))
    }

    fn skip_rest(&mut self) -> Result<usize, ReadError> {
        let skipped = self.relations.drain()?;
        self.tags.drain()?;
        self.members.drain()?;
        Ok(skipped)
    }

    fn reset(&mut self) -> Result<(), ReadError> {
        self.relations.reset()?;
        self.tags.reset()?;
        self.members.reset()
    }
}

/// Consume every child row belonging to `parent`.
fn attach<S, F>(
    cursor: &mut Cursor<S>,
    kind: EntityKind,
    collection: &'static str,
    parent: &EntityRow,
    mut add: F,
) -> Result<(), ReadError>
where
    S: RowSource,
    S::Row: ChildRow,
    F: FnMut(S::Row) -> Result<(), ReadError>,
{
    while let Some(child) = cursor.current() {
        let owner = child.owner();
        match owner.align(parent.id, parent.version) {
            Ordering::Less => {
                return Err(ReadError::OrphanedChild {
                    kind,
                    collection,
                    owner_id: owner.id,
                });
            }
            Ordering::Greater => break,
            Ordering::Equal => {}
        }
        if let Some(row) = cursor.advance()? {
            add(row)?;
        }
    }
    Ok(())
}

/// Fail if child rows remain once the parent cursor is exhausted.
fn ensure_consumed<S>(
    cursor: &Cursor<S>,
    kind: EntityKind,
    collection: &'static str,
) -> Result<(), ReadError>
where
    S: RowSource,
    S::Row: ChildRow,
{
    match cursor.current() {
        Some(child) => Err(ReadError::OrphanedChild {
            kind,
            collection,
            owner_id: child.owner().id,
        }),
        None => Ok(()),
    }
}

/// Categories an [`EntityStream`] should leave out.
///
/// # Examples
///
/// ```
/// use snapshot_core::Categories;
///
/// let only_nodes = Categories::default().skip_ways().skip_relations();
/// assert!(!only_nodes.skip_nodes);
/// assert!(only_nodes.skip_ways);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Categories {
    /// Leave out nodes.
    pub skip_nodes: bool,
    /// Leave out ways.
    pub skip_ways: bool,
    /// Leave out relations.
    pub skip_relations: bool,
}

impl Categories {
    /// Leave out nodes.
    #[must_use]
    pub const fn skip_nodes(mut self) -> Self {
        self.skip_nodes = true;
        self
    }

    /// Leave out ways.
    #[must_use]
    pub const fn skip_ways(mut self) -> Self {
        self.skip_ways = true;
        self
    }

    /// Leave out relations.
    #[must_use]
    pub const fn skip_relations(mut self) -> Self {
        self.skip_relations = true;
        self
    }

    /// Whether `kind` is left out.
    #[must_use]
    pub const fn skips(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Node => self.skip_nodes,
            EntityKind::Way => self.skip_ways,
            EntityKind::Relation => self.skip_relations,
        }
    }
}

/// Position of an [`EntityStream`] in its category sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Emitting nodes.
    Node,
    /// Emitting ways.
    Way,
    /// Emitting relations.
    Relation,
    /// Nothing further will be emitted until a reset.
    Exhausted,
}

impl StreamState {
    const fn next(self) -> Self {
        match self {
            Self::Node => Self::Way,
            Self::Way => Self::Relation,
            Self::Relation | Self::Exhausted => Self::Exhausted,
        }
    }
}

/// Lazy, restartable stream of every entity in a snapshot.
///
/// Nodes are emitted first, then ways, then relations, each in id order.
/// Iterating yields `Result`s; after the first error the iterator returns
/// `None` until [`reset`](EntityStream::reset) is called.
pub struct EntityStream<'a> {
    nodes: NodeReader<'a>,
    ways: WayReader<'a>,
    relations: RelationReader<'a>,
    categories: Categories,
    state: StreamState,
}

impl<'a> EntityStream<'a> {
    /// Open every cursor and position the stream on the first node.
    pub fn open(sources: SnapshotSources<'a>, categories: Categories) -> Result<Self, ReadError> {
        Ok(Self {
            nodes: NodeReader::open(sources.nodes)?,
            ways: WayReader::open(sources.ways)?,
            relations: RelationReader::open(sources.relations)?,
            categories,
            state: StreamState::Node,
        })
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Categories being left out.
    #[must_use]
    pub const fn categories(&self) -> Categories {
        self.categories
    }

    /// Change the categories left out from the next step onwards.
    ///
    /// A category that has already been passed is not revisited.
    pub fn set_categories(&mut self, categories: Categories) {
        self.categories = categories;
    }

    /// Pull the next entity.
    pub fn next_entity(&mut self) -> Result<Option<Entity>, ReadError> {
        let result = self.step();
        if result.is_err() {
            self.state = StreamState::Exhausted;
        }
        result
    }

    /// Re-execute every cursor and return to the first node.
    pub fn reset(&mut self) -> Result<(), ReadError> {
        self.state = StreamState::Exhausted;
        self.nodes.reset()?;
        self.ways.reset()?;
        self.relations.reset()?;
        self.state = StreamState::Node;
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Entity>, ReadError> {
        loop {
            let pulled = match self.state {
                StreamState::Node => pull(&mut self.nodes, self.categories.skip_nodes)?,
                StreamState::Way => pull(&mut self.ways, self.categories.skip_ways)?,
                StreamState::Relation => {
                    pull(&mut self.relations, self.categories.skip_relations)?
                }
                StreamState::Exhausted => return Ok(None),
            };
            if let Some(entity) = pulled {
                return Ok(Some(entity));
            }
            self.state = self.state.next();
            debug!("entity stream entering {:?}", self.state);
        }
    }
}

fn pull<G: GroupReader>(reader: &mut G, skip: bool) -> Result<Option<Entity>, ReadError> {
    if skip {
        let skipped = reader.skip_rest()?;
        if skipped > 0 {
            debug!("skipped {skipped} parent rows");
        }
        return Ok(None);
    }
    reader.next_entity()
}

impl Iterator for EntityStream<'_> {
    type Item = Result<Entity, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entity().transpose()
    }
}

impl std::iter::FusedIterator for EntityStream<'_> {}
