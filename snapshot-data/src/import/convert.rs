//! Conversion from decoded PBF elements to snapshot entities.

use osmpbf::{DenseNode, DenseNodeInfo, Element, Info, RelMemberType};
use snapshot_core::{
    Coordinate, CoordinateError, Entity, EntityKind, EntityMeta, Member, Node, Relation, Tags,
    Way,
};

/// PBF timestamps arrive in milliseconds; snapshots store seconds.
const MILLIS_PER_SECOND: i64 = 1000;

/// An element that cannot become an entity.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Rejected {
    pub kind: EntityKind,
    pub id: i64,
    pub reason: CoordinateError,
}

pub(super) fn convert(element: &Element<'_>) -> Result<Entity, Rejected> {
    match element {
        Element::Node(node) => {
            let location = locate(EntityKind::Node, node.id(), node.lat(), node.lon())?;
            Ok(Entity::Node(Node {
                meta: meta_from_info(node.id(), &node.info()),
                tags: collect_tags(node.tags()),
                location: Some(location),
            }))
        }
        Element::DenseNode(node) => dense_node(node),
        Element::Way(way) => Ok(Entity::Way(Way {
            meta: meta_from_info(way.id(), &way.info()),
            tags: collect_tags(way.tags()),
            nodes: way.refs().collect(),
        })),
        Element::Relation(relation) => Ok(Entity::Relation(Relation {
            meta: meta_from_info(relation.id(), &relation.info()),
            tags: collect_tags(relation.tags()),
            members: relation
                .members()
                .map(|member| {
                    let role = member.role().unwrap_or_default();
                    Member::new(member_kind(&member.member_type), member.member_id, role)
                })
                .collect(),
        })),
    }
}

fn dense_node(node: &DenseNode<'_>) -> Result<Entity, Rejected> {
    let location = locate(EntityKind::Node, node.id(), node.lat(), node.lon())?;
    let meta = node.info().map_or_else(
        || EntityMeta::new(node.id()),
        |info| meta_from_dense_info(node.id(), info),
    );
    Ok(Entity::Node(Node {
        meta,
        tags: collect_tags(node.tags()),
        location: Some(location),
    }))
}

fn locate(kind: EntityKind, id: i64, lat: f64, lon: f64) -> Result<Coordinate, Rejected> {
    Coordinate::from_degrees(lat, lon).map_err(|reason| Rejected { kind, id, reason })
}

fn collect_tags<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> Tags {
    tags.map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

const fn member_kind(member_type: &RelMemberType) -> EntityKind {
    match member_type {
        RelMemberType::Node => EntityKind::Node,
        RelMemberType::Way => EntityKind::Way,
        RelMemberType::Relation => EntityKind::Relation,
    }
}

fn meta_from_info(id: i64, info: &Info<'_>) -> EntityMeta {
    let mut meta = EntityMeta::new(id).with_visible(!info.deleted());
    if let Some(version) = info.version() {
        meta = meta.with_version(version);
    }
    if let Some(changeset) = info.changeset() {
        meta = meta.with_changeset(changeset);
    }
    if let Some(millis) = info.milli_timestamp() {
        meta = meta.with_timestamp(millis.div_euclid(MILLIS_PER_SECOND));
    }
    if let Some(uid) = info.uid() {
        let user = info.user().and_then(Result::ok).unwrap_or_default();
        meta = meta.with_user(uid, user);
    }
    meta
}

fn meta_from_dense_info(id: i64, info: &DenseNodeInfo<'_>) -> EntityMeta {
    EntityMeta::new(id)
        .with_version(info.version())
        .with_changeset(info.changeset())
        .with_timestamp(info.milli_timestamp().div_euclid(MILLIS_PER_SECOND))
        .with_user(info.uid(), info.user().unwrap_or_default())
        .with_visible(!info.deleted())
}
