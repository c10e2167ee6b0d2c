//! Pure conversions from snapshot rows into entities.
//!
//! Parent rows become entities with empty tag maps and child lists; child
//! rows are then folded in one by one. Sequence ids are checked against the
//! length of the list they extend, so a gap or duplicate surfaces as
//! [`ReadError::SequenceGap`] instead of a silently shifted way.

use crate::coordinate::Coordinate;
use crate::entity::{EntityKind, EntityMeta, Member, Node, Relation, Tags, Way};
use crate::error::ReadError;
use crate::rows::{EntityRow, MemberRow, NodeRow, TagRow, WayNodeRow};

impl From<&EntityRow> for EntityMeta {
    fn from(row: &EntityRow) -> Self {
        Self {
            id: row.id,
            version: row.version,
            changeset_id: row.changeset_id,
            timestamp: row.timestamp,
            user_id: row.user_id,
            user_name: row.user_name.clone(),
            visible: row.visible,
        }
    }
}

/// Build a node with no tags from its row.
pub fn build_node(row: &NodeRow) -> Result<Node, ReadError> {
    let location = Coordinate::from_scaled(row.latitude, row.longitude).map_err(|source| {
        ReadError::InvalidCoordinate {
            node_id: row.entity.id,
            source,
        }
    })?;
    Ok(Node::new(EntityMeta::from(&row.entity), location))
}

/// Build a way with no tags or nodes from its row.
#[must_use]
pub fn build_way(row: &EntityRow) -> Way {
    Way::new(EntityMeta::from(row), Vec::new())
}

/// Build a relation with no tags or members from its row.
#[must_use]
pub fn build_relation(row: &EntityRow) -> Relation {
    Relation::new(EntityMeta::from(row), Vec::new())
}

/// Add a tag row to `tags`. A repeated key keeps the last value.
pub fn add_tag(tags: &mut Tags, row: TagRow) {
    tags.insert(row.key, row.value);
}

/// Append a way-node row to `way`, checking its sequence id.
pub fn add_way_node(way: &mut Way, row: &WayNodeRow) -> Result<(), ReadError> {
    check_sequence(EntityKind::Way, way.meta.id, way.nodes.len(), row.sequence_id)?;
    way.nodes.push(row.node_id);
    Ok(())
}

/// Append a member row to `relation`, checking its sequence id and type.
pub fn add_member(relation: &mut Relation, row: MemberRow) -> Result<(), ReadError> {
    check_sequence(
        EntityKind::Relation,
        relation.meta.id,
        relation.members.len(),
        row.sequence_id,
    )?;
    let kind = EntityKind::try_from(row.member_type).map_err(|_| ReadError::UnknownMemberType {
        relation_id: relation.meta.id,
        member_type: row.member_type,
    })?;
    relation
        .members
        .push(Member::new(kind, row.member_id, row.member_role));
    Ok(())
}

fn check_sequence(kind: EntityKind, id: i64, expected: usize, found: i32) -> Result<(), ReadError> {
    if usize::try_from(found).ok() == Some(expected) {
        Ok(())
    } else {
        Err(ReadError::SequenceGap {
            kind,
            id,
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::OwnerKey;
    use rstest::{fixture, rstest};

    #[fixture]
    fn entity_row() -> EntityRow {
        EntityRow {
            id: 9,
            version: 4,
            changeset_id: 77,
            timestamp: 1_700_000_000,
            user_id: 12,
            user_name: "mapper".into(),
            visible: true,
        }
    }

    fn way_node(sequence_id: i32, node_id: i64) -> WayNodeRow {
        WayNodeRow {
            owner: OwnerKey::id(9),
            node_id,
            sequence_id,
        }
    }

    fn member(sequence_id: i32, member_type: i32) -> MemberRow {
        MemberRow {
            owner: OwnerKey::id(9),
            member_id: 3,
            member_type,
            member_role: "outer".into(),
            sequence_id,
        }
    }

    #[rstest]
    fn node_rows_carry_metadata_and_location(entity_row: EntityRow) {
        let node = build_node(&NodeRow {
            entity: entity_row,
            latitude: 515_000_000,
            longitude: -1_200_000,
        })
        .expect("valid node");
        assert_eq!(node.meta.changeset_id, 77);
        assert_eq!(node.meta.user_name, "mapper");
        let location = node.location.expect("location");
        assert_eq!((location.lat_e7(), location.lon_e7()), (515_000_000, -1_200_000));
        assert!(node.tags.is_empty());
    }

    #[rstest]
    fn node_rows_with_invalid_coordinates_are_rejected(entity_row: EntityRow) {
        let err = build_node(&NodeRow {
            entity: entity_row,
            latitude: 950_000_000,
            longitude: 0,
        })
        .expect_err("latitude too large");
        assert!(matches!(err, ReadError::InvalidCoordinate { node_id: 9, .. }));
    }

    #[rstest]
    fn way_nodes_append_in_sequence(entity_row: EntityRow) {
        let mut way = build_way(&entity_row);
        for (sequence, node_id) in [(0, 5), (1, 6), (2, 5)] {
            add_way_node(&mut way, &way_node(sequence, node_id)).expect("in sequence");
        }
        assert_eq!(way.nodes, vec![5, 6, 5]);
    }

    #[rstest]
    #[case(1)]
    #[case(-1)]
    fn way_node_gaps_are_rejected(entity_row: EntityRow, #[case] sequence: i32) {
        let mut way = build_way(&entity_row);
        let err = add_way_node(&mut way, &way_node(sequence, 5)).expect_err("gap");
        assert!(matches!(
            err,
            ReadError::SequenceGap {
                kind: EntityKind::Way,
                id: 9,
                expected: 0,
                ..
            }
        ));
    }

    #[rstest]
    fn members_decode_kind_and_role(entity_row: EntityRow) {
        let mut relation = build_relation(&entity_row);
        add_member(&mut relation, member(0, 1)).expect("first member");
        assert_eq!(relation.members, vec![Member::new(EntityKind::Way, 3, "outer")]);
    }

    #[rstest]
    fn unknown_member_types_are_rejected(entity_row: EntityRow) {
        let mut relation = build_relation(&entity_row);
        let err = add_member(&mut relation, member(0, 7)).expect_err("bad type");
        assert!(matches!(
            err,
            ReadError::UnknownMemberType {
                relation_id: 9,
                member_type: 7
            }
        ));
    }

    #[rstest]
    fn repeated_tag_keys_keep_last_value() {
        let mut tags = Tags::new();
        for value in ["a", "b"] {
            add_tag(
                &mut tags,
                TagRow {
                    owner: OwnerKey::id(1),
                    key: "name".into(),
                    value: value.into(),
                },
            );
        }
        assert_eq!(tags.get("name").map(String::as_str), Some("b"));
    }
}
