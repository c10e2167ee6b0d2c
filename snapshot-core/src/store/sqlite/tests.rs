//! Tests for the SQLite snapshot store.

use std::collections::BTreeSet;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::closure::{MISSING_NODES, NODES_IN_BOX, RELATIONS, WAYS};
use crate::entity::{EntityMeta, Member};
use crate::{Coordinate, StreamState};

fn node(id: i64, lat: f64, lon: f64) -> Entity {
    let location = Coordinate::from_degrees(lat, lon).expect("valid coordinate");
    Entity::Node(Node::new(EntityMeta::new(id), location))
}

fn keys(entities: &[Entity]) -> Vec<EntityKey> {
    entities.iter().map(Entity::key).collect()
}

fn sample() -> Vec<Entity> {
    let mut tagged = Node::new(
        EntityMeta::new(1)
            .with_version(3)
            .with_changeset(1234)
            .with_timestamp(1_700_000_000)
            .with_user(42, "mapper"),
        Coordinate::from_degrees(2.0, 3.0).expect("valid coordinate"),
    );
    tagged.tags.insert("highway".to_owned(), "crossing".to_owned());
    tagged.tags.insert("name".to_owned(), "Market".to_owned());

    let mut road = Way::new(EntityMeta::new(1), vec![12, 23, 34]);
    road.tags.insert("highway".to_owned(), "residential".to_owned());

    let route = Relation::new(
        EntityMeta::new(1),
        vec![
            Member::new(EntityKind::Node, 10, "a"),
            Member::new(EntityKind::Way, 11, "b"),
            Member::new(EntityKind::Relation, 12, "c"),
        ],
    );

    vec![
        Entity::Node(tagged),
        node(12, 2.1, 3.1),
        node(23, 2.2, 3.2),
        node(34, 40.0, 40.0),
        Entity::Way(road),
        Entity::Relation(route),
    ]
}

#[fixture]
fn db() -> SqliteSnapshotDb {
    let db = SqliteSnapshotDb::open_in_memory().expect("open store");
    db.add_or_update(sample()).expect("seed snapshot");
    db
}

#[rstest]
fn entities_round_trip(db: SqliteSnapshotDb) {
    for expected in sample() {
        let stored = db.get(expected.key()).expect("lookup");
        assert_eq!(stored.as_ref(), Some(&expected), "{}", expected.key());
    }
}

#[rstest]
#[case::one_row_per_page(1)]
#[case::two_rows_per_page(2)]
#[case::default_page(1024)]
fn stream_is_independent_of_page_size(#[case] page_size: usize) {
    let options = StoreOptions {
        page_size,
        ..StoreOptions::default()
    };
    let connection = Connection::open_in_memory().expect("open database");
    let db = SqliteSnapshotDb::from_connection(connection, options).expect("open store");
    db.add_or_update(sample()).expect("seed snapshot");

    let streamed: Vec<Entity> = db
        .stream(Categories::default())
        .expect("open stream")
        .collect::<Result<_, _>>()
        .expect("stream entities");
    assert_eq!(
        keys(&streamed),
        vec![
            EntityKey::node(1),
            EntityKey::node(12),
            EntityKey::node(23),
            EntityKey::node(34),
            EntityKey::way(1),
            EntityKey::relation(1),
        ]
    );
    assert_eq!(streamed, sample());
}

#[rstest]
fn stream_restarts_after_reset(db: SqliteSnapshotDb) {
    let mut stream = db
        .stream(Categories::default().skip_nodes())
        .expect("open stream");
    let first: Vec<EntityKey> = stream.by_ref().map(|e| e.expect("entity").key()).collect();
    assert_eq!(stream.state(), StreamState::Exhausted);
    stream.reset().expect("reset");
    let second: Vec<EntityKey> = stream.map(|e| e.expect("entity").key()).collect();
    assert_eq!(first, vec![EntityKey::way(1), EntityKey::relation(1)]);
    assert_eq!(first, second);
}

#[rstest]
fn bbox_pulls_in_way_nodes_outside_the_box(db: SqliteSnapshotDb) {
    let bbox = BoundingBox::from_degrees(2.05, 3.05, 2.25, 3.25).expect("valid box");
    let closure = db.bbox(&bbox).expect("closure");
    let ids = |group| {
        closure
            .entities
            .group(group)
            .map(keys)
            .unwrap_or_default()
    };
    assert_eq!(ids(NODES_IN_BOX), vec![EntityKey::node(12), EntityKey::node(23)]);
    assert_eq!(ids(MISSING_NODES), vec![EntityKey::node(34)]);
    assert_eq!(ids(WAYS), vec![EntityKey::way(1)]);
    assert!(ids(RELATIONS).is_empty());
    assert_eq!(closure.summary.dangling_node_refs, 0);
}

/// More ids per closure stage than one statement can bind.
fn crowded_snapshot() -> Vec<Entity> {
    let inside = (0..1250_i32).map(|i| {
        let row = i % 50;
        let column = (i - row) / 50;
        node(
            i64::from(i) + 1,
            10.0 + f64::from(row) * 0.01,
            10.0 + f64::from(column) * 0.01,
        )
    });
    let outside =
        (0..1200_i32).map(|i| node(10_001 + i64::from(i), 20.0, 20.0 + f64::from(i) * 0.001));
    let ways = (1..=1200_i64)
        .map(|id| Entity::Way(Way::new(EntityMeta::new(id), vec![id, 10_000 + id])));
    let relations = (1..=1000_i64).map(|id| {
        Entity::Relation(Relation::new(
            EntityMeta::new(id),
            vec![Member::new(EntityKind::Way, id, "part")],
        ))
    });
    let unrelated = Entity::Relation(Relation::new(
        EntityMeta::new(5000),
        vec![Member::new(EntityKind::Node, 9_999_999, "label")],
    ));
    inside
        .chain(outside)
        .chain(ways)
        .chain(relations)
        .chain(std::iter::once(unrelated))
        .collect()
}

#[rstest]
fn bbox_binds_large_id_sets_in_chunks() {
    let db = SqliteSnapshotDb::open_in_memory().expect("open store");
    db.add_or_update(crowded_snapshot()).expect("seed snapshot");
    let bbox = BoundingBox::from_degrees(10.0, 10.0, 11.0, 11.0).expect("valid box");
    let closure = db.bbox(&bbox).expect("closure");

    assert_eq!(closure.summary.nodes_in_box, 1250);
    assert_eq!(closure.summary.missing_nodes, 1200);
    assert_eq!(closure.summary.ways, 1200);
    assert_eq!(closure.summary.relations, 1000);
    assert_eq!(closure.summary.dangling_node_refs, 0);
    for group in [NODES_IN_BOX, MISSING_NODES, WAYS, RELATIONS] {
        let ids: Vec<i64> = closure
            .entities
            .group(group)
            .unwrap_or_default()
            .iter()
            .map(Entity::id)
            .collect();
        assert!(
            ids.windows(2).all(|pair| pair.first() < pair.last()),
            "group {group} is not in id order"
        );
    }
    let missing = closure.entities.group(MISSING_NODES).unwrap_or_default();
    assert_eq!(missing.first().map(Entity::id), Some(10_001));
    assert_eq!(missing.last().map(Entity::id), Some(11_200));
}

#[rstest]
fn replace_is_idempotent(db: SqliteSnapshotDb) {
    db.add_or_update(sample()).expect("write again");
    let streamed: Vec<Entity> = db
        .stream(Categories::default())
        .expect("open stream")
        .collect::<Result<_, _>>()
        .expect("stream entities");
    assert_eq!(streamed, sample());
}

#[rstest]
fn delete_reports_each_key(db: SqliteSnapshotDb) {
    let removed = db
        .delete(&[EntityKey::way(1), EntityKey::way(99), EntityKey::node(1)])
        .expect("delete");
    assert_eq!(removed, vec![true, false, true]);
    assert!(db.get(EntityKey::way(1)).expect("lookup").is_none());
    assert!(db.get(EntityKey::relation(1)).expect("lookup").is_some());
}

#[rstest]
fn clear_empties_every_category(db: SqliteSnapshotDb) {
    db.clear().expect("clear");
    assert_eq!(
        db.stream(Categories::default()).expect("open stream").count(),
        0
    );
}

#[rstest]
fn member_and_node_lookups(db: SqliteSnapshotDb) {
    let ways = db
        .ways_for_nodes(&BTreeSet::from([23, 500]))
        .expect("ways for nodes");
    assert_eq!(ways.len(), 1);
    assert_eq!(ways.first().map(|way| way.nodes.clone()), Some(vec![12, 23, 34]));

    let relations = db
        .relations_for_members(&[EntityKey::relation(12), EntityKey::node(11)])
        .expect("relations for members");
    assert_eq!(relations.len(), 1);
    assert!(
        db.relations_for_members(&[EntityKey::node(12)])
            .expect("relations for members")
            .is_empty()
    );
}

#[rstest]
fn sequence_gap_in_stored_rows_is_corruption(db: SqliteSnapshotDb) {
    db.connection()
        .execute("DELETE FROM way_nodes WHERE way_id = 1 AND sequence_id = 1", [])
        .expect("corrupt way nodes");
    let err = db.get(EntityKey::way(1)).expect_err("gap");
    assert!(matches!(
        err,
        SqliteStoreError::Read(ReadError::SequenceGap {
            kind: EntityKind::Way,
            id: 1,
            expected: 1,
            found: 2
        })
    ));
}

#[rstest]
fn orphaned_tag_rows_are_corruption(db: SqliteSnapshotDb) {
    db.connection()
        .execute(
            "INSERT INTO node_tags (node_id, key, value) VALUES (5, 'ghost', 'yes')",
            [],
        )
        .expect("insert orphan");
    let result: Result<Vec<Entity>, ReadError> = db
        .stream(Categories::default())
        .expect("open stream")
        .collect();
    assert!(matches!(
        result,
        Err(ReadError::OrphanedChild { owner_id: 5, .. })
    ));
}

#[rstest]
fn rows_with_null_metadata_read_as_defaults() {
    let db = SqliteSnapshotDb::open_in_memory().expect("open store");
    db.connection()
        .execute(
            "INSERT INTO way (id, changeset_id, visible, timestamp, version, usr, usr_id)
             VALUES (8, NULL, NULL, NULL, NULL, NULL, NULL)",
            [],
        )
        .expect("insert bare way");
    let way = db.get(EntityKey::way(8)).expect("lookup").expect("way 8");
    let expected = Way::new(EntityMeta::new(8).with_version(0), Vec::new());
    assert_eq!(way, Entity::Way(expected));
}

#[rstest]
fn read_only_store_requires_schema() {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("empty.db");
    Connection::open(&path)
        .and_then(|connection| connection.execute_batch("PRAGMA user_version = 1"))
        .expect("create empty database");
    let err = SqliteSnapshotDb::open(&path, StoreOptions::read_only()).expect_err("no schema");
    assert!(matches!(err, SqliteStoreError::SchemaMissing));
}

#[rstest]
fn read_only_store_reads_but_refuses_writes() {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("snapshot.db");
    {
        let db = SqliteSnapshotDb::open(&path, StoreOptions::default()).expect("open store");
        db.add_or_update(sample()).expect("seed snapshot");
    }
    let db = SqliteSnapshotDb::open(&path, StoreOptions::read_only()).expect("reopen");
    assert!(db.get(EntityKey::node(1)).expect("lookup").is_some());
    assert!(matches!(
        db.add_or_update(sample()),
        Err(WriteError::ReadOnly)
    ));
    assert!(matches!(db.clear(), Err(WriteError::ReadOnly)));
}
