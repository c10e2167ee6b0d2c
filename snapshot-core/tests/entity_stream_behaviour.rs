//! Behavioural tests for `EntityStream` over in-memory rows.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use snapshot_core::rows::{OwnerKey, TagRow};
use snapshot_core::test_support::{MemoryRows, MemoryStore};
use snapshot_core::{
    Categories, Coordinate, Entity, EntityKey, EntityKind, EntityMeta, EntityStream, Member, Node,
    ReadError, Relation, StreamState, Way,
};

/// Rows to stream, the open stream and what it produced.
#[derive(Default)]
struct StreamWorld {
    rows: RefCell<MemoryRows>,
    stream: RefCell<Option<EntityStream<'static>>>,
    yielded: RefCell<Vec<Entity>>,
    error: RefCell<Option<ReadError>>,
}

impl StreamWorld {
    fn open(&self, categories: Categories) {
        let rows = self.rows.borrow().clone();
        let stream = rows.stream(categories).expect("open stream");
        self.stream.replace(Some(stream));
        self.drain();
    }

    fn drain(&self) {
        let mut yielded = Vec::new();
        let mut error = None;
        {
            let mut borrowed = self.stream.borrow_mut();
            let stream = borrowed.as_mut().expect("stream should be open");
            for entity in stream.by_ref() {
                match entity {
                    Ok(entity) => yielded.push(entity),
                    Err(err) => error = Some(err),
                }
            }
        }
        self.yielded.replace(yielded);
        self.error.replace(error);
    }

    fn keys(&self) -> Vec<EntityKey> {
        self.yielded.borrow().iter().map(Entity::key).collect()
    }
}

#[fixture]
fn world() -> StreamWorld {
    StreamWorld::default()
}

fn sample_store() -> MemoryStore {
    let origin = Coordinate::from_degrees(1.0, 1.0).expect("valid coordinate");
    let mut tagged = Node::new(EntityMeta::new(1), origin);
    tagged.tags.insert("amenity".to_owned(), "bench".to_owned());
    MemoryStore::from_entities(vec![
        Entity::Node(tagged),
        Entity::Node(Node::new(EntityMeta::new(2), origin)),
        Entity::Way(Way::new(EntityMeta::new(1), vec![1, 2, 1])),
        Entity::Relation(Relation::new(
            EntityMeta::new(1),
            vec![
                Member::new(EntityKind::Way, 1, "outer"),
                Member::new(EntityKind::Node, 2, "label"),
            ],
        )),
    ])
    .expect("valid fixture")
}

#[given("a snapshot with two nodes, a way and a relation")]
fn given_sample(world: &StreamWorld) {
    world.rows.replace(sample_store().rows());
}

#[given("a snapshot whose way skips sequence id 1")]
fn given_sequence_gap(world: &StreamWorld) {
    let mut rows = sample_store().rows();
    rows.way_nodes.retain(|row| row.sequence_id != 1);
    world.rows.replace(rows);
}

#[given("a snapshot with a tag row for missing node 7")]
fn given_orphan(world: &StreamWorld) {
    let mut rows = sample_store().rows();
    rows.node_tags.push(TagRow {
        owner: OwnerKey::id(7),
        key: "ghost".to_owned(),
        value: "yes".to_owned(),
    });
    world.rows.replace(rows);
}

#[when("I stream every category")]
fn when_stream_all(world: &StreamWorld) {
    world.open(Categories::default());
}

#[when("I stream while skipping ways")]
fn when_stream_without_ways(world: &StreamWorld) {
    world.open(Categories::default().skip_ways());
}

#[when("I reset the stream and stream again")]
fn when_reset(world: &StreamWorld) {
    {
        let mut borrowed = world.stream.borrow_mut();
        let stream = borrowed.as_mut().expect("stream should be open");
        stream.reset().expect("reset stream");
        assert_eq!(stream.state(), StreamState::Node);
    }
    world.drain();
}

#[then("the stream yields node 1, node 2, way 1 and relation 1 in order")]
fn then_all_keys(world: &StreamWorld) {
    assert!(world.error.borrow().is_none(), "unexpected read error");
    assert_eq!(
        world.keys(),
        vec![
            EntityKey::node(1),
            EntityKey::node(2),
            EntityKey::way(1),
            EntityKey::relation(1),
        ]
    );
}

#[then("the stream yields node 1, node 2 and relation 1 in order")]
fn then_keys_without_ways(world: &StreamWorld) {
    assert!(world.error.borrow().is_none(), "unexpected read error");
    assert_eq!(
        world.keys(),
        vec![EntityKey::node(1), EntityKey::node(2), EntityKey::relation(1)]
    );
}

#[then("the streamed relation keeps its members")]
fn then_relation_members(world: &StreamWorld) {
    let yielded = world.yielded.borrow();
    let Some(Entity::Relation(relation)) = yielded.last() else {
        panic!("expected the stream to end with a relation");
    };
    assert_eq!(
        relation.members,
        vec![
            Member::new(EntityKind::Way, 1, "outer"),
            Member::new(EntityKind::Node, 2, "label"),
        ]
    );
}

#[then("the stream is exhausted")]
fn then_exhausted(world: &StreamWorld) {
    let borrowed = world.stream.borrow();
    let stream = borrowed.as_ref().expect("stream should be open");
    assert_eq!(stream.state(), StreamState::Exhausted);
}

#[then("the stream fails with a sequence gap for way 1")]
fn then_sequence_gap(world: &StreamWorld) {
    let error = world.error.borrow();
    assert!(matches!(
        *error,
        Some(ReadError::SequenceGap {
            kind: EntityKind::Way,
            id: 1,
            expected: 1,
            found: 2,
        })
    ));
    assert_eq!(world.keys(), vec![EntityKey::node(1), EntityKey::node(2)]);
}

#[then("the stream fails with an orphaned node tag for node 7")]
fn then_orphan(world: &StreamWorld) {
    let error = world.error.borrow();
    let err = error.as_ref().expect("the stream should fail");
    assert!(err.is_corruption());
    assert!(matches!(
        err,
        ReadError::OrphanedChild {
            kind: EntityKind::Node,
            collection: "node_tags",
            owner_id: 7,
        }
    ));
}

#[scenario(path = "tests/features/entity_stream.feature", index = 0)]
fn full_stream(world: StreamWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/entity_stream.feature", index = 1)]
fn skip_ways(world: StreamWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/entity_stream.feature", index = 2)]
fn sequence_gap(world: StreamWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/entity_stream.feature", index = 3)]
fn orphaned_tag(world: StreamWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/entity_stream.feature", index = 4)]
fn reset_replays(world: StreamWorld) {
    let _ = world;
}
