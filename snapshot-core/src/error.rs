//! Errors raised while reassembling entities from snapshot rows.

use thiserror::Error;

use crate::coordinate::CoordinateError;
use crate::entity::EntityKind;

/// Boxed error produced by a [`RowSource`](crate::cursor::RowSource)
/// backend.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned while reading entities back out of a snapshot.
///
/// Everything except [`ReadError::Source`] signals that the stored rows are
/// inconsistent with each other.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The backing row source failed.
    #[error("row source failed while {operation}: {source}")]
    Source {
        /// Cursor action that failed.
        operation: &'static str,
        /// Backend error.
        #[source]
        source: SourceError,
    },
    /// A way node or relation member arrived out of sequence.
    #[error("{kind} {id} expected sequence {expected} but found {found}")]
    SequenceGap {
        /// Owning entity kind.
        kind: EntityKind,
        /// Owning entity id.
        id: i64,
        /// Next sequence id the entity expected.
        expected: usize,
        /// Sequence id that was read.
        found: i32,
    },
    /// A child row references a parent the parent stream does not contain.
    #[error("{collection} row references missing {kind} {owner_id}")]
    OrphanedChild {
        /// Kind of the missing parent.
        kind: EntityKind,
        /// Child table the row came from.
        collection: &'static str,
        /// Parent id referenced by the row.
        owner_id: i64,
    },
    /// A relation member carried an unrecognised type code.
    #[error("relation {relation_id} has member with unknown type {member_type}")]
    UnknownMemberType {
        /// Owning relation.
        relation_id: i64,
        /// Stored code.
        member_type: i32,
    },
    /// A node row carried coordinates outside the valid range.
    #[error("node {node_id} has invalid coordinates: {source}")]
    InvalidCoordinate {
        /// Offending node.
        node_id: i64,
        /// Range violation.
        #[source]
        source: CoordinateError,
    },
}

impl ReadError {
    /// Whether the error indicates corrupt snapshot contents rather than a
    /// backend failure.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        !matches!(self, Self::Source { .. })
    }
}

/// Entities that cannot be persisted as given.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidInput {
    /// A node had no coordinates.
    #[error("node {id} has no coordinates")]
    MissingCoordinates {
        /// Offending node.
        id: i64,
    },
    /// A way or relation had more children than a sequence id can number.
    #[error("{kind} {id} has {count} children, more than a sequence id can address")]
    TooManyChildren {
        /// Owning entity kind.
        kind: EntityKind,
        /// Owning entity id.
        id: i64,
        /// Number of children supplied.
        count: usize,
    },
}
