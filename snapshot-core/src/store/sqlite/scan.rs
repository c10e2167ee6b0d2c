//! Keyset-paged row sources over the snapshot tables.
//!
//! Each page is one `SELECT ... ORDER BY ... LIMIT` statement that resumes
//! after the last row of the previous page, so no statement stays open
//! between pages and an abandoned cursor holds nothing.

use log::debug;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params_from_iter};

use crate::cursor::{BoxedSource, PagedSource};
use crate::error::SourceError;
use crate::rows::{EntityRow, MemberRow, NodeRow, OwnerKey, TagRow, WayNodeRow};

/// Highest number of host parameters a statement may bind.
const MAX_PARAMETERS: usize = 999;

/// Ids per filtered statement, leaving room for the resume parameters.
pub(crate) const MAX_FILTER_IDS: usize = MAX_PARAMETERS - 2;

/// A table and the column holding the id of the row's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Table {
    pub name: &'static str,
    pub owner: &'static str,
}

pub(crate) const NODE: Table = Table {
    name: "node",
    owner: "id",
};
pub(crate) const NODE_TAGS: Table = Table {
    name: "node_tags",
    owner: "node_id",
};
pub(crate) const WAY: Table = Table {
    name: "way",
    owner: "id",
};
pub(crate) const WAY_TAGS: Table = Table {
    name: "way_tags",
    owner: "way_id",
};
pub(crate) const WAY_NODES: Table = Table {
    name: "way_nodes",
    owner: "way_id",
};
pub(crate) const RELATION: Table = Table {
    name: "relation",
    owner: "id",
};
pub(crate) const RELATION_TAGS: Table = Table {
    name: "relation_tags",
    owner: "relation_id",
};
pub(crate) const RELATION_MEMBERS: Table = Table {
    name: "relation_members",
    owner: "relation_id",
};

/// A row type that can be read from a snapshot table.
pub(crate) trait ScannedRow: Clone {
    /// Columns selected after the owner column, in `from_row` order.
    const COLUMNS: &'static str;
    /// Column ordering rows that share an owner.
    const TIE_BREAK: Option<&'static str>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Owner id and tie-break value to resume after.
    fn position(&self) -> (i64, Option<Value>);
}

const ENTITY_COLUMNS: &str = "version, changeset_id, timestamp, usr_id, usr, visible";

fn entity_row(row: &Row<'_>) -> rusqlite::Result<EntityRow> {
    Ok(EntityRow {
        id: row.get(0)?,
        version: row.get::<_, Option<i32>>(1)?.unwrap_or_default(),
        changeset_id: row.get::<_, Option<i64>>(2)?.unwrap_or_default(),
        timestamp: row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
        user_id: row.get::<_, Option<i32>>(4)?.unwrap_or_default(),
        user_name: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        visible: row.get::<_, Option<bool>>(6)?.unwrap_or(true),
    })
}

impl ScannedRow for EntityRow {
    const COLUMNS: &'static str = ENTITY_COLUMNS;
    const TIE_BREAK: Option<&'static str> = None;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        entity_row(row)
    }

    fn position(&self) -> (i64, Option<Value>) {
        (self.id, None)
    }
}

impl ScannedRow for NodeRow {
    const COLUMNS: &'static str =
        "version, changeset_id, timestamp, usr_id, usr, visible, latitude, longitude";
    const TIE_BREAK: Option<&'static str> = None;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entity: entity_row(row)?,
            latitude: row.get(7)?,
            longitude: row.get(8)?,
        })
    }

    fn position(&self) -> (i64, Option<Value>) {
        (self.entity.id, None)
    }
}

impl ScannedRow for TagRow {
    const COLUMNS: &'static str = "key, value";
    const TIE_BREAK: Option<&'static str> = Some("key");

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            owner: OwnerKey::id(row.get(0)?),
            key: row.get(1)?,
            value: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        })
    }

    fn position(&self) -> (i64, Option<Value>) {
        (self.owner.id, Some(Value::Text(self.key.clone())))
    }
}

impl ScannedRow for WayNodeRow {
    const COLUMNS: &'static str = "node_id, sequence_id";
    const TIE_BREAK: Option<&'static str> = Some("sequence_id");

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            owner: OwnerKey::id(row.get(0)?),
            node_id: row.get(1)?,
            sequence_id: row.get(2)?,
        })
    }

    fn position(&self) -> (i64, Option<Value>) {
        (
            self.owner.id,
            Some(Value::Integer(i64::from(self.sequence_id))),
        )
    }
}

impl ScannedRow for MemberRow {
    const COLUMNS: &'static str = "member_id, member_type, member_role, sequence_id";
    const TIE_BREAK: Option<&'static str> = Some("sequence_id");

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            owner: OwnerKey::id(row.get(0)?),
            member_id: row.get(1)?,
            member_type: row.get(2)?,
            member_role: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            sequence_id: row.get(4)?,
        })
    }

    fn position(&self) -> (i64, Option<Value>) {
        (
            self.owner.id,
            Some(Value::Integer(i64::from(self.sequence_id))),
        )
    }
}

/// Rows of `table`, optionally restricted to owners in `filter`.
///
/// An empty `filter` scans the whole table. Callers restricting by id must
/// pass at most [`MAX_FILTER_IDS`] ids and skip the scan entirely when they
/// have none.
pub(crate) fn scan<'conn, R>(
    connection: &'conn Connection,
    table: Table,
    filter: Vec<i64>,
    page_size: usize,
) -> BoxedSource<'conn, R>
where
    R: ScannedRow + 'conn,
{
    let page_size = page_size.max(1);
    Box::new(PagedSource::new(
        move |last: Option<&R>| {
            fetch_page(connection, table, &filter, last, page_size).map_err(SourceError::from)
        },
        page_size,
    ))
}

fn fetch_page<R: ScannedRow>(
    connection: &Connection,
    table: Table,
    filter: &[i64],
    last: Option<&R>,
    page_size: usize,
) -> rusqlite::Result<Vec<R>> {
    let sql = page_sql::<R>(table, filter.len(), last.is_some(), page_size);
    let mut parameters: Vec<Value> = filter.iter().copied().map(Value::Integer).collect();
    if let Some(row) = last {
        let (owner, tie_break) = row.position();
        parameters.push(Value::Integer(owner));
        parameters.extend(tie_break);
    }
    debug!(
        "fetching {} page{}",
        table.name,
        if last.is_some() { " after previous" } else { "" }
    );
    let mut statement = connection.prepare_cached(&sql)?;
    let rows = statement.query_map(params_from_iter(parameters), R::from_row)?;
    rows.collect()
}

fn page_sql<R: ScannedRow>(
    table: Table,
    filter_len: usize,
    resume: bool,
    page_size: usize,
) -> String {
    let owner = table.owner;
    let mut conditions = Vec::new();
    if filter_len > 0 {
        conditions.push(format!("{owner} IN ({})", placeholders(filter_len)));
    }
    if resume {
        conditions.push(match R::TIE_BREAK {
            Some(column) => format!("({owner}, {column}) > (?, ?)"),
            None => format!("{owner} > ?"),
        });
    }
    let filter = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    let order = match R::TIE_BREAK {
        Some(column) => format!("{owner}, {column}"),
        None => owner.to_owned(),
    };
    format!(
        "SELECT {owner}, {columns} FROM {name}{filter} ORDER BY {order} LIMIT {page_size}",
        columns = R::COLUMNS,
        name = table.name,
    )
}

/// `?, ?, ...` with `count` placeholders.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::store::sqlite::schema::create_and_detect;
    use rstest::{fixture, rstest};

    #[fixture]
    fn connection() -> Connection {
        let connection = Connection::open_in_memory().expect("open in-memory database");
        create_and_detect(&connection).expect("create schema");
        let rows = [(2, 20, 0), (1, 11, 1), (1, 10, 0), (2, 21, 1), (3, 30, 0)];
        for (way_id, node_id, sequence_id) in rows {
            connection
                .execute(
                    "INSERT INTO way_nodes (way_id, node_id, sequence_id) VALUES (?1, ?2, ?3)",
                    (way_id, node_id, sequence_id),
                )
                .expect("seed way node");
        }
        connection
    }

    fn collect(connection: &Connection, filter: Vec<i64>, page_size: usize) -> Vec<WayNodeRow> {
        let mut cursor = Cursor::open(scan::<WayNodeRow>(connection, WAY_NODES, filter, page_size))
            .expect("open cursor");
        let mut rows = Vec::new();
        while let Some(row) = cursor.advance().expect("advance") {
            rows.push(row);
        }
        rows
    }

    #[rstest]
    #[case::single_page(100)]
    #[case::page_per_row(1)]
    #[case::split_inside_owner(3)]
    fn pages_resume_in_key_order(connection: Connection, #[case] page_size: usize) {
        let rows: Vec<(i64, i64)> = collect(&connection, Vec::new(), page_size)
            .into_iter()
            .map(|row| (row.owner.id, row.node_id))
            .collect();
        assert_eq!(rows, vec![(1, 10), (1, 11), (2, 20), (2, 21), (3, 30)]);
    }

    #[rstest]
    fn filter_restricts_owners(connection: Connection) {
        let owners: Vec<i64> = collect(&connection, vec![3, 1], 1)
            .into_iter()
            .map(|row| row.owner.id)
            .collect();
        assert_eq!(owners, vec![1, 1, 3]);
    }

    #[test]
    fn tag_pages_resume_after_owner_and_key() {
        let sql = page_sql::<TagRow>(NODE_TAGS, 2, true, 50);
        assert_eq!(
            sql,
            "SELECT node_id, key, value FROM node_tags WHERE node_id IN (?, ?) \
             AND (node_id, key) > (?, ?) ORDER BY node_id, key LIMIT 50"
        );
    }
}
