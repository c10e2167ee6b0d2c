//! Snapshot table layout and lifecycle.

use log::info;
use rusqlite::{Connection, Error as SqliteError, OptionalExtension};
use thiserror::Error;

/// Version recorded in `snapshot_schema_version` by [`create_and_detect`].
pub const SCHEMA_VERSION: i64 = 1;

/// Tables in deletion order: children before parents.
const TABLES: [&str; 8] = [
    "node_tags",
    "node",
    "way_tags",
    "way_nodes",
    "way",
    "relation_tags",
    "relation_members",
    "relation",
];

/// Errors raised while inspecting or changing the snapshot schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A schema statement failed.
    #[error("schema step `{step}` failed")]
    Migration {
        /// Step that failed.
        step: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// The database records a schema version this build does not read.
    #[error("snapshot schema version {found} does not match expected {expected}")]
    VersionMismatch {
        /// Version this build writes.
        expected: i64,
        /// Version stored in the database.
        found: i64,
    },
}

/// Whether the snapshot tables exist.
pub fn detect(connection: &Connection) -> Result<bool, SchemaError> {
    connection
        .query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'node')",
            [],
            |row| row.get(0),
        )
        .map_err(|source| SchemaError::Migration {
            step: "detect snapshot tables",
            source,
        })
}

/// Create any missing tables and indexes, then check the schema version.
///
/// Existing tables are left untouched, so calling this on a populated
/// snapshot is cheap. A database stamped with a different version is
/// rejected.
///
/// # Examples
/// ```
/// use rusqlite::Connection;
/// use snapshot_core::store::sqlite::schema::{create_and_detect, detect};
///
/// let connection = Connection::open_in_memory().expect("open database");
/// assert!(!detect(&connection).expect("inspect schema"));
/// create_and_detect(&connection).expect("create schema");
/// assert!(detect(&connection).expect("inspect schema"));
/// ```
pub fn create_and_detect(connection: &Connection) -> Result<(), SchemaError> {
    let created = !detect(connection)?;
    let transaction = connection
        .unchecked_transaction()
        .map_err(|source| SchemaError::Migration {
            step: "begin schema transaction",
            source,
        })?;

    create_parent_tables(&transaction)?;
    create_child_tables(&transaction)?;
    create_indexes(&transaction)?;
    ensure_schema_version(&transaction)?;

    transaction
        .commit()
        .map_err(|source| SchemaError::Migration {
            step: "commit schema transaction",
            source,
        })?;
    if created {
        info!("created snapshot schema version {SCHEMA_VERSION}");
    }
    Ok(())
}

/// Drop every snapshot table.
pub fn drop_schema(connection: &Connection) -> Result<(), SchemaError> {
    run_migration_step(
        connection,
        "drop snapshot tables",
        "DROP TABLE IF EXISTS node_tags;
         DROP TABLE IF EXISTS node;
         DROP TABLE IF EXISTS way_tags;
         DROP TABLE IF EXISTS way_nodes;
         DROP TABLE IF EXISTS way;
         DROP TABLE IF EXISTS relation_tags;
         DROP TABLE IF EXISTS relation_members;
         DROP TABLE IF EXISTS relation;
         DROP TABLE IF EXISTS snapshot_schema_version;",
    )?;
    info!("dropped snapshot schema");
    Ok(())
}

/// Remove every row while keeping the tables.
pub fn delete_all(connection: &Connection) -> Result<(), SchemaError> {
    let transaction = connection
        .unchecked_transaction()
        .map_err(|source| SchemaError::Migration {
            step: "begin clear transaction",
            source,
        })?;
    for table in TABLES {
        transaction
            .execute(&format!("DELETE FROM {table}"), [])
            .map_err(|source| SchemaError::Migration {
                step: "clear snapshot table",
                source,
            })?;
    }
    transaction
        .commit()
        .map_err(|source| SchemaError::Migration {
            step: "commit clear transaction",
            source,
        })
}

fn create_parent_tables(connection: &Connection) -> Result<(), SchemaError> {
    run_migration_step(
        connection,
        "create node",
        "CREATE TABLE IF NOT EXISTS node (
            id INTEGER PRIMARY KEY,
            latitude INTEGER NOT NULL,
            longitude INTEGER NOT NULL,
            changeset_id INTEGER,
            visible INTEGER,
            timestamp INTEGER,
            tile INTEGER NOT NULL,
            version INTEGER,
            usr TEXT,
            usr_id INTEGER
        )",
    )?;
    run_migration_step(
        connection,
        "create way",
        "CREATE TABLE IF NOT EXISTS way (
            id INTEGER PRIMARY KEY,
            changeset_id INTEGER,
            visible INTEGER,
            timestamp INTEGER,
            version INTEGER,
            usr TEXT,
            usr_id INTEGER
        )",
    )?;
    run_migration_step(
        connection,
        "create relation",
        "CREATE TABLE IF NOT EXISTS relation (
            id INTEGER PRIMARY KEY,
            changeset_id INTEGER,
            visible INTEGER,
            timestamp INTEGER,
            version INTEGER,
            usr TEXT,
            usr_id INTEGER
        )",
    )
}

fn create_child_tables(connection: &Connection) -> Result<(), SchemaError> {
    for (step, sql) in [
        (
            "create node_tags",
            "CREATE TABLE IF NOT EXISTS node_tags (
                node_id INTEGER NOT NULL,
                key TEXT NOT NULL,
                value TEXT,
                PRIMARY KEY (node_id, key)
            ) WITHOUT ROWID",
        ),
        (
            "create way_tags",
            "CREATE TABLE IF NOT EXISTS way_tags (
                way_id INTEGER NOT NULL,
                key TEXT NOT NULL,
                value TEXT,
                PRIMARY KEY (way_id, key)
            ) WITHOUT ROWID",
        ),
        (
            "create relation_tags",
            "CREATE TABLE IF NOT EXISTS relation_tags (
                relation_id INTEGER NOT NULL,
                key TEXT NOT NULL,
                value TEXT,
                PRIMARY KEY (relation_id, key)
            ) WITHOUT ROWID",
        ),
        (
            "create way_nodes",
            "CREATE TABLE IF NOT EXISTS way_nodes (
                way_id INTEGER NOT NULL,
                node_id INTEGER NOT NULL,
                sequence_id INTEGER NOT NULL,
                PRIMARY KEY (way_id, sequence_id)
            ) WITHOUT ROWID",
        ),
        (
            "create relation_members",
            "CREATE TABLE IF NOT EXISTS relation_members (
                relation_id INTEGER NOT NULL,
                member_type INTEGER NOT NULL,
                member_id INTEGER NOT NULL,
                member_role TEXT,
                sequence_id INTEGER NOT NULL,
                PRIMARY KEY (relation_id, sequence_id)
            ) WITHOUT ROWID",
        ),
    ] {
        run_migration_step(connection, step, sql)?;
    }
    Ok(())
}

fn create_indexes(connection: &Connection) -> Result<(), SchemaError> {
    run_migration_step(
        connection,
        "index node tiles",
        "CREATE INDEX IF NOT EXISTS idx_node_tile ON node(tile)",
    )?;
    run_migration_step(
        connection,
        "index node coordinates",
        "CREATE INDEX IF NOT EXISTS idx_node_latitude_longitude ON node(latitude, longitude)",
    )?;
    run_migration_step(
        connection,
        "index way_nodes by node",
        "CREATE INDEX IF NOT EXISTS idx_way_nodes_node ON way_nodes(node_id)",
    )?;
    run_migration_step(
        connection,
        "index relation_members by member",
        "CREATE INDEX IF NOT EXISTS idx_relation_members_member
            ON relation_members(member_type, member_id)",
    )
}

fn ensure_schema_version(connection: &Connection) -> Result<(), SchemaError> {
    run_migration_step(
        connection,
        "create schema version table",
        "CREATE TABLE IF NOT EXISTS snapshot_schema_version (
            version INTEGER PRIMARY KEY CHECK (version > 0),
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ) WITHOUT ROWID",
    )?;

    let existing: Option<i64> = connection
        .query_row(
            "SELECT version FROM snapshot_schema_version LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|source| SchemaError::Migration {
            step: "read schema version",
            source,
        })?;

    match existing {
        None => connection
            .execute(
                "INSERT INTO snapshot_schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )
            .map(|_| ())
            .map_err(|source| SchemaError::Migration {
                step: "record schema version",
                source,
            }),
        Some(SCHEMA_VERSION) => Ok(()),
        Some(found) => Err(SchemaError::VersionMismatch {
            expected: SCHEMA_VERSION,
            found,
        }),
    }
}

fn run_migration_step(
    connection: &Connection,
    step: &'static str,
    sql: &str,
) -> Result<(), SchemaError> {
    connection
        .execute_batch(sql)
        .map_err(|source| SchemaError::Migration { step, source })
}
