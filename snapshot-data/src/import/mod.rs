//! Sequential import of OSM PBF files into a snapshot.

use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use geo::{Coord, Rect};
use log::{info, warn};
use osmpbf::{Element, ElementReader};
use serde::Serialize;
use snapshot_core::{
    Coordinate, Entity, SnapshotWriter, SqliteSnapshotDb, SqliteStoreError, StoreOptions,
    WriteError, WriterOptions,
};
use thiserror::Error;

use crate::fs::ensure_parent_dir;

mod convert;

use convert::{Rejected, convert};

/// Elements written between progress log lines.
const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Counts and extent of an import run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ImportSummary {
    /// Nodes written, including dense-node entries.
    pub nodes: u64,
    /// Ways written.
    pub ways: u64,
    /// Relations written.
    pub relations: u64,
    /// Elements dropped because they could not be converted.
    pub skipped: u64,
    /// Extent of every written node. Coordinates are WGS84 with
    /// `x = longitude`, `y = latitude`.
    pub bounds: Option<Rect<f64>>,
}

impl ImportSummary {
    /// Entities written across every category.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.nodes + self.ways + self.relations
    }

    fn record(&mut self, entity: &Entity) {
        match entity {
            Entity::Node(node) => {
                self.nodes += 1;
                if let Some(location) = node.location {
                    self.include(location);
                }
            }
            Entity::Way(_) => self.ways += 1,
            Entity::Relation(_) => self.relations += 1,
        }
    }

    fn include(&mut self, location: Coordinate) {
        let point: Coord<f64> = location.into();
        self.bounds = Some(match self.bounds {
            Some(existing) => Rect::new(
                Coord {
                    x: existing.min().x.min(point.x),
                    y: existing.min().y.min(point.y),
                },
                Coord {
                    x: existing.max().x.max(point.x),
                    y: existing.max().y.max(point.y),
                },
            ),
            None => Rect::new(point, point),
        });
    }
}

/// Options for [`import_into_database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportOptions {
    /// Writer batching; see [`WriterOptions`].
    pub writer: WriterOptions,
    /// Remove existing entities before importing.
    pub replace: bool,
}

/// Errors returned when importing an OSM PBF file.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The PBF file could not be opened.
    #[error("failed to open OSM PBF file at {path:?}")]
    Open {
        /// Source error returned by `osmpbf`.
        #[source]
        source: osmpbf::Error,
        /// File that was opened.
        path: PathBuf,
    },
    /// The PBF file was opened but its contents did not decode.
    #[error("failed to decode OSM PBF data at {path:?}")]
    Decode {
        /// Source error returned by `osmpbf`.
        #[source]
        source: osmpbf::Error,
        /// File being decoded.
        path: PathBuf,
    },
    /// Writing entities to the snapshot failed.
    #[error(transparent)]
    Write(#[from] WriteError),
    /// The snapshot database could not be opened.
    #[error(transparent)]
    Store(#[from] SqliteStoreError),
    /// The database's parent directory could not be created.
    #[error("failed to create directory for {path}")]
    CreateDirectory {
        /// Database path whose parent was being created.
        path: Utf8PathBuf,
        /// Source error from the filesystem.
        #[source]
        source: io::Error,
    },
}

/// Feeds decoded elements into a writer, remembering the first failure.
struct Importer<'w, 'conn> {
    writer: &'w mut SnapshotWriter<'conn>,
    summary: ImportSummary,
    failure: Option<WriteError>,
}

impl<'w, 'conn> Importer<'w, 'conn> {
    fn new(writer: &'w mut SnapshotWriter<'conn>) -> Self {
        Self {
            writer,
            summary: ImportSummary::default(),
            failure: None,
        }
    }

    fn process(&mut self, element: &Element<'_>) {
        if self.failure.is_some() {
            return;
        }
        let entity = match convert(element) {
            Ok(entity) => entity,
            Err(Rejected { kind, id, reason }) => {
                warn!("skipping {kind} {id}: {reason}");
                self.summary.skipped += 1;
                return;
            }
        };
        match self.writer.push(&entity) {
            Ok(()) => {
                self.summary.record(&entity);
                let total = self.summary.total();
                if total % PROGRESS_INTERVAL == 0 {
                    info!("imported {total} entities");
                }
            }
            Err(WriteError::InvalidInput { key, reason }) => {
                warn!("skipping {key}: {reason}");
                self.summary.skipped += 1;
            }
            Err(err) => self.failure = Some(err),
        }
    }

    fn finish(self) -> Result<ImportSummary, WriteError> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.summary),
        }
    }
}

/// Stream the elements of an OSM PBF file into `writer`.
///
/// Elements are written in file order. Nodes whose coordinates fall outside
/// the valid range are skipped, logged and counted in
/// [`ImportSummary::skipped`]. The writer is left open: call
/// [`SnapshotWriter::finish`] to commit the final batch.
///
/// # Examples
/// ```no_run
/// use std::path::Path;
/// use snapshot_core::{SqliteSnapshotDb, StoreOptions, WriterOptions};
/// use snapshot_data::import_osm_pbf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let db = SqliteSnapshotDb::open("berlin.db", StoreOptions::default())?;
/// let mut writer = db.writer(WriterOptions::default())?;
/// let summary = import_osm_pbf(Path::new("berlin.osm.pbf"), &mut writer)?;
/// writer.finish()?;
/// println!("Imported {} nodes", summary.nodes);
/// # Ok(())
/// # }
/// ```
pub fn import_osm_pbf(
    path: &Path,
    writer: &mut SnapshotWriter<'_>,
) -> Result<ImportSummary, ImportError> {
    let reader = ElementReader::from_path(path).map_err(|source| ImportError::Open {
        source,
        path: path.to_path_buf(),
    })?;
    let mut importer = Importer::new(writer);
    reader
        .for_each(|element| importer.process(&element))
        .map_err(|source| ImportError::Decode {
            source,
            path: path.to_path_buf(),
        })?;
    Ok(importer.finish()?)
}

/// Import an OSM PBF file into the snapshot database at `database`.
///
/// The database and its parent directories are created when missing. With
/// [`ImportOptions::replace`] set, existing entities are cleared first;
/// otherwise imported entities replace stored ones key by key.
pub fn import_into_database(
    pbf: &Path,
    database: &Utf8Path,
    options: ImportOptions,
) -> Result<ImportSummary, ImportError> {
    ensure_parent_dir(database).map_err(|source| ImportError::CreateDirectory {
        path: database.to_path_buf(),
        source,
    })?;
    let db = SqliteSnapshotDb::open(database, StoreOptions::default())?;
    if options.replace {
        db.clear()?;
    }
    let mut writer = db.writer(options.writer)?;
    let summary = import_osm_pbf(pbf, &mut writer)?;
    let written = writer.finish()?;
    info!(
        "imported {} nodes, {} ways and {} relations into {database} in {} batches",
        summary.nodes, summary.ways, summary.relations, written.batches
    );
    Ok(summary)
}
