//! Error types emitted by the `osm-snapshot` CLI.
//!
//! Keep this error type reasonably small, as every command helper returns
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use snapshot_core::{CoordinateError, SqliteStoreError};
use snapshot_data::ImportError;
use thiserror::Error;

/// Errors emitted by the `osm-snapshot` CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Flag name without leading dashes.
        field: &'static str,
        /// Environment variable that can supply the value.
        env: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        /// Flag naming the path.
        field: &'static str,
        /// Path that was checked.
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        /// Flag naming the path.
        field: &'static str,
        /// Path that was checked.
        path: Utf8PathBuf,
        /// Source error from the filesystem.
        #[source]
        source: std::io::Error,
    },
    /// The bounding box flags do not describe a valid box.
    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(#[source] CoordinateError),
    /// Importing the PBF file failed.
    #[error("failed to import OSM data: {0}")]
    Import(#[source] Box<ImportError>),
    /// Opening or querying the snapshot database failed.
    #[error("snapshot query against {path:?} failed: {source}")]
    Store {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error from the store.
        #[source]
        source: Box<SqliteStoreError>,
    },
    /// Serialising the command report failed.
    #[error("failed to serialise report: {0}")]
    SerialiseReport(#[source] serde_json::Error),
    /// Writing the command report failed.
    #[error("failed to write report: {0}")]
    WriteReport(#[source] std::io::Error),
}

impl From<ImportError> for CliError {
    fn from(err: ImportError) -> Self {
        Self::Import(Box::new(err))
    }
}
