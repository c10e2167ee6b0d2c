//! `bbox` command: summarise the closure of a bounding box.

use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use snapshot_core::{BoundingBox, ClosureSummary, SnapshotStore, SqliteSnapshotDb, StoreOptions};

use crate::import::require_existing;
use crate::{
    ARG_DATABASE, ARG_MAX_LAT, ARG_MAX_LON, ARG_MIN_LAT, ARG_MIN_LON, CliError, ENV_BBOX_DATABASE,
    ENV_BBOX_MAX_LAT, ENV_BBOX_MAX_LON, ENV_BBOX_MIN_LAT, ENV_BBOX_MIN_LON,
};

/// CLI arguments for the `bbox` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "bbox",
    long_about = "Resolve every node inside a bounding box, the ways touching \
                 it together with their outside nodes, and the relations \
                 referencing any of those. Prints the size of each group and \
                 the number of way node references with no stored node.",
    about = "Summarise the contents of a bounding box"
)]
#[ortho_config(prefix = "OSM_SNAPSHOT")]
pub(crate) struct BboxArgs {
    /// Path to an existing snapshot database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Southern edge in degrees.
    #[arg(long = ARG_MIN_LAT, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) min_lat: Option<f64>,
    /// Western edge in degrees.
    #[arg(long = ARG_MIN_LON, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) min_lon: Option<f64>,
    /// Northern edge in degrees.
    #[arg(long = ARG_MAX_LAT, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) max_lat: Option<f64>,
    /// Eastern edge in degrees.
    #[arg(long = ARG_MAX_LON, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) max_lon: Option<f64>,
}

impl BboxArgs {
    fn into_config(self) -> Result<BboxConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        BboxConfig::try_from(merged)
    }
}

/// Resolved `bbox` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BboxConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) bbox: BoundingBox,
}

impl TryFrom<BboxArgs> for BboxConfig {
    type Error = CliError;

    fn try_from(args: BboxArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_BBOX_DATABASE,
        })?;
        let edge = |value: Option<f64>, field, env| {
            value.ok_or(CliError::MissingArgument { field, env })
        };
        let min_lat = edge(args.min_lat, ARG_MIN_LAT, ENV_BBOX_MIN_LAT)?;
        let min_lon = edge(args.min_lon, ARG_MIN_LON, ENV_BBOX_MIN_LON)?;
        let max_lat = edge(args.max_lat, ARG_MAX_LAT, ENV_BBOX_MAX_LAT)?;
        let max_lon = edge(args.max_lon, ARG_MAX_LON, ENV_BBOX_MAX_LON)?;
        let bbox = BoundingBox::from_degrees(min_lat, min_lon, max_lat, max_lon)
            .map_err(CliError::InvalidBoundingBox)?;
        Ok(Self { database, bbox })
    }
}

/// JSON report printed for a bounding-box query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct BboxReport {
    pub(crate) database: Utf8PathBuf,
    pub(crate) bbox: BoundingBox,
    #[serde(flatten)]
    pub(crate) summary: ClosureSummary,
}

pub(crate) fn resolve_bbox_config(args: BboxArgs) -> Result<BboxConfig, CliError> {
    let config = args.into_config()?;
    require_existing(&config.database, ARG_DATABASE)?;
    Ok(config)
}

pub(crate) fn execute_bbox(args: BboxArgs) -> Result<BboxReport, CliError> {
    let config = resolve_bbox_config(args)?;
    run_bbox(&config)
}

pub(crate) fn run_bbox(config: &BboxConfig) -> Result<BboxReport, CliError> {
    let store_error = |source| CliError::Store {
        path: config.database.clone(),
        source: Box::new(source),
    };
    let db = SqliteSnapshotDb::open(&config.database, StoreOptions::read_only())
        .map_err(store_error)?;
    let closure = db.bbox(&config.bbox).map_err(store_error)?;
    Ok(BboxReport {
        database: config.database.clone(),
        bbox: config.bbox,
        summary: closure.summary,
    })
}
