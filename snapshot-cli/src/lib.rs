//! Command-line interface for building and querying graph snapshots.
#![forbid(unsafe_code)]

use std::io::Write;

use clap::{Parser, Subcommand};
use serde::Serialize;

mod bbox;
mod error;
mod import;

pub use error::CliError;

use bbox::BboxArgs;
use import::ImportArgs;

const ARG_OSM_PBF: &str = "osm-pbf";
const ARG_DATABASE: &str = "database";
const ARG_BATCH_SIZE: &str = "batch-size";
const ARG_MIN_LAT: &str = "min-lat";
const ARG_MIN_LON: &str = "min-lon";
const ARG_MAX_LAT: &str = "max-lat";
const ARG_MAX_LON: &str = "max-lon";
const ENV_IMPORT_OSM_PBF: &str = "OSM_SNAPSHOT_CMDS_IMPORT_OSM_PBF";
const ENV_IMPORT_DATABASE: &str = "OSM_SNAPSHOT_CMDS_IMPORT_DATABASE";
const ENV_BBOX_DATABASE: &str = "OSM_SNAPSHOT_CMDS_BBOX_DATABASE";
const ENV_BBOX_MIN_LAT: &str = "OSM_SNAPSHOT_CMDS_BBOX_MIN_LAT";
const ENV_BBOX_MIN_LON: &str = "OSM_SNAPSHOT_CMDS_BBOX_MIN_LON";
const ENV_BBOX_MAX_LAT: &str = "OSM_SNAPSHOT_CMDS_BBOX_MAX_LAT";
const ENV_BBOX_MAX_LON: &str = "OSM_SNAPSHOT_CMDS_BBOX_MAX_LON";

/// Run the CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    dispatch(cli.command, &mut stdout)
}

fn dispatch(command: Command, out: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Import(args) => {
            let report = import::execute_import(args)?;
            write_report(out, &report)
        }
        Command::Bbox(args) => {
            let report = bbox::execute_bbox(args)?;
            write_report(out, &report)
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "osm-snapshot",
    about = "Build and query SQLite snapshots of OpenStreetMap data",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load an OSM PBF extract into a snapshot database.
    Import(ImportArgs),
    /// Report the referentially complete contents of a bounding box.
    Bbox(BboxArgs),
}

/// Print `report` as pretty JSON followed by a newline.
fn write_report<T: Serialize>(out: &mut dyn Write, report: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(report).map_err(CliError::SerialiseReport)?;
    out.write_all(payload.as_bytes())
        .map_err(CliError::WriteReport)?;
    out.write_all(b"\n").map_err(CliError::WriteReport)?;
    Ok(())
}

#[cfg(test)]
mod tests;
