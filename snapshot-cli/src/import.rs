//! `import` command: load an OSM PBF extract into a snapshot database.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use snapshot_core::WriterOptions;
use snapshot_data::{ImportOptions, ImportSummary, import_into_database};

use crate::{
    ARG_BATCH_SIZE, ARG_DATABASE, ARG_OSM_PBF, CliError, ENV_IMPORT_DATABASE, ENV_IMPORT_OSM_PBF,
};

/// CLI arguments for the `import` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "import",
    long_about = "Decode an OpenStreetMap PBF extract and write its nodes, \
                 ways and relations into an SQLite snapshot. Entities already \
                 in the database are replaced key by key. Paths can come from \
                 CLI flags, configuration files, or environment variables.",
    about = "Import an OSM PBF file into a snapshot database"
)]
#[ortho_config(prefix = "OSM_SNAPSHOT")]
pub(crate) struct ImportArgs {
    /// Path to the OpenStreetMap PBF file.
    #[arg(long = ARG_OSM_PBF, value_name = "path")]
    #[serde(default)]
    pub(crate) osm_pbf: Option<Utf8PathBuf>,
    /// Path to the snapshot database; created when missing.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Entities written per transaction; 0 writes everything in one.
    #[arg(long = ARG_BATCH_SIZE, value_name = "count")]
    #[serde(default)]
    pub(crate) batch_size: Option<usize>,
}

impl ImportArgs {
    fn into_config(self) -> Result<ImportConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ImportConfig::try_from(merged)
    }
}

/// Resolved `import` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportConfig {
    pub(crate) osm_pbf: Utf8PathBuf,
    pub(crate) database: Utf8PathBuf,
    pub(crate) batch_size: usize,
}

impl ImportConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.osm_pbf, ARG_OSM_PBF)
    }

    const fn options(&self) -> ImportOptions {
        ImportOptions {
            writer: WriterOptions {
                batch_size: self.batch_size,
            },
            replace: false,
        }
    }
}

impl TryFrom<ImportArgs> for ImportConfig {
    type Error = CliError;

    fn try_from(args: ImportArgs) -> Result<Self, Self::Error> {
        let osm_pbf = args.osm_pbf.ok_or(CliError::MissingArgument {
            field: ARG_OSM_PBF,
            env: ENV_IMPORT_OSM_PBF,
        })?;
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_IMPORT_DATABASE,
        })?;
        let batch_size = args
            .batch_size
            .unwrap_or_else(|| WriterOptions::default().batch_size);
        Ok(Self {
            osm_pbf,
            database,
            batch_size,
        })
    }
}

pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match snapshot_data::fs::is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::MissingSourceFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// JSON report printed after an import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ImportReport {
    pub(crate) database: Utf8PathBuf,
    #[serde(flatten)]
    pub(crate) summary: ImportSummary,
}

pub(crate) fn resolve_import_config(args: ImportArgs) -> Result<ImportConfig, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    Ok(config)
}

pub(crate) fn execute_import(args: ImportArgs) -> Result<ImportReport, CliError> {
    let config = resolve_import_config(args)?;
    run_import(&config)
}

pub(crate) fn run_import(config: &ImportConfig) -> Result<ImportReport, CliError> {
    info!("importing {} into {}", config.osm_pbf, config.database);
    let summary = import_into_database(
        config.osm_pbf.as_std_path(),
        &config.database,
        config.options(),
    )?;
    Ok(ImportReport {
        database: config.database.clone(),
        summary,
    })
}
