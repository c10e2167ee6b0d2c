//! Test helpers for preparing datasets and layered overrides.

use super::*;
use crate::import::{ImportConfig, resolve_import_config};
use base64::{Engine as _, engine::general_purpose};
use camino::{Utf8Path, Utf8PathBuf};
use snapshot_core::{
    Coordinate, Entity, EntityKind, EntityMeta, Member, Node, Relation, SqliteSnapshotDb,
    StoreOptions, Way,
};
use std::fs;
use tempfile::TempDir;

/// Scratch directory holding the files a command reads and writes.
#[derive(Debug)]
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    /// Decode the shared sample extract into `name`.
    pub(super) fn write_sample_pbf(&self, name: &str) -> Utf8PathBuf {
        let encoded_path = Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../snapshot-data/tests/fixtures/sample.osm.pbf.b64");
        let encoded = fs::read_to_string(&encoded_path).expect("read sample fixture");
        let cleaned: String = encoded
            .chars()
            .filter(|ch| !ch.is_ascii_whitespace())
            .collect();
        let decoded = general_purpose::STANDARD
            .decode(cleaned.as_bytes())
            .expect("decode sample fixture");
        let target = self.path(name);
        fs::write(&target, decoded).expect("write sample extract");
        target
    }

    /// Write a snapshot with a way crossing the edge of the unit box.
    pub(super) fn seed_database(&self, name: &str) -> Utf8PathBuf {
        let target = self.path(name);
        let db = SqliteSnapshotDb::open(&target, StoreOptions::default()).expect("open store");
        let at = |lat, lon| Coordinate::from_degrees(lat, lon).expect("valid coordinate");
        db.add_or_update([
            Entity::Node(Node::new(EntityMeta::new(1), at(0.5, 0.5))),
            Entity::Node(Node::new(EntityMeta::new(2), at(4.0, 4.0))),
            Entity::Way(Way::new(EntityMeta::new(10), vec![1, 2])),
            Entity::Relation(Relation::new(
                EntityMeta::new(20),
                vec![Member::new(EntityKind::Way, 10, "outer")],
            )),
        ])
        .expect("seed snapshot");
        target
    }
}

/// Run a parsed command and decode the report it prints.
pub(super) fn run_to_json(command: Command) -> Result<serde_json::Value, CliError> {
    let mut buffer = Vec::new();
    dispatch(command, &mut buffer)?;
    assert_eq!(buffer.last(), Some(&b'\n'), "reports end with a newline");
    Ok(serde_json::from_slice(&buffer).expect("report is valid JSON"))
}

/// Parse `osm-snapshot <args>`.
pub(super) fn parse(args: &[String]) -> Result<Command, CliError> {
    let invocation = std::iter::once("osm-snapshot".to_owned()).chain(args.iter().cloned());
    Cli::try_parse_from(invocation)
        .map(|cli| cli.command)
        .map_err(CliError::ArgumentParsing)
}

/// Values supplied by a configuration file or the environment.
#[derive(Debug, Clone, Default)]
pub(super) struct LayerOverrides {
    pub(super) osm_pbf: Option<Utf8PathBuf>,
    pub(super) database: Option<Utf8PathBuf>,
}

/// Resolve import arguments with explicit file and environment layers,
/// letting CLI values win over the environment and the environment win over
/// the file.
pub(super) fn merge_layers(
    mut cli_args: ImportArgs,
    file_layer: Option<&LayerOverrides>,
    env_layer: Option<&LayerOverrides>,
) -> Result<ImportConfig, CliError> {
    merge_field(
        &mut cli_args.osm_pbf,
        env_layer.and_then(|layer| layer.osm_pbf.clone()),
        file_layer.and_then(|layer| layer.osm_pbf.clone()),
    );
    merge_field(
        &mut cli_args.database,
        env_layer.and_then(|layer| layer.database.clone()),
        file_layer.and_then(|layer| layer.database.clone()),
    );
    resolve_import_config(cli_args)
}

fn merge_field<T>(target: &mut Option<T>, env_value: Option<T>, file_value: Option<T>) {
    if target.is_none()
        && let Some(value) = env_value.or(file_value)
    {
        *target = Some(value);
    }
}

pub(super) fn exists(path: &Utf8Path) -> bool {
    path.as_std_path().is_file()
}
