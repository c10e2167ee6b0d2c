//! Id-set queries backing bounding-box closures.

use std::collections::BTreeSet;

use rusqlite::{Connection, params_from_iter};

use super::scan::{MAX_FILTER_IDS, placeholders};
use crate::coordinate::BoundingBox;
use crate::entity::EntityKind;
use crate::tile::tile_ranges;

/// Above this many tile rows a plain coordinate range scan is cheaper than
/// one tile-range probe per row.
const MAX_TILE_ROWS: usize = 64;

/// Ids of nodes inside `bbox`, edges included.
pub(crate) fn node_ids_in_box(
    connection: &Connection,
    bbox: &BoundingBox,
) -> rusqlite::Result<BTreeSet<i64>> {
    let (min, max) = (bbox.min(), bbox.max());
    let bounds = [min.lat_e7(), max.lat_e7(), min.lon_e7(), max.lon_e7()];
    let ranges = tile_ranges(bbox);
    let mut ids = BTreeSet::new();
    if ranges.len() > MAX_TILE_ROWS {
        let mut statement = connection.prepare_cached(
            "SELECT id FROM node
             WHERE latitude BETWEEN ?1 AND ?2 AND longitude BETWEEN ?3 AND ?4",
        )?;
        for id in statement.query_map(bounds, |row| row.get(0))? {
            ids.insert(id?);
        }
        return Ok(ids);
    }

    let mut statement = connection.prepare_cached(
        "SELECT id FROM node
         WHERE tile BETWEEN ?1 AND ?2
           AND latitude BETWEEN ?3 AND ?4 AND longitude BETWEEN ?5 AND ?6",
    )?;
    for range in ranges {
        let [min_lat, max_lat, min_lon, max_lon] = bounds;
        let parameters = (
            *range.start(),
            *range.end(),
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        );
        for id in statement.query_map(parameters, |row| row.get(0))? {
            ids.insert(id?);
        }
    }
    Ok(ids)
}

/// Ids of ways referencing any of `node_ids`.
pub(crate) fn way_ids_for_nodes(
    connection: &Connection,
    node_ids: &BTreeSet<i64>,
) -> rusqlite::Result<BTreeSet<i64>> {
    let mut ids = BTreeSet::new();
    let node_ids: Vec<i64> = node_ids.iter().copied().collect();
    for chunk in node_ids.chunks(MAX_FILTER_IDS) {
        let sql = format!(
            "SELECT DISTINCT way_id FROM way_nodes WHERE node_id IN ({})",
            placeholders(chunk.len())
        );
        let mut statement = connection.prepare_cached(&sql)?;
        for id in statement.query_map(params_from_iter(chunk), |row| row.get(0))? {
            ids.insert(id?);
        }
    }
    Ok(ids)
}

/// Ids of relations with a member of `kind` whose id is in `member_ids`.
pub(crate) fn relation_ids_for_members(
    connection: &Connection,
    kind: EntityKind,
    member_ids: &BTreeSet<i64>,
) -> rusqlite::Result<BTreeSet<i64>> {
    let mut ids = BTreeSet::new();
    let member_ids: Vec<i64> = member_ids.iter().copied().collect();
    for chunk in member_ids.chunks(MAX_FILTER_IDS) {
        let sql = format!(
            "SELECT DISTINCT relation_id FROM relation_members
             WHERE member_type = ? AND member_id IN ({})",
            placeholders(chunk.len())
        );
        let mut statement = connection.prepare_cached(&sql)?;
        let parameters = std::iter::once(i64::from(kind.code())).chain(chunk.iter().copied());
        for id in statement.query_map(params_from_iter(parameters), |row| row.get(0))? {
            ids.insert(id?);
        }
    }
    Ok(ids)
}
