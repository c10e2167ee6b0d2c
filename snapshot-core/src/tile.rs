//! Web-mercator tile addressing for node rows.
//!
//! Every node row carries the id of the zoom-[`TILE_ZOOM`] tile containing
//! it. Ids are allocated level by level: all tiles of zoom 0 first, then
//! zoom 1, and so on. Within a level tiles are numbered row-major from the
//! north-west corner, so the tiles of one row form a contiguous id range.

use std::f64::consts::PI;
use std::ops::RangeInclusive;

use crate::coordinate::{BoundingBox, Coordinate};

/// Zoom level used for the node `tile` column.
pub const TILE_ZOOM: u8 = 14;

/// Latitude limit of the web-mercator projection.
const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_59;

/// Column and row of a tile at a given zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    /// Zoom level.
    pub zoom: u8,
    /// Column, growing eastwards.
    pub x: u32,
    /// Row, growing southwards.
    pub y: u32,
}

impl Tile {
    /// Tile containing `coordinate` at `zoom`.
    #[must_use]
    pub fn containing(coordinate: &Coordinate, zoom: u8) -> Self {
        let n = tiles_per_side(zoom);
        let latitude = coordinate
            .latitude()
            .clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE)
            .to_radians();
        let x = (coordinate.longitude() + 180.0) / 360.0 * f64::from(n);
        let y = (1.0 - (latitude.tan() + 1.0 / latitude.cos()).ln() / PI) / 2.0 * f64::from(n);
        Self {
            zoom,
            x: clamp_index(x, n),
            y: clamp_index(y, n),
        }
    }

    /// Globally unique id of this tile across all zoom levels.
    #[must_use]
    pub fn id(&self) -> u64 {
        let n = u64::from(tiles_per_side(self.zoom));
        level_offset(self.zoom) + u64::from(self.y) * n + u64::from(self.x)
    }
}

/// Tile id stored with a node at `coordinate`.
///
/// # Examples
///
/// ```
/// use snapshot_core::{Coordinate, tile::tile_id};
///
/// # fn main() -> Result<(), snapshot_core::CoordinateError> {
/// let id = tile_id(&Coordinate::from_degrees(0.0, 0.0)?);
/// assert!(id > 0);
/// # Ok(())
/// # }
/// ```
#[must_use]
pub fn tile_id(coordinate: &Coordinate) -> u64 {
    Tile::containing(coordinate, TILE_ZOOM).id()
}

/// Contiguous tile id ranges, one per tile row, covering `bbox`.
///
/// Nodes inside the box are guaranteed to carry a tile id inside one of the
/// returned ranges. The converse does not hold: callers must still compare
/// coordinates against the box.
#[must_use]
pub fn tile_ranges(bbox: &BoundingBox) -> Vec<RangeInclusive<u64>> {
    // North-west and south-east corners give the smallest and largest row.
    let north_west = Coordinate::from_scaled(bbox.max().lat_e7(), bbox.min().lon_e7())
        .map(|corner| Tile::containing(&corner, TILE_ZOOM));
    let south_east = Coordinate::from_scaled(bbox.min().lat_e7(), bbox.max().lon_e7())
        .map(|corner| Tile::containing(&corner, TILE_ZOOM));
    let (Ok(north_west), Ok(south_east)) = (north_west, south_east) else {
        return Vec::new();
    };
    (north_west.y..=south_east.y)
        .map(|y| {
            let first = Tile {
                zoom: TILE_ZOOM,
                x: north_west.x,
                y,
            };
            let last = Tile {
                zoom: TILE_ZOOM,
                x: south_east.x,
                y,
            };
            first.id()..=last.id()
        })
        .collect()
}

const fn tiles_per_side(zoom: u8) -> u32 {
    1_u32 << zoom
}

fn level_offset(zoom: u8) -> u64 {
    (0..zoom).map(|level| 1_u64 << (2 * u32::from(level))).sum()
}

fn clamp_index(position: f64, n: u32) -> u32 {
    let max = f64::from(n - 1);
    // The clamp keeps the float inside `0..n`, so the cast is exact.
    position.floor().clamp(0.0, max) as u32
}
