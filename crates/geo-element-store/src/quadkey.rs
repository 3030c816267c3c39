//! Quadkey tile addressing
//!
//! Tiles form a quadtree over the Web Mercator projection: level `L` splits the world
//! into `2^L × 2^L` tiles, `x` growing eastwards and `y` growing southwards.

use crate::{BoundingBox, Coordinate, MAX_LOD, MIN_LOD, Result, StoreError, utils};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Address of a single tile
///
/// Ordering is by level, then x, then y. Fields are read-only so that every quadkey in
/// circulation lies on the grid of its level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawQuadKey"))]
pub struct QuadKey {
    level: u8,
    x: u32,
    y: u32,
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawQuadKey {
    level: u8,
    x: u32,
    y: u32,
}

#[cfg(feature = "serde")]
impl TryFrom<RawQuadKey> for QuadKey {
    type Error = StoreError;

    fn try_from(raw: RawQuadKey) -> Result<Self> {
        Self::new(raw.level, raw.x, raw.y)
    }
}

impl QuadKey {
    /// Create a validated quadkey
    pub fn new(level: u8, x: u32, y: u32) -> Result<Self> {
        if !(MIN_LOD..=MAX_LOD).contains(&level) {
            return Err(StoreError::InvalidQuadKey(format!(
                "level {level} outside {MIN_LOD}..={MAX_LOD}"
            )));
        }
        let tiles = tiles_per_side(level);
        if u64::from(x) >= tiles || u64::from(y) >= tiles {
            return Err(StoreError::InvalidQuadKey(format!(
                "tile {x}/{y} outside the {tiles}x{tiles} grid of level {level}"
            )));
        }
        Ok(Self { level, x, y })
    }

    #[inline]
    pub fn level(&self) -> u8 {
        self.level
    }

    #[inline]
    pub fn x(&self) -> u32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> u32 {
        self.y
    }

    /// Base-4 code with one digit per level, most significant first
    ///
    /// Each digit is `bit_x + 2 * bit_y` of the corresponding level.
    pub fn code(&self) -> String {
        (1..=self.level)
            .rev()
            .map(|i| {
                let mask = 1u32 << (i - 1);
                let mut digit = b'0';
                if self.x & mask != 0 {
                    digit += 1;
                }
                if self.y & mask != 0 {
                    digit += 2;
                }
                digit as char
            })
            .collect()
    }

    /// Parse a code produced by [`QuadKey::code`]
    pub fn from_code(code: &str) -> Result<Self> {
        let level = u8::try_from(code.len())
            .map_err(|_| StoreError::InvalidQuadKey(format!("code too long: {code}")))?;
        let mut x = 0u32;
        let mut y = 0u32;
        for ch in code.chars() {
            let digit = ch
                .to_digit(4)
                .ok_or_else(|| StoreError::InvalidQuadKey(format!("bad digit in {code}")))?;
            x = (x << 1) | (digit & 1);
            y = (y << 1) | (digit >> 1);
        }
        Self::new(level, x, y)
    }

    /// Geographic extent of this tile
    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        tile_to_bounding_box(self)
    }
}

impl fmt::Display for QuadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.x, self.y)
    }
}

#[inline]
fn tiles_per_side(lod: u8) -> u64 {
    1u64 << lod
}

#[inline]
fn unit_to_tile(unit: f64, tiles: u64) -> u32 {
    let index = (unit * tiles as f64).floor();
    index.clamp(0.0, (tiles - 1) as f64) as u32
}

/// Find the tile containing a coordinate at the given level of detail
///
/// Coordinates outside the Mercator limits are clamped first, so the poles map to the
/// first/last row instead of producing infinities.
pub fn coordinate_to_tile(coordinate: &Coordinate, lod: u8) -> QuadKey {
    debug_assert!(lod <= MAX_LOD, "LOD {lod} above {MAX_LOD}");
    let tiles = tiles_per_side(lod);
    QuadKey {
        level: lod,
        x: unit_to_tile(utils::longitude_to_unit_x(coordinate.longitude), tiles),
        y: unit_to_tile(utils::latitude_to_unit_y(coordinate.latitude), tiles),
    }
}

/// Geographic extent of a tile
pub fn tile_to_bounding_box(quadkey: &QuadKey) -> BoundingBox {
    let tiles = tiles_per_side(quadkey.level) as f64;
    let x = f64::from(quadkey.x);
    let y = f64::from(quadkey.y);
    BoundingBox::new(
        Coordinate::new(
            utils::unit_y_to_latitude((y + 1.0) / tiles),
            utils::unit_x_to_longitude(x / tiles),
        ),
        Coordinate::new(
            utils::unit_y_to_latitude(y / tiles),
            utils::unit_x_to_longitude((x + 1.0) / tiles),
        ),
    )
}

/// Visit every tile at `lod` whose bounding box intersects `bbox`, row by row
///
/// Does nothing for an empty box. The candidate range is widened by one tile on each
/// side and then filtered with the exact intersection test, so that floating point
/// disagreement between tile lookup and tile extent can neither drop nor add tiles.
pub fn for_each_tile_intersecting<F>(bbox: &BoundingBox, lod: u8, mut visit: F)
where
    F: FnMut(QuadKey, &BoundingBox),
{
    let (Some(min), Some(max)) = (bbox.min(), bbox.max()) else {
        return;
    };

    let north_west = coordinate_to_tile(&Coordinate::new(max.latitude, min.longitude), lod);
    let south_east = coordinate_to_tile(&Coordinate::new(min.latitude, max.longitude), lod);
    let last = (tiles_per_side(lod) - 1) as u32;

    for y in north_west.y.saturating_sub(1)..=(south_east.y + 1).min(last) {
        for x in north_west.x.saturating_sub(1)..=(south_east.x + 1).min(last) {
            let quadkey = QuadKey { level: lod, x, y };
            let tile_bbox = tile_to_bounding_box(&quadkey);
            if tile_bbox.intersects(bbox) {
                visit(quadkey, &tile_bbox);
            }
        }
    }
}
