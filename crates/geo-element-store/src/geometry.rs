//! Geographic value types: coordinates, bounding boxes and LOD ranges

use crate::{Result, StoreError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lowest supported level of detail
pub const MIN_LOD: u8 = 1;

/// Highest supported level of detail
pub const MAX_LOD: u8 = 19;

/// A WGS84 coordinate in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[inline]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<Coordinate> for geo::Coord<f64> {
    #[inline]
    fn from(coordinate: Coordinate) -> Self {
        geo::Coord {
            x: coordinate.longitude,
            y: coordinate.latitude,
        }
    }
}

impl From<geo::Coord<f64>> for Coordinate {
    #[inline]
    fn from(coord: geo::Coord<f64>) -> Self {
        Coordinate::new(coord.y, coord.x)
    }
}

/// Axis-aligned box over latitude/longitude
///
/// A freshly created box is empty and only becomes valid once a coordinate is added.
/// Empty boxes intersect and contain nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    extent: Option<(Coordinate, Coordinate)>,
}

impl BoundingBox {
    /// Create a valid box from its corners
    pub fn new(min: Coordinate, max: Coordinate) -> Self {
        Self {
            extent: Some((min, max)),
        }
    }

    /// Create an empty (invalid) box
    pub const fn empty() -> Self {
        Self { extent: None }
    }

    /// Build the smallest box containing all coordinates
    pub fn from_coordinates<'a>(coordinates: impl IntoIterator<Item = &'a Coordinate>) -> Self {
        let mut bbox = Self::empty();
        for coordinate in coordinates {
            bbox.expand(*coordinate);
        }
        bbox
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.extent.is_some()
    }

    #[inline]
    pub fn min(&self) -> Option<Coordinate> {
        self.extent.map(|(min, _)| min)
    }

    #[inline]
    pub fn max(&self) -> Option<Coordinate> {
        self.extent.map(|(_, max)| max)
    }

    /// Grow the box so that it contains the coordinate
    pub fn expand(&mut self, coordinate: Coordinate) {
        self.extent = Some(match self.extent {
            None => (coordinate, coordinate),
            Some((min, max)) => (
                Coordinate::new(
                    min.latitude.min(coordinate.latitude),
                    min.longitude.min(coordinate.longitude),
                ),
                Coordinate::new(
                    max.latitude.max(coordinate.latitude),
                    max.longitude.max(coordinate.longitude),
                ),
            ),
        });
    }

    /// Grow the box so that it contains another box
    pub fn expand_box(&mut self, other: &BoundingBox) {
        if let Some((min, max)) = other.extent {
            self.expand(min);
            self.expand(max);
        }
    }

    /// Closed-interval intersection test (touching boxes intersect)
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        match (self.extent, other.extent) {
            (Some((min, max)), Some((omin, omax))) => {
                !(max.longitude < omin.longitude
                    || min.longitude > omax.longitude
                    || max.latitude < omin.latitude
                    || min.latitude > omax.latitude)
            }
            _ => false,
        }
    }

    /// Check whether the coordinate lies inside or on the border of the box
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        match self.extent {
            Some((min, max)) => {
                coordinate.latitude >= min.latitude
                    && coordinate.latitude <= max.latitude
                    && coordinate.longitude >= min.longitude
                    && coordinate.longitude <= max.longitude
            }
            None => false,
        }
    }

    /// Check whether another box lies completely inside this one
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        match other.extent {
            Some((min, max)) => self.contains(&min) && self.contains(&max),
            None => false,
        }
    }

    /// Longitude span in degrees (zero for an empty box)
    pub fn width(&self) -> f64 {
        self.extent
            .map(|(min, max)| max.longitude - min.longitude)
            .unwrap_or(0.0)
    }

    /// Latitude span in degrees (zero for an empty box)
    pub fn height(&self) -> f64 {
        self.extent
            .map(|(min, max)| max.latitude - min.latitude)
            .unwrap_or(0.0)
    }

    pub fn center(&self) -> Option<Coordinate> {
        self.extent.map(|(min, max)| {
            Coordinate::new(
                (min.latitude + max.latitude) / 2.0,
                (min.longitude + max.longitude) / 2.0,
            )
        })
    }
}

/// Inclusive range of levels of detail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LodRange {
    start: u8,
    end: u8,
}

impl LodRange {
    /// Create a validated range; fails if either end is outside the supported LODs
    pub fn new(start: u8, end: u8) -> Result<Self> {
        if start < MIN_LOD || end > MAX_LOD || start > end {
            return Err(StoreError::InvalidLodRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// A range holding exactly one level
    pub fn single(lod: u8) -> Result<Self> {
        Self::new(lod, lod)
    }

    #[inline]
    pub fn start(&self) -> u8 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> u8 {
        self.end
    }

    #[inline]
    pub fn contains(&self, lod: u8) -> bool {
        (self.start..=self.end).contains(&lod)
    }

    /// Iterate over every level in the range
    pub fn iter(&self) -> std::ops::RangeInclusive<u8> {
        self.start..=self.end
    }
}
