//! Geo Element Store - Tiled Storage of Map Elements
//!
//! This library stores geographic vector elements (nodes, ways, areas and relations) by
//! quadkey tile at multiple levels of detail (LOD) and makes them searchable per tile.
//!
//! # Architecture
//!
//! - **[`QuadKey`]**: Tile addressing, tile bounding boxes and tile enumeration
//! - **[`clipper`]**: Boundary-exact clipping of elements to a tile, in fixed-point arithmetic
//! - **[`ElementStore`]**: Backend contract, with [`InMemoryStore`] and [`PersistentStore`]
//! - **[`MultipolygonProcessor`]**: Assembles relation members into nested outer/inner areas
//! - **[`GeoStore`]**: Facade fanning writes and reads out over named backends
//!
//! # Data Flow
//!
//! Decoded elements are handed to [`GeoStore`], which enumerates affected tiles for each
//! LOD, consults the [`StyleOracle`] for `skip`/`size`/`clip` declarations, optionally clips
//! and finally writes into the chosen backend. Reads fan out over every backend that has
//! data for a tile and de-duplicate by element id.

pub mod clipper;
mod element;
mod geo_store;
mod geometry;
mod multipolygon;
mod quadkey;
mod store;
mod string_table;
mod style;
pub mod utils;

// Public API exports
pub use element::{Area, Element, ElementKind, Node, Relation, Tag, Tags, Way};
pub use geo_store::GeoStore;
pub use geometry::{BoundingBox, Coordinate, LodRange, MAX_LOD, MIN_LOD};
pub use multipolygon::{
    MemberIndex, MemberKind, MemberLookup, MemberRole, MultipolygonProcessor, RelationMember,
};
pub use quadkey::{QuadKey, coordinate_to_tile, for_each_tile_intersecting, tile_to_bounding_box};
pub use store::{
    ElementStore, ElementStoreExt, InMemoryStore, PersistentStore, PersistentStoreConfig,
};
pub use string_table::StringTable;
pub use style::{CLIP_KEY, FixedStyleOracle, SIZE_KEY, SKIP_KEY, Style, StyleOracle};

use std::path::PathBuf;

/// Coarse classification of [`StoreError`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid construction parameters, reported before any work is done
    Config,
    /// File open/read/write failures
    Io,
    /// Malformed or unencodable element data
    Data,
}

/// Error types for the element store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid LOD range {start}..={end} (supported {}..={})", MIN_LOD, MAX_LOD)]
    InvalidLodRange { start: u8, end: u8 },

    #[error("Invalid quadkey: {0}")]
    InvalidQuadKey(String),

    #[error("Invalid data directory {}: {reason}", .path.display())]
    InvalidDirectory { path: PathBuf, reason: String },

    #[error("Unknown element store: {0}")]
    UnknownStore(String),

    #[error("Element cannot be encoded: {0}")]
    Encoding(String),

    #[error("Corrupt tile data: {0}")]
    CorruptData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Which part of the error taxonomy this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidLodRange { .. }
            | StoreError::InvalidQuadKey(_)
            | StoreError::InvalidDirectory { .. }
            | StoreError::UnknownStore(_) => ErrorKind::Config,
            StoreError::Io(_) => ErrorKind::Io,
            StoreError::Encoding(_) | StoreError::CorruptData(_) => ErrorKind::Data,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
