//! Element store backends and the LOD store pipeline
//!
//! Backends only know how to keep elements per tile. Deciding *which* tiles an element
//! lands in, per level of detail and according to its style, is done once here by
//! [`ElementStoreExt`] for every backend.

mod cache;
mod codec;
mod memory;
mod persistent;

pub use memory::InMemoryStore;
pub use persistent::{PersistentStore, PersistentStoreConfig};

use crate::{
    BoundingBox, Element, LodRange, QuadKey, Result, StyleOracle, clipper, coordinate_to_tile,
    for_each_tile_intersecting,
};
use std::cell::OnceCell;

/// Storage backend contract
///
/// Duplicate writes are allowed and produce duplicate readable copies. De-duplication on
/// read is the job of [`crate::GeoStore`].
pub trait ElementStore: Send + Sync {
    /// Persist one element under one tile
    fn store(&self, element: &Element, quadkey: &QuadKey) -> Result<()>;

    /// Whether the tile holds any data, without materializing elements
    fn has_data(&self, quadkey: &QuadKey) -> Result<bool>;

    /// Call `visitor` once per stored element of the tile, in storage order
    fn search(&self, quadkey: &QuadKey, visitor: &mut dyn FnMut(&Element)) -> Result<()>;

    /// Flush buffered state
    fn commit(&self) -> Result<()>;

    /// Drop everything stored under the tile; erasing an empty tile is a no-op
    fn erase(&self, quadkey: &QuadKey) -> Result<()>;
}

/// Where the tiles of an element come from
#[derive(Clone, Copy, Debug)]
enum Region<'a> {
    /// Tiles intersecting the element's own bounding box
    Element,
    /// Exactly one tile
    Tile(&'a QuadKey),
    /// Tiles intersecting an explicit bounding box
    BoundingBox(&'a BoundingBox),
}

/// Style-driven store operations available on every backend
pub trait ElementStoreExt: ElementStore {
    /// Store the element in every tile it touches, for every LOD in `lods`
    ///
    /// Returns whether at least one tile received data.
    fn store_in_lod_range(
        &self,
        element: &Element,
        lods: LodRange,
        oracle: &dyn StyleOracle,
    ) -> Result<bool> {
        store_styled(self, element, lods, oracle, Region::Element)
    }

    /// Store the element in a single tile, at that tile's LOD
    fn store_in_tile(
        &self,
        element: &Element,
        quadkey: &QuadKey,
        oracle: &dyn StyleOracle,
    ) -> Result<bool> {
        let lods = LodRange::single(quadkey.level())?;
        store_styled(self, element, lods, oracle, Region::Tile(quadkey))
    }

    /// Store the element in every tile intersecting `bbox`, for every LOD in `lods`
    fn store_in_bbox(
        &self,
        element: &Element,
        bbox: &BoundingBox,
        lods: LodRange,
        oracle: &dyn StyleOracle,
    ) -> Result<bool> {
        store_styled(self, element, lods, oracle, Region::BoundingBox(bbox))
    }
}

impl<S: ElementStore + ?Sized> ElementStoreExt for S {}

fn store_styled<S: ElementStore + ?Sized>(
    store: &S,
    element: &Element,
    lods: LodRange,
    oracle: &dyn StyleOracle,
    region: Region<'_>,
) -> Result<bool> {
    #[cfg(feature = "profiling")]
    profiling::scope!("store::store_styled");

    // Computed on first use only, then shared by every LOD
    let element_bbox: OnceCell<BoundingBox> = OnceCell::new();
    let mut stored = false;

    for lod in lods.iter() {
        if !oracle.has_style(element, lod) {
            continue;
        }
        let style = oracle.for_element(element, lod);
        if style.skip() {
            continue;
        }
        let min_size = style.size();
        let clip = style.clip();

        let mut write = |quadkey: &QuadKey, tile_bbox: &BoundingBox| -> Result<()> {
            if let Some(min_size) = min_size
                && !matches!(element, Element::Node(_))
            {
                let bbox = element_bbox.get_or_init(|| element.bounding_box());
                let ratio = bbox.width() / tile_bbox.width();
                if ratio < min_size {
                    tracing::trace!(
                        "Skipping element {} in tile {}: size ratio {:.4} below {}",
                        element.id(),
                        quadkey,
                        ratio,
                        min_size
                    );
                    return Ok(());
                }
            }

            if clip {
                for piece in clipper::clip(element, quadkey, tile_bbox) {
                    if piece.is_empty() {
                        continue;
                    }
                    store.store(&piece, quadkey)?;
                    stored = true;
                }
            } else {
                store.store(element, quadkey)?;
                stored = true;
            }
            Ok(())
        };

        match (region, element) {
            (Region::Tile(quadkey), _) => write(quadkey, &quadkey.bounding_box())?,
            (Region::Element, Element::Node(node)) => {
                let quadkey = coordinate_to_tile(&node.coordinate, lod);
                write(&quadkey, &quadkey.bounding_box())?;
            }
            (Region::Element, _) => {
                let bbox = element_bbox.get_or_init(|| element.bounding_box());
                visit_tiles(bbox, lod, &mut write)?;
            }
            (Region::BoundingBox(bbox), _) => visit_tiles(bbox, lod, &mut write)?,
        }
    }

    Ok(stored)
}

/// Tile enumeration with early exit on the first failed write
fn visit_tiles<F>(bbox: &BoundingBox, lod: u8, write: &mut F) -> Result<()>
where
    F: FnMut(&QuadKey, &BoundingBox) -> Result<()>,
{
    let mut outcome = Ok(());
    for_each_tile_intersecting(bbox, lod, |quadkey, tile_bbox| {
        if outcome.is_ok() {
            outcome = write(&quadkey, tile_bbox);
        }
    });
    outcome
}
