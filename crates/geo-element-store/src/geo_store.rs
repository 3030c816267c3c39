//! GeoStore - Facade over named element stores
//!
//! Writes go to one named backend. Reads fan out over every backend holding data for a
//! tile and run through a de-duplicating filter keyed by element id.

use crate::{
    BoundingBox, Element, ElementStore, ElementStoreExt, LodRange, QuadKey, Result, StoreError,
    StyleOracle, for_each_tile_intersecting,
};

use rayon::prelude::*;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

/// Top-level entry point for storing and searching elements
#[derive(Clone, Default)]
pub struct GeoStore {
    /// Backends in registration order
    stores: Vec<(String, Arc<dyn ElementStore>)>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under `name`, replacing any backend of the same name
    pub fn register_store(&mut self, name: impl Into<String>, store: Arc<dyn ElementStore>) {
        let name = name.into();
        tracing::debug!("Registering element store '{}'", name);
        match self.stores.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = store,
            None => self.stores.push((name, store)),
        }
    }

    /// Names of the registered backends, in registration order
    pub fn store_names(&self) -> impl Iterator<Item = &str> {
        self.stores.iter().map(|(name, _)| name.as_str())
    }

    fn store(&self, name: &str) -> Result<&Arc<dyn ElementStore>> {
        self.stores
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, store)| store)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    /// Store an element in every tile it touches for each LOD of `lods`
    pub fn add_in_lod_range(
        &self,
        name: &str,
        element: &Element,
        lods: LodRange,
        oracle: &dyn StyleOracle,
    ) -> Result<bool> {
        self.store(name)?.store_in_lod_range(element, lods, oracle)
    }

    /// Store an element in a single tile
    pub fn add_to_tile(
        &self,
        name: &str,
        element: &Element,
        quadkey: &QuadKey,
        oracle: &dyn StyleOracle,
    ) -> Result<bool> {
        self.store(name)?.store_in_tile(element, quadkey, oracle)
    }

    /// Store an element in every tile intersecting `bbox` for each LOD of `lods`
    pub fn add_in_bbox(
        &self,
        name: &str,
        element: &Element,
        bbox: &BoundingBox,
        lods: LodRange,
        oracle: &dyn StyleOracle,
    ) -> Result<bool> {
        self.store(name)?.store_in_bbox(element, bbox, lods, oracle)
    }

    /// Store many elements at once
    ///
    /// Tile selection and clipping run in parallel; writes then go to the backend from
    /// the calling thread, in input order. Returns the number of elements that produced
    /// data. The first failed write aborts the whole call.
    pub fn add_all(
        &self,
        name: &str,
        elements: &[Element],
        lods: LodRange,
        oracle: &dyn StyleOracle,
    ) -> Result<usize> {
        #[cfg(feature = "profiling")]
        profiling::scope!("geo_store::add_all");

        let store = self.store(name)?;

        // Phase 1: decompose in parallel
        let batches: Vec<Vec<(QuadKey, Element)>> = elements
            .par_iter()
            .map(|element| -> Result<Vec<(QuadKey, Element)>> {
                let batch = TileBatch::default();
                batch.store_in_lod_range(element, lods, oracle)?;
                Ok(batch.into_writes())
            })
            .collect::<Result<_>>()?;

        // Phase 2: single writer
        let mut count = 0;
        for writes in batches {
            if writes.is_empty() {
                continue;
            }
            for (quadkey, element) in &writes {
                store.store(element, quadkey)?;
            }
            count += 1;
        }

        tracing::debug!(
            "Stored {} of {} element(s) into '{}'",
            count,
            elements.len(),
            name
        );
        Ok(count)
    }

    /// Whether any backend holds data for the tile
    pub fn has_data(&self, quadkey: &QuadKey) -> Result<bool> {
        for (_, store) in &self.stores {
            if store.has_data(quadkey)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Visit the elements of one tile across all backends, without duplicates
    pub fn search(
        &self,
        quadkey: &QuadKey,
        oracle: &dyn StyleOracle,
        visitor: &mut dyn FnMut(&Element),
    ) -> Result<()> {
        let mut filter = DuplicateFilter::new(oracle);
        self.search_tile(quadkey, &mut filter, visitor)
    }

    /// Visit the elements of every tile at `lod` intersecting `bbox`
    ///
    /// One de-duplicating filter spans all tiles, so an element stored in several tiles
    /// is reported once.
    pub fn search_bbox(
        &self,
        bbox: &BoundingBox,
        lod: u8,
        oracle: &dyn StyleOracle,
        visitor: &mut dyn FnMut(&Element),
    ) -> Result<()> {
        let mut tiles = Vec::new();
        for_each_tile_intersecting(bbox, lod, |quadkey, _| tiles.push(quadkey));

        let mut filter = DuplicateFilter::new(oracle);
        for quadkey in &tiles {
            self.search_tile(quadkey, &mut filter, visitor)?;
        }
        Ok(())
    }

    fn search_tile(
        &self,
        quadkey: &QuadKey,
        filter: &mut DuplicateFilter<'_>,
        visitor: &mut dyn FnMut(&Element),
    ) -> Result<()> {
        for (_, store) in &self.stores {
            if !store.has_data(quadkey)? {
                continue;
            }
            store.search(quadkey, &mut |element| {
                if filter.accept(element, quadkey.level()) {
                    visitor(element);
                }
            })?;
        }
        Ok(())
    }

    /// Flush every backend
    pub fn commit(&self) -> Result<()> {
        for (_, store) in &self.stores {
            store.commit()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for GeoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoStore")
            .field("stores", &self.store_names().collect::<Vec<_>>())
            .finish()
    }
}

/// Keep-first filter on element ids
///
/// - id `0` marks synthetic elements and always passes;
/// - the first element of an id passes;
/// - a later element with the same id passes only if its content differs from every
///   instance already forwarded and the oracle styles it at the tile's LOD. Backends may
///   hold differently clipped fragments of one element, which must all reach the caller.
struct DuplicateFilter<'a> {
    oracle: &'a dyn StyleOracle,
    seen: HashMap<u64, SmallVec<[u64; 1]>>,
}

impl<'a> DuplicateFilter<'a> {
    fn new(oracle: &'a dyn StyleOracle) -> Self {
        Self {
            oracle,
            seen: HashMap::new(),
        }
    }

    fn accept(&mut self, element: &Element, lod: u8) -> bool {
        let id = element.id();
        if id == 0 {
            return true;
        }
        let fingerprint = fingerprint(element);
        match self.seen.entry(id) {
            Entry::Vacant(entry) => {
                entry.insert(SmallVec::from_slice(&[fingerprint]));
                true
            }
            Entry::Occupied(mut entry) => {
                if entry.get().contains(&fingerprint) || !self.oracle.has_style(element, lod) {
                    return false;
                }
                entry.get_mut().push(fingerprint);
                true
            }
        }
    }
}

/// Content hash over kind, tags and the exact bits of every coordinate
fn fingerprint(element: &Element) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_element(element, &mut hasher);
    hasher.finish()
}

fn hash_element<H: Hasher>(element: &Element, hasher: &mut H) {
    element.kind().hash(hasher);
    element.id().hash(hasher);
    element.tags().as_slice().hash(hasher);
    match element {
        Element::Node(node) => {
            node.coordinate.latitude.to_bits().hash(hasher);
            node.coordinate.longitude.to_bits().hash(hasher);
        }
        Element::Way(crate::Way { coordinates, .. })
        | Element::Area(crate::Area { coordinates, .. }) => {
            coordinates.len().hash(hasher);
            for coordinate in coordinates {
                coordinate.latitude.to_bits().hash(hasher);
                coordinate.longitude.to_bits().hash(hasher);
            }
        }
        Element::Relation(relation) => {
            relation.elements.len().hash(hasher);
            for child in &relation.elements {
                hash_element(child, hasher);
            }
        }
    }
}

/// Scratch backend collecting the writes of one element
#[derive(Default)]
struct TileBatch {
    writes: Mutex<Vec<(QuadKey, Element)>>,
}

impl TileBatch {
    fn into_writes(self) -> Vec<(QuadKey, Element)> {
        self.writes
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ElementStore for TileBatch {
    fn store(&self, element: &Element, quadkey: &QuadKey) -> Result<()> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((*quadkey, element.clone()));
        Ok(())
    }

    fn has_data(&self, quadkey: &QuadKey) -> Result<bool> {
        Ok(self
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(stored, _)| stored == quadkey))
    }

    fn search(&self, quadkey: &QuadKey, visitor: &mut dyn FnMut(&Element)) -> Result<()> {
        let writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, element) in writes.iter().filter(|(stored, _)| stored == quadkey) {
            visitor(element);
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }

    fn erase(&self, quadkey: &QuadKey) -> Result<()> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(stored, _)| stored != quadkey);
        Ok(())
    }
}
