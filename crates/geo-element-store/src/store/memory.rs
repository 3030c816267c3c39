use super::ElementStore;
use crate::{Element, QuadKey, Result};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Backend keeping owned element copies per tile in an ordered map
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tiles: RwLock<BTreeMap<QuadKey, Vec<Element>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tiles holding at least one element
    pub fn tile_count(&self) -> usize {
        self.tiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Tiles with data, in quadkey order
    pub fn quadkeys(&self) -> Vec<QuadKey> {
        self.tiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

impl ElementStore for InMemoryStore {
    fn store(&self, element: &Element, quadkey: &QuadKey) -> Result<()> {
        self.tiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(*quadkey)
            .or_default()
            .push(element.clone());
        Ok(())
    }

    fn has_data(&self, quadkey: &QuadKey) -> Result<bool> {
        Ok(self
            .tiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(quadkey))
    }

    fn search(&self, quadkey: &QuadKey, visitor: &mut dyn FnMut(&Element)) -> Result<()> {
        // Copy out so that the visitor may write back into this store
        let elements = self
            .tiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(quadkey)
            .cloned()
            .unwrap_or_default();
        for element in &elements {
            visitor(element);
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }

    fn erase(&self, quadkey: &QuadKey) -> Result<()> {
        let removed = self
            .tiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(quadkey);
        if let Some(elements) = removed {
            tracing::debug!("Erased {} element(s) from tile {}", elements.len(), quadkey);
        }
        Ok(())
    }
}
