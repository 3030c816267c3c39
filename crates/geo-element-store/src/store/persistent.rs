//! File-backed element store
//!
//! Every tile owns two append-only files under `<root>/<lod>/`: `<code>.dat` holding the
//! encoded elements and `<code>.idf` holding one `(id, offset)` record per element. Open
//! file pairs live in a bounded LRU cache.

use super::ElementStore;
use super::cache::{CachedResource, HandleCache};
use super::codec;
use crate::{Element, QuadKey, Result, StoreError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

const DATA_EXTENSION: &str = "dat";
const INDEX_EXTENSION: &str = "idf";

/// Configuration for the persistent store
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PersistentStoreConfig {
    /// Directory holding one subdirectory per level of detail.
    /// Default: `data`
    pub root: PathBuf,
    /// Number of tiles whose file handles stay open.
    /// Default: 8
    pub cache_capacity: usize,
}

impl Default for PersistentStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            cache_capacity: 8,
        }
    }
}

impl PersistentStoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }
}

/// Open index and data files of one tile
struct TileFiles {
    index: File,
    data: File,
}

impl TileFiles {
    fn open(index_path: &Path, data_path: &Path) -> io::Result<Self> {
        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let open = |path: &Path| {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
        };
        Ok(Self {
            index: open(index_path)?,
            data: open(data_path)?,
        })
    }

    fn append(&mut self, id: u64, record: &[u8]) -> Result<()> {
        let offset = self.data.seek(SeekFrom::End(0))?;
        let index_record = codec::encode_index(id, offset)?;
        self.data.write_all(record)?;
        self.index.seek(SeekFrom::End(0))?;
        self.index.write_all(&index_record)?;
        Ok(())
    }

    fn read_all(&mut self) -> Result<Vec<Element>> {
        let mut index = Vec::new();
        self.index.seek(SeekFrom::Start(0))?;
        self.index.read_to_end(&mut index)?;

        let mut reader = BufReader::new(&self.data);
        codec::decode_index(&index)?
            .into_iter()
            .map(|(id, offset)| {
                reader.seek(SeekFrom::Start(offset))?;
                codec::decode_element(&mut reader, id)
            })
            .collect()
    }

    fn sync(&self) -> io::Result<()> {
        self.data.sync_all()?;
        self.index.sync_all()
    }
}

impl CachedResource for TileFiles {
    fn close(self) -> io::Result<()> {
        self.sync()
    }
}

/// Element store writing tiles to disk
pub struct PersistentStore {
    root: PathBuf,
    cache: HandleCache<QuadKey, TileFiles>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl PersistentStore {
    /// Create a store rooted at `config.root`, creating the directory if needed
    pub fn new(config: PersistentStoreConfig) -> Result<Self> {
        let invalid = |reason: String| StoreError::InvalidDirectory {
            path: config.root.clone(),
            reason,
        };

        let capacity = NonZeroUsize::new(config.cache_capacity)
            .ok_or_else(|| invalid("cache capacity must be non-zero".to_string()))?;
        if config.root.exists() && !config.root.is_dir() {
            return Err(invalid("not a directory".to_string()));
        }
        fs::create_dir_all(&config.root).map_err(|err| invalid(err.to_string()))?;

        tracing::debug!(
            "Opened persistent store at {} (cache capacity {})",
            config.root.display(),
            capacity
        );
        Ok(Self {
            root: config.root,
            cache: HandleCache::new(capacity),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of tiles whose files are currently open
    pub fn open_tiles(&self) -> usize {
        self.cache.len()
    }

    /// Whether the files of `quadkey` are currently open
    pub fn is_open(&self, quadkey: &QuadKey) -> bool {
        self.cache.contains(quadkey)
    }

    fn tile_path(&self, quadkey: &QuadKey, extension: &str) -> PathBuf {
        self.root
            .join(quadkey.level().to_string())
            .join(format!("{}.{extension}", quadkey.code()))
    }

    fn with_tile<T>(
        &self,
        quadkey: &QuadKey,
        use_files: impl FnOnce(&mut TileFiles) -> Result<T>,
    ) -> Result<T> {
        let index_path = self.tile_path(quadkey, INDEX_EXTENSION);
        let data_path = self.tile_path(quadkey, DATA_EXTENSION);
        self.cache.with_entry(
            quadkey,
            || TileFiles::open(&index_path, &data_path),
            use_files,
        )
    }
}

impl ElementStore for PersistentStore {
    fn store(&self, element: &Element, quadkey: &QuadKey) -> Result<()> {
        let record = codec::encode_element(element)?;
        self.with_tile(quadkey, |files| files.append(element.id(), &record))
    }

    fn has_data(&self, quadkey: &QuadKey) -> Result<bool> {
        Ok(self.tile_path(quadkey, DATA_EXTENSION).try_exists()?)
    }

    fn search(&self, quadkey: &QuadKey, visitor: &mut dyn FnMut(&Element)) -> Result<()> {
        // Never create files for tiles that were not written
        if !self.has_data(quadkey)? {
            return Ok(());
        }
        // Decode under the cache lock, visit after releasing it
        let elements = self.with_tile(quadkey, TileFiles::read_all)?;
        for element in &elements {
            visitor(element);
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.cache.for_each(|_, files| Ok(files.sync()?))
    }

    fn erase(&self, quadkey: &QuadKey) -> Result<()> {
        self.cache.remove(quadkey)?;
        for extension in [INDEX_EXTENSION, DATA_EXTENSION] {
            match fs::remove_file(self.tile_path(quadkey, extension)) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        tracing::debug!("Erased tile {}", quadkey);
        Ok(())
    }
}

impl std::fmt::Debug for PersistentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore")
            .field("root", &self.root)
            .field("open_tiles", &self.open_tiles())
            .finish()
    }
}
