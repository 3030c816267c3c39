//! Interning of tag keys and values
//!
//! Tags store `u32` ids instead of strings. Ids are dense and assigned in insertion
//! order. A file-backed table appends `[len: u32 LE][utf8 bytes]` records and rebuilds
//! its lookup maps from them on open.

use crate::{Result, StoreError};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
struct Entries {
    ids: HashMap<String, u32>,
    strings: Vec<String>,
}

impl Entries {
    fn insert(&mut self, string: String) -> Result<u32> {
        let id = u32::try_from(self.strings.len())
            .map_err(|_| StoreError::Encoding("string table is full".to_string()))?;
        self.ids.insert(string.clone(), id);
        self.strings.push(string);
        Ok(id)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: Entries,
    file: Option<File>,
}

/// Thread-safe string interner
#[derive(Debug, Default)]
pub struct StringTable {
    inner: RwLock<Inner>,
}

impl StringTable {
    /// Table living only in memory
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create) a file-backed table
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut entries = Entries::default();
        let mut rest = bytes.as_slice();
        while !rest.is_empty() {
            let Some((len, tail)) = rest.split_first_chunk::<4>() else {
                return Err(StoreError::CorruptData(format!(
                    "truncated string length in {}",
                    path.display()
                )));
            };
            let len = u32::from_le_bytes(*len) as usize;
            if tail.len() < len {
                return Err(StoreError::CorruptData(format!(
                    "truncated string in {}",
                    path.display()
                )));
            }
            let (string, tail) = tail.split_at(len);
            let string = String::from_utf8(string.to_vec())
                .map_err(|err| StoreError::CorruptData(err.to_string()))?;
            entries.insert(string)?;
            rest = tail;
        }

        tracing::debug!(
            "Loaded {} string(s) from {}",
            entries.strings.len(),
            path.display()
        );
        Ok(Self {
            inner: RwLock::new(Inner {
                entries,
                file: Some(file),
            }),
        })
    }

    /// Id of `string`, assigning the next free id on first use
    pub fn get_id(&self, string: &str) -> Result<u32> {
        if let Some(&id) = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .ids
            .get(string)
        {
            return Ok(id);
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        // Another writer may have won the race between the two locks
        if let Some(&id) = inner.entries.ids.get(string) {
            return Ok(id);
        }

        if let Some(file) = inner.file.as_mut() {
            let len = u32::try_from(string.len()).map_err(|_| {
                StoreError::Encoding(format!("string of {} bytes is too long", string.len()))
            })?;
            let mut record = Vec::with_capacity(4 + string.len());
            record.extend_from_slice(&len.to_le_bytes());
            record.extend_from_slice(string.as_bytes());
            file.write_all(&record)?;
        }
        inner.entries.insert(string.to_string())
    }

    /// String registered under `id`
    pub fn get_string(&self, id: u32) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .strings
            .get(id as usize)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .strings
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush the backing file, if any
    pub fn flush(&self) -> Result<()> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(file) = inner.file.as_ref() {
            file.sync_all()?;
        }
        Ok(())
    }
}
