//! # Catalog Metadata Records
//!
//! The catalogue and every schema persist the same two record shapes in
//! their stores:
//!
//! - **Header** (record-id 1): creation and modification timestamps, a
//!   child count, and the record-ids of the child descriptors, in
//!   registration order.
//! - **Descriptor** (any other record): the child's name plus, for
//!   entities, the ordered column names needed to reopen the entity.
//!
//! Both encode through the little-endian cursor codec.

use eyre::{ensure, Result};

use crate::catalog::column::now_millis;
use crate::encoding::{ByteReader, ByteWriter};
use crate::storage::Serializer;

/// Header record shared by the catalogue and schema stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogHeader {
    pub created: u64,
    pub modified: u64,
    pub entries: Vec<u64>,
}

impl CatalogHeader {
    pub fn new() -> Self {
        let now = now_millis();
        Self {
            created: now,
            modified: now,
            entries: Vec::new(),
        }
    }

    pub fn push_entry(&mut self, recid: u64) {
        self.entries.push(recid);
        self.modified = now_millis();
    }

    pub fn remove_entry(&mut self, recid: u64) {
        self.entries.retain(|&e| e != recid);
        self.modified = now_millis();
    }
}

impl Default for CatalogHeader {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CatalogHeaderSer;

impl Serializer<CatalogHeader> for CatalogHeaderSer {
    fn serialize(&self, value: &CatalogHeader) -> Result<Vec<u8>> {
        let mut w = ByteWriter::with_capacity(24 + value.entries.len() * 8);
        w.put_u64(value.created);
        w.put_u64(value.modified);
        w.put_u32(value.entries.len() as u32);
        for recid in &value.entries {
            w.put_u64(*recid);
        }
        Ok(w.into_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<CatalogHeader> {
        let mut r = ByteReader::new(bytes);
        let created = r.get_u64()?;
        let modified = r.get_u64()?;
        let count = r.get_u32()? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(r.get_u64()?);
        }
        r.expect_end()?;
        Ok(CatalogHeader {
            created,
            modified,
            entries,
        })
    }
}

/// Child descriptor: the object's simple name plus, for entities, the
/// ordered column names (empty for schema descriptors).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub columns: Vec<String>,
}

impl Descriptor {
    pub fn schema(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn entity(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

pub struct DescriptorSer;

impl Serializer<Descriptor> for DescriptorSer {
    fn serialize(&self, value: &Descriptor) -> Result<Vec<u8>> {
        ensure!(!value.name.is_empty(), "descriptor name must be non-empty");
        let mut w = ByteWriter::new();
        w.put_str(&value.name);
        w.put_u32(value.columns.len() as u32);
        for column in &value.columns {
            w.put_str(column);
        }
        Ok(w.into_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Descriptor> {
        let mut r = ByteReader::new(bytes);
        let name = r.get_str()?;
        let count = r.get_u32()? as usize;
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            columns.push(r.get_str()?);
        }
        r.expect_end()?;
        Ok(Descriptor { name, columns })
    }
}
