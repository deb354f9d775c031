//! # Read Volumes
//!
//! A [`Volume`] is the read-side view over a store's log file. Two
//! backings exist, selected by [`VolumeKind`]:
//!
//! - **Mmap**: the file is memory-mapped read-only; `slice` borrows
//!   directly from the map (zero-copy). The map is rebuilt on `refresh`
//!   after the append handle grows or truncates the file.
//! - **Heap**: positional reads into owned buffers. Slower, but usable
//!   where mapping is undesirable (network filesystems, tiny stores).
//!
//! The append path never goes through a volume; the store writes via its
//! own file handle and calls `refresh` so subsequent reads observe the
//! new length.

use std::borrow::Cow;
use std::fs::File;

use eyre::{ensure, Result, WrapErr};
use memmap2::Mmap;

pub use crate::config::VolumeKind;

/// Read-only view over the store file.
pub trait Volume: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bounds-checked read of `len` bytes at `offset`.
    fn slice(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>>;

    /// Re-synchronizes the view with the file after append or truncate.
    fn refresh(&mut self, file: &File) -> Result<()>;
}

impl VolumeKind {
    /// Opens a volume of this kind over an already-open store file.
    pub fn open(&self, file: &File) -> Result<Box<dyn Volume>> {
        match self {
            VolumeKind::Mmap => Ok(Box::new(MmapVolume::new(file)?)),
            VolumeKind::Heap => Ok(Box::new(HeapVolume::new(file)?)),
        }
    }
}

/// Zero-copy mmap-backed volume.
///
/// An empty file cannot be mapped; `map` stays `None` until the first
/// refresh after bytes exist.
pub struct MmapVolume {
    map: Option<Mmap>,
    len: u64,
}

impl MmapVolume {
    pub fn new(file: &File) -> Result<Self> {
        let mut volume = Self { map: None, len: 0 };
        volume.refresh(file)?;
        Ok(volume)
    }
}

impl Volume for MmapVolume {
    fn len(&self) -> u64 {
        self.len
    }

    fn slice(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        ensure!(
            offset + len as u64 <= self.len,
            "read of {} bytes at offset {} exceeds volume length {}",
            len,
            offset,
            self.len
        );
        let map = self
            .map
            .as_ref()
            .ok_or_else(|| eyre::eyre!("read from empty volume"))?;
        let start = offset as usize;
        Ok(Cow::Borrowed(&map[start..start + len]))
    }

    fn refresh(&mut self, file: &File) -> Result<()> {
        let len = file.metadata().wrap_err("failed to stat store file")?.len();
        if len == 0 {
            self.map = None;
            self.len = 0;
            return Ok(());
        }
        // SAFETY: the store holds an exclusive flock for its lifetime, so
        // no other process mutates the mapped range; in-process writers
        // only ever append past `len` or truncate, after which refresh
        // rebuilds the map before any read.
        let map = unsafe { Mmap::map(file).wrap_err("failed to memory-map store file")? };
        self.len = len;
        self.map = Some(map);
        Ok(())
    }
}

/// Positional-read volume with owned buffers.
pub struct HeapVolume {
    file: File,
    len: u64,
}

impl HeapVolume {
    pub fn new(file: &File) -> Result<Self> {
        let dup = file
            .try_clone()
            .wrap_err("failed to duplicate store file handle")?;
        let len = dup.metadata().wrap_err("failed to stat store file")?.len();
        Ok(Self { file: dup, len })
    }
}

impl Volume for HeapVolume {
    fn len(&self) -> u64 {
        self.len
    }

    fn slice(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        ensure!(
            offset + len as u64 <= self.len,
            "read of {} bytes at offset {} exceeds volume length {}",
            len,
            offset,
            self.len
        );
        let mut buf = vec![0u8; len];
        read_exact_at(&self.file, &mut buf, offset)?;
        Ok(Cow::Owned(buf))
    }

    fn refresh(&mut self, file: &File) -> Result<()> {
        self.len = file.metadata().wrap_err("failed to stat store file")?.len();
        Ok(())
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    use std::os::unix::fs::FileExt;

    file.read_exact_at(buf, offset)
        .wrap_err_with(|| format!("positional read of {} bytes at {}", buf.len(), offset))?;
    Ok(())
}

#[cfg(windows)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    use std::os::windows::fs::FileExt;

    let mut read = 0;
    while read < buf.len() {
        let n = file
            .seek_read(&mut buf[read..], offset + read as u64)
            .wrap_err("positional read failed")?;
        ensure!(n > 0, "unexpected end of store file");
        read += n;
    }
    Ok(())
}
