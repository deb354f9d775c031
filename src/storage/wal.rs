//! # Log Frame Format
//!
//! The record store is log-structured: the write-ahead log *is* the data
//! file. Every mutation appends one frame; a Commit frame seals the batch.
//!
//! ## Frame Format
//!
//! ```text
//! +------------------+------------------+
//! | Frame Header     | Payload          |
//! | (24 bytes)       | (payload_len)    |
//! +------------------+------------------+
//! ```
//!
//! The header carries:
//! - `recid`: the record id the frame targets (0 for Commit frames)
//! - `payload_len`: payload bytes following the header
//! - `kind`: Put, Delete, Prealloc, or Commit
//! - `checksum`: CRC-64/ECMA over the header fields and the payload
//!
//! ## Recovery Protocol
//!
//! On open the file is scanned front to back. Frames accumulate in a
//! staging map that is folded into the committed index each time a valid
//! Commit frame appears. The first invalid frame (bad checksum, short
//! read, unknown kind) ends the scan, and what follows it decides the
//! outcome:
//!
//! - nothing well-formed after the damage: the invalid bytes are an
//!   interrupted append; everything past the last Commit is truncated
//!   away, making a crash indistinguishable from an explicit rollback;
//! - any well-formed frame after the damage: later writes landed, so
//!   the invalid bytes sit inside data that was once durable. That is
//!   bit-rot or a partial overwrite, and open fails with
//!   `StorageCorruption` instead of discarding it.

use crc::{Crc, CRC_64_ECMA_182};
use eyre::Result;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::DbError;

pub const FRAME_HEADER_SIZE: usize = 24;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Mutation kind carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Put = 1,
    Delete = 2,
    Prealloc = 3,
    Commit = 4,
}

impl FrameKind {
    pub fn from_tag(tag: u8) -> Option<FrameKind> {
        match tag {
            1 => Some(FrameKind::Put),
            2 => Some(FrameKind::Delete),
            3 => Some(FrameKind::Prealloc),
            4 => Some(FrameKind::Commit),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FrameHeader {
    recid: U64,
    payload_len: U32,
    kind: u8,
    _reserved: [u8; 3],
    checksum: U64,
}

const _: () = assert!(std::mem::size_of::<FrameHeader>() == FRAME_HEADER_SIZE);

impl FrameHeader {
    pub fn new(recid: u64, kind: FrameKind, payload: &[u8]) -> Self {
        let mut header = Self {
            recid: U64::new(recid),
            payload_len: U32::new(payload.len() as u32),
            kind: kind as u8,
            _reserved: [0; 3],
            checksum: U64::new(0),
        };
        header.checksum = U64::new(header.compute_checksum(payload));
        header
    }

    pub fn recid(&self) -> u64 {
        self.recid.get()
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len.get() as usize
    }

    pub fn kind(&self) -> Option<FrameKind> {
        FrameKind::from_tag(self.kind)
    }

    fn compute_checksum(&self, payload: &[u8]) -> u64 {
        let mut digest = CRC64.digest();
        digest.update(&self.recid.get().to_le_bytes());
        digest.update(&self.payload_len.get().to_le_bytes());
        digest.update(&[self.kind]);
        digest.update(payload);
        digest.finalize()
    }

    pub fn validate(&self, payload: &[u8]) -> bool {
        self.kind().is_some() && self.compute_checksum(payload) == self.checksum.get()
    }

    /// Parses a header from a buffer, without checksum validation.
    pub fn parse(bytes: &[u8]) -> Result<&Self> {
        if bytes.len() < FRAME_HEADER_SIZE {
            eyre::bail!(
                "buffer too small for FrameHeader: {} < {}",
                bytes.len(),
                FRAME_HEADER_SIZE
            );
        }
        Self::ref_from_bytes(&bytes[..FRAME_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse FrameHeader: {:?}", e))
    }
}

/// Serializes one frame (header + payload) into a contiguous buffer.
pub fn encode_frame(recid: u64, kind: FrameKind, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader::new(recid, kind, payload);
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Corruption error for a frame inside the committed prefix.
pub fn corrupt(path: &std::path::Path, detail: impl Into<String>) -> eyre::Report {
    DbError::StorageCorruption {
        path: path.to_path_buf(),
        detail: detail.into(),
    }
    .into()
}

/// True if `bytes` hold a well-formed frame at any offset. Recovery uses
/// this to separate a torn crash tail (nothing valid follows the damage)
/// from corruption inside previously durable data (later frames survive
/// past the invalid bytes).
pub fn contains_valid_frame(bytes: &[u8]) -> bool {
    if bytes.len() < FRAME_HEADER_SIZE {
        return false;
    }
    for start in 0..=bytes.len() - FRAME_HEADER_SIZE {
        let Ok(header) = FrameHeader::parse(&bytes[start..]) else {
            continue;
        };
        if header.kind().is_none() {
            continue;
        }
        let payload_start = start + FRAME_HEADER_SIZE;
        let end = match payload_start.checked_add(header.payload_len()) {
            Some(end) if end <= bytes.len() => end,
            _ => continue,
        };
        if header.validate(&bytes[payload_start..end]) {
            return true;
        }
    }
    false
}
