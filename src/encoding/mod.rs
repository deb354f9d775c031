//! # Little-Endian Record Codec
//!
//! All on-disk payloads: catalogue and schema headers, child descriptors,
//! column values: use fixed little-endian binary encoding. This module
//! provides the cursor pair the serializers are written against:
//!
//! - [`ByteWriter`]: append-only encoder over a growable buffer
//! - [`ByteReader`]: bounds-checked decoder over a byte slice
//!
//! Short reads are decoding errors, not panics: a truncated payload inside
//! a checksummed frame means the serializer and the stored bytes disagree,
//! which callers surface as corruption.

mod bytes;

pub use bytes::{ByteReader, ByteWriter};
