//! PACK v2 object-stream parsing.
//!
//! A pack begins with the 4-byte signature `PACK`, a big-endian version and
//! a big-endian entry count. Each entry has a variable-length header packing
//! the object type and inflated size, followed (for delta types) by a 20-byte
//! base-object reference, followed by a zlib stream with no recorded
//! compressed length. We learn how many input bytes each stream consumed from
//! the decompressor itself, which is what lets us step to the next record.

use crate::Error;
use flate2::{Decompress, FlushDecompress, Status};
use gix_hash::ObjectId;

/// The PACK stream signature.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";

/// Pack header metadata, used only transiently during decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackMeta {
    /// Always `PACK` for a well-formed stream.
    pub signature: [u8; 4],
    /// Pack format version (2 for every client we care about).
    pub version: u32,
    /// Number of object records in the stream.
    pub entries: u32,
}

/// Object type as encoded in bits 4-6 of the first entry-header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
    OfsDelta,
    RefDelta,
}

impl ObjectKind {
    /// Map the 3-bit type field to an object kind.
    pub fn from_type_bits(bits: u8) -> Result<Self, Error> {
        match bits {
            1 => Ok(ObjectKind::Commit),
            2 => Ok(ObjectKind::Tree),
            3 => Ok(ObjectKind::Blob),
            4 => Ok(ObjectKind::Tag),
            6 => Ok(ObjectKind::OfsDelta),
            7 => Ok(ObjectKind::RefDelta),
            other => Err(Error::Pack(format!("invalid object type {other}"))),
        }
    }

    /// Delta entries carry a base-object reference before their body.
    pub fn is_delta(self) -> bool {
        matches!(self, ObjectKind::OfsDelta | ObjectKind::RefDelta)
    }
}

/// One decoded object record.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub kind: ObjectKind,
    /// Inflated size as declared by the entry header.
    pub size: u64,
    /// Base-object reference for delta entries.
    pub base: Option<ObjectId>,
    /// Inflated object content.
    pub data: Vec<u8>,
}

/// Parse the 12-byte pack header off the front of `buf`.
///
/// Returns the metadata and the remainder of the buffer (the first entry).
pub fn parse_pack_meta(buf: &[u8]) -> Result<(PackMeta, &[u8]), Error> {
    if buf.len() < 12 {
        return Err(Error::Pack("stream shorter than the 12-byte header".into()));
    }
    let signature: [u8; 4] = buf[..4].try_into().expect("sliced to 4 bytes");
    if &signature != PACK_SIGNATURE {
        return Err(Error::Pack(format!(
            "bad signature {:?}, expected \"PACK\"",
            String::from_utf8_lossy(&signature)
        )));
    }
    let version = u32::from_be_bytes(buf[4..8].try_into().expect("sliced to 4 bytes"));
    let entries = u32::from_be_bytes(buf[8..12].try_into().expect("sliced to 4 bytes"));
    Ok((
        PackMeta {
            signature,
            version,
            entries,
        },
        &buf[12..],
    ))
}

/// Decode one entry header: object type plus inflated size.
///
/// The first byte packs a continuation flag (bit 7), the 3-bit type
/// (bits 4-6) and the low 4 size bits; each continuation byte contributes 7
/// further size bits, later chunks more significant. Returns the kind, the
/// size and how many header bytes were consumed.
pub fn decode_entry_header(buf: &[u8]) -> Result<(ObjectKind, u64, usize), Error> {
    let first = *buf
        .first()
        .ok_or_else(|| Error::Pack("truncated entry header".into()))?;
    let kind = ObjectKind::from_type_bits((first >> 4) & 0x07)?;
    let mut size = u64::from(first & 0x0F);
    let mut shift = 4u32;
    let mut consumed = 1usize;
    let mut more = first & 0x80 != 0;

    while more {
        let byte = *buf
            .get(consumed)
            .ok_or_else(|| Error::Pack("truncated entry size header".into()))?;
        if shift > 57 {
            return Err(Error::Pack("entry size header overflows 64 bits".into()));
        }
        size |= u64::from(byte & 0x7F) << shift;
        shift += 7;
        consumed += 1;
        more = byte & 0x80 != 0;
    }

    Ok((kind, size, consumed))
}

/// Read `entries` object records from the stream.
///
/// Any malformed header or zlib body aborts decoding; no partial record list
/// is ever returned.
pub fn read_objects(mut buf: &[u8], entries: u32) -> Result<Vec<ObjectRecord>, Error> {
    let mut records = Vec::with_capacity(entries as usize);

    for index in 0..entries {
        let (kind, size, header_len) = decode_entry_header(buf)
            .map_err(|e| Error::Pack(format!("entry {index}: {e}")))?;
        buf = &buf[header_len..];

        let base = if kind.is_delta() {
            let raw = buf
                .get(..20)
                .ok_or_else(|| Error::Pack(format!("entry {index}: truncated delta base")))?;
            buf = &buf[20..];
            let id = ObjectId::try_from(raw)
                .map_err(|e| Error::Pack(format!("entry {index}: bad delta base: {e}")))?;
            Some(id)
        } else {
            None
        };

        let (data, consumed) =
            inflate(buf, size).map_err(|e| Error::Pack(format!("entry {index}: {e}")))?;
        if data.len() as u64 != size {
            return Err(Error::Pack(format!(
                "entry {index}: inflated to {} bytes, header declared {size}",
                data.len()
            )));
        }
        buf = &buf[consumed..];

        records.push(ObjectRecord {
            kind,
            size,
            base,
            data,
        });
    }

    Ok(records)
}

/// Inflate one zlib stream from the front of `buf`.
///
/// Returns the inflated bytes and the exact number of compressed input bytes
/// consumed, taken from the decompressor after stream end.
fn inflate(buf: &[u8], size_hint: u64) -> Result<(Vec<u8>, usize), Error> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(usize::try_from(size_hint).unwrap_or(0).max(64));

    loop {
        let consumed_in = inflater.total_in() as usize;
        let status = inflater
            .decompress_vec(&buf[consumed_in..], &mut out, FlushDecompress::Finish)
            .map_err(|e| Error::Pack(format!("zlib inflation failed: {e}")))?;
        match status {
            Status::StreamEnd => {
                return Ok((out, inflater.total_in() as usize));
            }
            Status::Ok | Status::BufError => {
                if consumed_in == inflater.total_in() as usize && out.len() == out.capacity() {
                    out.reserve(out.capacity().max(64));
                } else if consumed_in == inflater.total_in() as usize {
                    return Err(Error::Pack("zlib stream ended prematurely".into()));
                }
            }
        }
    }
}

/// Helpers for constructing synthetic pack streams in tests.
#[doc(hidden)]
pub mod testing {
    use super::ObjectKind;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn type_bits(kind: ObjectKind) -> u8 {
        match kind {
            ObjectKind::Commit => 1,
            ObjectKind::Tree => 2,
            ObjectKind::Blob => 3,
            ObjectKind::Tag => 4,
            ObjectKind::OfsDelta => 6,
            ObjectKind::RefDelta => 7,
        }
    }

    /// Encode an entry header for the given kind and inflated size.
    pub fn encode_entry_header(kind: ObjectKind, size: u64) -> Vec<u8> {
        let mut out = Vec::new();
        let mut remainder = size >> 4;
        let mut first = (type_bits(kind) << 4) | (size & 0x0F) as u8;
        if remainder != 0 {
            first |= 0x80;
        }
        out.push(first);
        while remainder != 0 {
            let mut byte = (remainder & 0x7F) as u8;
            remainder >>= 7;
            if remainder != 0 {
                byte |= 0x80;
            }
            out.push(byte);
        }
        out
    }

    /// Build a complete pack stream from `(kind, payload)` pairs.
    ///
    /// Delta entries get a dummy all-zero 20-byte base reference.
    pub fn pack_with_objects(objects: &[(ObjectKind, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"PACK");
        out.extend_from_slice(&2u32.to_be_bytes());
        out.extend_from_slice(&(objects.len() as u32).to_be_bytes());
        for (kind, payload) in objects {
            out.extend_from_slice(&encode_entry_header(*kind, payload.len() as u64));
            if kind.is_delta() {
                out.extend_from_slice(&[0u8; 20]);
            }
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload).expect("in-memory write");
            out.extend_from_slice(&encoder.finish().expect("in-memory finish"));
        }
        out
    }
}
