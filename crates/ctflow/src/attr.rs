//! Netlink attribute (nlattr) cursor.
//!
//! Conntrack records are streams of type-length-value attributes, some of
//! them nested and some with protocol-specific padding that is not part of
//! the declared length. An iterator is a poor fit for that layout, so this
//! module provides [`AttributeReader`], a bounds-checked cursor over an
//! immutable buffer. Every advance is explicit and fallible; there is no
//! way to read past the end of the buffer.

use crate::error::{Error, Result};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header (length + type, both u16).
pub const NLA_HDRLEN: usize = 4;

/// Nested-attribute flag in the type field.
pub const NLA_F_NESTED: u16 = 1 << 15;

/// One decoded attribute header.
///
/// `len` is the payload length only; the 4-byte header is already
/// subtracted from the raw length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrHeader {
    /// NLA_F_NESTED was set in the type field.
    pub nested: bool,
    /// Attribute type, low 15 bits.
    pub kind: u16,
    /// Payload length in bytes.
    pub len: usize,
}

/// One attribute with its payload, borrowing the input buffer.
#[derive(Debug, Clone, Copy)]
pub struct RawAttribute<'a> {
    /// NLA_F_NESTED was set in the type field.
    pub nested: bool,
    /// Attribute type, low 15 bits.
    pub kind: u16,
    /// Exactly the declared payload bytes.
    pub payload: &'a [u8],
}

/// Cursor over a conntrack record buffer.
#[derive(Debug)]
pub struct AttributeReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AttributeReader<'a> {
    /// Create a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left before the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Read one attribute header.
    ///
    /// The length and type fields are native-endian, as the kernel writes
    /// them. The nested flag is masked out of the returned type.
    pub fn read_header(&mut self) -> Result<AttrHeader> {
        if self.remaining() < NLA_HDRLEN {
            return Err(Error::TruncatedHeader {
                remaining: self.remaining(),
            });
        }
        let raw_len = u16::from_ne_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        let raw_type = u16::from_ne_bytes([self.data[self.pos + 2], self.data[self.pos + 3]]);
        self.pos += NLA_HDRLEN;
        Ok(AttrHeader {
            nested: raw_type & NLA_F_NESTED != 0,
            kind: raw_type & !NLA_F_NESTED,
            len: (raw_len as usize).saturating_sub(NLA_HDRLEN),
        })
    }

    /// Read one attribute header plus its full payload.
    pub fn read_attr(&mut self) -> Result<RawAttribute<'a>> {
        let header = self.read_header()?;
        let payload = self.read_bytes(header.len)?;
        Ok(RawAttribute {
            nested: header.nested,
            kind: header.kind,
            payload,
        })
    }

    /// Read exactly `n` bytes as an opaque slice.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::TruncatedPayload {
                expected: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Advance the cursor by `n` bytes without interpretation.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(Error::TruncatedSkip {
                requested: n,
                remaining: self.remaining(),
            });
        }
        self.pos += n;
        Ok(())
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a u16 in network byte order.
    pub fn read_u16_be(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a u64 in network byte order.
    pub fn read_u64_be(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}
