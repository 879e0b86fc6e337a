//! Length-tagged box primitives.
//!
//! Every multi-byte field is big-endian. All reads go through [`ByteCursor`],
//! which refuses to move past the end of its slice, so a lying length field can
//! only ever produce an error, never an out-of-bounds access.

use crate::{Error, Result};
use std::ops::Range;

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const ABST: Self = Self(*b"abst");
    pub const ASRT: Self = Self(*b"asrt");
    pub const AFRT: Self = Self(*b"afrt");
    pub const AFRA: Self = Self(*b"afra");
    pub const MOOF: Self = Self(*b"moof");
    pub const MDAT: Self = Self(*b"mdat");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decoded box header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Box type code.
    pub box_type: BoxType,
    /// Box size including header.
    pub size: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl BoxHeader {
    /// Read a box header at the cursor position.
    ///
    /// A 32-bit length of 1 selects the 64-bit extended length that follows
    /// the tag; a length of 0 means the box runs to the end of the cursor.
    /// The declared length is *not* checked against the remaining bytes here;
    /// [`ByteCursor::read_box`] does that for callers that need it.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let size = cursor.read_u32()? as u64;
        let box_type = cursor.read_tag()?;

        let (size, header_size) = match size {
            1 => (cursor.read_u64()?, 16u8),
            0 => (8 + cursor.remaining() as u64, 8u8),
            n => (n, 8u8),
        };

        if size < header_size as u64 {
            return Err(Error::BoxTooShort {
                box_type,
                declared: size,
            });
        }

        Ok(Self {
            box_type,
            size,
            header_size,
        })
    }

    /// Get the body size (size - header).
    pub fn body_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }
}

/// Forward-only reader over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Offset from the start of the underlying slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let have = self.remaining();
        if n > have {
            return Err(Error::BufferUnderflow { need: n, have });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_tag(&mut self) -> Result<BoxType> {
        let b = self.take(4)?;
        Ok(BoxType::from_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a NUL-terminated string, consuming the terminator.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; these strings end up in
    /// URLs and log lines only.
    pub fn read_cstr(&mut self, what: &'static str) -> Result<String> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::UnterminatedString(what))?;
        let s = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(s)
    }

    /// Skip a NUL-terminated string, consuming the terminator.
    pub fn skip_cstr(&mut self, what: &'static str) -> Result<()> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::UnterminatedString(what))?;
        self.pos += len + 1;
        Ok(())
    }

    /// Read one complete box that must carry the `expected` tag.
    ///
    /// Returns the header and a cursor limited to the box body; `self` is
    /// advanced past the whole box.
    pub fn read_box(&mut self, expected: BoxType) -> Result<(BoxHeader, ByteCursor<'a>)> {
        let header = BoxHeader::read(self)?;

        if header.box_type != expected {
            return Err(Error::UnexpectedBox {
                expected,
                found: header.box_type,
            });
        }

        let available = self.remaining();
        if header.body_size() > available as u64 {
            return Err(Error::BoxOverrun {
                box_type: header.box_type,
                declared: header.size,
                available: available + header.header_size as usize,
            });
        }

        let body = self.take(header.body_size() as usize)?;
        Ok((header, ByteCursor::new(body)))
    }
}

/// Locate the `mdat` body inside a downloaded fragment.
///
/// Boxes before the `mdat` (`afra`, `abst`, `moof`, ...) are skipped by their
/// declared length. The returned range is the `mdat` body, clamped to the bytes
/// actually present.
pub fn find_payload(data: &[u8]) -> Result<Range<usize>> {
    let mut cursor = ByteCursor::new(data);

    while !cursor.is_empty() {
        let header = BoxHeader::read(&mut cursor).map_err(|_| Error::PayloadNotFound)?;
        let body_size = header.body_size();

        if header.box_type == BoxType::MDAT {
            let start = cursor.position();
            let available = cursor.remaining();
            if body_size > available as u64 {
                tracing::debug!(
                    declared = body_size,
                    available,
                    "mdat extends past fragment end, clamping"
                );
            }
            let len = body_size.min(available as u64) as usize;
            return Ok(start..start + len);
        }

        let skip = usize::try_from(body_size).map_err(|_| Error::PayloadNotFound)?;
        cursor.skip(skip).map_err(|_| Error::PayloadNotFound)?;
    }

    Err(Error::PayloadNotFound)
}
