//! Big-endian primitives over a byte slice.
//!
//! The streaming demuxer parses windows of a growing byte stream, so all
//! reads are offset-based over `&[u8]` rather than through `Read`/`Seek`.

use byteorder::{BigEndian, ByteOrder};
use vf_common::{DemuxError, DemuxResult};

/// Cursor-free reader over an immutable byte slice.
#[derive(Copy, Clone, Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check(&self, offset: usize, needed: usize) -> DemuxResult<()> {
        if offset.checked_add(needed).is_none_or(|end| end > self.data.len()) {
            return Err(DemuxError::BufferUnderflow {
                offset,
                needed,
                available: self.data.len().saturating_sub(offset),
            });
        }
        Ok(())
    }

    pub fn read_u8(&self, offset: usize) -> DemuxResult<u8> {
        self.check(offset, 1)?;
        Ok(self.data[offset])
    }

    pub fn read_u16(&self, offset: usize) -> DemuxResult<u16> {
        self.check(offset, 2)?;
        Ok(BigEndian::read_u16(&self.data[offset..]))
    }

    pub fn read_u32(&self, offset: usize) -> DemuxResult<u32> {
        self.check(offset, 4)?;
        Ok(BigEndian::read_u32(&self.data[offset..]))
    }

    /// Read a big-endian length of 1..=4 bytes.
    pub fn read_uint(&self, offset: usize, width: usize) -> DemuxResult<u32> {
        debug_assert!((1..=4).contains(&width));
        self.check(offset, width)?;
        let mut val = 0u32;
        for &b in &self.data[offset..offset + width] {
            val = (val << 8) | b as u32;
        }
        Ok(val)
    }

    /// Read a 4-byte ASCII four-character code.
    pub fn read_fourcc(&self, offset: usize) -> DemuxResult<u32> {
        self.read_u32(offset)
    }

    /// Borrow a sub-range without copying.
    pub fn slice(&self, offset: usize, len: usize) -> DemuxResult<&'a [u8]> {
        self.check(offset, len)?;
        Ok(&self.data[offset..offset + len])
    }
}
