//! Fixed-width field access over byte slices.
//!
//! All integers are stored in native byte order. Nothing here reinterprets
//! memory as a struct: every field is copied in or out at an explicit offset.

use crate::foundation::error::{PcError, PcResult};

/// Sequential reader over a borrowed byte slice.
///
/// Reads return `None` once the slice is exhausted; a failed read does not
/// advance the cursor.
#[derive(Clone, Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes: [u8; N] = self.data.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(bytes)
    }

    /// Read a native-endian `u32`.
    pub fn read_u32(&mut self) -> Option<u32> {
        self.take::<4>().map(u32::from_ne_bytes)
    }

    /// Read a native-endian `u64`.
    pub fn read_u64(&mut self) -> Option<u64> {
        self.take::<8>().map(u64::from_ne_bytes)
    }

    /// Read a fixed-size byte array.
    pub fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take::<N>()
    }
}

/// Sequential writer into a borrowed mutable byte slice.
#[derive(Debug)]
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    /// Start writing at the beginning of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Copy `bytes` at the current position.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> PcResult<()> {
        let end = self
            .pos
            .checked_add(bytes.len())
            .ok_or_else(|| PcError::overflow("cursor position"))?;
        let available = self.buf.len();
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(PcError::BufferTooSmall {
                needed: end as u64,
                available: available as u64,
            })?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// Write a native-endian `u32`.
    pub fn put_u32(&mut self, v: u32) -> PcResult<()> {
        self.put_bytes(&v.to_ne_bytes())
    }

    /// Write a native-endian `u64`.
    pub fn put_u64(&mut self, v: u64) -> PcResult<()> {
        self.put_bytes(&v.to_ne_bytes())
    }
}

/// Resolve `[offset, offset + size)` inside a buffer of `len` bytes.
///
/// `None` when the end wraps past `u64::MAX` or lies beyond `len`.
pub fn checked_range(offset: u64, size: u64, len: usize) -> Option<std::ops::Range<usize>> {
    let end = offset.checked_add(size)?;
    if end > len as u64 {
        return None;
    }
    Some(usize::try_from(offset).ok()?..usize::try_from(end).ok()?)
}

/// Offset of element `ordinal` in a strided table starting at `base`.
pub fn strided_offset(base: u64, ordinal: u32, stride: u32) -> Option<u64> {
    u64::from(ordinal)
        .checked_mul(u64::from(stride))?
        .checked_add(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_stops_at_end_without_advancing() {
        let data = 7u32.to_ne_bytes();
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u64(), None);
        assert_eq!(r.position(), 0);
        assert_eq!(r.read_u32(), Some(7));
        assert_eq!(r.read_u32(), None);
    }

    #[test]
    fn writer_reports_short_buffer() {
        let mut buf = [0u8; 6];
        let mut w = ByteWriter::new(&mut buf);
        w.put_u32(1).unwrap();
        let err = w.put_u32(2).unwrap_err();
        assert!(matches!(
            err,
            PcError::BufferTooSmall {
                needed: 8,
                available: 6
            }
        ));
        assert_eq!(w.position(), 4);
    }

    #[test]
    fn checked_range_rejects_wrap_and_overrun() {
        assert_eq!(checked_range(4, 4, 8), Some(4..8));
        assert_eq!(checked_range(4, 5, 8), None);
        assert_eq!(checked_range(u64::MAX, 2, 8), None);
        assert_eq!(checked_range(8, 0, 8), Some(8..8));
    }

    #[test]
    fn strided_offset_detects_overflow() {
        assert_eq!(strided_offset(56, 2, 56), Some(168));
        assert_eq!(strided_offset(u64::MAX, 1, 1), None);
        assert_eq!(
            strided_offset(0, u32::MAX, u32::MAX),
            Some(u64::from(u32::MAX) * u64::from(u32::MAX))
        );
    }
}
