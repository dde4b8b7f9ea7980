//! Byte order helpers: little endian for GIF output, big endian for IFF input.
use crate::io::{Result, Write};

/// Writer extension to write little endian data
pub trait WriteBytesExt<T> {
    /// Writes `T` to a bytes stream. Least significant byte first.
    fn write_le(&mut self, n: T) -> Result<()>;
}

impl<W: Write + ?Sized> WriteBytesExt<u8> for W {
    #[inline(always)]
    fn write_le(&mut self, n: u8) -> Result<()> {
        self.write_all(&[n])
    }
}

impl<W: Write + ?Sized> WriteBytesExt<u16> for W {
    #[inline]
    fn write_le(&mut self, n: u16) -> Result<()> {
        self.write_all(&n.to_le_bytes())
    }
}

/// Bounds-checked big endian reads out of an IFF payload.
///
/// Every accessor returns `None` instead of panicking when `at` runs past the
/// end, so truncated chunks surface as format errors.
pub trait BigEndianSlice {
    /// Byte at `at`.
    fn be_u8(&self, at: usize) -> Option<u8>;
    /// Big endian `u16` starting at `at`.
    fn be_u16(&self, at: usize) -> Option<u16>;
    /// Big endian `u32` starting at `at`.
    fn be_u32(&self, at: usize) -> Option<u32>;
}

impl BigEndianSlice for [u8] {
    #[inline]
    fn be_u8(&self, at: usize) -> Option<u8> {
        self.get(at).copied()
    }

    #[inline]
    fn be_u16(&self, at: usize) -> Option<u16> {
        let bytes = self.get(at..at.checked_add(2)?)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    #[inline]
    fn be_u32(&self, at: usize) -> Option<u32> {
        let bytes = self.get(at..at.checked_add(4)?)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[test]
fn big_endian_reads_are_bounds_checked() {
    let data: &[u8] = &[0x12, 0x34, 0x56, 0x78, 0x9A];
    assert_eq!(data.be_u8(4), Some(0x9A));
    assert_eq!(data.be_u16(0), Some(0x1234));
    assert_eq!(data.be_u32(1), Some(0x3456_789A));
    assert_eq!(data.be_u32(2), None);
    assert_eq!(data.be_u16(usize::MAX), None);
}
