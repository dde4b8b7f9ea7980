//! ANIM `DLTA` decompression.
//!
//! All three supported methods are "vertical" deltas: each plane is cut into
//! columns one, two or four bytes wide and every column carries its own list
//! of ops walking down it. An op either skips rows, copies a run of unique
//! values ("uniq") or repeats one value ("same").

use crate::decoder::{AnimHeader, DecodingFormatError};
use crate::planar::PlanarBitmap;
use crate::traits::BigEndianSlice;

/// Plane pointers in a `DLTA` chunk. Methods 5 and 8 use the first eight,
/// method 7 keeps its op lists there and its data lists in the other eight.
const POINTERS: usize = 16;
const PLANE_POINTERS: usize = 8;

/// Sequential big endian reads from a delta chunk.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    op: u8,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], pos: usize, op: u8) -> Self {
        Self { data, pos, op }
    }

    #[inline]
    fn malformed(&self) -> DecodingFormatError {
        DecodingFormatError::MalformedDelta(self.op)
    }

    fn u8(&mut self) -> Result<u8, DecodingFormatError> {
        let v = self.data.be_u8(self.pos).ok_or_else(|| self.malformed())?;
        self.pos += 1;
        Ok(v)
    }

    /// Reads a `width` byte word, returning its raw bytes.
    fn word(&mut self, width: usize) -> Result<&'a [u8], DecodingFormatError> {
        let end = self.pos + width;
        let v = self.data.get(self.pos..end).ok_or_else(|| self.malformed())?;
        self.pos = end;
        Ok(v)
    }

    /// Reads a `width` byte word as a count.
    fn count(&mut self, width: usize) -> Result<usize, DecodingFormatError> {
        let v = match width {
            1 => self.data.be_u8(self.pos).map(u32::from),
            2 => self.data.be_u16(self.pos).map(u32::from),
            _ => self.data.be_u32(self.pos),
        };
        let v = v.ok_or_else(|| self.malformed())?;
        self.pos += width;
        Ok(v as usize)
    }
}

/// Writes down one column of a plane.
struct Column<'p> {
    plane: &'p mut [u8],
    offset: usize,
    stop: usize,
    pitch: usize,
    width: usize,
    xor: bool,
}

impl<'p> Column<'p> {
    fn new(plane: &'p mut [u8], x: usize, width: usize, pitch: usize, height: usize, xor: bool) -> Self {
        Self {
            plane,
            offset: x,
            stop: x + pitch * height,
            pitch,
            width,
            xor,
        }
    }

    /// Stores `value` in the current row and moves down. Rows past the
    /// bottom are dropped.
    #[inline]
    fn put(&mut self, value: &[u8]) {
        if self.offset >= self.stop {
            return;
        }
        if let Some(dst) = self.plane.get_mut(self.offset..self.offset + self.width) {
            if self.xor {
                dst.iter_mut().zip(value).for_each(|(d, s)| *d ^= s);
            } else {
                dst.copy_from_slice(&value[..self.width]);
            }
        }
        self.offset += self.pitch;
    }

    /// Stores `value` in the next `count` rows, cut short at the bottom.
    fn fill(&mut self, value: &[u8], count: usize) {
        let rows = self
            .stop
            .saturating_sub(self.offset)
            .checked_div(self.pitch)
            .unwrap_or(0);
        for _ in 0..count.min(rows) {
            self.put(value);
        }
    }

    #[inline]
    fn skip(&mut self, rows: usize) {
        self.offset = self.offset.saturating_add(rows.saturating_mul(self.pitch));
    }
}

/// Applies a `DLTA` chunk to `bitmap` in place.
///
/// Plane pointers are byte offsets from the start of the chunk. A zero
/// pointer leaves its plane untouched.
pub(crate) fn apply(
    bitmap: &mut PlanarBitmap,
    header: &AnimHeader,
    delta: &[u8],
) -> Result<(), DecodingFormatError> {
    let op = header.operation;
    if !matches!(op, 5 | 7 | 8) {
        return Err(DecodingFormatError::UnknownAnimOperation(op));
    }
    let mut pointers = [0usize; POINTERS];
    for (i, p) in pointers.iter_mut().enumerate() {
        *p = delta
            .be_u32(i * 4)
            .ok_or(DecodingFormatError::MalformedDelta(op))? as usize;
    }
    let planes = bitmap.num_planes().min(PLANE_POINTERS);
    let word = if header.long_data() { 4 } else { 2 };
    log::debug!(
        "delta op {op}, {} data, xor {}",
        if word == 4 { "long" } else { "short" },
        header.xor()
    );
    for p in 0..planes {
        if pointers[p] == 0 {
            continue;
        }
        match op {
            5 => byte_vertical(bitmap, p, header.xor(), Cursor::new(delta, pointers[p], op))?,
            7 => {
                let data = pointers[p + PLANE_POINTERS];
                split_vertical(
                    bitmap,
                    p,
                    header.xor(),
                    word,
                    Cursor::new(delta, pointers[p], op),
                    Cursor::new(delta, data, op),
                )?
            }
            _ => merged_vertical(bitmap, p, header.xor(), word, Cursor::new(delta, pointers[p], op))?,
        }
    }
    Ok(())
}

/// Width in bytes of each column for `word` byte data. When the row pitch is
/// not a multiple of the word size the final column falls back to short words.
fn column_widths(pitch: usize, word: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..pitch.div_ceil(word)).map(move |c| {
        let x = c * word;
        (x, word.min(pitch - x))
    })
}

/// Method 5: byte columns, ops and data in one stream.
fn byte_vertical(
    bitmap: &mut PlanarBitmap,
    plane: usize,
    xor: bool,
    mut ops: Cursor<'_>,
) -> Result<(), DecodingFormatError> {
    let (pitch, height) = (bitmap.pitch(), bitmap.height());
    let columns = bitmap.width().div_ceil(8);
    let data = bitmap.plane_mut(plane);
    for x in 0..columns {
        let mut col = Column::new(data, x, 1, pitch, height, xor);
        let opcount = ops.u8()?;
        for _ in 0..opcount {
            let op = ops.u8()?;
            if op & 0x80 != 0 {
                for _ in 0..op & 0x7F {
                    let value = ops.word(1)?;
                    col.put(value);
                }
            } else if op == 0 {
                let count = ops.u8()?;
                let value = ops.word(1)?;
                col.fill(value, usize::from(count));
            } else {
                col.skip(usize::from(op));
            }
        }
    }
    Ok(())
}

/// Method 7: byte ops in one list, word data in another.
fn split_vertical(
    bitmap: &mut PlanarBitmap,
    plane: usize,
    xor: bool,
    word: usize,
    mut ops: Cursor<'_>,
    mut values: Cursor<'_>,
) -> Result<(), DecodingFormatError> {
    let (pitch, height) = (bitmap.pitch(), bitmap.height());
    let data = bitmap.plane_mut(plane);
    for (x, width) in column_widths(pitch, word) {
        let mut col = Column::new(data, x, width, pitch, height, xor);
        let opcount = ops.u8()?;
        for _ in 0..opcount {
            let op = ops.u8()?;
            if op & 0x80 != 0 {
                for _ in 0..op & 0x7F {
                    let value = values.word(width)?;
                    col.put(value);
                }
            } else if op == 0 {
                let count = ops.u8()?;
                let value = values.word(width)?;
                col.fill(value, usize::from(count));
            } else {
                col.skip(usize::from(op));
            }
        }
    }
    Ok(())
}

/// Method 8: word ops and word data interleaved in one stream.
fn merged_vertical(
    bitmap: &mut PlanarBitmap,
    plane: usize,
    xor: bool,
    word: usize,
    mut ops: Cursor<'_>,
) -> Result<(), DecodingFormatError> {
    let (pitch, height) = (bitmap.pitch(), bitmap.height());
    let data = bitmap.plane_mut(plane);
    for (x, width) in column_widths(pitch, word) {
        let uniq_bit = 1usize << (width * 8 - 1);
        let mut col = Column::new(data, x, width, pitch, height, xor);
        let opcount = ops.count(width)?;
        for _ in 0..opcount {
            let op = ops.count(width)?;
            if op & uniq_bit != 0 {
                for _ in 0..op & !uniq_bit {
                    let value = ops.word(width)?;
                    col.put(value);
                }
            } else if op == 0 {
                let count = ops.count(width)?;
                let value = ops.word(width)?;
                col.fill(value, count);
            } else {
                col.skip(op);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn header(operation: u8, bits: u32) -> AnimHeader {
        AnimHeader {
            operation,
            bits,
            ..AnimHeader::default()
        }
    }

    /// Builds a chunk with one plane pointer per entry of `lists`, at `slots`.
    fn chunk(lists: &[(usize, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![0u8; POINTERS * 4];
        for (slot, list) in lists {
            let at = out.len() as u32;
            out[slot * 4..slot * 4 + 4].copy_from_slice(&at.to_be_bytes());
            out.extend_from_slice(list);
        }
        out
    }

    fn column(bitmap: &PlanarBitmap, plane: usize, x: usize, width: usize) -> Vec<Vec<u8>> {
        let pitch = bitmap.pitch();
        (0..bitmap.height())
            .map(|y| bitmap.plane(plane)[y * pitch + x..y * pitch + x + width].to_vec())
            .collect()
    }

    #[test]
    fn byte_vertical_ops() {
        // 16x6, one plane; column 0 gets skip 1, uniq [0xAA, 0xBB], same 2 x 0xCC
        let mut bmp = PlanarBitmap::new(16, 6, 1);
        let mut list = vec![3, 1, 0x82, 0xAA, 0xBB, 0, 2, 0xCC];
        list.push(0); // column 1: no ops
        let delta = chunk(&[(0, list)]);
        apply(&mut bmp, &header(5, 0), &delta).unwrap();
        assert_eq!(
            column(&bmp, 0, 0, 1),
            vec![vec![0u8], vec![0xAA], vec![0xBB], vec![0xCC], vec![0xCC], vec![0]]
        );
        assert!(column(&bmp, 0, 1, 1).iter().all(|b| b[0] == 0));
    }

    #[test]
    fn xor_combines_with_existing_data() {
        let mut bmp = PlanarBitmap::new(8, 2, 2);
        bmp.plane_mut(1).fill(0x0F);
        let delta = chunk(&[(1, vec![1, 0x82, 0xFF, 0x01])]);
        apply(&mut bmp, &header(5, AnimHeader::XOR), &delta).unwrap();
        assert_eq!(column(&bmp, 1, 0, 1), vec![vec![0xF0u8], vec![0x0E]]);
        assert!(bmp.plane(0).iter().all(|&b| b == 0));
    }

    #[test]
    fn writes_stop_at_the_bottom() {
        let mut bmp = PlanarBitmap::new(8, 2, 1);
        let delta = chunk(&[(0, vec![2, 0, 200, 0x55, 0x84, 1, 2, 3, 4])]);
        apply(&mut bmp, &header(5, 0), &delta).unwrap();
        assert_eq!(bmp.plane(0), &[0x55, 0, 0x55, 0]);
    }

    #[test]
    fn split_vertical_short_and_long() {
        // 32 pixels wide: two short columns or one long one
        let mut bmp = PlanarBitmap::new(32, 3, 1);
        let ops = vec![2, 1, 0x81, 1, 0, 2];
        let data = vec![0x12, 0x34, 0xAB, 0xCD];
        let mut delta = chunk(&[(0, ops)]);
        let at = delta.len() as u32;
        delta[8 * 4..8 * 4 + 4].copy_from_slice(&at.to_be_bytes());
        delta.extend_from_slice(&data);
        apply(&mut bmp, &header(7, 0), &delta).unwrap();
        assert_eq!(column(&bmp, 0, 0, 2), vec![vec![0u8, 0], vec![0x12, 0x34], vec![0, 0]]);
        assert_eq!(column(&bmp, 0, 2, 2), vec![vec![0xABu8, 0xCD], vec![0xAB, 0xCD], vec![0, 0]]);

        let mut bmp = PlanarBitmap::new(32, 3, 1);
        let ops = vec![1, 0x83];
        let data: Vec<u8> = (1..=12).collect();
        let mut delta = chunk(&[(0, ops)]);
        let at = delta.len() as u32;
        delta[8 * 4..8 * 4 + 4].copy_from_slice(&at.to_be_bytes());
        delta.extend_from_slice(&data);
        apply(&mut bmp, &header(7, AnimHeader::LONG_DATA), &delta).unwrap();
        assert_eq!(bmp.plane(0), &data[..]);
    }

    #[test]
    fn merged_vertical_long_with_short_tail() {
        // 48 pixels: one long column and a short one for the last 16 pixels
        let mut bmp = PlanarBitmap::new(48, 2, 1);
        let mut list = Vec::new();
        for w in [1u32, 0x8000_0001, 0xDEAD_BEEF] {
            list.extend_from_slice(&w.to_be_bytes());
        }
        for w in [2u16, 1, 0x8001, 0x4242] {
            list.extend_from_slice(&w.to_be_bytes());
        }
        let delta = chunk(&[(0, list)]);
        apply(&mut bmp, &header(8, AnimHeader::LONG_DATA), &delta).unwrap();
        assert_eq!(bmp.plane(0), &[0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 0, 0, 0, 0x42, 0x42][..]);
    }

    #[test]
    fn merged_vertical_short_same_run() {
        let mut bmp = PlanarBitmap::new(16, 4, 1);
        let mut list = Vec::new();
        for w in [1u16, 0, 3, 0x0F0F] {
            list.extend_from_slice(&w.to_be_bytes());
        }
        let delta = chunk(&[(0, list)]);
        apply(&mut bmp, &header(8, 0), &delta).unwrap();
        assert_eq!(bmp.plane(0), &[0x0F, 0x0F, 0x0F, 0x0F, 0x0F, 0x0F, 0, 0][..]);
    }

    #[test]
    fn huge_same_run_stops_at_the_bottom() {
        let mut bmp = PlanarBitmap::new(32, 4, 1);
        let mut list = Vec::new();
        for w in [1u32, 0, 0xFFFF_FFFF, 0x1234_5678] {
            list.extend_from_slice(&w.to_be_bytes());
        }
        let delta = chunk(&[(0, list)]);
        apply(&mut bmp, &header(8, AnimHeader::LONG_DATA), &delta).unwrap();
        assert_eq!(column(&bmp, 0, 0, 4), vec![vec![0x12u8, 0x34, 0x56, 0x78]; 4]);

        // a skip past the bottom leaves no rows to fill
        let mut bmp = PlanarBitmap::new(32, 4, 1);
        let mut list = Vec::new();
        for w in [2u32, 9, 0, 0xFFFF_FFFF, 0x1234_5678] {
            list.extend_from_slice(&w.to_be_bytes());
        }
        let delta = chunk(&[(0, list)]);
        apply(&mut bmp, &header(8, AnimHeader::LONG_DATA), &delta).unwrap();
        assert!(bmp.plane(0).iter().all(|&b| b == 0));
    }

    #[test]
    fn bad_input_is_rejected() {
        let mut bmp = PlanarBitmap::new(16, 4, 1);
        let delta = chunk(&[(0, vec![1, 0x85, 1])]);
        assert!(matches!(
            apply(&mut bmp, &header(5, 0), &delta),
            Err(DecodingFormatError::MalformedDelta(5))
        ));
        assert!(matches!(
            apply(&mut bmp, &header(5, 0), &[0; 10]),
            Err(DecodingFormatError::MalformedDelta(5))
        ));
        let delta = chunk(&[(0, vec![0])]);
        assert!(matches!(
            apply(&mut bmp, &header(3, 0), &delta),
            Err(DecodingFormatError::UnknownAnimOperation(3))
        ));
    }
}
