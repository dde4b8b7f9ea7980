//! Bit-planar bitmaps as stored by ILBM, and their conversion to packed pixels.

use alloc::vec::Vec;

use crate::palette::Palette;

/// Amiga display mode bits, as found in `CAMG` chunks.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ModeFlags(pub u32);

impl ModeFlags {
    /// Interlaced display: twice the lines, half-height pixels.
    pub const LACE: u32 = 0x0004;
    /// Super-hires (1280 wide) display.
    pub const SUPERHIRES: u32 = 0x0020;
    /// Extra-Half-Brite: 6 planes, upper 32 colors are the lower 32 at half intensity.
    pub const EXTRA_HALFBRITE: u32 = 0x0080;
    /// Hold-And-Modify.
    pub const HAM: u32 = 0x0800;
    /// The upper word holds a monitor ID rather than junk.
    pub const EXTENDED_MODE: u32 = 0x1000;
    /// Hires (640 wide) display: half-width pixels.
    pub const HIRES: u32 = 0x8000;

    /// `true` if every bit of `bits` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    /// Interlaced.
    #[inline]
    #[must_use]
    pub const fn is_lace(self) -> bool {
        self.contains(Self::LACE)
    }

    /// Hires or super-hires.
    #[inline]
    #[must_use]
    pub const fn is_hires(self) -> bool {
        self.0 & (Self::HIRES | Self::SUPERHIRES) != 0
    }

    /// Hold-And-Modify.
    #[inline]
    #[must_use]
    pub const fn is_ham(self) -> bool {
        self.contains(Self::HAM)
    }

    /// Extra-Half-Brite.
    #[inline]
    #[must_use]
    pub const fn is_ehb(self) -> bool {
        self.contains(Self::EXTRA_HALFBRITE)
    }
}

/// A bitmap made of up to 32 one-bit planes.
///
/// Plane memory is a single block; plane `i` is the `i`th `pitch * height`
/// slice of it. Planes are allocated in whole groups of 8 (the ones past
/// `num_planes` stay zero) so conversion to chunky pixels can transpose 8
/// planes at a time without special-casing shallow or ragged depths.
#[derive(Debug, Clone)]
pub struct PlanarBitmap {
    width: usize,
    height: usize,
    pitch: usize,
    num_planes: usize,
    plane_data: Vec<u8>,
    /// Colors for indexed images. Empty for direct RGB images.
    pub palette: Palette,
    /// Color index that should be shown transparent.
    pub transparent_color: Option<u8>,
    /// Ticks to wait before this frame is shown, at `rate` ticks per second.
    pub delay: u32,
    /// Tick rate for `delay`.
    pub rate: u32,
    /// Which earlier frame a delta applies to: 1 for the previous one, 2 for the one before that.
    /// Zero for still images.
    pub interleave: u8,
    /// Display mode the image was drawn for.
    pub mode: ModeFlags,
}

impl PlanarBitmap {
    /// Tick rate of Amiga ANIM timing (jiffies).
    pub const DEFAULT_RATE: u32 = 60;

    /// Allocates a zeroed bitmap.
    ///
    /// # Panics
    ///
    /// If `num_planes` is 0 or more than 32.
    #[must_use]
    pub fn new(width: usize, height: usize, num_planes: usize) -> Self {
        assert!(
            (1..=32).contains(&num_planes),
            "plane count must be within 1..=32"
        );
        // Amiga bitplanes must be an even number of bytes wide
        let pitch = width.div_ceil(16) * 2;
        let allocated = num_planes.div_ceil(8) * 8;
        Self {
            width,
            height,
            pitch,
            num_planes,
            plane_data: vec![0; pitch * height * allocated],
            palette: Palette::default(),
            transparent_color: None,
            delay: 0,
            rate: Self::DEFAULT_RATE,
            interleave: 0,
            mode: ModeFlags::default(),
        }
    }

    /// Width in pixels.
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes per plane row.
    #[inline]
    #[must_use]
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// Number of planes in use.
    #[inline]
    #[must_use]
    pub fn num_planes(&self) -> usize {
        self.num_planes
    }

    /// Bytes each pixel occupies once converted to chunky form.
    #[inline]
    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        match self.num_planes {
            0..=8 => 1,
            9..=16 => 2,
            _ => 4,
        }
    }

    #[inline]
    fn plane_size(&self) -> usize {
        self.pitch * self.height
    }

    /// Plane `index`, `pitch * height` bytes.
    ///
    /// # Panics
    ///
    /// If `index >= num_planes()`.
    #[must_use]
    pub fn plane(&self, index: usize) -> &[u8] {
        assert!(index < self.num_planes, "plane {index} out of range");
        let size = self.plane_size();
        &self.plane_data[index * size..(index + 1) * size]
    }

    /// Mutable plane `index`.
    ///
    /// # Panics
    ///
    /// If `index >= num_planes()`.
    pub fn plane_mut(&mut self, index: usize) -> &mut [u8] {
        assert!(index < self.num_planes, "plane {index} out of range");
        let size = self.plane_size();
        &mut self.plane_data[index * size..(index + 1) * size]
    }

    /// Sets every bit of a plane to `set`.
    pub fn fill_bitplane(&mut self, index: usize, set: bool) {
        self.plane_mut(index).fill(if set { 0xFF } else { 0 });
    }

    /// Converts the planes to packed pixels.
    ///
    /// Rows are written `dest_pitch` bytes apart, starting at the upper left
    /// corner of `dest`; anything to the right of the image is left alone.
    /// Pixels are one byte for up to 8 planes, a little endian `u16` for up
    /// to 16 and RGBA for deeper images (24 planes have opaque alpha, the
    /// 32nd-plane group is alpha).
    ///
    /// # Panics
    ///
    /// If `dest` cannot hold `height` rows of `dest_pitch` bytes or a row is
    /// narrower than `width * bytes_per_pixel()`.
    pub fn to_chunky(&self, dest: &mut [u8], dest_pitch: usize) {
        assert!(dest_pitch >= self.width * self.bytes_per_pixel());
        assert!(dest.len() >= dest_pitch * self.height);
        match self.num_planes {
            0 => {}
            1..=8 => self.to_chunky_8(dest, dest_pitch),
            9..=16 => self.to_chunky_16(dest, dest_pitch),
            _ => self.to_chunky_rgba(dest, dest_pitch),
        }
    }

    fn to_chunky_8(&self, dest: &mut [u8], dest_pitch: usize) {
        let step = self.plane_size();
        let groups = self.width / 8;
        for y in 0..self.height {
            let src_row = y * self.pitch;
            let out = &mut dest[y * dest_pitch..];
            for x in 0..groups {
                rotate8x8(&self.plane_data[src_row + x..], step, &mut out[x * 8..], 1);
            }
            for x in groups * 8..self.width {
                out[x] = self.gather(src_row, x, 0, self.num_planes) as u8;
            }
        }
    }

    fn to_chunky_16(&self, dest: &mut [u8], dest_pitch: usize) {
        for y in 0..self.height {
            let src_row = y * self.pitch;
            let out = &mut dest[y * dest_pitch..];
            for x in 0..self.width {
                let pixel = self.gather(src_row, x, 0, self.num_planes) as u16;
                out[x * 2..x * 2 + 2].copy_from_slice(&pixel.to_le_bytes());
            }
        }
    }

    fn to_chunky_rgba(&self, dest: &mut [u8], dest_pitch: usize) {
        let step = self.plane_size();
        let channels = self.num_planes.div_ceil(8).min(4);
        let groups = self.width / 8;
        for y in 0..self.height {
            let src_row = y * self.pitch;
            let out = &mut dest[y * dest_pitch..y * dest_pitch + self.width * 4];
            if channels < 4 {
                for px in out.chunks_exact_mut(4) {
                    px[3] = 0xFF;
                }
            }
            for c in 0..channels {
                let base = c * 8 * step + src_row;
                for x in 0..groups {
                    rotate8x8(&self.plane_data[base + x..], step, &mut out[x * 32 + c..], 4);
                }
                let last = (c * 8 + 8).min(self.num_planes);
                for x in groups * 8..self.width {
                    out[x * 4 + c] = self.gather(src_row, x, c * 8, last) as u8;
                }
            }
        }
    }

    /// Collects the bits of pixel `x` from planes `first..last`, lowest plane in bit 0.
    #[inline]
    fn gather(&self, src_row: usize, x: usize, first: usize, last: usize) -> u32 {
        let step = self.plane_size();
        let byte = src_row + (x >> 3);
        let bit = 7 - (x & 7);
        (first..last).rev().fold(0u32, |pixel, p| {
            pixel << 1 | u32::from((self.plane_data[p * step + byte] >> bit) & 1)
        })
    }
}

impl PartialEq for PlanarBitmap {
    /// Two bitmaps are equal when they would display the same image.
    fn eq(&self, other: &Self) -> bool {
        if self.width != other.width
            || self.height != other.height
            || self.num_planes != other.num_planes
            || self.palette != other.palette
        {
            return false;
        }
        let used = self.num_planes * self.plane_size();
        self.plane_data[..used] == other.plane_data[..used]
    }
}

const fn spread_table(shift: u32) -> [u32; 16] {
    let mut table = [0u32; 16];
    let mut i = 0;
    while i < 16 {
        let mut v = 0u32;
        if i & 1 != 0 {
            v |= 0x0000_0001;
        }
        if i & 2 != 0 {
            v |= 0x0000_0100;
        }
        if i & 4 != 0 {
            v |= 0x0001_0000;
        }
        if i & 8 != 0 {
            v |= 0x0100_0000;
        }
        table[i] = v << shift;
        i += 1;
    }
    table
}

/// Each nibble spread one bit per byte, then shifted to its source row's bit.
static SPREAD: [[u32; 16]; 8] = [
    spread_table(0),
    spread_table(1),
    spread_table(2),
    spread_table(3),
    spread_table(4),
    spread_table(5),
    spread_table(6),
    spread_table(7),
];

/// Transposes an 8x8 bit tile.
///
/// Reads 8 bytes `src_step` apart (one per plane, leftmost pixel in bit 7) and
/// writes 8 bytes `dst_step` apart so that bit `p` of output byte `k` is bit
/// `7 - k` of input byte `p`. With `dst_step == 1` this turns one byte column
/// of 8 planes into 8 chunky pixels.
///
/// After Sue-Ken Yap, "A Fast 90-Degree Bitmap Rotator", Graphics Gems II.
pub(crate) fn rotate8x8(src: &[u8], src_step: usize, dst: &mut [u8], dst_step: usize) {
    let mut lo = 0u32;
    let mut hi = 0u32;
    for (row, table) in SPREAD.iter().enumerate() {
        let b = src[row * src_step];
        lo |= table[usize::from(b & 0x0F)];
        hi |= table[usize::from(b >> 4)];
    }
    let words = [hi, lo];
    for (half, word) in words.iter().enumerate() {
        for (i, byte) in word.to_be_bytes().into_iter().enumerate() {
            dst[(half * 4 + i) * dst_step] = byte;
        }
    }
}
