//! Packed ("chunky") pixel buffers.

use alloc::vec::Vec;

use crate::dither::DitherMode;
use crate::palette::Palette;
use crate::planar::PlanarBitmap;

/// A packed pixel buffer of 1, 2 or 4 bytes per pixel.
///
/// Rows are `pitch` bytes apart and the buffer holds exactly `pitch * height`
/// bytes. Four-byte pixels are RGBA.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkyBitmap {
    width: usize,
    height: usize,
    pitch: usize,
    bytes_per_pixel: usize,
    pixels: Vec<u8>,
}

impl ChunkyBitmap {
    /// Allocates a zeroed bitmap.
    #[must_use]
    pub fn new(width: usize, height: usize, bytes_per_pixel: usize) -> Self {
        let pitch = width * bytes_per_pixel;
        Self {
            width,
            height,
            pitch,
            bytes_per_pixel,
            pixels: vec![0; pitch * height],
        }
    }

    /// Allocates an 8-bit bitmap filled with `color`.
    #[must_use]
    pub fn solid(width: usize, height: usize, color: u8) -> Self {
        let mut bitmap = Self::new(width, height, 1);
        bitmap.set_solid_color(color);
        bitmap
    }

    /// Wraps existing 8-bit pixels, `width * height` of them.
    ///
    /// Returns `None` if the buffer has the wrong size.
    #[must_use]
    pub fn from_indexed(width: usize, height: usize, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == width * height).then_some(Self {
            width,
            height,
            pitch: width,
            bytes_per_pixel: 1,
            pixels,
        })
    }

    /// Converts a planar bitmap, scaling it by whole factors on each axis.
    ///
    /// HAM images come out as RGBA, everything else keeps the pixel size
    /// chosen by [`PlanarBitmap::bytes_per_pixel`]. A factor of 0 is treated as 1.
    #[must_use]
    pub fn from_planar(planar: &PlanarBitmap, scale_x: usize, scale_y: usize) -> Self {
        let (sx, sy) = (scale_x.max(1), scale_y.max(1));
        let (w, h) = (planar.width(), planar.height());
        let ham = planar.mode.is_ham() && planar.num_planes() <= 8;
        let bpp = if ham { 4 } else { planar.bytes_per_pixel() };
        let mut bitmap = Self::new(w * sx, h * sy, bpp);
        if bitmap.pixels.is_empty() {
            return bitmap;
        }
        if ham {
            let mut indices = vec![0u8; w * h];
            planar.to_chunky(&mut indices, w);
            decode_ham(
                &indices,
                w,
                &planar.palette,
                planar.num_planes() > 6,
                &mut bitmap.pixels,
                bitmap.pitch,
            );
        } else {
            planar.to_chunky(&mut bitmap.pixels, bitmap.pitch);
        }
        bitmap.expand(w, h, sx, sy);
        bitmap
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

    /// Bytes per row.
    #[inline]
    #[must_use]
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// Bytes per pixel: 1, 2 or 4.
    #[inline]
    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    /// All pixel bytes.
    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// All pixel bytes, mutably.
    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Row `y`.
    #[inline]
    #[must_use]
    pub fn row(&self, y: usize) -> &[u8] {
        &self.pixels[y * self.pitch..(y + 1) * self.pitch]
    }

    /// Consumes the bitmap, returning its pixels.
    #[must_use]
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Sets every byte of the buffer to `color`.
    pub fn set_solid_color(&mut self, color: u8) {
        self.pixels.fill(color);
    }

    /// Sets every byte of a rectangle to `color`, clipped to the bitmap.
    pub fn fill_rect(&mut self, left: usize, top: usize, width: usize, height: usize, color: u8) {
        let right = (left + width).min(self.width);
        let bottom = (top + height).min(self.height);
        if left >= right {
            return;
        }
        let bpp = self.bytes_per_pixel;
        for y in top..bottom {
            let row = y * self.pitch;
            self.pixels[row + left * bpp..row + right * bpp].fill(color);
        }
    }

    /// Scales the `src_width` x `src_height` image in the upper left corner
    /// of the buffer by `sx` x `sy`, in place.
    ///
    /// Works bottom to top and right to left so no source pixel is overwritten
    /// before it is read. Each source row is widened once and then copied down.
    ///
    /// # Panics
    ///
    /// If the scaled image does not fit the bitmap.
    pub fn expand(&mut self, src_width: usize, src_height: usize, sx: usize, sy: usize) {
        let (sx, sy) = (sx.max(1), sy.max(1));
        if sx == 1 && sy == 1 {
            return;
        }
        assert!(src_width * sx <= self.width && src_height * sy <= self.height);
        let bpp = self.bytes_per_pixel;
        let pitch = self.pitch;
        for y in (0..src_height).rev() {
            let src = y * pitch;
            let dst = y * sy * pitch;
            if sx > 1 {
                for x in (0..src_width).rev() {
                    let mut pixel = [0u8; 4];
                    pixel[..bpp].copy_from_slice(&self.pixels[src + x * bpp..src + (x + 1) * bpp]);
                    let out = dst + x * sx * bpp;
                    for chunk in self.pixels[out..out + sx * bpp].chunks_exact_mut(bpp) {
                        chunk.copy_from_slice(&pixel[..bpp]);
                    }
                }
            } else if dst != src {
                self.pixels.copy_within(src..src + src_width * bpp, dst);
            }
            let row_bytes = src_width * sx * bpp;
            for j in 1..sy {
                self.pixels.copy_within(dst..dst + row_bytes, dst + j * pitch);
            }
        }
    }

    /// Maps an RGBA bitmap onto `palette`, producing an 8-bit bitmap.
    ///
    /// # Panics
    ///
    /// If this bitmap is not 4 bytes per pixel.
    #[must_use]
    pub fn rgb_to_palette(&self, palette: &Palette, dither: DitherMode) -> ChunkyBitmap {
        assert_eq!(self.bytes_per_pixel, 4, "palettizing needs RGBA pixels");
        let mut out = ChunkyBitmap::new(self.width, self.height, 1);
        let mut palettizer = dither.palettizer(palette, self.width);
        for y in 0..self.height {
            let src = &self.row(y)[..self.width * 4];
            let dst = &mut out.pixels[y * out.pitch..(y + 1) * out.pitch];
            palettizer.palettize_row(src, dst);
            palettizer.advance_rows(1);
        }
        out
    }
}

/// Reconstructs Hold-And-Modify colors into RGBA.
///
/// The top two bits of each pixel pick a palette color (00) or replace the
/// blue (01), red (10) or green (11) channel of the pixel to the left. Every
/// row starts from palette color 0.
fn decode_ham(
    indices: &[u8],
    width: usize,
    palette: &Palette,
    ham8: bool,
    out: &mut [u8],
    out_pitch: usize,
) {
    let (shift, mask) = if ham8 { (6, 0x3F) } else { (4, 0x0F) };
    let expand = |v: u8| -> u8 {
        if ham8 {
            v << 2 | v >> 4
        } else {
            v << 4 | v
        }
    };
    let base = palette.get(0).unwrap_or_default();
    for (y, row) in indices.chunks_exact(width.max(1)).enumerate() {
        let mut color = base;
        let dst = &mut out[y * out_pitch..y * out_pitch + width * 4];
        for (&p, px) in row.iter().zip(dst.chunks_exact_mut(4)) {
            let value = p & mask;
            match (p >> shift) & 3 {
                0 => color = palette.get(usize::from(value)).unwrap_or_default(),
                1 => color.blue = expand(value),
                2 => color.red = expand(value),
                _ => color.green = expand(value),
            }
            px.copy_from_slice(&[color.red, color.green, color.blue, 0xFF]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::ColorRegister;
    use crate::planar::ModeFlags;

    fn numbered(width: usize, height: usize, bpp: usize) -> ChunkyBitmap {
        let mut b = ChunkyBitmap::new(width, height, bpp);
        for (i, p) in b.pixels.iter_mut().enumerate() {
            *p = i as u8;
        }
        b
    }

    #[test]
    fn expand_replicates_every_pixel() {
        for &(sx, sy, bpp) in &[(2usize, 1usize, 1usize), (1, 3, 1), (3, 2, 1), (2, 2, 4), (4, 3, 2)] {
            let (w, h) = (5, 4);
            let src = numbered(w, h, bpp);
            let mut big = ChunkyBitmap::new(w * sx, h * sy, bpp);
            for y in 0..h {
                let from = &src.pixels[y * src.pitch..(y + 1) * src.pitch];
                big.pixels[y * big.pitch..y * big.pitch + src.pitch].copy_from_slice(from);
            }
            big.expand(w, h, sx, sy);
            assert_eq!(big.width(), w * sx);
            assert_eq!(big.height(), h * sy);
            for y in 0..h {
                for x in 0..w {
                    let want = &src.pixels[y * src.pitch + x * bpp..][..bpp];
                    for j in 0..sy {
                        for i in 0..sx {
                            let at = (y * sy + j) * big.pitch + (x * sx + i) * bpp;
                            assert_eq!(&big.pixels[at..at + bpp], want, "sx={sx} sy={sy} x={x} y={y}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn from_planar_scales() {
        let mut planar = PlanarBitmap::new(3, 2, 2);
        planar.plane_mut(0)[0] = 0b1010_0000;
        planar.plane_mut(1)[2] = 0b0100_0000;
        let chunky = ChunkyBitmap::from_planar(&planar, 2, 2);
        assert_eq!(chunky.width(), 6);
        assert_eq!(chunky.height(), 4);
        assert_eq!(chunky.row(0), &[1, 1, 0, 0, 1, 1]);
        assert_eq!(chunky.row(1), &[1, 1, 0, 0, 1, 1]);
        assert_eq!(chunky.row(2), &[0, 0, 2, 2, 0, 0]);
        assert_eq!(chunky.row(3), &[0, 0, 2, 2, 0, 0]);
    }

    #[test]
    fn ham6_holds_and_modifies() {
        let mut planar = PlanarBitmap::new(4, 1, 6);
        planar.palette = Palette::new(vec![ColorRegister::new(0x10, 0x20, 0x30), ColorRegister::new(0xFF, 0, 0)]);
        planar.mode = ModeFlags(ModeFlags::HAM);
        // pixels: palette 1, modify blue to 0xA, modify green to 0x5, modify red to 0x0
        let pixels = [0b00_0001u8, 0b01_1010, 0b11_0101, 0b10_0000];
        for (x, &p) in pixels.iter().enumerate() {
            for plane in 0..6 {
                if p >> plane & 1 != 0 {
                    planar.plane_mut(plane)[0] |= 0x80 >> x;
                }
            }
        }
        let chunky = ChunkyBitmap::from_planar(&planar, 1, 1);
        assert_eq!(chunky.bytes_per_pixel(), 4);
        assert_eq!(
            chunky.row(0),
            &[0xFF, 0, 0, 0xFF, 0xFF, 0, 0xAA, 0xFF, 0xFF, 0x55, 0xAA, 0xFF, 0, 0x55, 0xAA, 0xFF]
        );
    }

    #[test]
    fn ham8_uses_six_bit_values() {
        let mut planar = PlanarBitmap::new(2, 2, 8);
        planar.palette = Palette::new(vec![ColorRegister::new(1, 2, 3)]);
        planar.mode = ModeFlags(ModeFlags::HAM);
        // row 0: modify red to 0x3F twice; row 1 restarts from palette 0
        for plane in 0..6 {
            planar.plane_mut(plane)[0] = 0xC0;
        }
        planar.plane_mut(7)[0] = 0xC0;
        let pitch = planar.pitch();
        planar.plane_mut(6)[pitch] = 0x80;
        let chunky = ChunkyBitmap::from_planar(&planar, 1, 1);
        assert_eq!(chunky.row(0), &[0xFF, 2, 3, 0xFF, 0xFF, 2, 3, 0xFF]);
        assert_eq!(chunky.row(1), &[1, 2, 0, 0xFF, 1, 2, 3, 0xFF]);
    }

    #[test]
    fn rgb_to_palette_picks_nearest() {
        let mut rgba = ChunkyBitmap::new(2, 1, 4);
        rgba.pixels.copy_from_slice(&[250, 250, 250, 255, 3, 0, 0, 255]);
        let pal = Palette::new(vec![ColorRegister::gray(0), ColorRegister::gray(255)]);
        let out = rgba.rgb_to_palette(&pal, DitherMode::None);
        assert_eq!(out.pixels(), &[1, 0]);
    }

    #[test]
    fn fill_rect_is_clipped() {
        let mut b = ChunkyBitmap::solid(4, 3, 9);
        b.fill_rect(2, 1, 10, 10, 0);
        assert_eq!(b.row(0), &[9, 9, 9, 9]);
        assert_eq!(b.row(1), &[9, 9, 0, 0]);
        assert_eq!(b.row(2), &[9, 9, 0, 0]);
    }
}
