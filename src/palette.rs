//! Color registers and color tables.

use alloc::vec::Vec;
use core::ops::Index;

/// A single 24-bit color, as stored in `CMAP` chunks and GIF color tables.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ColorRegister {
    /// Red intensity.
    pub red: u8,
    /// Green intensity.
    pub green: u8,
    /// Blue intensity.
    pub blue: u8,
}

impl ColorRegister {
    /// Creates a color from its three intensities.
    #[inline]
    #[must_use]
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Creates a gray with all three channels at `level`.
    #[inline]
    #[must_use]
    pub const fn gray(level: u8) -> Self {
        Self::new(level, level, level)
    }

    /// Packs the color as `0x00RRGGBB`.
    #[inline]
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        (self.red as u32) << 16 | (self.green as u32) << 8 | self.blue as u32
    }

    /// The channels as an array in red, green, blue order.
    #[inline]
    #[must_use]
    pub const fn channels(self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }
}

impl From<[u8; 3]> for ColorRegister {
    #[inline]
    fn from(c: [u8; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }
}

/// Weighted squared distance between two colors.
///
/// Thiadmer Riemersma's low-cost approximation of perceived difference: red
/// and blue errors are weighted by the mean red level.
#[inline]
#[must_use]
pub fn color_distance(r1: i32, g1: i32, b1: i32, c: ColorRegister) -> i32 {
    let rmean = (r1 + i32::from(c.red)) / 2;
    let dr = r1 - i32::from(c.red);
    let dg = g1 - i32::from(c.green);
    let db = b1 - i32::from(c.blue);
    (512 + rmean) * dr * dr + 1024 * dg * dg + (767 - rmean) * db * db
}

/// An ordered color table.
///
/// `CMAP` chunks may hold any number of entries; GIF color tables must hold a
/// power of two. [`Palette::extend`] bridges the two.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<ColorRegister>,
    bits: u8,
}

impl Palette {
    /// The largest palette a GIF can carry.
    pub const MAX_COLORS: usize = 256;

    /// Creates a palette from a list of colors.
    #[must_use]
    pub fn new(colors: Vec<ColorRegister>) -> Self {
        let bits = bits_for(colors.len());
        Self { colors, bits }
    }

    /// Parses the payload of a `CMAP` chunk.
    ///
    /// A truncated final entry is kept with its missing channels zeroed.
    #[must_use]
    pub fn from_cmap(data: &[u8]) -> Self {
        let colors = data
            .chunks(3)
            .map(|c| ColorRegister::new(c[0], c.get(1).copied().unwrap_or(0), c.get(2).copied().unwrap_or(0)))
            .collect();
        Self::new(colors)
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// `true` when the palette has no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Bits needed to index every entry, i.e. `ceil(log2(len))`.
    #[inline]
    #[must_use]
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// The entries in order.
    #[inline]
    #[must_use]
    pub fn colors(&self) -> &[ColorRegister] {
        &self.colors
    }

    /// Returns the entry at `index`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<ColorRegister> {
        self.colors.get(index).copied()
    }

    /// Returns a copy of this palette padded to the next power of two, at least 2 and at most 256 entries.
    ///
    /// Added entries form a grayscale ramp. An empty palette stays empty.
    #[must_use]
    pub fn extend(&self) -> Palette {
        if self.colors.is_empty() {
            return Palette::default();
        }
        self.extend_to(1)
    }

    /// Like [`Palette::extend`], but the result has at least `1 << min_bits` entries, even when empty.
    #[must_use]
    pub fn extend_to(&self, min_bits: u8) -> Palette {
        let mut bits = min_bits.clamp(1, 8);
        while (1usize << bits) < self.colors.len() && bits < 8 {
            bits += 1;
        }
        let size = 1usize << bits;
        let mut colors = Vec::with_capacity(size);
        colors.extend(self.colors.iter().take(size).copied());
        for i in colors.len()..size {
            colors.push(ColorRegister::gray(((i * 255) >> bits) as u8));
        }
        Palette { colors, bits }
    }

    /// Detects a palette written by software that only knew 4-bit OCS colors:
    /// at most 32 entries and every low nibble zero.
    #[must_use]
    pub fn is_ocs(&self) -> bool {
        !self.colors.is_empty()
            && self.colors.len() <= 32
            && self
                .colors
                .iter()
                .all(|c| (c.red | c.green | c.blue) & 0x0F == 0)
    }

    /// Restores full 8-bit range to an OCS palette by copying each high nibble into the low nibble.
    pub fn fix_ocs(&mut self) {
        for c in &mut self.colors {
            c.red |= c.red >> 4;
            c.green |= c.green >> 4;
            c.blue |= c.blue >> 4;
        }
    }

    /// Builds the Extra-Half-Brite palette: 64 entries, the upper 32 being the lower 32 at half intensity.
    pub fn make_ehb(&mut self) {
        if self.colors.is_empty() {
            return;
        }
        self.colors.resize(64, ColorRegister::default());
        for i in 0..32 {
            let c = self.colors[i];
            self.colors[32 + i] = ColorRegister::new(c.red >> 1, c.green >> 1, c.blue >> 1);
        }
        self.bits = bits_for(self.colors.len());
    }

    /// Index of the entry closest to `(r, g, b)` by [`color_distance`].
    ///
    /// An exact match returns immediately; otherwise the first of equally close entries wins.
    #[must_use]
    pub fn nearest_color(&self, r: u8, g: u8, b: u8) -> u8 {
        let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
        let mut best = 0;
        let mut best_dist = i32::MAX;
        for (i, &c) in self.colors.iter().enumerate().take(Self::MAX_COLORS) {
            let dist = color_distance(r, g, b, c);
            if dist < best_dist {
                if dist == 0 {
                    return i as u8;
                }
                best_dist = dist;
                best = i;
            }
        }
        best as u8
    }

    /// The palette as packed `[r, g, b, r, g, b, ...]` bytes.
    #[must_use]
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.colors.iter().flat_map(|c| c.channels()).collect()
    }
}

impl Index<usize> for Palette {
    type Output = ColorRegister;

    #[inline]
    fn index(&self, index: usize) -> &ColorRegister {
        &self.colors[index]
    }
}

impl From<Vec<ColorRegister>> for Palette {
    fn from(colors: Vec<ColorRegister>) -> Self {
        Self::new(colors)
    }
}

fn bits_for(len: usize) -> u8 {
    let mut bits = 0;
    while (1usize << bits) < len {
        bits += 1;
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Palette {
        Palette::new((0..n).map(|i| ColorRegister::new(i as u8, 0, 0)).collect())
    }

    #[test]
    fn bits_round_up() {
        assert_eq!(ramp(0).bits(), 0);
        assert_eq!(ramp(1).bits(), 0);
        assert_eq!(ramp(2).bits(), 1);
        assert_eq!(ramp(3).bits(), 2);
        assert_eq!(ramp(32).bits(), 5);
        assert_eq!(ramp(33).bits(), 6);
    }

    #[test]
    fn extend_pads_with_gray_and_never_truncates() {
        let pal = ramp(5).extend();
        assert_eq!(pal.len(), 8);
        assert_eq!(pal.bits(), 3);
        assert_eq!(&pal.colors()[..5], ramp(5).colors());
        assert_eq!(pal[5], ColorRegister::gray(((5 * 255) >> 3) as u8));
        assert_eq!(pal[7], ColorRegister::gray(((7 * 255) >> 3) as u8));

        assert_eq!(ramp(1).extend().len(), 2);
        assert_eq!(ramp(256).extend().len(), 256);
        assert!(Palette::default().extend().is_empty());
    }

    #[test]
    fn extend_to_honors_plane_depth() {
        let pal = ramp(4).extend_to(5);
        assert_eq!(pal.len(), 32);
        assert_eq!(pal.bits(), 5);
        assert_eq!(Palette::default().extend_to(1).len(), 2);
    }

    #[test]
    fn truncated_cmap_is_zero_filled() {
        let pal = Palette::from_cmap(&[1, 2, 3, 4, 5]);
        assert_eq!(pal.len(), 2);
        assert_eq!(pal[1], ColorRegister::new(4, 5, 0));
    }

    #[test]
    fn ocs_detection_and_fix() {
        let mut pal = Palette::from_cmap(&[0xF0, 0x80, 0x00, 0x10, 0x20, 0x30]);
        assert!(pal.is_ocs());
        pal.fix_ocs();
        assert_eq!(pal[0], ColorRegister::new(0xFF, 0x88, 0x00));
        assert_eq!(pal[1], ColorRegister::new(0x11, 0x22, 0x33));
        assert!(!pal.is_ocs());

        let big = Palette::new(alloc::vec![ColorRegister::new(0x10, 0, 0); 33]);
        assert!(!big.is_ocs());
    }

    #[test]
    fn ehb_halves_the_first_32() {
        let mut pal = Palette::new(alloc::vec![ColorRegister::new(200, 101, 3); 32]);
        pal.make_ehb();
        assert_eq!(pal.len(), 64);
        assert_eq!(pal.bits(), 6);
        assert_eq!(pal[40], ColorRegister::new(100, 50, 1));
    }

    #[test]
    fn nearest_prefers_exact_then_first() {
        let pal = Palette::new(alloc::vec![
            ColorRegister::new(0, 0, 0),
            ColorRegister::new(255, 255, 255),
            ColorRegister::new(10, 10, 10),
            ColorRegister::new(10, 10, 10),
        ]);
        assert_eq!(pal.nearest_color(10, 10, 10), 2);
        assert_eq!(pal.nearest_color(250, 240, 255), 1);
        assert_eq!(pal.nearest_color(12, 9, 11), 2);
    }

    #[test]
    fn distance_weights_green_most() {
        let base = ColorRegister::new(128, 128, 128);
        let dg = color_distance(128, 138, 128, base);
        let dr = color_distance(138, 128, 128, base);
        let db = color_distance(128, 128, 138, base);
        assert!(dg > dr && dg > db);
    }
}
