//! Reduction of true color images to a palette.
//!
//! A [`Quantizer`] is fed RGBA pixels (possibly from several calls) and then
//! asked for a palette. Mapping pixels onto that palette is the job of the
//! [`dither`](crate::dither) module.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::palette::{ColorRegister, Palette};

mod median_cut;
mod neuquant;

pub use self::median_cut::MedianCut;
pub use self::neuquant::NeuQuant;

/// Builds a palette from accumulated pixels.
pub trait Quantizer {
    /// Accumulates RGBA pixels, 4 bytes each. Alpha is ignored.
    fn add_pixels(&mut self, rgba: &[u8]);

    /// Computes a palette for everything added so far.
    fn palette(&mut self) -> Palette;
}

/// Available quantization algorithms.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QuantizerKind {
    /// Dan Bloomberg's modified median cut.
    MedianCut,
    /// Anthony Dekker's neural network quantizer.
    #[default]
    NeuQuant,
}

impl QuantizerKind {
    /// Creates a quantizer producing at most `max_colors` colors (capped at 256).
    #[must_use]
    pub fn build(self, max_colors: usize) -> Box<dyn Quantizer> {
        let max_colors = max_colors.min(Palette::MAX_COLORS);
        match self {
            Self::MedianCut => Box::new(MedianCut::new(max_colors)),
            Self::NeuQuant => Box::new(NeuQuant::new(max_colors)),
        }
    }
}

/// One distinct color and how many pixels have it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HistEntry {
    /// Red, green and blue.
    pub component: [u8; 3],
    /// Number of pixels.
    pub count: u32,
}

impl HistEntry {
    /// The entry's color.
    #[inline]
    #[must_use]
    pub fn color(&self) -> ColorRegister {
        ColorRegister::from(self.component)
    }
}

/// The distinct colors of an image with their pixel counts.
///
/// Entries stay in the order their colors were first seen.
#[derive(Debug, Clone)]
pub struct Histogram {
    entries: Vec<HistEntry>,
    index: BTreeMap<u32, usize>,
    mins: [u8; 3],
    maxs: [u8; 3],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    /// An empty histogram.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: BTreeMap::new(),
            mins: [u8::MAX; 3],
            maxs: [0; 3],
        }
    }

    /// Counts the colors of RGBA pixels.
    pub fn add_pixels(&mut self, rgba: &[u8]) {
        for px in rgba.chunks_exact(4) {
            let component = [px[0], px[1], px[2]];
            let key = ColorRegister::from(component).to_u32();
            match self.index.get(&key) {
                Some(&at) => self.entries[at].count += 1,
                None => {
                    self.index.insert(key, self.entries.len());
                    self.entries.push(HistEntry {
                        component,
                        count: 1,
                    });
                }
            }
            for i in 0..3 {
                self.mins[i] = self.mins[i].min(component[i]);
                self.maxs[i] = self.maxs[i].max(component[i]);
            }
        }
    }

    /// Number of distinct colors.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` before any pixel was added.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[HistEntry] {
        &self.entries
    }

    /// The entries, mutably. Reordering them is allowed; the color index is
    /// not consulted again once quantization starts.
    #[inline]
    pub(crate) fn entries_mut(&mut self) -> &mut [HistEntry] {
        &mut self.entries
    }

    /// Smallest and largest value seen per channel, `None` when empty.
    #[must_use]
    pub fn bounds(&self) -> Option<([u8; 3], [u8; 3])> {
        (!self.is_empty()).then_some((self.mins, self.maxs))
    }

    /// Total number of pixels counted.
    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.count)).sum()
    }

    /// One palette entry per distinct color, in first-seen order.
    #[must_use]
    pub fn to_palette(&self) -> Palette {
        Palette::new(self.entries.iter().map(HistEntry::color).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba(colors: &[[u8; 3]]) -> Vec<u8> {
        colors.iter().flat_map(|c| [c[0], c[1], c[2], 0xFF]).collect()
    }

    #[test]
    fn histogram_counts_in_first_seen_order() {
        let mut histo = Histogram::new();
        histo.add_pixels(&rgba(&[[9, 9, 9], [1, 2, 3], [9, 9, 9]]));
        histo.add_pixels(&rgba(&[[1, 2, 3], [0, 200, 0]]));
        assert_eq!(histo.len(), 3);
        assert_eq!(histo.entries()[0].component, [9, 9, 9]);
        assert_eq!(histo.entries()[0].count, 2);
        assert_eq!(histo.entries()[1].count, 2);
        assert_eq!(histo.pixel_count(), 5);
        assert_eq!(histo.bounds(), Some(([0, 2, 0], [9, 200, 9])));
        assert_eq!(histo.to_palette()[2], ColorRegister::new(0, 200, 0));
    }

    #[test]
    fn alpha_does_not_split_colors() {
        let mut histo = Histogram::new();
        histo.add_pixels(&[5, 6, 7, 0, 5, 6, 7, 255]);
        assert_eq!(histo.len(), 1);
    }

    #[test]
    fn kinds_build_working_quantizers() {
        for kind in [QuantizerKind::MedianCut, QuantizerKind::NeuQuant] {
            let mut quant = kind.build(16);
            quant.add_pixels(&rgba(&[[255, 0, 0], [0, 0, 255]]));
            let pal = quant.palette();
            assert!(!pal.is_empty() && pal.len() <= 16, "{kind:?}");
        }
    }
}
