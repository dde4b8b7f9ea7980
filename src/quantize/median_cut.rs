//! Modified median cut, after Dan S. Bloomberg's "Color quantization using
//! modified median cut".

use alloc::collections::BinaryHeap;
use alloc::vec::Vec;

use super::{Histogram, Quantizer};
use crate::palette::{ColorRegister, Palette};

/// A box of color space and the histogram entries inside it.
#[derive(Debug, Clone)]
struct Bin {
    mins: [u8; 3],
    maxs: [u8; 3],
    /// Channel the entries are currently sorted on.
    sort_dim: Option<usize>,
    count: u32,
    begin: usize,
    end: usize,
}

impl Bin {
    #[inline]
    fn dim(&self, i: usize) -> u32 {
        u32::from(self.maxs[i] - self.mins[i]) + 1
    }

    /// The longest side. The lowest channel wins ties.
    fn longest_dim(&self) -> usize {
        let mut best = 0;
        for i in 1..3 {
            if self.dim(i) > self.dim(best) {
                best = i;
            }
        }
        best
    }

    fn volume(&self) -> u64 {
        (0..3).map(|i| u64::from(self.dim(i))).product()
    }

    fn can_split(&self) -> bool {
        self.count >= 2 && (0..3).any(|i| self.dim(i) > 1)
    }

    fn sort(&mut self, histo: &mut Histogram, dim: usize) {
        if self.sort_dim != Some(dim) {
            histo.entries_mut()[self.begin..self.end].sort_unstable_by_key(|e| e.component[dim]);
            self.sort_dim = Some(dim);
        }
    }

    /// Splits off the part of this bin at or above `split_at` on channel `dim`.
    fn split(&mut self, histo: &Histogram, dim: usize, split_at: u8) -> Bin {
        debug_assert!(self.mins[dim] < split_at && split_at <= self.maxs[dim]);
        let mut upper = Bin {
            mins: self.mins,
            maxs: self.maxs,
            sort_dim: self.sort_dim,
            count: 0,
            begin: self.end,
            end: self.end,
        };
        upper.mins[dim] = split_at;
        self.maxs[dim] = split_at - 1;

        let entries = &histo.entries()[self.begin..self.end];
        let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
            return upper;
        };
        if split_at <= first.component[dim] {
            // everything moves up
            upper.begin = self.begin;
            upper.count = self.count;
            self.end = self.begin;
            self.count = 0;
            return upper;
        }
        if split_at > last.component[dim] {
            return upper;
        }

        let at = self.begin + entries.partition_point(|e| e.component[dim] < split_at);
        upper.begin = at;
        self.end = at;
        // count whichever side has fewer entries
        if self.end - self.begin > upper.end - upper.begin {
            upper.count = histo.entries()[upper.begin..upper.end]
                .iter()
                .map(|e| e.count)
                .sum();
            self.count -= upper.count;
        } else {
            let count: u32 = histo.entries()[self.begin..self.end]
                .iter()
                .map(|e| e.count)
                .sum();
            upper.count = self.count - count;
            self.count = count;
        }
        upper
    }

    /// Average of the pixels inside, or the center of the box when empty.
    fn color(&self, histo: &Histogram) -> ColorRegister {
        if self.count == 0 {
            let center = |i: usize| ((u16::from(self.mins[i]) + u16::from(self.maxs[i]) + 1) / 2) as u8;
            return ColorRegister::new(center(0), center(1), center(2));
        }
        let mut total = [0u64; 3];
        for e in &histo.entries()[self.begin..self.end] {
            for (t, &c) in total.iter_mut().zip(&e.component) {
                *t += u64::from(c) * u64::from(e.count);
            }
        }
        let count = u64::from(self.count);
        ColorRegister::new(
            (total[0] / count) as u8,
            (total[1] / count) as u8,
            (total[2] / count) as u8,
        )
    }
}

/// Median cut quantizer.
///
/// Bins are split by population until three quarters of the palette is used,
/// then by population times volume so sparse but wide areas of color space
/// get entries too.
#[derive(Debug, Clone)]
pub struct MedianCut {
    histo: Histogram,
    max_colors: usize,
}

impl MedianCut {
    /// Creates a quantizer producing at most `max_colors` colors.
    #[must_use]
    pub fn new(max_colors: usize) -> Self {
        Self {
            histo: Histogram::new(),
            max_colors: max_colors.clamp(1, Palette::MAX_COLORS),
        }
    }

    /// The colors counted so far.
    #[must_use]
    pub fn histogram(&self) -> &Histogram {
        &self.histo
    }

    fn cut(&mut self) -> Vec<Bin> {
        let pixels = u32::try_from(self.histo.pixel_count()).unwrap_or(u32::MAX);
        // Starting from the whole color space lets dithering reach the
        // corners; empty bins there still get a color.
        let mut bins = vec![Bin {
            mins: [0; 3],
            maxs: [255; 3],
            sort_dim: None,
            count: pixels,
            begin: 0,
            end: self.histo.len(),
        }];
        let reprio_at = self.max_colors * 3 / 4;
        let mut by_volume = false;
        let priority = |bin: &Bin, by_volume: bool| {
            let pop = u64::from(bin.count);
            if by_volume {
                pop * bin.volume()
            } else {
                pop
            }
        };
        let mut queue = BinaryHeap::new();
        queue.push((priority(&bins[0], by_volume), 0usize));

        while bins.len() < self.max_colors {
            let Some((_, index)) = queue.pop() else {
                break;
            };
            let bin = &mut bins[index];
            let dim = bin.longest_dim();
            bin.sort(&mut self.histo, dim);

            // median by population, not by entry
            let entries = &self.histo.entries()[bin.begin..bin.end];
            let stop = bin.count / 2;
            let mut seen = 0;
            let mut i = 0;
            while seen < stop && i < entries.len() {
                seen += entries[i].count;
                i += 1;
            }
            let median = i32::from(entries[i.saturating_sub(1)].component[dim]) + 1;
            let (lo, hi) = (i32::from(bin.mins[dim]), i32::from(bin.maxs[dim]));
            let mut split_at = if median - lo > hi - median {
                (median + lo) / 2
            } else {
                (median + hi) / 2
            };
            if split_at == lo {
                split_at += 1;
            }
            log::debug!(
                "split bin {index} (pop {}) at {split_at} on channel {dim}",
                bin.count
            );
            let upper = bin.split(&self.histo, dim, split_at as u8);
            let upper_index = bins.len();
            bins.push(upper);

            if bins.len() != reprio_at {
                for i in [index, upper_index] {
                    if bins[i].can_split() {
                        queue.push((priority(&bins[i], by_volume), i));
                    }
                }
            } else {
                by_volume = true;
                queue.clear();
                for (i, bin) in bins.iter().enumerate() {
                    if bin.can_split() {
                        queue.push((priority(bin, by_volume), i));
                    }
                }
            }
        }
        bins
    }
}

impl Quantizer for MedianCut {
    fn add_pixels(&mut self, rgba: &[u8]) {
        self.histo.add_pixels(rgba);
    }

    fn palette(&mut self) -> Palette {
        if self.histo.len() <= self.max_colors {
            return self.histo.to_palette();
        }
        let bins = self.cut();
        Palette::new(bins.iter().map(|bin| bin.color(&self.histo)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(n: usize, seed: u32) -> Vec<u8> {
        let mut state = seed | 1;
        let mut out = Vec::with_capacity(n * 4);
        for _ in 0..n {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            out.extend_from_slice(&[state as u8, (state >> 8) as u8, (state >> 16) as u8, 0xFF]);
        }
        out
    }

    #[test]
    fn few_colors_pass_through() {
        let mut mc = MedianCut::new(8);
        mc.add_pixels(&[10, 20, 30, 255, 1, 1, 1, 255, 10, 20, 30, 255]);
        let pal = mc.palette();
        assert_eq!(pal.len(), 2);
        assert_eq!(pal[0], ColorRegister::new(10, 20, 30));
        assert_eq!(pal[1], ColorRegister::new(1, 1, 1));
    }

    #[test]
    fn many_colors_are_cut_down() {
        for max in [2usize, 16, 100, 256] {
            let mut mc = MedianCut::new(max);
            mc.add_pixels(&noise(5000, max as u32));
            let pal = mc.palette();
            assert!(pal.len() <= max && !pal.is_empty(), "max={max} got {}", pal.len());
        }
    }

    #[test]
    fn bins_partition_the_histogram() {
        let mut mc = MedianCut::new(64);
        mc.add_pixels(&noise(3000, 99));
        let total = mc.histogram().pixel_count();
        let bins = mc.cut();
        assert!(bins.len() <= 64);
        let mut counted = 0u64;
        for bin in &bins {
            let entries = &mc.histogram().entries()[bin.begin..bin.end];
            let sum: u64 = entries.iter().map(|e| u64::from(e.count)).sum();
            assert_eq!(sum, u64::from(bin.count));
            counted += sum;
            for e in entries {
                for i in 0..3 {
                    assert!(bin.mins[i] <= e.component[i] && e.component[i] <= bin.maxs[i]);
                }
            }
            let c = bin.color(mc.histogram()).channels();
            for i in 0..3 {
                assert!(bin.mins[i] <= c[i] && c[i] <= bin.maxs[i], "{bin:?} {c:?}");
            }
        }
        assert_eq!(counted, total);
    }

    #[test]
    fn single_color_flood_stops_early() {
        let mut mc = MedianCut::new(4);
        let mut px = vec![0u8; 0];
        for i in 0..5u8 {
            px.extend_from_slice(&[i * 50, 0, 0, 255]);
        }
        for _ in 0..100 {
            px.extend_from_slice(&[7, 7, 7, 255]);
        }
        mc.add_pixels(&px);
        let pal = mc.palette();
        assert!(pal.len() <= 4);
    }
}
