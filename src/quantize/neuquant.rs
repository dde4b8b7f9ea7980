//! NeuQuant neural-net quantization, after Anthony Dekker, "Kohonen neural
//! networks for optimal colour quantization", Network: Computation in Neural
//! Systems, Vol. 5 (1994), pp 351-367.
//!
//! Training samples come from the color histogram instead of striding through
//! the image, so the result does not depend on image dimensions.

use alloc::vec::Vec;

use super::{Histogram, Quantizer};
use crate::palette::{ColorRegister, Palette};

/// Learning cycles.
const NCYCLES: usize = 100;
/// Reserved neurons: black, white and the background color.
const SPECIALS: usize = 3;
const BG_COLOR: usize = SPECIALS - 1;

const RADIUS_BIAS_SHIFT: u32 = 6;
const RADIUS_BIAS: i32 = 1 << RADIUS_BIAS_SHIFT;
/// Radius shrinks by 1/30 each cycle.
const RADIUS_DEC: i32 = 30;
/// Learning rate shrinks by 1/30 each cycle.
const ALPHA_DEC: i32 = 30;

const ALPHA_BIAS_SHIFT: u32 = 10;
const INIT_ALPHA: i32 = 1 << ALPHA_BIAS_SHIFT;

const GAMMA: f64 = 1024.0;
const BETA: f64 = 1.0 / 1024.0;
const BETA_GAMMA: f64 = BETA * GAMMA;

#[inline]
fn abs(x: f64) -> f64 {
    if x < 0.0 {
        -x
    } else {
        x
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// NeuQuant quantizer.
#[derive(Debug, Clone)]
pub struct NeuQuant {
    histo: Histogram,
    netsize: usize,
    network: Vec<[f64; 3]>,
    bias: Vec<f64>,
    freq: Vec<f64>,
    /// Trained colors as `[r, g, b]`, sorted on green once built.
    colormap: Vec<[i32; 3]>,
    /// First colormap entry for each green level.
    netindex: [usize; 256],
}

impl NeuQuant {
    /// Creates a quantizer producing `max_colors` colors (between 4 and 256).
    #[must_use]
    pub fn new(max_colors: usize) -> Self {
        let netsize = max_colors.clamp(SPECIALS + 1, Palette::MAX_COLORS);
        let mut nq = Self {
            histo: Histogram::new(),
            netsize,
            network: vec![[0.0; 3]; netsize],
            bias: vec![0.0; netsize],
            freq: vec![0.0; netsize],
            colormap: Vec::new(),
            netindex: [0; 256],
        };
        nq.setup();
        nq
    }

    fn setup(&mut self) {
        let netsize = self.netsize;
        self.network[0] = [0.0; 3];
        self.network[1] = [255.0; 3];
        let cut = (netsize - SPECIALS) as f64;
        for (i, n) in self.network.iter_mut().enumerate().skip(SPECIALS) {
            let level = 255.0 * (i - SPECIALS) as f64 / cut;
            *n = [level; 3];
        }
        self.freq.fill(1.0 / netsize as f64);
        self.bias.fill(0.0);
    }

    /// Training samples: every color repeated in proportion to its count,
    /// reduced by the common divisor of all counts, in a shuffled order.
    fn samples(&self) -> Vec<[u8; 3]> {
        let entries = self.histo.entries();
        let divisor = entries.iter().fold(0, |g, e| gcd(g, e.count)).max(1);
        let mut samples = Vec::new();
        for e in entries {
            for _ in 0..e.count / divisor {
                samples.push(e.component);
            }
        }
        // Fisher-Yates with a fixed xorshift so output is reproducible.
        let mut state = 0x2545_F491u32;
        for i in (1..samples.len()).rev() {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let j = state as usize % (i + 1);
            samples.swap(i, j);
        }
        samples
    }

    fn alter_single(&mut self, alpha: f64, i: usize, c: [f64; 3]) {
        for (n, c) in self.network[i].iter_mut().zip(c) {
            *n -= alpha * (*n - c);
        }
    }

    /// Moves the neurons within `rad` of `i` towards `c`, less the further away they are.
    fn alter_neigh(&mut self, alpha: f64, rad: i32, i: usize, c: [f64; 3]) {
        let i = i as i32;
        let lo = (i - rad).max(SPECIALS as i32 - 1);
        let hi = (i + rad).min(self.netsize as i32);
        let mut j = i + 1;
        let mut k = i - 1;
        let mut q = 0;
        let rad2 = f64::from(rad * rad);
        while j < hi || k > lo {
            let a = alpha * (rad2 - f64::from(q * q)) / rad2;
            q += 1;
            if j < hi {
                self.alter_single(a, j as usize, c);
                j += 1;
            }
            if k > lo {
                self.alter_single(a, k as usize, c);
                k -= 1;
            }
        }
    }

    /// Finds the closest neuron, updating the frequency bookkeeping, and
    /// returns the best one once frequently winning neurons are penalized.
    fn contest(&mut self, c: [f64; 3]) -> usize {
        let mut best_d = f64::MAX;
        let mut best_bias_d = f64::MAX;
        let mut best_pos = SPECIALS;
        let mut best_bias_pos = SPECIALS;
        for i in SPECIALS..self.netsize {
            let n = &self.network[i];
            let dist = abs(n[0] - c[0]) + abs(n[1] - c[1]) + abs(n[2] - c[2]);
            if dist < best_d {
                best_d = dist;
                best_pos = i;
            }
            let bias_dist = dist - self.bias[i];
            if bias_dist < best_bias_d {
                best_bias_d = bias_dist;
                best_bias_pos = i;
            }
            self.freq[i] -= BETA * self.freq[i];
            self.bias[i] += BETA_GAMMA * self.freq[i];
        }
        self.freq[best_pos] += BETA;
        self.bias[best_pos] -= BETA_GAMMA;
        best_bias_pos
    }

    fn special_find(&self, c: [f64; 3]) -> Option<usize> {
        self.network[..SPECIALS].iter().position(|n| *n == c)
    }

    fn learn(&mut self) {
        let samples = self.samples();
        let init_rad = (self.netsize / 8) as i32;
        let mut bias_radius = init_rad * RADIUS_BIAS;
        let mut alpha = INIT_ALPHA;
        let delta = (samples.len() / NCYCLES).max(1);
        let radius = |bias_radius: i32| match bias_radius >> RADIUS_BIAS_SHIFT {
            r if r <= 1 => 0,
            r => r,
        };
        let mut rad = radius(bias_radius);
        log::debug!(
            "NeuQuant learning: {} samples, {} colors, radius {rad}",
            samples.len(),
            self.netsize
        );

        for (i, s) in samples.iter().enumerate() {
            let c = [f64::from(s[0]), f64::from(s[1]), f64::from(s[2])];
            if i == 0 {
                self.network[BG_COLOR] = c;
            }
            let j = match self.special_find(c) {
                Some(j) => j,
                None => self.contest(c),
            };
            if j >= SPECIALS {
                let a = f64::from(alpha) / f64::from(INIT_ALPHA);
                self.alter_single(a, j, c);
                if rad > 0 {
                    self.alter_neigh(a, rad, j, c);
                }
            }
            if (i + 1) % delta == 0 {
                alpha -= alpha / ALPHA_DEC;
                bias_radius -= bias_radius / RADIUS_DEC;
                rad = radius(bias_radius);
            }
        }
    }

    /// Rounds the network to 8-bit colors.
    fn fix(&mut self) {
        self.colormap = self
            .network
            .iter()
            .map(|n| n.map(|v| ((0.5 + v) as i32).clamp(0, 255)))
            .collect();
    }

    /// Sorts the colormap on green and indexes where each green level starts.
    fn inx_build(&mut self) {
        let maxnetpos = self.netsize - 1;
        let mut previous = 0usize;
        let mut start = 0usize;
        for i in 0..self.netsize {
            let mut small_pos = i;
            let mut small_val = self.colormap[i][1];
            for j in i + 1..self.netsize {
                if self.colormap[j][1] < small_val {
                    small_pos = j;
                    small_val = self.colormap[j][1];
                }
            }
            self.colormap.swap(i, small_pos);
            let small_val = small_val as usize;
            if small_val != previous {
                self.netindex[previous] = (start + i) >> 1;
                for entry in &mut self.netindex[previous + 1..small_val] {
                    *entry = i;
                }
                previous = small_val;
                start = i;
            }
        }
        self.netindex[previous] = (start + maxnetpos) >> 1;
        for entry in &mut self.netindex[previous + 1..] {
            *entry = maxnetpos;
        }
    }

    /// Index of the trained color closest to `(r, g, b)` by L1 distance.
    ///
    /// Only meaningful after [`Quantizer::palette`] has run; indices refer to that palette.
    #[must_use]
    pub fn lookup(&self, r: u8, g: u8, b: u8) -> usize {
        let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
        let size = self.colormap.len() as isize;
        let mut best_d = 1000;
        let mut best = 0;
        let mut i = self.netindex[g as usize] as isize;
        let mut j = i - 1;
        while i < size || j >= 0 {
            if i < size {
                let p = self.colormap[i as usize];
                let dist = p[1] - g;
                if dist >= best_d {
                    i = size;
                } else {
                    let dist = dist.abs() + (p[0] - r).abs();
                    if dist < best_d {
                        let dist = dist + (p[2] - b).abs();
                        if dist < best_d {
                            best_d = dist;
                            best = i as usize;
                        }
                    }
                    i += 1;
                }
            }
            if j >= 0 {
                let p = self.colormap[j as usize];
                let dist = g - p[1];
                if dist >= best_d {
                    j = -1;
                } else {
                    let dist = dist.abs() + (p[0] - r).abs();
                    if dist < best_d {
                        let dist = dist + (p[2] - b).abs();
                        if dist < best_d {
                            best_d = dist;
                            best = j as usize;
                        }
                    }
                    j -= 1;
                }
            }
        }
        best
    }
}

impl Quantizer for NeuQuant {
    fn add_pixels(&mut self, rgba: &[u8]) {
        self.histo.add_pixels(rgba);
    }

    fn palette(&mut self) -> Palette {
        self.setup();
        self.learn();
        self.fix();
        self.inx_build();
        Palette::new(
            self.colormap
                .iter()
                .map(|c| ColorRegister::new(c[0] as u8, c[1] as u8, c[2] as u8))
                .collect(),
        )
    }
}
