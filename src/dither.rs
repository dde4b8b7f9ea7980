//! Mapping true color pixels onto a palette.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::palette::Palette;

/// One neighbor of an error diffusion kernel.
#[derive(Debug, Copy, Clone)]
struct Tap {
    dx: i8,
    dy: u8,
    /// Share of the error, 16.16 fixed point.
    weight: i32,
}

const fn tap(dx: i8, dy: u8, num: i32, den: i32) -> Tap {
    Tap {
        dx,
        dy,
        weight: num * 65536 / den,
    }
}

const FLOYD_STEINBERG: [Tap; 4] = [
    tap(1, 0, 7, 16),
    tap(-1, 1, 3, 16),
    tap(0, 1, 5, 16),
    tap(1, 1, 1, 16),
];

const JARVIS_JUDICE_NINKE: [Tap; 12] = [
    tap(1, 0, 7, 48),
    tap(2, 0, 5, 48),
    tap(-2, 1, 3, 48),
    tap(-1, 1, 5, 48),
    tap(0, 1, 7, 48),
    tap(1, 1, 5, 48),
    tap(2, 1, 3, 48),
    tap(-2, 2, 1, 48),
    tap(-1, 2, 3, 48),
    tap(0, 2, 5, 48),
    tap(1, 2, 3, 48),
    tap(2, 2, 1, 48),
];

const STUCKI: [Tap; 12] = [
    tap(1, 0, 8, 42),
    tap(2, 0, 4, 42),
    tap(-2, 1, 2, 42),
    tap(-1, 1, 4, 42),
    tap(0, 1, 8, 42),
    tap(1, 1, 4, 42),
    tap(2, 1, 2, 42),
    tap(-2, 2, 1, 42),
    tap(-1, 2, 2, 42),
    tap(0, 2, 4, 42),
    tap(1, 2, 2, 42),
    tap(2, 2, 1, 42),
];

// Atkinson only passes on 3/4 of the error.
const ATKINSON: [Tap; 6] = [
    tap(1, 0, 1, 8),
    tap(2, 0, 1, 8),
    tap(-1, 1, 1, 8),
    tap(0, 1, 1, 8),
    tap(1, 1, 1, 8),
    tap(0, 2, 1, 8),
];

const BURKES: [Tap; 7] = [
    tap(1, 0, 8, 32),
    tap(2, 0, 4, 32),
    tap(-2, 1, 2, 32),
    tap(-1, 1, 4, 32),
    tap(0, 1, 8, 32),
    tap(1, 1, 4, 32),
    tap(2, 1, 2, 32),
];

const SIERRA3: [Tap; 10] = [
    tap(1, 0, 5, 32),
    tap(2, 0, 3, 32),
    tap(-2, 1, 2, 32),
    tap(-1, 1, 4, 32),
    tap(0, 1, 5, 32),
    tap(1, 1, 4, 32),
    tap(2, 1, 2, 32),
    tap(-1, 2, 2, 32),
    tap(0, 2, 3, 32),
    tap(1, 2, 2, 32),
];

const SIERRA2: [Tap; 7] = [
    tap(1, 0, 4, 16),
    tap(2, 0, 3, 16),
    tap(-2, 1, 1, 16),
    tap(-1, 1, 2, 16),
    tap(0, 1, 3, 16),
    tap(1, 1, 2, 16),
    tap(2, 1, 1, 16),
];

const SIERRA_LITE: [Tap; 3] = [tap(1, 0, 2, 4), tap(-1, 1, 1, 4), tap(0, 1, 1, 4)];

/// How true color images are reduced to their palette.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DitherMode {
    /// Nearest color, no dithering.
    #[default]
    None,
    /// Floyd-Steinberg.
    FloydSteinberg,
    /// Jarvis, Judice and Ninke.
    JarvisJudiceNinke,
    /// Stucki.
    Stucki,
    /// Atkinson.
    Atkinson,
    /// Burkes.
    Burkes,
    /// Three-row Sierra.
    Sierra3,
    /// Two-row Sierra.
    Sierra2,
    /// Sierra Lite.
    SierraLite,
}

impl DitherMode {
    /// Every mode, in selector order.
    pub const ALL: [DitherMode; 9] = [
        Self::None,
        Self::FloydSteinberg,
        Self::JarvisJudiceNinke,
        Self::Stucki,
        Self::Atkinson,
        Self::Burkes,
        Self::Sierra3,
        Self::Sierra2,
        Self::SierraLite,
    ];

    /// Maps a numeric selector (0 for none, 1 to 8 for the kernels) to a mode.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    fn kernel(self) -> &'static [Tap] {
        match self {
            Self::None => &[],
            Self::FloydSteinberg => &FLOYD_STEINBERG,
            Self::JarvisJudiceNinke => &JARVIS_JUDICE_NINKE,
            Self::Stucki => &STUCKI,
            Self::Atkinson => &ATKINSON,
            Self::Burkes => &BURKES,
            Self::Sierra3 => &SIERRA3,
            Self::Sierra2 => &SIERRA2,
            Self::SierraLite => &SIERRA_LITE,
        }
    }

    /// Creates a palettizer for rows of `width` pixels.
    #[must_use]
    pub fn palettizer<'a>(self, palette: &'a Palette, width: usize) -> Box<dyn Palettizer + 'a> {
        match self {
            Self::None => Box::new(NoDither::new(palette)),
            _ => Box::new(ErrorDiffusion::new(palette, self.kernel(), width)),
        }
    }
}

/// Converts rows of RGBA pixels to palette indices, top to bottom.
pub trait Palettizer {
    /// Converts one row. `out` receives one index per 4-byte pixel of `rgba`.
    fn palettize_row(&mut self, rgba: &[u8], out: &mut [u8]);

    /// Moves `rows` rows down. Must be called between rows.
    fn advance_rows(&mut self, _rows: usize) {}
}

/// Plain nearest color matching.
#[derive(Debug)]
pub struct NoDither<'a> {
    palette: &'a Palette,
}

impl<'a> NoDither<'a> {
    /// Matches against `palette`.
    #[must_use]
    pub fn new(palette: &'a Palette) -> Self {
        Self { palette }
    }
}

impl Palettizer for NoDither<'_> {
    fn palettize_row(&mut self, rgba: &[u8], out: &mut [u8]) {
        for (px, o) in rgba.chunks_exact(4).zip(out) {
            *o = self.palette.nearest_color(px[0], px[1], px[2]);
        }
    }
}

/// Error diffusion with a fixed kernel.
///
/// Keeps accumulated error for the current row and the two below it.
#[derive(Debug)]
pub struct ErrorDiffusion<'a> {
    palette: &'a Palette,
    kernel: &'static [Tap],
    rows: [Vec<[i32; 3]>; 3],
}

impl<'a> ErrorDiffusion<'a> {
    fn new(palette: &'a Palette, kernel: &'static [Tap], width: usize) -> Self {
        Self {
            palette,
            kernel,
            rows: [
                vec![[0; 3]; width],
                vec![[0; 3]; width],
                vec![[0; 3]; width],
            ],
        }
    }

    /// Total weight of the kernel, 16.16 fixed point.
    #[cfg(test)]
    fn weight_sum(&self) -> i32 {
        self.kernel.iter().map(|t| t.weight).sum()
    }
}

impl Palettizer for ErrorDiffusion<'_> {
    fn palettize_row(&mut self, rgba: &[u8], out: &mut [u8]) {
        let width = self.rows[0].len();
        for (x, (px, o)) in rgba.chunks_exact(4).zip(out).enumerate().take(width) {
            let err = self.rows[0][x];
            let mut c = [0i32; 3];
            for i in 0..3 {
                // error never pushes a channel outside 0..=255
                c[i] = (i32::from(px[i]) + (err[i] >> 16)).clamp(0, 255);
            }
            let index = self.palette.nearest_color(c[0] as u8, c[1] as u8, c[2] as u8);
            *o = index;
            let chosen = self.palette.get(usize::from(index)).unwrap_or_default().channels();
            let residual = [
                c[0] - i32::from(chosen[0]),
                c[1] - i32::from(chosen[1]),
                c[2] - i32::from(chosen[2]),
            ];
            for tap in self.kernel {
                let nx = x as isize + isize::from(tap.dx);
                if nx < 0 || nx >= width as isize {
                    continue;
                }
                let cell = &mut self.rows[usize::from(tap.dy)][nx as usize];
                for i in 0..3 {
                    cell[i] += residual[i] * tap.weight;
                }
            }
        }
    }

    fn advance_rows(&mut self, rows: usize) {
        let rows = rows.min(3);
        self.rows.rotate_left(rows);
        for row in &mut self.rows[3 - rows..] {
            row.fill([0; 3]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::ColorRegister;

    fn bw() -> Palette {
        Palette::new(vec![ColorRegister::gray(0), ColorRegister::gray(255)])
    }

    #[test]
    fn selectors_map_to_modes() {
        assert_eq!(DitherMode::from_index(0), Some(DitherMode::None));
        assert_eq!(DitherMode::from_index(1), Some(DitherMode::FloydSteinberg));
        assert_eq!(DitherMode::from_index(8), Some(DitherMode::SierraLite));
        assert_eq!(DitherMode::from_index(9), None);
    }

    #[test]
    fn kernels_never_amplify_error() {
        for mode in DitherMode::ALL {
            let sum: i32 = mode.kernel().iter().map(|t| t.weight).sum();
            assert!(sum <= 65536, "{mode:?}");
            assert!(mode.kernel().iter().all(|t| t.dy <= 2 && t.dx.abs() <= 2));
        }
    }

    #[test]
    fn diffused_error_is_bounded() {
        // saturated input on palettes without black or white leaves a large
        // residual at every pixel
        let palettes = [
            Palette::new(vec![ColorRegister::gray(128)]),
            Palette::new(vec![ColorRegister::gray(64), ColorRegister::gray(192)]),
        ];
        let (width, height) = (9, 12);
        let image: Vec<Vec<u8>> = (0..height)
            .map(|y| {
                (0..width)
                    .flat_map(|x| {
                        let v = if (x * 7 + y * 3) % 5 < 2 { 255 } else { 0 };
                        [v, v, v, 255]
                    })
                    .collect()
            })
            .collect();
        for (pal, mode) in palettes
            .iter()
            .flat_map(|pal| DitherMode::ALL.into_iter().skip(1).map(move |mode| (pal, mode)))
        {
            let mut ed = ErrorDiffusion::new(pal, mode.kernel(), width);
            let limit = ed.weight_sum() * 255;
            let check = |ed: &ErrorDiffusion<'_>| {
                for cell in ed.rows.iter().flatten() {
                    assert!(cell.iter().all(|c| c.abs() <= limit), "{mode:?}: {cell:?}");
                }
            };
            let mut first = Vec::new();
            for row in &image {
                let mut out = vec![0u8; width];
                ed.palettize_row(row, &mut out);
                check(&ed);
                ed.advance_rows(1);
                check(&ed);
                first.push(out);
            }

            let mut p = mode.palettizer(pal, width);
            for (row, expected) in image.iter().zip(&first) {
                let mut out = vec![0u8; width];
                p.palettize_row(row, &mut out);
                p.advance_rows(1);
                assert_eq!(&out, expected, "{mode:?}");
            }
        }
    }

    #[test]
    fn mid_gray_dithers_to_a_mix() {
        let pal = bw();
        let width = 16;
        let row = [128u8, 128, 128, 255].repeat(width);
        for mode in DitherMode::ALL.into_iter().skip(1) {
            let mut p = mode.palettizer(&pal, width);
            let mut ones = 0;
            for _ in 0..16 {
                let mut out = vec![0u8; width];
                p.palettize_row(&row, &mut out);
                p.advance_rows(1);
                ones += out.iter().filter(|&&i| i == 1).count();
            }
            assert!(ones > 0 && ones < 256, "{mode:?}: {ones}");
        }
        let mut p = DitherMode::None.palettizer(&pal, width);
        let mut out = vec![0u8; width];
        p.palettize_row(&row, &mut out);
        assert!(out.iter().all(|&i| i == out[0]));
    }

    #[test]
    fn advancing_clears_rows() {
        let pal = bw();
        let mut ed = ErrorDiffusion::new(&pal, &FLOYD_STEINBERG, 3);
        ed.rows[1][0] = [5; 3];
        ed.rows[2][1] = [7; 3];
        ed.advance_rows(1);
        assert_eq!(ed.rows[0][0], [5; 3]);
        assert_eq!(ed.rows[1][1], [7; 3]);
        assert_eq!(ed.rows[2], vec![[0; 3]; 3]);
        ed.advance_rows(5);
        assert!(ed.rows.iter().all(|r| r.iter().all(|c| *c == [0; 3])));
    }
}
