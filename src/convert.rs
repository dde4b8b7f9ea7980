//! End-to-end conversion of an IFF file to GIF.

use alloc::fmt;
use alloc::vec::Vec;

use crate::chunky::ChunkyBitmap;
use crate::decoder::{Decoder, DecodingError, Decruncher};
use crate::dither::DitherMode;
use crate::encoder::{EncodingError, GifWriter, Sink};
use crate::io::Read;
use crate::planar::ModeFlags;
use crate::quantize::QuantizerKind;

/// Conversion error.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConvertError {
    /// The IFF input could not be decoded.
    Decoding(DecodingError),
    /// The GIF output could not be written.
    Encoding(EncodingError),
}

impl fmt::Display for ConvertError {
    #[cold]
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decoding(err) => err.fmt(fmt),
            Self::Encoding(err) => err.fmt(fmt),
        }
    }
}

impl core::error::Error for ConvertError {
    #[cold]
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Decoding(err) => Some(err),
            Self::Encoding(err) => Some(err),
        }
    }
}

impl From<DecodingError> for ConvertError {
    #[cold]
    fn from(err: DecodingError) -> Self {
        Self::Decoding(err)
    }
}

impl From<EncodingError> for ConvertError {
    #[cold]
    fn from(err: EncodingError) -> Self {
        Self::Encoding(err)
    }
}

/// Options for converting an IFF file.
///
#[cfg_attr(feature = "std", doc = "```rust")]
#[cfg_attr(not(feature = "std"), doc = "```rust,ignore")]
/// use iff2gif::{ConvertOptions, MemorySink};
///
/// # fn chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
/// #     let mut v = id.to_vec();
/// #     v.extend_from_slice(&(data.len() as u32).to_be_bytes());
/// #     v.extend_from_slice(data);
/// #     v
/// # }
/// # let bmhd = [0, 8, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 1, 1, 0, 8, 0, 1];
/// # let mut form = b"ILBM".to_vec();
/// # form.extend(chunk(b"BMHD", &bmhd));
/// # form.extend(chunk(b"CMAP", &[0, 0, 0, 255, 255, 255]));
/// # form.extend(chunk(b"BODY", &[0xAA, 0]));
/// # let ilbm = chunk(b"FORM", &form);
/// let mut options = ConvertOptions::new();
/// options.set_scale(2, 2);
/// let mut sink = MemorySink::default();
/// options.convert(&ilbm[..], &mut sink).unwrap();
/// assert_eq!(&sink.files[0][..6], b"GIF89a");
/// ```
#[derive(Clone)]
pub struct ConvertOptions<'a> {
    scale_x: usize,
    scale_y: usize,
    auto_aspect: bool,
    frame_rate: Option<u32>,
    clips: Vec<(u32, u32)>,
    solo: bool,
    dither: DitherMode,
    quantizer: QuantizerKind,
    decruncher: Option<&'a dyn Decruncher>,
}

impl fmt::Debug for ConvertOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertOptions")
            .field("scale_x", &self.scale_x)
            .field("scale_y", &self.scale_y)
            .field("auto_aspect", &self.auto_aspect)
            .field("frame_rate", &self.frame_rate)
            .field("clips", &self.clips)
            .field("solo", &self.solo)
            .field("dither", &self.dither)
            .field("quantizer", &self.quantizer)
            .field("decruncher", &self.decruncher.is_some())
            .finish()
    }
}

impl Default for ConvertOptions<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ConvertOptions<'a> {
    /// Creates options for a plain conversion: no scaling, every frame, one file.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scale_x: 1,
            scale_y: 1,
            auto_aspect: false,
            frame_rate: None,
            clips: Vec::new(),
            solo: false,
            dither: DitherMode::default(),
            quantizer: QuantizerKind::default(),
            decruncher: None,
        }
    }

    /// Scales every frame by whole factors. 0 counts as 1.
    pub fn set_scale(&mut self, x: usize, y: usize) {
        self.scale_x = x.max(1);
        self.scale_y = y.max(1);
    }

    /// Doubles one axis to make up for non-square Amiga pixels.
    ///
    /// Low resolution interlaced images are doubled horizontally, high
    /// resolution non-interlaced ones vertically.
    pub fn set_auto_aspect(&mut self, auto_aspect: bool) {
        self.auto_aspect = auto_aspect;
    }

    /// Overrides the tick rate of the animation's delays.
    pub fn set_frame_rate(&mut self, rate: Option<u32>) {
        self.frame_rate = rate;
    }

    /// Limits output to frames `first..=last`, counting from 1.
    ///
    /// Several ranges can be added; they are sorted and merged.
    pub fn add_clip(&mut self, first: u32, last: u32) {
        let (first, last) = if first <= last { (first, last) } else { (last, first) };
        self.clips.push((first.max(1), last.max(1)));
    }

    /// Writes each frame to its own file.
    pub fn set_solo(&mut self, solo: bool) {
        self.solo = solo;
    }

    /// Dithering used when true color frames are reduced to a palette.
    pub fn set_dither(&mut self, dither: DitherMode) {
        self.dither = dither;
    }

    /// Quantizer used for true color frames.
    pub fn set_quantizer(&mut self, quantizer: QuantizerKind) {
        self.quantizer = quantizer;
    }

    /// Unpacks PowerPacker compressed input.
    pub fn set_decruncher(&mut self, decruncher: &'a dyn Decruncher) {
        self.decruncher = Some(decruncher);
    }

    /// The clip ranges, sorted with overlapping and adjacent ranges merged.
    #[must_use]
    pub fn merged_clips(&self) -> Vec<(u32, u32)> {
        let mut clips = self.clips.clone();
        clips.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(clips.len());
        for (first, last) in clips {
            match merged.last_mut() {
                Some(prev) if first <= prev.1.saturating_add(1) => prev.1 = prev.1.max(last),
                _ => merged.push((first, last)),
            }
        }
        merged
    }

    fn aspect_scale(&self, mode: ModeFlags) -> (usize, usize) {
        let (mut x, mut y) = (self.scale_x, self.scale_y);
        if self.auto_aspect {
            match (mode.is_hires(), mode.is_lace()) {
                (false, true) => x *= 2,
                (true, false) => y *= 2,
                _ => {}
            }
        }
        (x, y)
    }

    /// Converts the IFF file in `reader`, writing GIFs to `sink`.
    ///
    /// Output is finished even when decoding fails part way, so frames
    /// decoded before the error are kept. The first error is returned.
    pub fn convert<R: Read, S: Sink>(&self, reader: R, sink: S) -> Result<(), ConvertError> {
        let mut decoder = Decoder::from_reader(reader, self.decruncher)?;
        let mut writer = GifWriter::new(sink);
        writer.set_solo(self.solo);
        writer.set_frame_rate(self.frame_rate);
        writer.set_clips(self.merged_clips());
        writer.set_dither(self.dither);
        writer.set_quantizer(self.quantizer);

        let mut scale = None;
        let result = loop {
            let bitmap = match decoder.next_frame() {
                Ok(Some(bitmap)) => bitmap,
                Ok(None) => break Ok(()),
                Err(err) => break Err(ConvertError::from(err)),
            };
            // The page size cannot change between frames.
            let (sx, sy) = *scale.get_or_insert_with(|| self.aspect_scale(bitmap.mode));
            let chunky = ChunkyBitmap::from_planar(bitmap, sx, sy);
            if let Err(err) = writer.add_frame(bitmap, chunky) {
                break Err(err.into());
            }
        };
        log::debug!("{} frames decoded", decoder.frames_decoded());
        let finished = writer.finish().map_err(ConvertError::from);
        result.and(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clips_are_merged() {
        let mut options = ConvertOptions::new();
        options.add_clip(10, 12);
        options.add_clip(3, 1);
        options.add_clip(2, 5);
        options.add_clip(6, 6);
        options.add_clip(20, 30);
        options.add_clip(25, 26);
        assert_eq!(options.merged_clips(), [(1, 6), (10, 12), (20, 30)]);
        assert!(ConvertOptions::new().merged_clips().is_empty());
    }

    #[test]
    fn auto_aspect() {
        let mut options = ConvertOptions::new();
        options.set_scale(0, 3);
        assert_eq!(options.aspect_scale(ModeFlags(ModeFlags::LACE)), (1, 3));
        options.set_auto_aspect(true);
        assert_eq!(options.aspect_scale(ModeFlags(ModeFlags::LACE)), (2, 3));
        assert_eq!(options.aspect_scale(ModeFlags(ModeFlags::HIRES)), (1, 6));
        assert_eq!(
            options.aspect_scale(ModeFlags(ModeFlags::HIRES | ModeFlags::LACE)),
            (1, 3)
        );
        assert_eq!(options.aspect_scale(ModeFlags::default()), (1, 3));
    }

    #[test]
    fn error_cast() {
        use alloc::boxed::Box;
        use crate::decoder::DecodingFormatError;
        let _: Box<dyn core::error::Error> =
            ConvertError::from(DecodingError::from(DecodingFormatError::NotIff)).into();
    }
}
