//! # GIF writer
//!
//! Turns a sequence of decoded frames into GIF89a. Each frame only stores the
//! rectangle that changed since the one before, with unchanged pixels turned
//! transparent when that compresses better.

use alloc::fmt;
use alloc::vec::Vec;

use crate::chunky::ChunkyBitmap;
use crate::dither::DitherMode;
use crate::io::{self, Write};
use crate::lzw::CodeStream;
use crate::palette::Palette;
use crate::planar::PlanarBitmap;
use crate::quantize::QuantizerKind;
use crate::queue::FrameQueue;
use crate::traits::WriteBytesExt;

/// The image has incorrect properties, making it impossible to encode as a gif.
#[derive(Debug)]
#[non_exhaustive]
pub enum EncodingFormatError {
    /// The image has too many colors.
    TooManyColors,
    /// The image has no color palette which is required.
    MissingColorPalette,
    /// The image is larger than 65535 pixels on a side.
    TooLarge,
}

impl core::error::Error for EncodingFormatError {}
impl fmt::Display for EncodingFormatError {
    #[cold]
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyColors => write!(fmt, "the image has too many colors"),
            Self::MissingColorPalette => write!(
                fmt,
                "the GIF format requires a color palette but none was given"
            ),
            Self::TooLarge => write!(fmt, "the image is too large for GIF"),
        }
    }
}

/// Encoding error.
#[derive(Debug)]
#[non_exhaustive]
pub enum EncodingError {
    /// Returned if the to image is not encodable as a gif.
    Format(EncodingFormatError),
    /// Wraps an I/O error.
    Io(io::IoError),
    /// An earlier write failed and the output was closed.
    WriterClosed,
}

impl fmt::Display for EncodingError {
    #[cold]
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => err.fmt(fmt),
            Self::Format(err) => err.fmt(fmt),
            Self::WriterClosed => fmt.write_str("the output was closed after a failed write"),
        }
    }
}

impl core::error::Error for EncodingError {
    #[cold]
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Format(err) => Some(err),
            Self::WriterClosed => None,
        }
    }
}

impl From<io::IoError> for EncodingError {
    #[cold]
    fn from(err: io::IoError) -> Self {
        Self::Io(err)
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for EncodingError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        Self::Io(io::IoError::from(err))
    }
}

impl From<EncodingFormatError> for EncodingError {
    #[cold]
    fn from(err: EncodingFormatError) -> Self {
        Self::Format(err)
    }
}

/// Known GIF block labels.
#[derive(Debug, Copy, Clone)]
#[repr(u8)]
enum Block {
    Image = 0x2C,
    Extension = 0x21,
    Trailer = 0x3B,
}

/// Known GIF extension labels.
#[derive(Debug, Copy, Clone)]
#[repr(u8)]
enum Extension {
    Control = 0xF9,
    Application = 0xFF,
}

/// What a decoder does with a frame before drawing the next one.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DisposalMethod {
    /// Decoder is not required to take any action.
    #[default]
    Any = 0,
    /// Do not dispose.
    Keep = 1,
    /// Restore the frame's area to the background color.
    Background = 2,
    /// Restore to the previous frame.
    Previous = 3,
}

/// Where GIF files go.
///
/// Normally one file is created for the whole animation. In solo mode every
/// frame gets its own file.
pub trait Sink {
    /// The writer for one file.
    type Output: Write;

    /// Creates the file for the whole animation (`None`) or for frame
    /// `frame`, counting from 1.
    fn create(&mut self, frame: Option<u32>) -> io::Result<Self::Output>;

    /// Called with a completely written file.
    fn finish(&mut self, output: Self::Output) -> io::Result<()> {
        drop(output);
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    type Output = S::Output;

    #[inline]
    fn create(&mut self, frame: Option<u32>) -> io::Result<Self::Output> {
        (**self).create(frame)
    }

    #[inline]
    fn finish(&mut self, output: Self::Output) -> io::Result<()> {
        (**self).finish(output)
    }
}

/// Collects finished files in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    /// Every finished file, in order.
    pub files: Vec<Vec<u8>>,
}

impl Sink for MemorySink {
    type Output = Vec<u8>;

    fn create(&mut self, _frame: Option<u32>) -> io::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn finish(&mut self, output: Vec<u8>) -> io::Result<()> {
        self.files.push(output);
        Ok(())
    }
}

/// Creates each file by calling a function with the frame number.
pub struct FnSink<F>(pub F);

impl<F, W> Sink for FnSink<F>
where
    F: FnMut(Option<u32>) -> io::Result<W>,
    W: Write,
{
    type Output = W;

    #[inline]
    fn create(&mut self, frame: Option<u32>) -> io::Result<W> {
        (self.0)(frame)
    }
}

/// Position and size of a frame on the page.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub left: u16,
    /// Top edge.
    pub top: u16,
    /// Width.
    pub width: u16,
    /// Height.
    pub height: u16,
}

/// One encoded frame, waiting to be written.
#[derive(Debug, Default, Clone)]
pub struct GifFrame {
    /// Disposal method bits and transparency flag of the control extension.
    pub(crate) flags: u8,
    /// Delay in centiseconds.
    pub(crate) delay: u16,
    pub(crate) transparent: u8,
    pub(crate) left: u16,
    pub(crate) top: u16,
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) local_palette: Option<Palette>,
    /// Minimum code size, LZW sub-blocks and terminator.
    pub(crate) lzw: Vec<u8>,
}

impl GifFrame {
    /// The area this frame covers.
    #[must_use]
    pub fn rect(&self) -> Rect {
        Rect {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
        }
    }

    fn set_rect(&mut self, rect: Rect) {
        self.left = rect.left;
        self.top = rect.top;
        self.width = rect.width;
        self.height = rect.height;
    }

    /// Transparent color index, if any.
    #[must_use]
    pub fn transparent(&self) -> Option<u8> {
        (self.flags & 1 != 0).then_some(self.transparent)
    }

    fn set_transparent(&mut self, index: Option<u8>) {
        match index {
            Some(index) => {
                self.flags |= 1;
                self.transparent = index;
            }
            None => {
                self.flags &= !1;
                self.transparent = 0;
            }
        }
    }

    /// Disposal method applied once this frame has been shown.
    #[must_use]
    pub fn disposal(&self) -> DisposalMethod {
        match (self.flags >> 2) & 7 {
            1 => DisposalMethod::Keep,
            2 => DisposalMethod::Background,
            3 => DisposalMethod::Previous,
            _ => DisposalMethod::Any,
        }
    }

    fn set_disposal(&mut self, method: DisposalMethod) {
        self.flags = (self.flags & !0x1C) | ((method as u8) << 2);
    }

    /// Delay after this frame in centiseconds.
    #[must_use]
    pub fn delay(&self) -> u16 {
        self.delay
    }

    /// Writes control extension, image descriptor, local color table and image data.
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        if self.flags != 0 || self.delay != 0 {
            w.write_le(Block::Extension as u8)?;
            w.write_le(Extension::Control as u8)?;
            w.write_le(4u8)?;
            w.write_le(self.flags)?;
            w.write_le(self.delay)?;
            w.write_le(self.transparent)?;
            w.write_le(0u8)?;
        }
        let mut flags = 0;
        if let Some(palette) = &self.local_palette {
            flags |= 0b1000_0000;
            flags |= flag_size(palette.len());
        }
        w.write_le(Block::Image as u8)?;
        w.write_le(self.left)?;
        w.write_le(self.top)?;
        w.write_le(self.width)?;
        w.write_le(self.height)?;
        w.write_le(flags)?;
        if let Some(palette) = &self.local_palette {
            write_color_table(w, palette)?;
        }
        w.write_all(&self.lzw)
    }
}

fn write_color_table<W: Write + ?Sized>(w: &mut W, palette: &Palette) -> io::Result<()> {
    w.write_all(&palette.to_rgb_bytes())?;
    let padding = (2 << flag_size(palette.len())) - palette.len();
    for _ in 0..padding {
        w.write_all(&[0, 0, 0])?;
    }
    Ok(())
}

/// GIF writer fed with decoded frames.
///
/// The header is written once the second frame arrives, when it is known
/// whether the file loops. Frames are held back in a short queue so their
/// disposal and delay can be filled in from the frame after them.
pub struct GifWriter<S: Sink> {
    sink: S,
    w: Option<S::Output>,
    /// A write failed; nothing more is written.
    closed: bool,
    finished: bool,
    solo: bool,
    forced_rate: bool,
    frame_rate: u32,
    dither: DitherMode,
    quantizer: QuantizerKind,
    clips: Vec<(u32, u32)>,
    queue: FrameQueue,
    /// What a viewer shows after the last queued frame.
    prev_frame: Option<ChunkyBitmap>,
    global_palette: Palette,
    background: u8,
    page_width: u16,
    page_height: u16,
    frame_count: u32,
    first_delay: u32,
    total_ticks: u64,
    gif_time: u64,
}

impl<S: Sink> GifWriter<S> {
    /// Creates a writer. Nothing is written until frames are added.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            w: None,
            closed: false,
            finished: false,
            solo: false,
            forced_rate: false,
            frame_rate: PlanarBitmap::DEFAULT_RATE,
            dither: DitherMode::default(),
            quantizer: QuantizerKind::default(),
            clips: vec![(1, u32::MAX)],
            queue: FrameQueue::default(),
            prev_frame: None,
            global_palette: Palette::default(),
            background: 0,
            page_width: 0,
            page_height: 0,
            frame_count: 0,
            first_delay: 0,
            total_ticks: 0,
            gif_time: 0,
        }
    }

    /// Writes every frame to its own file.
    pub fn set_solo(&mut self, solo: bool) {
        self.solo = solo;
    }

    /// Uses `rate` ticks per second for delays instead of the rate the frames carry.
    pub fn set_frame_rate(&mut self, rate: Option<u32>) {
        match rate.filter(|&r| r > 0) {
            Some(rate) => {
                self.forced_rate = true;
                self.frame_rate = rate;
            }
            None => self.forced_rate = false,
        }
    }

    /// Only writes frames within these inclusive ranges, counting from 1.
    ///
    /// The ranges must be sorted and must not overlap. An empty list means every frame.
    pub fn set_clips(&mut self, clips: Vec<(u32, u32)>) {
        self.clips = if clips.is_empty() {
            vec![(1, u32::MAX)]
        } else {
            clips
        };
    }

    /// Dithering used when reducing true color frames.
    pub fn set_dither(&mut self, dither: DitherMode) {
        self.dither = dither;
    }

    /// Quantizer used for true color frames.
    pub fn set_quantizer(&mut self, quantizer: QuantizerKind) {
        self.quantizer = quantizer;
    }

    /// Gets a reference to the sink.
    pub fn get_ref(&self) -> &S {
        &self.sink
    }

    /// Gets a mutable reference to the sink.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Adds the next frame of the source.
    ///
    /// `bitmap` supplies palette, timing and transparency, `chunky` the pixels.
    pub fn add_frame(&mut self, bitmap: &PlanarBitmap, chunky: ChunkyBitmap) -> Result<(), EncodingError> {
        let (chunky, palette, transparent) = match chunky.bytes_per_pixel() {
            1 => {
                let bits = bitmap.num_planes().min(8) as u8;
                let palette = bitmap.palette.extend_to(bits);
                (chunky, palette, bitmap.transparent_color)
            }
            4 => {
                let mut quantizer = self.quantizer.build(Palette::MAX_COLORS);
                quantizer.add_pixels(chunky.pixels());
                let palette = quantizer.palette().extend();
                if palette.is_empty() {
                    return Err(EncodingFormatError::MissingColorPalette.into());
                }
                log::debug!("quantized to {} colors", palette.len());
                let chunky = chunky.rgb_to_palette(&palette, self.dither);
                (chunky, palette, None)
            }
            _ => return Err(EncodingFormatError::TooManyColors.into()),
        };
        let min_code_size = palette.bits();

        if self.frame_count == 0 {
            self.page_width = u16::try_from(chunky.width()).map_err(|_| EncodingFormatError::TooLarge)?;
            self.page_height = u16::try_from(chunky.height()).map_err(|_| EncodingFormatError::TooLarge)?;
            log::info!(
                "{}x{}x{}",
                bitmap.width(),
                bitmap.height(),
                bitmap.num_planes()
            );
            self.global_palette = palette.clone();
            self.detect_background(transparent, &chunky);
            self.first_delay = bitmap.delay;
        }
        if bitmap.rate > 0 && !self.forced_rate {
            self.frame_rate = bitmap.rate;
        }
        self.frame_count += 1;

        let Some(&(first, last)) = self.clips.first() else {
            return Ok(());
        };
        if self.frame_count >= first {
            if self.solo || self.queue.total() == 1 {
                self.write_header(true)?;
            }
            self.make_frame(bitmap, chunky, palette, transparent, min_code_size)?;
        }
        if self.frame_count == last {
            self.clips.remove(0);
            if self.clips.is_empty() {
                // The whole source was not converted, so its last frames
                // do not repeat the first ones.
                self.queue.set_drop_frames(0);
            }
        }
        Ok(())
    }

    /// The background is the transparent color if there is one.
    fn detect_background(&mut self, transparent: Option<u8>, chunky: &ChunkyBitmap) {
        match transparent {
            Some(index) => {
                self.background = index;
                self.prev_frame = Some(ChunkyBitmap::solid(chunky.width(), chunky.height(), index));
            }
            None => self.background = 0,
        }
    }

    fn write_header(&mut self, mut looping: bool) -> Result<(), EncodingError> {
        if self.solo {
            looping = false;
            if self.w.is_some() {
                self.finish_file()?;
            }
        }
        if self.closed {
            return Err(EncodingError::WriterClosed);
        }
        let index = self.solo.then_some(self.frame_count);
        let w = match self.sink.create(index) {
            Ok(w) => w,
            Err(err) => {
                log::error!("could not create output: {err}");
                self.closed = true;
                return Err(err.into());
            }
        };
        self.w = Some(w);

        let mut flags = 0;
        if !self.global_palette.is_empty() {
            flags = 0b1111_0000 | flag_size(self.global_palette.len());
        }
        let (width, height, background) = (self.page_width, self.page_height, self.background);
        let palette = self.global_palette.clone();
        self.write(|w| {
            w.write_all(b"GIF89a")?;
            w.write_le(width)?;
            w.write_le(height)?;
            w.write_le(flags)?;
            w.write_le(background)?;
            w.write_le(0u8)?;
            if flags & 0x80 != 0 {
                write_color_table(w, &palette)?;
            }
            if looping {
                w.write_le(Block::Extension as u8)?;
                w.write_le(Extension::Application as u8)?;
                w.write_le(11u8)?;
                w.write_all(b"NETSCAPE2.0")?;
                w.write_le(3u8)?;
                w.write_le(1u8)?;
                w.write_le(0u16)?;
                w.write_le(0u8)?;
            }
            Ok(())
        })
    }

    fn make_frame(
        &mut self,
        bitmap: &PlanarBitmap,
        chunky: ChunkyBitmap,
        palette: Palette,
        transparent: Option<u8>,
        min_code_size: u8,
    ) -> Result<(), EncodingError> {
        self.queue
            .set_drop_frames(if self.solo { 0 } else { usize::from(bitmap.interleave) });
        let mut frame = GifFrame::default();
        let full = Rect {
            left: 0,
            top: 0,
            width: u16::try_from(chunky.width()).map_err(|_| EncodingFormatError::TooLarge)?,
            height: u16::try_from(chunky.height()).map_err(|_| EncodingFormatError::TooLarge)?,
        };
        frame.set_rect(full);
        frame.set_transparent(transparent);

        // A previous frame of another size cannot be diffed against.
        if self
            .prev_frame
            .as_ref()
            .is_some_and(|p| p.width() != chunky.width() || p.height() != chunky.height())
        {
            self.prev_frame = None;
        }

        // Things about the previous frame that depend on this one.
        if let Some(old_rect) = self.queue.most_recent().map(GifFrame::rect) {
            let disposal = self.select_disposal(transparent, old_rect, &chunky);
            let delay = self.add_delay(bitmap.delay);
            if let Some(old) = self.queue.most_recent_mut() {
                old.set_disposal(disposal);
                if let Some(delay) = delay {
                    old.delay = delay;
                }
            }
        }

        // Indices past the table this frame is coded with collide with the LZW control codes.
        let palette_len = palette.len().min(1 << min_code_size);
        // Unlike an ANIM CMAP, a GIF local color table only applies to its own frame.
        if palette != self.global_palette {
            frame.local_palette = Some(palette);
        }
        if self.global_palette.is_empty() && frame.local_palette.is_none() {
            return Err(EncodingFormatError::MissingColorPalette.into());
        }
        // Viewers will not repaint old pixels with a new palette.
        let palette_changed = self
            .queue
            .most_recent()
            .is_some_and(|old| old.local_palette != frame.local_palette);

        let prev = self.prev_frame.as_ref().filter(|_| !palette_changed);
        if let Some(prev) = prev {
            frame.set_rect(minimum_area(prev, &chunky));
        }
        let rect = frame.rect();

        let mut substituted = false;
        let trans = match prev {
            None => None,
            Some(_) if self.queue.total() == 0 => None,
            Some(_) if transparent.is_some() => transparent,
            Some(prev) => {
                let t = select_transparent_color(prev, &chunky, rect, palette_len);
                if t.is_some() {
                    frame.set_transparent(t);
                    substituted = true;
                }
                t
            }
        };
        frame.lzw = compress_rect(&chunky, prev, rect, min_code_size, trans);
        if trans.is_some() {
            // Sometimes keeping the real pixels compresses better.
            let plain = compress_rect(&chunky, prev, rect, min_code_size, None);
            if plain.len() <= frame.lzw.len() {
                frame.lzw = plain;
                if substituted {
                    frame.set_transparent(None);
                }
            }
        }
        log::debug!(
            "frame {}: {}x{} at {},{}, {} bytes",
            self.frame_count,
            rect.width,
            rect.height,
            rect.left,
            rect.top,
            frame.lzw.len()
        );

        if let Some(evicted) = self.queue.push(frame, bitmap) {
            self.write(|w| evicted.write(w))?;
        }
        self.prev_frame = if self.solo { None } else { Some(chunky) };
        Ok(())
    }

    /// Picks the disposal for the frame before this one: keep it, unless
    /// some pixel turns transparent, which only clearing can achieve.
    fn select_disposal(&mut self, transparent: Option<u8>, old_rect: Rect, chunky: &ChunkyBitmap) -> DisposalMethod {
        let (Some(trans), Some(prev)) = (transparent, self.prev_frame.as_mut()) else {
            return DisposalMethod::Keep;
        };
        let turns_transparent = prev
            .pixels()
            .iter()
            .zip(chunky.pixels())
            .any(|(&p, &c)| p != trans && c == trans);
        if !turns_transparent {
            return DisposalMethod::Keep;
        }
        prev.fill_rect(
            usize::from(old_rect.left),
            usize::from(old_rect.top),
            usize::from(old_rect.width),
            usize::from(old_rect.height),
            trans,
        );
        DisposalMethod::Background
    }

    /// Converts an ANIM delay for the frame after the previous one into
    /// centiseconds for the previous one.
    ///
    /// Ticks are totalled so rounding errors do not add up.
    fn add_delay(&mut self, delay: u32) -> Option<u16> {
        if delay == 0 {
            return None;
        }
        let tick = self.total_ticks + u64::from(delay);
        let now = tick * 100 / u64::from(self.frame_rate.max(1));
        let centis = now.saturating_sub(self.gif_time);
        self.total_ticks = tick;
        self.gif_time += centis;
        Some(u16::try_from(centis).unwrap_or(u16::MAX))
    }

    /// Runs `f` on the open output. A failure closes it for good.
    fn write<F>(&mut self, f: F) -> Result<(), EncodingError>
    where
        F: FnOnce(&mut S::Output) -> io::Result<()>,
    {
        let w = self.w.as_mut().ok_or(EncodingError::WriterClosed)?;
        if let Err(err) = f(w) {
            log::error!("could not write GIF: {err}");
            self.w = None;
            self.closed = true;
            return Err(err.into());
        }
        Ok(())
    }

    /// Writes the queued frames and the trailer and hands the file back to the sink.
    fn finish_file(&mut self) -> Result<(), EncodingError> {
        if self.w.is_none() {
            return Ok(());
        }
        // ANIM delays the start of a frame, GIF the start of the next: the
        // first frame's delay belongs after the last.
        let delay = self.add_delay(self.first_delay);
        if let (Some(old), Some(delay)) = (self.queue.most_recent_mut(), delay) {
            old.delay = delay;
        }
        let frames = self.queue.finalize();
        self.write(|w| {
            for frame in &frames {
                frame.write(w)?;
            }
            w.write_le(Block::Trailer as u8)?;
            w.flush()
        })?;
        if let Some(w) = self.w.take() {
            if let Err(err) = self.sink.finish(w) {
                self.closed = true;
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Finishes the last file.
    ///
    /// A single frame file is only given its header now, without looping.
    pub fn finish(&mut self) -> Result<(), EncodingError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if self.closed {
            return Err(EncodingError::WriterClosed);
        }
        if !self.solo && self.queue.total() == 1 {
            self.write_header(false)?;
        }
        self.finish_file()
    }
}

impl<S: Sink> Drop for GifWriter<S> {
    #[cfg(feature = "raii_no_panic")]
    fn drop(&mut self) {
        if !self.finished && !self.closed {
            let _ = self.finish();
        }
    }

    #[cfg(not(feature = "raii_no_panic"))]
    fn drop(&mut self) {
        if !self.finished && !self.closed {
            self.finish().unwrap();
        }
    }
}

/// Smallest rectangle holding every pixel that differs. Identical frames
/// give a 1x1 rectangle so the frame still has image data.
fn minimum_area(prev: &ChunkyBitmap, cur: &ChunkyBitmap) -> Rect {
    let width = cur.width();
    let (a, b) = (prev.pixels(), cur.pixels());
    if b.is_empty() {
        return Rect::default();
    }
    let Some(start) = a.iter().zip(b).position(|(p, c)| p != c) else {
        return Rect {
            left: 0,
            top: 0,
            width: 1,
            height: 1,
        };
    };
    let end = a.iter().zip(b).rposition(|(p, c)| p != c).unwrap_or(start);
    let (top, bottom) = (start / width, end / width);
    let column_changed = |x: usize| (top..=bottom).any(|y| a[y * width + x] != b[y * width + x]);
    let left = (0..width).find(|&x| column_changed(x)).unwrap_or(0);
    let right = (left..width).rev().find(|&x| column_changed(x)).unwrap_or(left);
    Rect {
        left: left as u16,
        top: top as u16,
        width: (right - left + 1) as u16,
        height: (bottom - top + 1) as u16,
    }
}

/// Lowest color index not used by any changed pixel in `rect`, if it is within the palette.
fn select_transparent_color(
    prev: &ChunkyBitmap,
    cur: &ChunkyBitmap,
    rect: Rect,
    palette_len: usize,
) -> Option<u8> {
    let mut used = [false; 256];
    for (p, c) in rect_rows(prev, rect).zip(rect_rows(cur, rect)) {
        for (&p, &c) in p.iter().zip(c) {
            if p != c {
                used[usize::from(c)] = true;
            }
        }
    }
    let color = used.iter().position(|&u| !u)?;
    (color < palette_len).then_some(color as u8)
}

fn rect_rows(bitmap: &ChunkyBitmap, rect: Rect) -> impl Iterator<Item = &[u8]> {
    let (left, width) = (usize::from(rect.left), usize::from(rect.width));
    let top = usize::from(rect.top);
    (top..top + usize::from(rect.height)).map(move |y| &bitmap.row(y)[left..left + width])
}

/// LZW compresses `rect` of `chunky`. With `trans`, pixels equal to `prev` are
/// replaced by that index.
fn compress_rect(
    chunky: &ChunkyBitmap,
    prev: Option<&ChunkyBitmap>,
    rect: Rect,
    min_code_size: u8,
    trans: Option<u8>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(usize::from(rect.width) * usize::from(rect.height) / 2 + 16);
    let mut codes = CodeStream::new(&mut out, min_code_size);
    match (prev, trans) {
        (Some(prev), Some(trans)) => {
            for (p, c) in rect_rows(prev, rect).zip(rect_rows(chunky, rect)) {
                for (&p, &c) in p.iter().zip(c) {
                    codes.add_byte(if p != c { c } else { trans });
                }
            }
        }
        _ => {
            for row in rect_rows(chunky, rect) {
                codes.add_bytes(row);
            }
        }
    }
    codes.finish();
    out
}

// Color table size converted to flag bits
fn flag_size(size: usize) -> u8 {
    (size.clamp(2, 255).next_power_of_two().trailing_zeros() - 1) as u8
}
