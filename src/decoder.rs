//! # ILBM and ANIM decoding
//!
//! [`Decoder`] walks an IFF file and hands out one [`PlanarBitmap`] per
//! picture. ANIM files are reconstructed from their delta frames with the
//! usual double buffered history.

use alloc::fmt;
use alloc::string::String;
use alloc::vec::Vec;

use crate::delta;
use crate::iff::{FormReader, FourCC};
use crate::io::{self, Read};
use crate::palette::Palette;
use crate::planar::{ModeFlags, PlanarBitmap};
use crate::traits::BigEndianSlice;

/// The file is not a picture or animation this crate can read.
#[derive(Debug)]
#[non_exhaustive]
pub enum DecodingFormatError {
    /// The data does not start with a `FORM` chunk.
    NotIff,
    /// The outer `FORM` is neither `ILBM` nor `ANIM`.
    UnsupportedFormType(FourCC),
    /// A chunk is shorter than its contents require or runs past its container.
    TruncatedChunk(FourCC),
    /// `BMHD` asks for a plane count other than 1 to 8, 24 or 32.
    UnsupportedPlaneCount(u8),
    /// `BODY` uses a compression method other than none or ByteRun1.
    UnsupportedCompression(u8),
    /// `ANHD` interleave is larger than 2.
    InterleaveTooLarge(u8),
    /// `BODY` appeared before any `BMHD`.
    BodyBeforeHeader,
    /// `DLTA` appeared before any `ANHD` in its frame.
    DeltaWithoutHeader,
    /// `DLTA` appeared before any full frame it could apply to.
    DeltaWithoutHistory,
    /// `ANHD` names a delta method that is not supported.
    UnknownAnimOperation(u8),
    /// A delta's pointers or ops run past the end of its chunk.
    MalformedDelta(u8),
    /// The file is PowerPacker compressed and no decruncher was given.
    NoDecruncher,
    /// The decruncher failed.
    DecrunchFailed,
}

impl core::error::Error for DecodingFormatError {}
impl fmt::Display for DecodingFormatError {
    #[cold]
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotIff => fmt.write_str("not an IFF file"),
            Self::UnsupportedFormType(kind) => write!(fmt, "unsupported IFF type {kind}"),
            Self::TruncatedChunk(id) => write!(fmt, "{id} chunk is truncated"),
            Self::UnsupportedPlaneCount(n) => write!(fmt, "unsupported number of bitplanes: {n}"),
            Self::UnsupportedCompression(c) => write!(fmt, "unsupported compression method {c}"),
            Self::InterleaveTooLarge(i) => write!(fmt, "interleave {i} is too large"),
            Self::BodyBeforeHeader => fmt.write_str("BODY encountered before BMHD"),
            Self::DeltaWithoutHeader => fmt.write_str("DLTA encountered before ANHD"),
            Self::DeltaWithoutHistory => fmt.write_str("DLTA encountered before the first frame"),
            Self::UnknownAnimOperation(op) => write!(fmt, "unsupported ANIM operation {op}"),
            Self::MalformedDelta(op) => write!(fmt, "malformed ANIM operation {op} delta"),
            Self::NoDecruncher => fmt.write_str("PowerPacker data, but no decruncher available"),
            Self::DecrunchFailed => fmt.write_str("could not decrunch PowerPacker data"),
        }
    }
}

/// Decoding error.
#[derive(Debug)]
#[non_exhaustive]
pub enum DecodingError {
    /// The file could not be understood.
    Format(DecodingFormatError),
    /// Wraps an I/O error.
    Io(io::IoError),
}

impl fmt::Display for DecodingError {
    #[cold]
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(err) => err.fmt(fmt),
            Self::Io(err) => err.fmt(fmt),
        }
    }
}

impl core::error::Error for DecodingError {
    #[cold]
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Format(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<io::IoError> for DecodingError {
    #[cold]
    fn from(err: io::IoError) -> Self {
        Self::Io(err)
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for DecodingError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        Self::Io(io::IoError::from(err))
    }
}

impl From<DecodingFormatError> for DecodingError {
    #[cold]
    fn from(err: DecodingFormatError) -> Self {
        Self::Format(err)
    }
}

/// Unpacks PowerPacker (`PP20`) compressed files.
pub trait Decruncher {
    /// Returns the unpacked data, or `None` if `packed` is not valid.
    ///
    /// `packed` is the whole file, magic included.
    fn decrunch(&self, packed: &[u8]) -> Option<Vec<u8>>;
}

/// Magic at the start of PowerPacker data.
pub const POWERPACKER_MAGIC: [u8; 4] = *b"PP20";

/// Size of the unpacked data, from the trailer of a PowerPacker file.
///
/// The last four bytes hold a 24 bit big endian length followed by the number
/// of bits to skip.
#[must_use]
pub fn powerpacker_unpacked_len(packed: &[u8]) -> Option<usize> {
    let at = packed.len().checked_sub(4)?;
    if at < POWERPACKER_MAGIC.len() {
        return None;
    }
    let v = packed.be_u32(at)?;
    Some((v >> 8) as usize)
}

/// `BMHD` masking technique.
pub mod masking {
    /// No mask.
    pub const NONE: u8 = 0;
    /// An extra mask plane follows the image planes of each row.
    pub const HAS_MASK: u8 = 1;
    /// `transparent_color` is see-through.
    pub const HAS_TRANSPARENT_COLOR: u8 = 2;
    /// Lasso.
    pub const LASSO: u8 = 3;
}

/// Contents of a `BMHD` chunk.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct BitmapHeader {
    /// Image width in pixels.
    pub width: u16,
    /// Image height in pixels.
    pub height: u16,
    /// Position on the page.
    pub x: i16,
    /// Position on the page.
    pub y: i16,
    /// Number of bitplanes.
    pub num_planes: u8,
    /// See [`masking`].
    pub masking: u8,
    /// 0 for none, 1 for ByteRun1.
    pub compression: u8,
    /// Transparent color index, used with [`masking::HAS_TRANSPARENT_COLOR`].
    pub transparent_color: u16,
    /// Pixel aspect ratio numerator.
    pub x_aspect: u8,
    /// Pixel aspect ratio denominator.
    pub y_aspect: u8,
    /// Width of the page the image was drawn for.
    pub page_width: i16,
    /// Height of the page the image was drawn for.
    pub page_height: i16,
}

impl BitmapHeader {
    /// Size of the chunk.
    pub const SIZE: usize = 20;

    /// Parses a `BMHD` payload.
    pub fn parse(data: &[u8]) -> Result<Self, DecodingFormatError> {
        if data.len() < Self::SIZE {
            return Err(DecodingFormatError::TruncatedChunk(FourCC::BMHD));
        }
        let u16_at = |at| data.be_u16(at).unwrap_or(0);
        let header = Self {
            width: u16_at(0),
            height: u16_at(2),
            x: u16_at(4) as i16,
            y: u16_at(6) as i16,
            num_planes: data[8],
            masking: data[9],
            compression: data[10],
            transparent_color: u16_at(12),
            x_aspect: data[14],
            y_aspect: data[15],
            page_width: u16_at(16) as i16,
            page_height: u16_at(18) as i16,
        };
        match header.num_planes {
            1..=8 | 24 | 32 => Ok(header),
            n => Err(DecodingFormatError::UnsupportedPlaneCount(n)),
        }
    }

    /// Display mode guessed from the page size.
    #[must_use]
    pub fn page_mode(&self) -> ModeFlags {
        let mut mode = 0;
        if self.page_width >= 640 {
            mode |= ModeFlags::HIRES;
        }
        if self.page_height >= 400 {
            mode |= ModeFlags::LACE;
        }
        ModeFlags(mode)
    }
}

/// Contents of an `ANHD` chunk.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct AnimHeader {
    /// Delta method.
    pub operation: u8,
    /// Plane mask for XOR mode.
    pub mask: u8,
    /// Width of the changed area.
    pub width: u16,
    /// Height of the changed area.
    pub height: u16,
    /// Position of the changed area.
    pub x: i16,
    /// Position of the changed area.
    pub y: i16,
    /// Ticks since the first frame.
    pub abs_time: u32,
    /// Ticks to wait before showing this frame.
    pub rel_time: u32,
    /// Frames back this delta applies to. 0 means 2.
    pub interleave: u8,
    /// Method flags, see [`AnimHeader::LONG_DATA`] and [`AnimHeader::XOR`].
    pub bits: u32,
}

impl AnimHeader {
    /// Data words are 32 rather than 16 bits.
    pub const LONG_DATA: u32 = 1;
    /// Data is combined with the old frame by XOR instead of replacing it.
    pub const XOR: u32 = 2;

    /// Parses an `ANHD` payload.
    pub fn parse(data: &[u8]) -> Result<Self, DecodingFormatError> {
        let truncated = || DecodingFormatError::TruncatedChunk(FourCC::ANHD);
        let header = Self {
            operation: data.be_u8(0).ok_or_else(truncated)?,
            mask: data.be_u8(1).ok_or_else(truncated)?,
            width: data.be_u16(2).ok_or_else(truncated)?,
            height: data.be_u16(4).ok_or_else(truncated)?,
            x: data.be_u16(6).ok_or_else(truncated)? as i16,
            y: data.be_u16(8).ok_or_else(truncated)? as i16,
            abs_time: data.be_u32(10).ok_or_else(truncated)?,
            rel_time: data.be_u32(14).ok_or_else(truncated)?,
            interleave: data.be_u8(18).ok_or_else(truncated)?,
            bits: data.be_u32(20).ok_or_else(truncated)?,
        };
        if header.interleave > 2 {
            return Err(DecodingFormatError::InterleaveTooLarge(header.interleave));
        }
        Ok(header)
    }

    /// `true` for 32 bit data words.
    #[inline]
    #[must_use]
    pub fn long_data(&self) -> bool {
        self.bits & Self::LONG_DATA != 0
    }

    /// `true` when data is XORed onto the old frame.
    #[inline]
    #[must_use]
    pub fn xor(&self) -> bool {
        self.bits & Self::XOR != 0
    }

    /// History slot this delta applies to.
    #[inline]
    #[must_use]
    pub fn slot(&self) -> usize {
        usize::from(self.interleave & 1)
    }
}

/// Unpacks a `BODY` chunk into `bitmap`.
///
/// Each row stores every plane in turn, then the mask plane if there is
/// one. Data that ends early leaves the remaining rows blank.
fn unpack_body(
    header: &BitmapHeader,
    body: &[u8],
    bitmap: &mut PlanarBitmap,
) -> Result<(), DecodingFormatError> {
    if header.compression > 1 {
        return Err(DecodingFormatError::UnsupportedCompression(header.compression));
    }
    let pitch = bitmap.pitch();
    let planes = bitmap.num_planes();
    let stored_planes = planes + usize::from(header.masking == masking::HAS_MASK);
    let mut mask_row = vec![0u8; pitch];
    let mut pos = 0;
    for y in 0..bitmap.height() {
        for p in 0..stored_planes {
            let row = if p < planes {
                &mut bitmap.plane_mut(p)[y * pitch..(y + 1) * pitch]
            } else {
                &mut mask_row[..]
            };
            let read = if header.compression == 0 {
                copy_row(&body[pos.min(body.len())..], row)
            } else {
                unpack_byte_run(&body[pos.min(body.len())..], row)
            };
            match read {
                Some(n) => pos += n,
                None => {
                    log::warn!("BODY ends at row {y} of {}", bitmap.height());
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

/// Copies one uncompressed row, returning the bytes consumed.
fn copy_row(src: &[u8], row: &mut [u8]) -> Option<usize> {
    let src = src.get(..row.len())?;
    row.copy_from_slice(src);
    Some(row.len())
}

/// Decodes one ByteRun1 row, returning the bytes consumed.
///
/// A control byte `n` from 0 to 127 copies the next `n + 1` bytes; from -1 to
/// -128 it repeats the next byte `-n + 1` times. Runs never cross rows: any
/// excess is dropped.
fn unpack_byte_run(src: &[u8], row: &mut [u8]) -> Option<usize> {
    let mut pos = 0;
    let mut x = 0;
    while x < row.len() {
        let n = *src.get(pos)? as i8;
        pos += 1;
        if n >= 0 {
            let count = n as usize + 1;
            let literal = src.get(pos..pos + count)?;
            let take = count.min(row.len() - x);
            row[x..x + take].copy_from_slice(&literal[..take]);
            pos += count;
            x += count;
        } else {
            let count = -(n as isize) as usize + 1;
            let value = *src.get(pos)?;
            pos += 1;
            let take = count.min(row.len() - x);
            row[x..x + take].fill(value);
            x += count;
        }
    }
    Some(pos)
}

/// The kind of file being decoded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// A single `ILBM` picture.
    Still,
    /// An `ANIM` of `ILBM` frames.
    Anim,
}

/// What one `ILBM` form turned into.
enum Loaded {
    Nothing,
    Body(PlanarBitmap),
    Delta(usize),
}

/// Frame history: the last two reconstructed frames.
#[derive(Debug, Default)]
struct History {
    slots: [Option<PlanarBitmap>; 2],
    current: usize,
    /// Playback rate from `DPAN`.
    speed: Option<u32>,
}

impl History {
    /// Decodes the chunks of one `ILBM` form.
    fn load_ilbm(&mut self, mut form: FormReader<'_>) -> Result<Loaded, DecodingFormatError> {
        let mut header = None;
        let mut anim_header = None;
        let mut palette = None;
        let mut mode = None;
        let mut bogus_mode = false;
        let mut loaded = Loaded::Nothing;

        while let Some((id, data)) = form.next_data_chunk()? {
            log::debug!("{id} chunk, {} bytes", data.len());
            match id {
                FourCC::BMHD => {
                    let h = BitmapHeader::parse(data)?;
                    log::info!(
                        "{}x{} pixels, {} planes, page {}x{}",
                        h.width,
                        h.height,
                        h.num_planes,
                        h.page_width,
                        h.page_height
                    );
                    header = Some(h);
                }
                FourCC::CMAP => {
                    if data.len() % 3 != 0 {
                        log::warn!("CMAP size {} is not a multiple of 3", data.len());
                    }
                    let mut pal = Palette::from_cmap(data);
                    if pal.is_ocs() {
                        log::warn!("palette has only 4 bits per channel, expanding");
                        pal.fix_ocs();
                    }
                    palette = Some(pal);
                }
                FourCC::CAMG => {
                    let id = data
                        .be_u32(0)
                        .ok_or(DecodingFormatError::TruncatedChunk(FourCC::CAMG))?;
                    // Some brushes store junk in the upper half
                    if id & 0xFFFF_0000 != 0 && id & ModeFlags::EXTENDED_MODE == 0 {
                        log::warn!("ignoring bogus display mode {id:08X}");
                        bogus_mode = true;
                        mode = None;
                    } else {
                        bogus_mode = false;
                        mode = Some(ModeFlags(id));
                    }
                }
                FourCC::BODY => {
                    let h = header.as_ref().ok_or(DecodingFormatError::BodyBeforeHeader)?;
                    let mut bitmap = PlanarBitmap::new(
                        usize::from(h.width),
                        usize::from(h.height),
                        usize::from(h.num_planes),
                    );
                    if h.masking == masking::HAS_TRANSPARENT_COLOR {
                        bitmap.transparent_color = u8::try_from(h.transparent_color).ok();
                        if bitmap.transparent_color.is_none() {
                            log::warn!("transparent color {} out of range", h.transparent_color);
                        }
                    }
                    bitmap.mode = match mode {
                        Some(m) => m,
                        None if bogus_mode => h.page_mode(),
                        None => ModeFlags::default(),
                    };
                    if let Some(mut pal) = palette.take() {
                        if bitmap.mode.is_ehb() {
                            pal.make_ehb();
                        }
                        bitmap.palette = pal;
                    }
                    unpack_body(h, data, &mut bitmap)?;
                    loaded = Loaded::Body(bitmap);
                }
                FourCC::ANHD => anim_header = Some(AnimHeader::parse(data)?),
                FourCC::DLTA => {
                    let ah = anim_header.as_ref().ok_or(DecodingFormatError::DeltaWithoutHeader)?;
                    let slot = ah.slot();
                    let bitmap = self.slots[slot]
                        .as_mut()
                        .ok_or(DecodingFormatError::DeltaWithoutHistory)?;
                    if let Some(m) = mode {
                        bitmap.mode = m;
                    }
                    if let Some(mut pal) = palette.take() {
                        if bitmap.mode.is_ehb() {
                            pal.make_ehb();
                        }
                        bitmap.palette = pal;
                    }
                    delta::apply(bitmap, ah, data)?;
                    bitmap.delay = ah.rel_time;
                    bitmap.interleave = 2 - (ah.interleave & 1);
                    loaded = Loaded::Delta(slot);
                }
                FourCC::DPAN => {
                    let frames = data.be_u16(2);
                    // a speed of 0 is probably an anim brush
                    let speed = data.be_u8(4).map(|s| if s == 0 { 10 } else { u32::from(s) });
                    log::info!("DPAN: {frames:?} frames at {speed:?} fps");
                    if speed.is_some() {
                        self.speed = speed;
                    }
                }
                FourCC::ANNO => {
                    let text = data.split(|&b| b == 0).next().unwrap_or_default();
                    log::info!("annotation: {}", String::from_utf8_lossy(text));
                }
                _ => log::debug!("skipping {id}"),
            }
        }
        Ok(loaded)
    }

    /// Files `loaded` into the history. Returns `true` if it is a new frame.
    fn store(&mut self, loaded: Loaded) -> bool {
        match loaded {
            Loaded::Nothing => return false,
            Loaded::Body(mut bitmap) => {
                if let Some(speed) = self.speed {
                    bitmap.rate = speed;
                }
                self.slots = [Some(bitmap.clone()), Some(bitmap)];
                self.current = 0;
            }
            Loaded::Delta(slot) => {
                let interleave = self.slots[slot].as_ref().map_or(2, |b| b.interleave);
                if interleave != 1 {
                    self.slots.swap(0, 1);
                    self.current = 1 - slot;
                } else {
                    self.current = slot;
                }
                let [a, b] = &mut self.slots;
                let (current, other) = if self.current == 0 { (a, b) } else { (b, a) };
                if let (Some(current), Some(other)) = (current.as_mut(), other.as_mut()) {
                    if let Some(speed) = self.speed {
                        current.rate = speed;
                    }
                    other.palette = current.palette.clone();
                    other.mode = current.mode;
                }
            }
        }
        true
    }

    fn current(&self) -> Option<&PlanarBitmap> {
        self.slots[self.current].as_ref()
    }
}

/// ILBM/ANIM decoder.
///
/// The whole file is held in memory.
#[derive(Debug)]
pub struct Decoder {
    data: Vec<u8>,
    kind: FileKind,
    /// Position of the next frame form within the outer form.
    pos: usize,
    finished: bool,
    frames: usize,
    history: History,
}

impl Decoder {
    /// Creates a decoder for a complete file.
    ///
    /// PowerPacker data is unpacked with `decruncher` first.
    pub fn new(data: Vec<u8>, decruncher: Option<&dyn Decruncher>) -> Result<Self, DecodingError> {
        let data = if data.starts_with(&POWERPACKER_MAGIC) {
            let decruncher = decruncher.ok_or(DecodingFormatError::NoDecruncher)?;
            log::debug!(
                "decrunching {} bytes to {:?}",
                data.len(),
                powerpacker_unpacked_len(&data)
            );
            decruncher
                .decrunch(&data)
                .ok_or(DecodingFormatError::DecrunchFailed)?
        } else {
            data
        };
        let kind = match FormReader::new(&data)?.kind() {
            FourCC::ILBM => FileKind::Still,
            FourCC::ANIM => FileKind::Anim,
            other => return Err(DecodingFormatError::UnsupportedFormType(other).into()),
        };
        Ok(Self {
            data,
            kind,
            pos: 0,
            finished: false,
            frames: 0,
            history: History::default(),
        })
    }

    /// Reads the whole of `r` and creates a decoder for it.
    pub fn from_reader<R: Read>(
        mut r: R,
        decruncher: Option<&dyn Decruncher>,
    ) -> Result<Self, DecodingError> {
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        Self::new(data, decruncher)
    }

    /// Still picture or animation.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Frames returned so far.
    #[inline]
    #[must_use]
    pub fn frames_decoded(&self) -> usize {
        self.frames
    }

    /// Decodes the next frame.
    ///
    /// Returns `None` once the file is exhausted. After an error no more
    /// frames are returned.
    pub fn next_frame(&mut self) -> Result<Option<&PlanarBitmap>, DecodingError> {
        match self.advance() {
            Ok(true) => {
                self.frames += 1;
                Ok(self.history.current())
            }
            Ok(false) => {
                self.finished = true;
                Ok(None)
            }
            Err(err) => {
                self.finished = true;
                Err(err)
            }
        }
    }

    fn advance(&mut self) -> Result<bool, DecodingError> {
        if self.finished {
            return Ok(false);
        }
        let mut outer = FormReader::new(&self.data)?;
        if self.kind == FileKind::Still {
            let loaded = self.history.load_ilbm(outer)?;
            self.finished = true;
            return Ok(self.history.store(loaded));
        }
        outer.seek(self.pos);
        loop {
            let form = outer.next_form();
            self.pos = outer.position();
            let Some(form) = form? else {
                return Ok(false);
            };
            if form.kind() != FourCC::ILBM {
                log::debug!("skipping {} form", form.kind());
                continue;
            }
            let loaded = self.history.load_ilbm(form)?;
            if self.history.store(loaded) {
                return Ok(true);
            }
        }
    }
}
