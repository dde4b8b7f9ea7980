//! EA IFF 85 container parsing.
//!
//! An IFF file is a `FORM` chunk: a big endian length, a four character form
//! type and then child chunks, each an ID, a big endian length and a payload
//! padded to an even size. Children can be `FORM`s themselves.

use core::fmt;

use crate::decoder::DecodingFormatError;
use crate::traits::BigEndianSlice;

/// A four character chunk or form identifier.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Container chunk.
    pub const FORM: Self = Self(*b"FORM");
    /// Interleaved bitmap form.
    pub const ILBM: Self = Self(*b"ILBM");
    /// Animation form.
    pub const ANIM: Self = Self(*b"ANIM");
    /// Bitmap header.
    pub const BMHD: Self = Self(*b"BMHD");
    /// Color map.
    pub const CMAP: Self = Self(*b"CMAP");
    /// Amiga display mode.
    pub const CAMG: Self = Self(*b"CAMG");
    /// Bitmap data.
    pub const BODY: Self = Self(*b"BODY");
    /// Free form annotation.
    pub const ANNO: Self = Self(*b"ANNO");
    /// Animation frame header.
    pub const ANHD: Self = Self(*b"ANHD");
    /// Animation delta data.
    pub const DLTA: Self = Self(*b"DLTA");
    /// Deluxe Paint animation info.
    pub const DPAN: Self = Self(*b"DPAN");
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// One child of a `FORM`.
#[derive(Debug)]
pub enum Chunk<'a> {
    /// A plain data chunk.
    Data {
        /// Chunk identifier.
        id: FourCC,
        /// Payload, without padding.
        data: &'a [u8],
    },
    /// A nested `FORM`.
    Form(FormReader<'a>),
}

/// Walks the children of one `FORM`.
#[derive(Debug, Clone)]
pub struct FormReader<'a> {
    kind: FourCC,
    /// The form body, after the form type.
    body: &'a [u8],
    pos: usize,
}

impl<'a> FormReader<'a> {
    /// Parses the `FORM` header at the start of `data`.
    ///
    /// A form claiming to be longer than `data` is cut short to what is there.
    pub fn new(data: &'a [u8]) -> Result<Self, DecodingFormatError> {
        if data.get(..4) != Some(b"FORM".as_slice()) {
            return Err(DecodingFormatError::NotIff);
        }
        let len = data.be_u32(4).ok_or(DecodingFormatError::NotIff)? as usize;
        let available = data.len() - 8;
        if len > available {
            log::warn!("FORM claims {len} bytes but only {available} are present");
        }
        Self::from_payload(&data[8..8 + len.min(available)], FourCC::FORM)
    }

    fn from_payload(payload: &'a [u8], id: FourCC) -> Result<Self, DecodingFormatError> {
        let kind = payload
            .get(..4)
            .and_then(|k| <[u8; 4]>::try_from(k).ok())
            .map(FourCC)
            .ok_or(DecodingFormatError::TruncatedChunk(id))?;
        Ok(Self {
            kind,
            body: &payload[4..],
            pos: 0,
        })
    }

    /// The form type, such as `ILBM`.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> FourCC {
        self.kind
    }

    /// Returns the next child, or `None` at the end of the form.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'a>>, DecodingFormatError> {
        if self.pos >= self.body.len() {
            return Ok(None);
        }
        let header = self
            .body
            .get(self.pos..self.pos + 8)
            .ok_or(DecodingFormatError::TruncatedChunk(FourCC::FORM))?;
        let id = FourCC([header[0], header[1], header[2], header[3]]);
        let len = self
            .body
            .be_u32(self.pos + 4)
            .ok_or(DecodingFormatError::TruncatedChunk(id))? as usize;
        let start = self.pos + 8;
        let payload = start
            .checked_add(len)
            .and_then(|end| self.body.get(start..end))
            .ok_or(DecodingFormatError::TruncatedChunk(id))?;
        // odd sizes are padded, but tolerate a missing final pad byte
        self.pos = (start + len + (len & 1)).min(self.body.len());
        if id == FourCC::FORM {
            Ok(Some(Chunk::Form(Self::from_payload(payload, id)?)))
        } else {
            Ok(Some(Chunk::Data { id, data: payload }))
        }
    }

    /// Returns the next data chunk, skipping nested forms.
    pub fn next_data_chunk(&mut self) -> Result<Option<(FourCC, &'a [u8])>, DecodingFormatError> {
        while let Some(chunk) = self.next_chunk()? {
            if let Chunk::Data { id, data } = chunk {
                return Ok(Some((id, data)));
            }
        }
        Ok(None)
    }

    /// Returns the next nested form, skipping data chunks.
    pub fn next_form(&mut self) -> Result<Option<FormReader<'a>>, DecodingFormatError> {
        while let Some(chunk) = self.next_chunk()? {
            if let Chunk::Form(form) = chunk {
                return Ok(Some(form));
            }
        }
        Ok(None)
    }

    /// Offset of the next child within the form body.
    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Continues reading at `pos`, as returned by [`FormReader::position`].
    #[inline]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::vec::Vec;

    /// Serializes a chunk, padding odd payloads.
    pub(crate) fn chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
        if data.len() & 1 != 0 {
            out.push(0);
        }
        out
    }

    /// Serializes a `FORM` of the given type around already serialized children.
    pub(crate) fn form(kind: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
        let mut body = kind.to_vec();
        for c in children {
            body.extend_from_slice(c);
        }
        chunk(b"FORM", &body)
    }

    #[test]
    fn walks_chunks_and_forms() {
        let file = form(
            b"ANIM",
            &[
                chunk(b"ANNO", b"odd"),
                form(b"ILBM", &[chunk(b"BMHD", &[1, 2]), chunk(b"BODY", &[])]),
                chunk(b"JUNK", &[9; 4]),
                form(b"8SVX", &[]),
            ],
        );
        let mut reader = FormReader::new(&file).unwrap();
        assert_eq!(reader.kind(), FourCC::ANIM);

        let mut forms = reader.clone();
        let mut ilbm = forms.next_form().unwrap().unwrap();
        assert_eq!(ilbm.kind(), FourCC::ILBM);
        assert_eq!(ilbm.next_data_chunk().unwrap(), Some((FourCC::BMHD, &[1u8, 2][..])));
        assert_eq!(ilbm.next_data_chunk().unwrap(), Some((FourCC::BODY, &[][..])));
        assert_eq!(ilbm.next_data_chunk().unwrap(), None);
        assert_eq!(forms.next_form().unwrap().unwrap().kind(), FourCC(*b"8SVX"));
        assert!(forms.next_form().unwrap().is_none());

        assert_eq!(reader.next_data_chunk().unwrap(), Some((FourCC::ANNO, &b"odd"[..])));
        assert_eq!(reader.next_data_chunk().unwrap(), Some((FourCC(*b"JUNK"), &[9u8; 4][..])));
        assert_eq!(reader.next_data_chunk().unwrap(), None);
    }

    #[test]
    fn rejects_non_iff() {
        assert!(matches!(FormReader::new(b"RIFF\0\0\0\x04WAVE"), Err(DecodingFormatError::NotIff)));
        assert!(matches!(FormReader::new(b"FO"), Err(DecodingFormatError::NotIff)));
    }

    #[test]
    fn truncated_chunk_is_an_error() {
        let mut file = form(b"ILBM", &[chunk(b"BODY", &[1, 2, 3, 4, 5, 6])]);
        file.truncate(file.len() - 3);
        let mut reader = FormReader::new(&file).unwrap();
        assert!(matches!(
            reader.next_chunk(),
            Err(DecodingFormatError::TruncatedChunk(FourCC::BODY))
        ));
    }

    #[test]
    fn fourcc_displays_as_text() {
        assert_eq!(alloc::format!("{}", FourCC::DLTA), "DLTA");
        assert_eq!(alloc::format!("{:?}", FourCC([b'A', 0, b'B', b'C'])), "A?BC");
    }
}
