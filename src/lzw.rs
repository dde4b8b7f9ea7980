//! GIF flavoured LZW compression.
//!
//! Output is ready to be written after an image descriptor: the minimum code
//! size byte, the code stream split into length-prefixed sub-blocks of at most
//! 255 bytes, then an empty block.

use alloc::vec::Vec;

/// GIF restricts codes to 12 bits.
const CODE_LIMIT: u16 = 1 << 12;

/// Slots in the string table. A prime comfortably above `CODE_LIMIT`.
const TABLE_SIZE: usize = 5003;

const EMPTY: u32 = u32::MAX;

/// Maps (prefix code, appended byte) to the code of that string.
///
/// Open addressing with linear probing. The table never holds more than
/// `CODE_LIMIT` entries, so a probe always finds a free slot.
struct StringTable {
    keys: Vec<u32>,
    codes: Vec<u16>,
}

impl StringTable {
    fn new() -> Self {
        Self {
            keys: vec![EMPTY; TABLE_SIZE],
            codes: vec![0; TABLE_SIZE],
        }
    }

    fn clear(&mut self) {
        self.keys.fill(EMPTY);
    }

    #[inline]
    fn key(prefix: u16, byte: u8) -> u32 {
        u32::from(prefix) << 8 | u32::from(byte)
    }

    /// Finds the slot holding `key`, or the empty slot where it belongs.
    #[inline]
    fn slot(&self, key: u32) -> usize {
        let mut at = ((key & 0xFF) << 4 ^ key >> 8) as usize % TABLE_SIZE;
        loop {
            let k = self.keys[at];
            if k == key || k == EMPTY {
                return at;
            }
            at += 1;
            if at == TABLE_SIZE {
                at = 0;
            }
        }
    }
}

/// Incremental LZW encoder writing into a caller-provided buffer.
pub struct CodeStream<'a> {
    out: &'a mut Vec<u8>,
    table: StringTable,
    min_code_size: u8,
    code_size: u8,
    clear_code: u16,
    end_code: u16,
    next_code: u16,
    matched: Option<u16>,
    accum: u32,
    bits: u8,
    block_len_at: usize,
    block_len: u8,
}

impl<'a> CodeStream<'a> {
    /// Starts a code stream and writes the minimum code size and the initial clear code.
    ///
    /// `min_code_size` is raised to 2 if lower, as GIF requires, and capped at 8.
    pub fn new(out: &'a mut Vec<u8>, min_code_size: u8) -> Self {
        let min_code_size = min_code_size.clamp(2, 8);
        let clear_code = 1u16 << min_code_size;
        out.push(min_code_size);
        let mut stream = Self {
            out,
            table: StringTable::new(),
            min_code_size,
            code_size: min_code_size + 1,
            clear_code,
            end_code: clear_code + 1,
            next_code: clear_code + 2,
            matched: None,
            accum: 0,
            bits: 0,
            block_len_at: 0,
            block_len: 0,
        };
        stream.write_code(clear_code);
        stream
    }

    /// Adds one pixel to the stream.
    ///
    /// Pixel values must be below `1 << min_code_size`.
    pub fn add_byte(&mut self, pixel: u8) {
        debug_assert!(u16::from(pixel) < self.clear_code, "pixel outside the palette");
        let Some(matched) = self.matched else {
            // single pixels are always in the table
            self.matched = Some(u16::from(pixel));
            return;
        };
        let key = StringTable::key(matched, pixel);
        let slot = self.table.slot(key);
        if self.table.keys[slot] == key {
            self.matched = Some(self.table.codes[slot]);
            return;
        }
        self.write_code(matched);
        self.table.keys[slot] = key;
        self.table.codes[slot] = self.next_code;
        self.next_code += 1;
        if self.next_code == CODE_LIMIT {
            self.write_code(self.clear_code);
        } else if self.next_code == (1 << self.code_size) + 1 {
            self.code_size += 1;
        }
        self.matched = Some(u16::from(pixel));
    }

    /// Adds every pixel of `pixels`.
    pub fn add_bytes(&mut self, pixels: &[u8]) {
        for &p in pixels {
            self.add_byte(p);
        }
    }

    /// Flushes the pending match, writes the end code and terminates the sub-blocks.
    pub fn finish(mut self) {
        if let Some(matched) = self.matched.take() {
            self.write_code(matched);
        }
        self.write_code(self.end_code);
        if self.bits > 0 {
            self.push_byte(self.accum as u8);
            self.accum = 0;
            self.bits = 0;
        }
        self.out.push(0);
    }

    fn write_code(&mut self, code: u16) {
        self.accum |= u32::from(code) << self.bits;
        self.bits += self.code_size;
        while self.bits >= 8 {
            self.push_byte(self.accum as u8);
            self.accum >>= 8;
            self.bits -= 8;
        }
        if code == self.clear_code {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.table.clear();
        self.code_size = self.min_code_size + 1;
        self.next_code = self.end_code + 1;
        self.matched = None;
    }

    fn push_byte(&mut self, byte: u8) {
        if self.block_len == 0 {
            self.block_len_at = self.out.len();
            self.out.push(0);
        }
        self.out.push(byte);
        self.block_len += 1;
        self.out[self.block_len_at] = self.block_len;
        if self.block_len == 0xFF {
            self.block_len = 0;
        }
    }
}

/// Compresses `pixels` into a new buffer.
#[must_use]
pub fn compress(pixels: &[u8], min_code_size: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() / 2 + 16);
    let mut stream = CodeStream::new(&mut out, min_code_size);
    stream.add_bytes(pixels);
    stream.finish();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Joins the sub-blocks back into one code stream, checking the framing on the way.
    fn unblock(data: &[u8]) -> (u8, Vec<u8>) {
        let mut codes = Vec::new();
        let mut at = 1;
        loop {
            let len = usize::from(data[at]);
            at += 1;
            if len == 0 {
                break;
            }
            codes.extend_from_slice(&data[at..at + len]);
            at += len;
        }
        assert_eq!(at, data.len(), "data after the block terminator");
        (data[0], codes)
    }

    fn round_trip(pixels: &[u8], min_code_size: u8) {
        let encoded = compress(pixels, min_code_size);
        let (size, codes) = unblock(&encoded);
        let decoded = weezl::decode::Decoder::new(weezl::BitOrder::Lsb, size)
            .decode(&codes)
            .unwrap();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn all_zero_image() {
        let pixels = [0u8; 16];
        let encoded = compress(&pixels, 1);
        assert_eq!(encoded[0], 2);
        round_trip(&pixels, 2);
    }

    #[test]
    fn empty_input_still_terminates() {
        let encoded = compress(&[], 4);
        let (size, codes) = unblock(&encoded);
        assert_eq!(size, 4);
        // clear and end codes, 5 bits each
        assert_eq!(codes, [0x30, 0x02]);
    }

    #[test]
    fn table_reset_at_code_limit() {
        let mut state = 0x1234_5678u32;
        let pixels: Vec<u8> = (0..40_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        round_trip(&pixels, 8);
    }

    #[test]
    fn long_runs_span_many_blocks() {
        let pixels: Vec<u8> = (0..20_000u32).map(|i| ((i / 7) % 3) as u8).collect();
        round_trip(&pixels, 2);
        let encoded = compress(&pixels, 2);
        let (_, codes) = unblock(&encoded);
        assert!(codes.len() > 255);
    }
}
