use iff2gif::lzw;
use weezl::{decode::Decoder, BitOrder};

/// Strips the minimum code size and the sub-block framing.
fn code_stream(data: &[u8]) -> (u8, Vec<u8>) {
    let mut codes = Vec::new();
    let mut at = 1;
    while data[at] != 0 {
        let len = usize::from(data[at]);
        codes.extend_from_slice(&data[at + 1..at + 1 + len]);
        at += 1 + len;
    }
    assert_eq!(at + 1, data.len(), "data after the terminating block");
    (data[0], codes)
}

fn round_trip(pixels: &[u8], min_code_size: u8) {
    let compressed = lzw::compress(pixels, min_code_size);
    let (size, codes) = code_stream(&compressed);
    assert_eq!(size, min_code_size.max(2));
    let decoded = Decoder::new(BitOrder::Lsb, size).decode(&codes).unwrap();
    assert_eq!(decoded, pixels);
}

#[test]
fn all_zero_image() {
    round_trip(&[0; 16], 2);
}

#[test]
fn every_code_size() {
    for size in 2..=8u8 {
        let max = (1u16 << size) as usize;
        let pixels: Vec<u8> = (0..3000).map(|i| ((i * 7 + i / 13) % max) as u8).collect();
        round_trip(&pixels, size);
    }
}

#[test]
fn table_resets() {
    // enough distinct strings to fill the 4096 entry table several times
    let mut state = 0x1234_5678u32;
    let pixels: Vec<u8> = (0..200_000)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect();
    round_trip(&pixels, 8);
}

#[test]
fn long_runs() {
    let mut pixels = vec![3u8; 70_000];
    pixels.extend(std::iter::repeat(1).take(513));
    round_trip(&pixels, 2);
}
