//! Builders for small IFF files.
#![allow(dead_code)]

pub fn chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
    out
}

pub fn form(kind: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    let mut body = kind.to_vec();
    for child in children {
        body.extend_from_slice(child);
    }
    chunk(b"FORM", &body)
}

/// Uncompressed, unmasked bitmap header.
pub fn bmhd(width: u16, height: u16, planes: u8) -> Vec<u8> {
    let mut h = Vec::new();
    h.extend_from_slice(&width.to_be_bytes());
    h.extend_from_slice(&height.to_be_bytes());
    h.extend_from_slice(&[0, 0, 0, 0, planes, 0, 0, 0, 0, 0, 10, 11]);
    h.extend_from_slice(&320u16.to_be_bytes());
    h.extend_from_slice(&200u16.to_be_bytes());
    chunk(b"BMHD", &h)
}

pub fn anhd(operation: u8, reltime: u32) -> Vec<u8> {
    let mut h = vec![operation, 0];
    h.extend_from_slice(&[0; 12]);
    h.extend_from_slice(&reltime.to_be_bytes());
    h.extend_from_slice(&[0, 0]);
    h.extend_from_slice(&0u32.to_be_bytes());
    h.extend_from_slice(&[0; 16]);
    chunk(b"ANHD", &h)
}

/// Op 5 delta for a one plane image at most 8 pixels wide: replaces the
/// first rows of the only column.
pub fn byte_vertical_delta(rows: &[u8]) -> Vec<u8> {
    let mut d = vec![0u8; 64];
    d[0..4].copy_from_slice(&64u32.to_be_bytes());
    d.push(1);
    d.push(0x80 | rows.len() as u8);
    d.extend_from_slice(rows);
    chunk(b"DLTA", &d)
}

pub const BLACK_WHITE: [u8; 6] = [0, 0, 0, 255, 255, 255];
