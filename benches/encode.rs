use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use iff2gif::dither::DitherMode;
use iff2gif::quantize::QuantizerKind;
use iff2gif::{lzw, ChunkyBitmap};

const WIDTH: usize = 320;
const HEIGHT: usize = 256;

/// Smooth gradients with some noise, like a scanned picture.
fn rgba_image() -> ChunkyBitmap {
    let mut image = ChunkyBitmap::new(WIDTH, HEIGHT, 4);
    let mut noise = 0x2545_F491u32;
    for (i, px) in image.pixels_mut().chunks_exact_mut(4).enumerate() {
        let (x, y) = (i % WIDTH, i / WIDTH);
        noise ^= noise << 13;
        noise ^= noise >> 17;
        noise ^= noise << 5;
        let n = (noise >> 28) as usize;
        px[0] = ((x * 255 / WIDTH + n) & 0xFF) as u8;
        px[1] = ((y * 255 / HEIGHT + n) & 0xFF) as u8;
        px[2] = (((x + y) * 127 / WIDTH) & 0xFF) as u8;
        px[3] = 0xFF;
    }
    image
}

fn bench_lzw(c: &mut Criterion) {
    let mut group = c.benchmark_group("lzw");
    group.throughput(Throughput::Bytes((WIDTH * HEIGHT) as u64));
    let flat = vec![0u8; WIDTH * HEIGHT];
    let stripes: Vec<u8> = (0..WIDTH * HEIGHT).map(|i| (i / 7 % 32) as u8).collect();
    let noise: Vec<u8> = rgba_image().pixels().iter().step_by(4).copied().collect();
    for (name, pixels, size) in [("flat", &flat, 2), ("stripes", &stripes, 5), ("noise", &noise, 8)] {
        group.bench_with_input(BenchmarkId::new("compress", name), pixels, |b, pixels| {
            b.iter(|| lzw::compress(black_box(pixels), size))
        });
    }
    group.finish();
}

fn bench_palettize(c: &mut Criterion) {
    let image = rgba_image();
    let mut group = c.benchmark_group("palettize");
    group.throughput(Throughput::Elements((WIDTH * HEIGHT) as u64));
    group.sample_size(20);
    for kind in [QuantizerKind::MedianCut, QuantizerKind::NeuQuant] {
        group.bench_function(BenchmarkId::new("quantize", format!("{kind:?}")), |b| {
            b.iter(|| {
                let mut quantizer = kind.build(256);
                quantizer.add_pixels(black_box(image.pixels()));
                quantizer.palette()
            })
        });
    }
    let mut quantizer = QuantizerKind::MedianCut.build(256);
    quantizer.add_pixels(image.pixels());
    let palette = quantizer.palette().extend();
    for dither in [DitherMode::None, DitherMode::FloydSteinberg, DitherMode::Atkinson] {
        group.bench_function(BenchmarkId::new("rgb_to_palette", format!("{dither:?}")), |b| {
            b.iter(|| black_box(&image).rgb_to_palette(&palette, dither))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lzw, bench_palettize);
criterion_main!(benches);
