#![forbid(unsafe_code)]
//! # Amiga IFF to GIF conversion library
//!
//! Reads IFF ILBM pictures and ANIM animations and writes them as GIF89a.
//!
//! ## no_std support
//!
//! This crate supports `no_std` environments with an allocator. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! iff2gif = { version = "0.1", default-features = false }
//! ```
//!
//! In `no_std` mode, the crate provides its own `Read` and `Write` traits
//! in the `iff2gif::io` module. Implement these traits for your I/O types.
//!
//! ## High level interface
//!
//! [`ConvertOptions::convert`] decodes a whole file and writes it through a
//! [`Sink`], which opens one output for the animation, or one per frame in
//! solo mode:
//!
#![cfg_attr(feature = "std", doc = "```rust,no_run")]
#![cfg_attr(not(feature = "std"), doc = "```rust,ignore")]
//! use std::fs::File;
//! use std::io::BufWriter;
//! use iff2gif::{io, ConvertOptions, FnSink};
//!
//! let input = File::open("dance.anim").unwrap();
//! let mut options = ConvertOptions::new();
//! options.set_auto_aspect(true);
//! options.add_clip(1, 20);
//! let sink = FnSink(|frame: Option<u32>| -> io::Result<BufWriter<File>> {
//!     let name = match frame {
//!         Some(n) => format!("dance{n:04}.gif"),
//!         None => "dance.gif".to_owned(),
//!     };
//!     Ok(BufWriter::new(File::create(name)?))
//! });
//! options.convert(input, sink).unwrap();
//! ```
//!
//! ## Lower level interface
//!
//! [`Decoder`] yields the frames of a file as [`PlanarBitmap`]s, which
//! [`ChunkyBitmap::from_planar`] turns into pixels and [`GifWriter`] encodes.
//! The [`quantize`] and [`dither`] modules reduce true color images, [`lzw`]
//! holds the GIF compressor and [`iff`] the container parser.
#![deny(missing_docs)]
#![allow(unknown_lints)] // Certain lints only apply to later versions of Rust
#![allow(clippy::manual_range_contains)]
#![allow(clippy::new_without_default)]
#![deny(clippy::alloc_instead_of_core)]
#![deny(clippy::std_instead_of_alloc)]
#![deny(clippy::std_instead_of_core)]
#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod chunky;
mod convert;
mod decoder;
mod delta;
pub mod dither;
mod encoder;
pub mod iff;
/// I/O traits and types for no_std support.
pub mod io;
pub mod lzw;
mod palette;
mod planar;
pub mod quantize;
mod queue;
mod traits;

pub use crate::chunky::ChunkyBitmap;
pub use crate::convert::{ConvertError, ConvertOptions};
pub use crate::palette::{color_distance, ColorRegister, Palette};
pub use crate::planar::{ModeFlags, PlanarBitmap};

pub use crate::decoder::{masking, powerpacker_unpacked_len, POWERPACKER_MAGIC};
pub use crate::decoder::{AnimHeader, BitmapHeader, Decoder, Decruncher, FileKind};
pub use crate::decoder::{DecodingError, DecodingFormatError};

pub use crate::encoder::{DisposalMethod, FnSink, GifFrame, GifWriter, MemorySink, Rect, Sink};
pub use crate::encoder::{EncodingError, EncodingFormatError};
