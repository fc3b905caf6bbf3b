//! DAQ Formats Core - Event Containers and Payload Compression
//!
//! Binary containers used by the data-acquisition chain, and the codec layer
//! that compresses their payloads:
//!
//! - **Fragment**: one detector sub-system's payload behind a packed header
//! - **Event**: a header plus the fragments of one trigger, or a single
//!   compressed blob when the Compressed status bit is set
//! - **Compression**: four interchangeable backends (zstd, zlib, LZ4, Brotli)
//!   behind one contract, configured from string key/value pairs, with
//!   optional per-event metrics
//!
//! # Example
//!
//! ```
//! use daqformats_core::compression::{CodecKind, Compressor};
//! use daqformats_core::format::{Event, Fragment};
//!
//! let mut event = Event::new(0, 9015, 1);
//! event.add_fragment(Fragment::new(0, 0x030000, 1, 42, &[0u8; 512])).unwrap();
//! let original = event.raw();
//!
//! let mut compressor = Compressor::new(CodecKind::Zlib);
//! compressor.setup_compression().unwrap();
//! compressor.compress(&mut event).unwrap();
//! assert!(event.is_compressed());
//!
//! let restored = Event::from_bytes(&event.raw()).unwrap();
//! assert_eq!(restored.raw(), original);
//! ```

pub mod compression;
pub mod format;

mod error;
mod types;

pub use error::{DaqError, FormatError, Result};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    pub use crate::compression::DEFAULT_DICTIONARY_SIZE;
    pub use crate::format::MAX_STREAM_PAYLOAD_SIZE;

    /// Backend used when the `Compressor` key is absent
    pub const COMPRESSOR: &str = "ZSTD";

    /// zstd compression level
    pub const ZSTD_LEVEL: i32 = crate::compression::zstd_codec::DEFAULT_LEVEL;

    /// zstd dictionary file
    pub const ZSTD_DICTIONARY_PATH: &str = crate::compression::zstd_codec::DEFAULT_DICTIONARY_PATH;

    /// zlib compression level
    pub const ZLIB_LEVEL: u32 = crate::compression::zlib_codec::DEFAULT_LEVEL;

    /// zlib output chunk size
    pub const ZLIB_BUFFER_SIZE: usize = crate::compression::zlib_codec::DEFAULT_BUFFER_SIZE;

    /// LZ4 level
    pub const LZ4_LEVEL: i32 = crate::compression::lz4_codec::DEFAULT_LEVEL;

    /// Brotli quality
    pub const BROTLI_QUALITY: u32 = crate::compression::brotli_codec::DEFAULT_QUALITY;

    /// Brotli window (log2)
    pub const BROTLI_WINDOW: u32 = crate::compression::brotli_codec::DEFAULT_WINDOW;
}
