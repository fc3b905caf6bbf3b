//! Pluggable compression of event payloads
//!
//! Four backends share one [`Codec`] contract:
//!
//! | Kind     | Crate             | Header code                  |
//! |----------|-------------------|------------------------------|
//! | `ZSTD`   | `zstd`            | 0x01, 0x0A with a dictionary |
//! | `Zlib`   | `flate2`          | 0x02                         |
//! | `LZ4`    | `lz4`, `lz4_flex` | 0x03                         |
//! | `Brotli` | `brotli`          | 0x04                         |
//!
//! A [`Compressor`] owns one backend, its configuration and the optional
//! metrics logs. Decoding goes through [`PayloadDecoder`] so the event parser
//! can restore compressed records without knowing about backends.

pub(crate) mod brotli_codec;
mod compressor;
mod config;
pub(crate) mod lz4_codec;
mod metrics;
pub(crate) mod zlib_codec;
pub(crate) mod zstd_codec;

pub use brotli_codec::BrotliCodec;
pub use compressor::{Compressor, CompressorState};
pub use config::{
    CompressorConfig, BUFFER_SIZE_KEY, COMPRESSION_LEVEL_KEY, COMPRESSOR_KEY, DICTIONARY_PATH_KEY,
    USE_DICTIONARY_KEY,
};
pub use lz4_codec::Lz4Codec;
pub use metrics::{EventMetrics, HeaderSnapshot, MetricsLog, MetricsSummary};
pub use zlib_codec::ZlibCodec;
pub use zstd_codec::ZstdCodec;

use crate::format::{Event, EventHeader};
use crate::types::AlgorithmId;
use crate::{DaqError, Result};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Upper bound for retry loops that grow a decompression buffer
pub const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// Default upper bound for a trained dictionary
pub const DEFAULT_DICTIONARY_SIZE: usize = 110 * 1024;

/// Contract shared by all compression backends
///
/// `setup` allocates the backend's native context; `release` drops it and
/// may be called any number of times. Compress and decompress on a backend
/// that is not set up fail with [`DaqError::CodecSetup`], backend failures
/// with [`DaqError::CodecOperation`].
pub trait Codec {
    /// Backend family
    fn kind(&self) -> CodecKind;

    /// Code written into the event header by the last successful setup
    fn algorithm(&self) -> AlgorithmId;

    /// Read the recognised keys of `config` and allocate the native context
    fn setup(&mut self, config: &CompressorConfig) -> Result<()>;

    /// Prepare the decompression side (loads the dictionary where applicable)
    fn prepare_decompression(&mut self) -> Result<()> {
        Ok(())
    }

    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>>;

    /// Drop the native context
    fn release(&mut self);

    fn is_ready(&self) -> bool;
}

/// Backend selector, as named by the `Compressor` configuration key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    Zstd,
    Zlib,
    Lz4,
    Brotli,
}

impl CodecKind {
    pub const ALL: [CodecKind; 4] = [
        CodecKind::Zstd,
        CodecKind::Zlib,
        CodecKind::Lz4,
        CodecKind::Brotli,
    ];

    /// Name used in configuration files and metrics logs
    pub fn name(self) -> &'static str {
        match self {
            CodecKind::Zstd => "ZSTD",
            CodecKind::Zlib => "Zlib",
            CodecKind::Lz4 => "LZ4",
            CodecKind::Brotli => "Brotli",
        }
    }

    /// Backend able to decode payloads carrying this code
    pub fn for_algorithm(algorithm: AlgorithmId) -> Option<Self> {
        match algorithm {
            AlgorithmId::None => None,
            AlgorithmId::Zstd | AlgorithmId::ZstdDictionary => Some(CodecKind::Zstd),
            AlgorithmId::Zlib => Some(CodecKind::Zlib),
            AlgorithmId::Lz4 => Some(CodecKind::Lz4),
            AlgorithmId::Brotli => Some(CodecKind::Brotli),
        }
    }
}

impl FromStr for CodecKind {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zstd" | "zstandard" => Ok(CodecKind::Zstd),
            "zlib" | "deflate" => Ok(CodecKind::Zlib),
            "lz4" => Ok(CodecKind::Lz4),
            "brotli" => Ok(CodecKind::Brotli),
            _ => Err(DaqError::CodecSetup(format!("unknown compressor '{}'", s))),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Closed set of backends, dispatched by variant
#[derive(Debug)]
pub enum Backend {
    Zstd(ZstdCodec),
    Zlib(ZlibCodec),
    Lz4(Lz4Codec),
    Brotli(BrotliCodec),
}

impl Backend {
    /// Unconfigured backend of the given kind
    pub fn new(kind: CodecKind) -> Self {
        match kind {
            CodecKind::Zstd => Backend::Zstd(ZstdCodec::new()),
            CodecKind::Zlib => Backend::Zlib(ZlibCodec::new()),
            CodecKind::Lz4 => Backend::Lz4(Lz4Codec::new()),
            CodecKind::Brotli => Backend::Brotli(BrotliCodec::new()),
        }
    }

    /// Backend set up with defaults, able to decode payloads of `algorithm`
    ///
    /// Dictionary payloads cannot be decoded this way: the dictionary is part
    /// of a compressor's configuration, not of the record.
    pub fn for_decoding(algorithm: AlgorithmId) -> Result<Self> {
        if algorithm == AlgorithmId::ZstdDictionary {
            return Err(DaqError::CodecSetup(
                "payload was compressed with a zstd dictionary; \
                 configure a compressor with useDictionary"
                    .into(),
            ));
        }
        let kind = CodecKind::for_algorithm(algorithm)
            .ok_or(DaqError::UnsupportedCompressionCode(algorithm.code()))?;
        let mut backend = Backend::new(kind);
        backend.setup(&CompressorConfig::new())?;
        Ok(backend)
    }
}

impl Codec for Backend {
    fn kind(&self) -> CodecKind {
        match self {
            Backend::Zstd(c) => c.kind(),
            Backend::Zlib(c) => c.kind(),
            Backend::Lz4(c) => c.kind(),
            Backend::Brotli(c) => c.kind(),
        }
    }

    fn algorithm(&self) -> AlgorithmId {
        match self {
            Backend::Zstd(c) => c.algorithm(),
            Backend::Zlib(c) => c.algorithm(),
            Backend::Lz4(c) => c.algorithm(),
            Backend::Brotli(c) => c.algorithm(),
        }
    }

    fn setup(&mut self, config: &CompressorConfig) -> Result<()> {
        match self {
            Backend::Zstd(c) => c.setup(config),
            Backend::Zlib(c) => c.setup(config),
            Backend::Lz4(c) => c.setup(config),
            Backend::Brotli(c) => c.setup(config),
        }
    }

    fn prepare_decompression(&mut self) -> Result<()> {
        match self {
            Backend::Zstd(c) => c.prepare_decompression(),
            Backend::Zlib(c) => c.prepare_decompression(),
            Backend::Lz4(c) => c.prepare_decompression(),
            Backend::Brotli(c) => c.prepare_decompression(),
        }
    }

    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        match self {
            Backend::Zstd(c) => c.compress(input),
            Backend::Zlib(c) => c.compress(input),
            Backend::Lz4(c) => c.compress(input),
            Backend::Brotli(c) => c.compress(input),
        }
    }

    fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        match self {
            Backend::Zstd(c) => c.decompress(input),
            Backend::Zlib(c) => c.decompress(input),
            Backend::Lz4(c) => c.decompress(input),
            Backend::Brotli(c) => c.decompress(input),
        }
    }

    fn release(&mut self) {
        match self {
            Backend::Zstd(c) => c.release(),
            Backend::Zlib(c) => c.release(),
            Backend::Lz4(c) => c.release(),
            Backend::Brotli(c) => c.release(),
        }
    }

    fn is_ready(&self) -> bool {
        match self {
            Backend::Zstd(c) => c.is_ready(),
            Backend::Zlib(c) => c.is_ready(),
            Backend::Lz4(c) => c.is_ready(),
            Backend::Brotli(c) => c.is_ready(),
        }
    }
}

/// Restores the compressed payload of an event while it is being parsed
///
/// Receives the raw header so implementations can dispatch on its
/// compression code. Backend failures must be reported as
/// [`DaqError::CodecOperation`]; the parser turns them into
/// [`DaqError::CorruptedPayload`].
pub trait PayloadDecoder {
    fn decode_payload(&mut self, header: &EventHeader, compressed: &[u8]) -> Result<Vec<u8>>;
}

impl<D: PayloadDecoder + ?Sized> PayloadDecoder for &mut D {
    fn decode_payload(&mut self, header: &EventHeader, compressed: &[u8]) -> Result<Vec<u8>> {
        (**self).decode_payload(header, compressed)
    }
}

/// Decoder creating a default-configured backend for each payload
///
/// Handles every code except 0x0A, which needs the dictionary of a
/// configured [`Compressor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandaloneDecoder;

impl PayloadDecoder for StandaloneDecoder {
    fn decode_payload(&mut self, header: &EventHeader, compressed: &[u8]) -> Result<Vec<u8>> {
        let algorithm = AlgorithmId::try_from(header.compression_code)?;
        Backend::for_decoding(algorithm)?.decompress(compressed)
    }
}

/// Train a zstd dictionary on the fragment payloads of sample events
///
/// Compressed events are skipped. Fails when no usable sample is left or
/// when the samples are too few or too small for training.
pub fn train_dictionary(events: &[Event], max_size: usize) -> Result<Vec<u8>> {
    let samples: Vec<_> = events
        .iter()
        .filter(|event| !event.is_compressed())
        .map(|event| event.raw_fragments())
        .filter(|sample| !sample.is_empty())
        .collect();
    if samples.is_empty() {
        return Err(DaqError::CodecSetup("no uncompressed events to train a dictionary on".into()));
    }

    let dictionary = zstd::dict::from_samples(&samples, max_size)
        .map_err(|e| DaqError::CodecSetup(format!("dictionary training failed: {}", e)))?;
    info!(
        "Trained {} byte dictionary from {} events",
        dictionary.len(),
        samples.len()
    );
    Ok(dictionary)
}
