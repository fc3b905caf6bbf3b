//! zlib (deflate) backend

use super::config::{CompressorConfig, BUFFER_SIZE_KEY, COMPRESSION_LEVEL_KEY};
use super::{Codec, CodecKind, MAX_DECOMPRESSED_SIZE};
use crate::types::AlgorithmId;
use crate::{DaqError, Result};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use std::fmt;
use tracing::debug;

/// Default compression level
pub const DEFAULT_LEVEL: u32 = 3;

/// Default output chunk size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// zlib codec
///
/// Runs the deflate/inflate stream in a loop, growing the output by one
/// `bufferSize` chunk whenever the stream runs out of room. The stream
/// states are kept between calls and reset per event.
pub struct ZlibCodec {
    level: u32,
    buffer_size: usize,
    deflate: Option<Compress>,
    inflate: Option<Decompress>,
}

impl ZlibCodec {
    pub fn new() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            buffer_size: DEFAULT_BUFFER_SIZE,
            deflate: None,
            inflate: None,
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ZlibCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZlibCodec")
            .field("level", &self.level)
            .field("buffer_size", &self.buffer_size)
            .field("ready", &self.deflate.is_some())
            .finish()
    }
}

impl Codec for ZlibCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Zlib
    }

    fn algorithm(&self) -> AlgorithmId {
        AlgorithmId::Zlib
    }

    fn setup(&mut self, config: &CompressorConfig) -> Result<()> {
        self.release();
        self.level = config.value_or(COMPRESSION_LEVEL_KEY, DEFAULT_LEVEL, |level| *level <= 9)?;
        self.buffer_size = config.value_or(BUFFER_SIZE_KEY, DEFAULT_BUFFER_SIZE, |size| *size > 0)?;
        self.deflate = Some(Compress::new(Compression::new(self.level), true));
        self.inflate = Some(Decompress::new(true));
        debug!("zlib ready: level {}, buffer {} bytes", self.level, self.buffer_size);
        Ok(())
    }

    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let deflate = self
            .deflate
            .as_mut()
            .ok_or_else(|| DaqError::CodecSetup("zlib codec is not set up".into()))?;
        deflate.reset();

        let mut output = Vec::with_capacity(self.buffer_size);
        loop {
            if output.len() == output.capacity() {
                output.reserve_exact(self.buffer_size);
            }
            let consumed = deflate.total_in() as usize;
            let produced = deflate.total_out();
            let status = deflate
                .compress_vec(&input[consumed..], &mut output, FlushCompress::Finish)
                .map_err(|e| DaqError::CodecOperation(format!("zlib compression failed: {}", e)))?;
            match status {
                Status::StreamEnd => return Ok(output),
                Status::Ok | Status::BufError => {
                    if deflate.total_in() as usize == consumed && deflate.total_out() == produced {
                        return Err(DaqError::CodecOperation(
                            "zlib compression made no progress".into(),
                        ));
                    }
                }
            }
        }
    }

    fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let inflate = self
            .inflate
            .as_mut()
            .ok_or_else(|| DaqError::CodecSetup("zlib codec is not set up".into()))?;
        inflate.reset(true);

        let mut output = Vec::with_capacity(self.buffer_size);
        loop {
            if output.len() == output.capacity() {
                if output.len() >= MAX_DECOMPRESSED_SIZE {
                    return Err(DaqError::CodecOperation(format!(
                        "zlib output exceeds {} bytes",
                        MAX_DECOMPRESSED_SIZE
                    )));
                }
                output.reserve_exact(self.buffer_size);
            }
            let consumed = inflate.total_in() as usize;
            let produced = inflate.total_out();
            let status = inflate
                .decompress_vec(&input[consumed..], &mut output, FlushDecompress::Finish)
                .map_err(|e| {
                    DaqError::CodecOperation(format!("zlib decompression failed: {}", e))
                })?;
            match status {
                Status::StreamEnd => return Ok(output),
                Status::Ok | Status::BufError => {
                    if inflate.total_in() as usize == consumed && inflate.total_out() == produced {
                        return Err(DaqError::CodecOperation(format!(
                            "zlib stream truncated after {} of {} input bytes",
                            consumed,
                            input.len()
                        )));
                    }
                }
            }
        }
    }

    fn release(&mut self) {
        self.deflate = None;
        self.inflate = None;
    }

    fn is_ready(&self) -> bool {
        self.deflate.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let mut codec = ZlibCodec::new();
        codec.setup(&CompressorConfig::new()).unwrap();
        assert_eq!(codec.level(), DEFAULT_LEVEL);
        assert_eq!(codec.buffer_size(), DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let mut codec = ZlibCodec::new();
        let invalid = [
            (COMPRESSION_LEVEL_KEY, "12"),
            (BUFFER_SIZE_KEY, "-4"),
            (BUFFER_SIZE_KEY, "0"),
        ];
        for (key, value) in invalid {
            let result = codec.setup(&CompressorConfig::new().with(key, value));
            assert!(matches!(result, Err(DaqError::CodecSetup(_))), "{} = {}", key, value);
            assert!(!codec.is_ready());
        }

        codec
            .setup(
                &CompressorConfig::new()
                    .with(COMPRESSION_LEVEL_KEY, "9")
                    .with(BUFFER_SIZE_KEY, "256"),
            )
            .unwrap();
        assert_eq!(codec.level(), 9);
        assert_eq!(codec.buffer_size(), 256);
    }

    #[test]
    fn test_output_spans_many_chunks() {
        // Incompressible input forces the loop through many output chunks
        let mut state = 0x1234_5678u32;
        let input: Vec<u8> = (0..20_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();

        let mut codec = ZlibCodec::new();
        codec
            .setup(&CompressorConfig::new().with(BUFFER_SIZE_KEY, "64"))
            .unwrap();
        let compressed = codec.compress(&input).unwrap();
        assert!(compressed.len() > 64);
        assert_eq!(codec.decompress(&compressed).unwrap(), input);

        // Stream state is reset between events
        let compressed_again = codec.compress(&input).unwrap();
        assert_eq!(compressed_again, compressed);
    }

    #[test]
    fn test_truncated_stream() {
        let mut codec = ZlibCodec::new();
        codec.setup(&CompressorConfig::new()).unwrap();
        let input = vec![7u8; 10_000];
        let compressed = codec.compress(&input).unwrap();
        let result = codec.decompress(&compressed[..compressed.len() / 2]);
        assert!(matches!(result, Err(DaqError::CodecOperation(_))));

        // A failed call leaves the codec usable
        assert_eq!(codec.decompress(&compressed).unwrap(), input);
    }
}
