//! LZ4 block backend

use super::config::{CompressorConfig, COMPRESSION_LEVEL_KEY};
use super::{Codec, CodecKind, MAX_DECOMPRESSED_SIZE};
use crate::types::AlgorithmId;
use crate::{DaqError, Result};
use lz4::block::CompressionMode;
use lz4_flex::block::DecompressError;
use tracing::debug;

/// Default compression level
pub const DEFAULT_LEVEL: i32 = 7;

/// Smallest first guess for the decompressed size
const MIN_OUTPUT_GUESS: usize = 1024;

/// LZ4 codec
///
/// Compression runs the high-compression block encoder at the configured
/// level (1..=12). The block format does not store the decompressed size, so
/// decompression guesses an output size and doubles it until the block fits.
#[derive(Debug)]
pub struct Lz4Codec {
    level: i32,
    ready: bool,
}

impl Lz4Codec {
    pub fn new() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            ready: false,
        }
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(DaqError::CodecSetup("lz4 codec is not set up".into()))
        }
    }
}

impl Default for Lz4Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for Lz4Codec {
    fn kind(&self) -> CodecKind {
        CodecKind::Lz4
    }

    fn algorithm(&self) -> AlgorithmId {
        AlgorithmId::Lz4
    }

    fn setup(&mut self, config: &CompressorConfig) -> Result<()> {
        self.ready = false;
        self.level = config.value_or(COMPRESSION_LEVEL_KEY, DEFAULT_LEVEL, |level| {
            (1..=12).contains(level)
        })?;
        self.ready = true;
        debug!("lz4 ready: level {}", self.level);
        Ok(())
    }

    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.ensure_ready()?;
        lz4::block::compress(input, Some(CompressionMode::HIGHCOMPRESSION(self.level)), false)
            .map_err(|e| DaqError::CodecOperation(format!("lz4 compression failed: {}", e)))
    }

    fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.ensure_ready()?;

        let mut capacity = input
            .len()
            .saturating_mul(4)
            .clamp(MIN_OUTPUT_GUESS, MAX_DECOMPRESSED_SIZE);
        let mut output = vec![0u8; capacity];
        loop {
            match lz4_flex::block::decompress_into(input, &mut output) {
                Ok(len) => {
                    output.truncate(len);
                    return Ok(output);
                }
                Err(DecompressError::OutputTooSmall { .. }) if capacity < MAX_DECOMPRESSED_SIZE => {
                    capacity = (capacity * 2).min(MAX_DECOMPRESSED_SIZE);
                    output.resize(capacity, 0);
                }
                Err(e) => {
                    return Err(DaqError::CodecOperation(format!("lz4 decompression failed: {}", e)))
                }
            }
        }
    }

    fn release(&mut self) {
        self.ready = false;
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_is_recorded() {
        let mut codec = Lz4Codec::new();
        codec
            .setup(&CompressorConfig::new().with(COMPRESSION_LEVEL_KEY, "12"))
            .unwrap();
        assert_eq!(codec.level(), 12);

        let result = codec.setup(&CompressorConfig::new().with(COMPRESSION_LEVEL_KEY, "0"));
        assert!(matches!(result, Err(DaqError::CodecSetup(_))));
        assert!(!codec.is_ready());
    }

    #[test]
    fn test_level_changes_output() {
        let input: Vec<u8> = (0..50_000u32)
            .flat_map(|i| {
                format!("hit {} plane {} adc {};", i % 97, i % 8, (i * 13) % 1024).into_bytes()
            })
            .collect();

        let mut sizes = Vec::new();
        for level in ["1", "12"] {
            let mut codec = Lz4Codec::new();
            codec
                .setup(&CompressorConfig::new().with(COMPRESSION_LEVEL_KEY, level))
                .unwrap();
            let compressed = codec.compress(&input).unwrap();
            assert_eq!(codec.decompress(&compressed).unwrap(), input);
            sizes.push(compressed.len());
        }
        assert!(sizes[1] <= sizes[0], "level 12 {} > level 1 {}", sizes[1], sizes[0]);
    }

    #[test]
    fn test_highly_compressible_needs_retries() {
        // Ratio far above the first 4x guess
        let input = vec![0u8; 500_000];
        let mut codec = Lz4Codec::new();
        codec.setup(&CompressorConfig::new()).unwrap();
        let compressed = codec.compress(&input).unwrap();
        assert!(compressed.len() * 4 < input.len());
        assert_eq!(codec.decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn test_corrupted_block() {
        let mut codec = Lz4Codec::new();
        codec.setup(&CompressorConfig::new()).unwrap();
        // Match offset pointing before the start of the output
        let result = codec.decompress(&[0x1f, 0x41, 0xff, 0xff]);
        assert!(matches!(result, Err(DaqError::CodecOperation(_))));
    }
}
