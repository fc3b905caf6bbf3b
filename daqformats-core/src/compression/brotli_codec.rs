//! Brotli backend

use super::config::{CompressorConfig, COMPRESSION_LEVEL_KEY};
use super::{Codec, CodecKind};
use crate::types::AlgorithmId;
use crate::{DaqError, Result};
use std::io::{Read, Write};
use tracing::debug;

/// Default quality
pub const DEFAULT_QUALITY: u32 = 7;

/// Base-2 logarithm of the sliding window
pub const DEFAULT_WINDOW: u32 = 22;

/// Internal buffer size of the streaming encoder and decoder
const STREAM_BUFFER_SIZE: usize = 4096;

/// Brotli codec
///
/// Holds no native state between events: an encoder or decoder instance is
/// created for each call and dropped when it returns.
#[derive(Debug)]
pub struct BrotliCodec {
    quality: u32,
    window: u32,
    ready: bool,
}

impl BrotliCodec {
    pub fn new() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            window: DEFAULT_WINDOW,
            ready: false,
        }
    }

    pub fn quality(&self) -> u32 {
        self.quality
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(DaqError::CodecSetup("brotli codec is not set up".into()))
        }
    }
}

impl Default for BrotliCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for BrotliCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Brotli
    }

    fn algorithm(&self) -> AlgorithmId {
        AlgorithmId::Brotli
    }

    fn setup(&mut self, config: &CompressorConfig) -> Result<()> {
        self.ready = false;
        self.quality =
            config.value_or(COMPRESSION_LEVEL_KEY, DEFAULT_QUALITY, |quality| *quality <= 11)?;
        self.ready = true;
        debug!("brotli ready: quality {}, window {}", self.quality, self.window);
        Ok(())
    }

    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.ensure_ready()?;
        let mut encoder = brotli::CompressorWriter::new(
            Vec::with_capacity(input.len() / 2 + 64),
            STREAM_BUFFER_SIZE,
            self.quality,
            self.window,
        );
        encoder
            .write_all(input)
            .and_then(|_| encoder.flush())
            .map_err(|e| DaqError::CodecOperation(format!("brotli compression failed: {}", e)))?;
        Ok(encoder.into_inner())
    }

    fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.ensure_ready()?;
        let mut decoder = brotli::Decompressor::new(input, STREAM_BUFFER_SIZE);
        let mut output = Vec::with_capacity(input.len().saturating_mul(4));
        decoder
            .read_to_end(&mut output)
            .map_err(|e| DaqError::CodecOperation(format!("brotli decompression failed: {}", e)))?;
        Ok(output)
    }

    fn release(&mut self) {
        self.ready = false;
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}
