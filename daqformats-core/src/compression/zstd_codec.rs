//! Zstandard backend with optional dictionary

use super::config::{
    CompressorConfig, COMPRESSION_LEVEL_KEY, DICTIONARY_PATH_KEY, USE_DICTIONARY_KEY,
};
use super::{Codec, CodecKind, MAX_DECOMPRESSED_SIZE};
use crate::types::AlgorithmId;
use crate::{DaqError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zstd::bulk::{Compressor, Decompressor};

/// Default compression level
pub const DEFAULT_LEVEL: i32 = 7;

/// Dictionary file used when `useDictionary` is set without a path
pub const DEFAULT_DICTIONARY_PATH: &str = "dictionary.zstd";

/// Zstandard codec
///
/// Both contexts are created once and reused for every event. With
/// `useDictionary` the dictionary file is read at setup and the codec writes
/// [`AlgorithmId::ZstdDictionary`] instead of [`AlgorithmId::Zstd`].
pub struct ZstdCodec {
    level: i32,
    dictionary_path: Option<PathBuf>,
    dictionary: Option<Vec<u8>>,
    compressor: Option<Compressor<'static>>,
    decompressor: Option<Decompressor<'static>>,
}

impl ZstdCodec {
    pub fn new() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            dictionary_path: None,
            dictionary: None,
            compressor: None,
            decompressor: None,
        }
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    /// Loaded dictionary, if any
    pub fn dictionary(&self) -> Option<&[u8]> {
        self.dictionary.as_deref()
    }

    fn load_dictionary(&mut self) -> Result<()> {
        if self.dictionary.is_some() {
            return Ok(());
        }
        if let Some(path) = &self.dictionary_path {
            self.dictionary = Some(read_dictionary(path)?);
        }
        Ok(())
    }

    fn new_decompressor(&self) -> Result<Decompressor<'static>> {
        let decompressor = match &self.dictionary {
            Some(dictionary) => Decompressor::with_dictionary(dictionary),
            None => Decompressor::new(),
        };
        decompressor.map_err(|e| {
            DaqError::CodecSetup(format!("cannot create zstd decompression context: {}", e))
        })
    }
}

fn read_dictionary(path: &Path) -> Result<Vec<u8>> {
    let dictionary = std::fs::read(path).map_err(|e| {
        DaqError::CodecSetup(format!("cannot read zstd dictionary {}: {}", path.display(), e))
    })?;
    info!("Loaded zstd dictionary {} ({} bytes)", path.display(), dictionary.len());
    Ok(dictionary)
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ZstdCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZstdCodec")
            .field("level", &self.level)
            .field("dictionary_path", &self.dictionary_path)
            .field("dictionary_len", &self.dictionary.as_ref().map(Vec::len))
            .field("ready", &self.compressor.is_some())
            .finish()
    }
}

impl Codec for ZstdCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Zstd
    }

    fn algorithm(&self) -> AlgorithmId {
        if self.dictionary_path.is_some() {
            AlgorithmId::ZstdDictionary
        } else {
            AlgorithmId::Zstd
        }
    }

    fn setup(&mut self, config: &CompressorConfig) -> Result<()> {
        self.release();
        self.dictionary_path = None;
        self.dictionary = None;

        let range = zstd::compression_level_range();
        self.level =
            config.value_or(COMPRESSION_LEVEL_KEY, DEFAULT_LEVEL, |level| range.contains(level))?;
        let dictionary_path = config.flag_or(USE_DICTIONARY_KEY, false)?.then(|| {
            PathBuf::from(config.get(DICTIONARY_PATH_KEY).unwrap_or(DEFAULT_DICTIONARY_PATH))
        });
        if let Some(path) = &dictionary_path {
            self.dictionary = Some(read_dictionary(path)?);
        }
        self.dictionary_path = dictionary_path;

        let compressor = match &self.dictionary {
            Some(dictionary) => Compressor::with_dictionary(self.level, dictionary),
            None => Compressor::new(self.level),
        }
        .map_err(|e| {
            DaqError::CodecSetup(format!("cannot create zstd compression context: {}", e))
        })?;
        self.compressor = Some(compressor);

        debug!(
            "zstd ready: level {}, dictionary {}",
            self.level,
            if self.dictionary.is_some() { "on" } else { "off" }
        );
        Ok(())
    }

    fn prepare_decompression(&mut self) -> Result<()> {
        self.load_dictionary()?;
        if self.decompressor.is_none() {
            self.decompressor = Some(self.new_decompressor()?);
        }
        Ok(())
    }

    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let compressor = self
            .compressor
            .as_mut()
            .ok_or_else(|| DaqError::CodecSetup("zstd codec is not set up".into()))?;
        compressor
            .compress(input)
            .map_err(|e| DaqError::CodecOperation(format!("zstd compression failed: {}", e)))
    }

    fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        if self.compressor.is_none() {
            return Err(DaqError::CodecSetup("zstd codec is not set up".into()));
        }
        if self.decompressor.is_none() {
            self.decompressor = Some(self.new_decompressor()?);
        }
        let Some(decompressor) = self.decompressor.as_mut() else {
            return Err(DaqError::CodecSetup("zstd codec is not set up".into()));
        };

        match zstd::zstd_safe::get_frame_content_size(input) {
            Ok(Some(size)) if size as usize <= MAX_DECOMPRESSED_SIZE => decompressor
                .decompress(input, size as usize)
                .map_err(|e| DaqError::CodecOperation(format!("zstd decompression failed: {}", e))),
            Ok(Some(size)) => Err(DaqError::CodecOperation(format!(
                "zstd frame declares {} bytes, limit is {}",
                size, MAX_DECOMPRESSED_SIZE
            ))),
            Err(_) => Err(DaqError::CodecOperation("not a valid zstd frame".into())),
            // Frame written without a content size: grow until it fits
            Ok(None) => {
                let mut capacity = input.len().saturating_mul(4).max(1024);
                loop {
                    match decompressor.decompress(input, capacity) {
                        Ok(output) => return Ok(output),
                        Err(_) if capacity < MAX_DECOMPRESSED_SIZE => {
                            capacity = (capacity * 2).min(MAX_DECOMPRESSED_SIZE);
                        }
                        Err(e) => {
                            return Err(DaqError::CodecOperation(format!(
                                "zstd decompression failed: {}",
                                e
                            )))
                        }
                    }
                }
            }
        }
    }

    fn release(&mut self) {
        self.compressor = None;
        self.decompressor = None;
    }

    fn is_ready(&self) -> bool {
        self.compressor.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i / 7) % 251) as u8).collect()
    }

    #[test]
    fn test_defaults() {
        let mut codec = ZstdCodec::new();
        codec.setup(&CompressorConfig::new()).unwrap();
        assert_eq!(codec.level(), DEFAULT_LEVEL);
        assert_eq!(codec.algorithm(), AlgorithmId::Zstd);
        assert!(codec.dictionary().is_none());
    }

    #[test]
    fn test_level_setting() {
        let mut codec = ZstdCodec::new();
        let result = codec.setup(&CompressorConfig::new().with(COMPRESSION_LEVEL_KEY, "1000"));
        assert!(matches!(result, Err(DaqError::CodecSetup(_))));
        assert!(!codec.is_ready());

        codec
            .setup(&CompressorConfig::new().with(COMPRESSION_LEVEL_KEY, "19"))
            .unwrap();
        assert_eq!(codec.level(), 19);
    }

    #[test]
    fn test_context_reused_across_calls() {
        let mut codec = ZstdCodec::new();
        codec.setup(&CompressorConfig::new()).unwrap();
        for len in [0, 10, 4096, 100_000] {
            let input = sample(len);
            let compressed = codec.compress(&input).unwrap();
            assert_eq!(codec.decompress(&compressed).unwrap(), input);
        }
    }

    #[test]
    fn test_frame_without_content_size() {
        let input = sample(50_000);
        let mut encoder = zstd::stream::Encoder::new(Vec::new(), 3).unwrap();
        encoder.write_all(&input).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut codec = ZstdCodec::new();
        codec.setup(&CompressorConfig::new()).unwrap();
        assert_eq!(codec.decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn test_dictionary_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"raw content dictionary: tracker plane hits adc channel")
            .unwrap();
        let config = CompressorConfig::new()
            .with(USE_DICTIONARY_KEY, "yes")
            .with(DICTIONARY_PATH_KEY, file.path().to_string_lossy());

        let mut codec = ZstdCodec::new();
        codec.setup(&config).unwrap();
        codec.prepare_decompression().unwrap();
        assert_eq!(codec.algorithm(), AlgorithmId::ZstdDictionary);
        assert!(codec.dictionary().is_some());

        let input = b"tracker plane hits adc channel 17 tracker plane hits adc channel 18".to_vec();
        let compressed = codec.compress(&input).unwrap();
        assert_eq!(codec.decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn test_missing_dictionary_fails_setup() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompressorConfig::new()
            .with(USE_DICTIONARY_KEY, "true")
            .with(DICTIONARY_PATH_KEY, dir.path().join("absent.zstd").to_string_lossy());
        let mut codec = ZstdCodec::new();
        assert!(matches!(codec.setup(&config), Err(DaqError::CodecSetup(_))));
        assert!(!codec.is_ready());
        assert_eq!(codec.algorithm(), AlgorithmId::Zstd);
        assert!(codec.dictionary().is_none());
    }

    #[test]
    fn test_garbage_input() {
        let mut codec = ZstdCodec::new();
        codec.setup(&CompressorConfig::new()).unwrap();
        assert!(matches!(
            codec.decompress(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]),
            Err(DaqError::CodecOperation(_))
        ));
    }
}
