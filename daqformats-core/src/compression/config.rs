//! String-keyed compressor configuration

use crate::{DaqError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// Backend selector (`ZSTD`, `Zlib`, `LZ4`, `Brotli`)
pub const COMPRESSOR_KEY: &str = "Compressor";
/// Backend-specific compression level / quality
pub const COMPRESSION_LEVEL_KEY: &str = "compressionLevel";
/// Whether the zstd backend loads a dictionary
pub const USE_DICTIONARY_KEY: &str = "useDictionary";
/// Path of the zstd dictionary file
pub const DICTIONARY_PATH_KEY: &str = "dictionaryPath";
/// Chunk size of the zlib stream loop
pub const BUFFER_SIZE_KEY: &str = "bufferSize";

/// Key/value configuration consumed by a codec at setup time
///
/// Each backend reads its own subset of keys and ignores the rest. Typed
/// lookups distinguish an absent key (`Ok(None)`, caller applies its default)
/// from a present but malformed one (`Err`, a setup error).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompressorConfig(BTreeMap<String, String>);

impl CompressorConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Raw value of a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Merge another configuration into this one; its values win
    pub fn merge(&mut self, other: &CompressorConfig) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Parse a value, `Ok(None)` when the key is absent
    pub fn lookup<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                DaqError::CodecSetup(format!("invalid value '{}' for {}: {}", raw, key, e))
            }),
        }
    }

    /// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`)
    pub fn lookup_flag(&self, key: &str) -> Result<Option<bool>> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(DaqError::CodecSetup(format!(
                "invalid value '{}' for {}: expected a boolean",
                raw, key
            ))),
        }
    }

    /// Typed value for an optional key, `default` when absent
    ///
    /// A present value must parse and pass `accept`; it is never replaced by
    /// the default.
    pub fn value_or<T>(&self, key: &str, default: T, accept: impl Fn(&T) -> bool) -> Result<T>
    where
        T: FromStr + Display,
        T::Err: Display,
    {
        match self.lookup::<T>(key)? {
            None => Ok(default),
            Some(value) if accept(&value) => Ok(value),
            Some(value) => Err(DaqError::CodecSetup(format!(
                "value {} for {} is out of range",
                value, key
            ))),
        }
    }

    /// Boolean flag for an optional key, `default` when absent
    pub fn flag_or(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.lookup_flag(key)?.unwrap_or(default))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CompressorConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_absent_and_present() {
        let config = CompressorConfig::new().with(COMPRESSION_LEVEL_KEY, " 5 ");
        assert_eq!(config.lookup::<i32>(COMPRESSION_LEVEL_KEY).unwrap(), Some(5));
        assert_eq!(config.lookup::<usize>(BUFFER_SIZE_KEY).unwrap(), None);
    }

    #[test]
    fn test_lookup_malformed_is_error() {
        let config = CompressorConfig::new().with(COMPRESSION_LEVEL_KEY, "high");
        let err = config.lookup::<i32>(COMPRESSION_LEVEL_KEY).unwrap_err();
        assert!(matches!(err, DaqError::CodecSetup(_)));
        assert!(err.to_string().contains("compressionLevel"));
    }

    #[test]
    fn test_lookup_flag() {
        let config: CompressorConfig = [
            ("a", "TRUE"),
            ("b", "0"),
            ("c", "maybe"),
        ]
        .into_iter()
        .collect();
        assert_eq!(config.lookup_flag("a").unwrap(), Some(true));
        assert_eq!(config.lookup_flag("b").unwrap(), Some(false));
        assert!(config.lookup_flag("c").is_err());
        assert_eq!(config.lookup_flag("d").unwrap(), None);
    }

    #[test]
    fn test_value_or() {
        let config = CompressorConfig::new().with(COMPRESSION_LEVEL_KEY, "9");
        assert_eq!(config.value_or(COMPRESSION_LEVEL_KEY, 3u32, |l| *l <= 9).unwrap(), 9);
        assert_eq!(config.value_or(BUFFER_SIZE_KEY, 1024usize, |n| *n > 0).unwrap(), 1024);
        assert!(!config.flag_or(USE_DICTIONARY_KEY, false).unwrap());
    }

    #[test]
    fn test_value_or_rejects_present_invalid_values() {
        let config = CompressorConfig::new()
            .with(COMPRESSION_LEVEL_KEY, "fast")
            .with(BUFFER_SIZE_KEY, "0")
            .with(USE_DICTIONARY_KEY, "sometimes");
        assert!(matches!(
            config.value_or(COMPRESSION_LEVEL_KEY, 3u32, |_| true),
            Err(DaqError::CodecSetup(_))
        ));
        let err = config.value_or(BUFFER_SIZE_KEY, 1024usize, |n| *n > 0).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(config.flag_or(USE_DICTIONARY_KEY, false).is_err());
    }

    #[test]
    fn test_merge_overrides() {
        let mut base = CompressorConfig::new()
            .with(COMPRESSION_LEVEL_KEY, "3")
            .with(BUFFER_SIZE_KEY, "512");
        base.merge(&CompressorConfig::new().with(COMPRESSION_LEVEL_KEY, "9"));
        assert_eq!(base.get(COMPRESSION_LEVEL_KEY), Some("9"));
        assert_eq!(base.get(BUFFER_SIZE_KEY), Some("512"));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn test_json_shape() {
        let config: CompressorConfig =
            serde_json::from_str(r#"{"Compressor": "LZ4", "compressionLevel": "9"}"#).unwrap();
        assert_eq!(config.get(COMPRESSOR_KEY), Some("LZ4"));
        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            serde_json::json!({"Compressor": "LZ4", "compressionLevel": "9"})
        );
    }
}
