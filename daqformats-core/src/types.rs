//! Core types shared by the fragment and event formats

use crate::{DaqError, Result};
use std::fmt;

/// Marker byte opening every encoded fragment
pub const FRAGMENT_MARKER: u8 = 0xAA;

/// Latest (and only) supported fragment format version
pub const FRAGMENT_VERSION: u16 = 0x0001;

/// Marker byte opening every encoded event
pub const EVENT_MARKER: u8 = 0xBB;

/// Latest (and only) supported event format version
pub const EVENT_VERSION: u8 = 0x01;

/// Event status bits
///
/// Bits 0-9 are raised by the event builder, bit 11 marks a compressed payload.
pub mod status {
    pub const UNCLASSIFIED_ERROR: u16 = 1;
    pub const BCID_MISMATCH: u16 = 1 << 1;
    pub const TAG_MISMATCH: u16 = 1 << 2;
    pub const TIMEOUT: u16 = 1 << 3;
    pub const OVERFLOW: u16 = 1 << 4;
    pub const CORRUPTED_FRAGMENT: u16 = 1 << 5;
    pub const DUMMY_FRAGMENT: u16 = 1 << 6;
    pub const MISSING_FRAGMENT: u16 = 1 << 7;
    pub const EMPTY_FRAGMENT: u16 = 1 << 8;
    pub const DUPLICATE_FRAGMENT: u16 = 1 << 9;
    pub const COMPRESSED: u16 = 1 << 11;
}

/// Kind of trigger an event was recorded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventTag {
    Physics = 0x00,
    Calibration = 0x01,
    Monitoring = 0x02,
    TlbMonitoring = 0x03,
}

impl TryFrom<u8> for EventTag {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0x00 => Ok(EventTag::Physics),
            0x01 => Ok(EventTag::Calibration),
            0x02 => Ok(EventTag::Monitoring),
            0x03 => Ok(EventTag::TlbMonitoring),
            other => Err(other),
        }
    }
}

/// Detector sub-system a fragment source id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFamily {
    Trigger,
    Tracker,
    Pmt,
}

impl SourceFamily {
    pub const TRIGGER_SOURCE_ID: u32 = 0x020000;
    pub const TRACKER_SOURCE_ID: u32 = 0x030000;
    pub const PMT_SOURCE_ID: u32 = 0x040000;

    /// Classify a source id by its upper 16 bits
    pub fn of(source_id: u32) -> Option<Self> {
        match source_id & 0xFFFF_0000 {
            Self::TRIGGER_SOURCE_ID => Some(SourceFamily::Trigger),
            Self::TRACKER_SOURCE_ID => Some(SourceFamily::Tracker),
            Self::PMT_SOURCE_ID => Some(SourceFamily::Pmt),
            _ => None,
        }
    }
}

/// Compression algorithm recorded in the event header
///
/// One flat enumeration: each backend owns one code, the zstd backend owns a
/// second one that is only written when a dictionary was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum AlgorithmId {
    #[default]
    None = 0x00,
    Zstd = 0x01,
    Zlib = 0x02,
    Lz4 = 0x03,
    Brotli = 0x04,
    ZstdDictionary = 0x0A,
}

impl AlgorithmId {
    /// All codes that may appear in a header
    pub const ALL: [AlgorithmId; 6] = [
        AlgorithmId::None,
        AlgorithmId::Zstd,
        AlgorithmId::Zlib,
        AlgorithmId::Lz4,
        AlgorithmId::Brotli,
        AlgorithmId::ZstdDictionary,
    ];

    /// Wire byte
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            AlgorithmId::None => "none",
            AlgorithmId::Zstd => "zstd",
            AlgorithmId::Zlib => "zlib",
            AlgorithmId::Lz4 => "lz4",
            AlgorithmId::Brotli => "brotli",
            AlgorithmId::ZstdDictionary => "zstd+dictionary",
        }
    }
}

impl TryFrom<u8> for AlgorithmId {
    type Error = DaqError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(AlgorithmId::None),
            0x01 => Ok(AlgorithmId::Zstd),
            0x02 => Ok(AlgorithmId::Zlib),
            0x03 => Ok(AlgorithmId::Lz4),
            0x04 => Ok(AlgorithmId::Brotli),
            0x0A => Ok(AlgorithmId::ZstdDictionary),
            other => Err(DaqError::UnsupportedCompressionCode(other)),
        }
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which representation an event payload is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressedState {
    #[default]
    Uncompressed,
    Compressed,
}

impl CompressedState {
    /// Read the state from an event status word
    pub fn from_status(status: u16) -> Self {
        if status & status::COMPRESSED != 0 {
            CompressedState::Compressed
        } else {
            CompressedState::Uncompressed
        }
    }
}

/// Microseconds since the Unix epoch
pub fn now_micros() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_codes() {
        for algo in AlgorithmId::ALL {
            assert_eq!(AlgorithmId::try_from(algo.code()).unwrap(), algo);
        }
        assert_eq!(AlgorithmId::ZstdDictionary.code(), 0x0A);
        assert!(matches!(
            AlgorithmId::try_from(0x05),
            Err(DaqError::UnsupportedCompressionCode(0x05))
        ));
    }

    #[test]
    fn test_compressed_state_from_status() {
        assert_eq!(
            CompressedState::from_status(status::COMPRESSED | status::BCID_MISMATCH),
            CompressedState::Compressed
        );
        assert_eq!(
            CompressedState::from_status(status::BCID_MISMATCH),
            CompressedState::Uncompressed
        );
    }

    #[test]
    fn test_source_family() {
        assert_eq!(SourceFamily::of(0x020001), Some(SourceFamily::Trigger));
        assert_eq!(SourceFamily::of(0x030005), Some(SourceFamily::Tracker));
        assert_eq!(SourceFamily::of(0x040000), Some(SourceFamily::Pmt));
        assert_eq!(SourceFamily::of(0x990000), None);
    }

    #[test]
    fn test_event_tag() {
        assert_eq!(EventTag::try_from(0x03), Ok(EventTag::TlbMonitoring));
        assert_eq!(EventTag::try_from(0x42), Err(0x42));
    }
}
