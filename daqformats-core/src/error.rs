//! Error types for the DAQ formats

use crate::types::AlgorithmId;
use thiserror::Error;

/// Result type alias for DAQ format operations
pub type Result<T> = std::result::Result<T, DaqError>;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum DaqError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed fragment or event record
    #[error("Invalid format: {0}")]
    Format(#[from] FormatError),

    /// A fragment with this source id is already part of the event
    #[error("Duplicate fragment addition for source id 0x{0:06x}")]
    DuplicateFragment(u32),

    /// Compression code found in an event header matches no backend
    #[error("Unsupported compression code: 0x{0:02x}")]
    UnsupportedCompressionCode(u8),

    /// Codec could not be set up (bad configuration value, context allocation,
    /// missing dictionary)
    #[error("Codec setup error: {0}")]
    CodecSetup(String),

    /// Backend reported a compress/decompress failure
    #[error("Codec operation error: {0}")]
    CodecOperation(String),

    /// Operation not allowed in the event's or compressor's current state
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// A compressed event payload could not be restored while parsing
    #[error("Corrupted {algorithm} payload: {reason}")]
    CorruptedPayload {
        algorithm: AlgorithmId,
        reason: String,
    },
}

impl DaqError {
    /// Check if error comes from decoding a malformed record
    pub fn is_format_error(&self) -> bool {
        matches!(self, DaqError::Format(_))
    }

    /// Check if error was raised by the codec layer
    pub fn is_codec_error(&self) -> bool {
        matches!(
            self,
            DaqError::CodecSetup(_)
                | DaqError::CodecOperation(_)
                | DaqError::UnsupportedCompressionCode(_)
                | DaqError::CorruptedPayload { .. }
        )
    }
}

/// Decode failures of the fragment and event wire formats
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Fewer bytes than the smallest possible record
    #[error("Too little data for {what}: need {needed} bytes, have {available}")]
    TooShort {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// Marker byte does not identify the expected record type
    #[error("Wrong {what} marker: expected 0x{expected:02x}, found 0x{found:02x}")]
    BadMarker {
        what: &'static str,
        expected: u8,
        found: u8,
    },

    /// Version is not the latest supported one
    #[error("Unsupported {what} format version {found}")]
    UnsupportedVersion { what: &'static str, found: u16 },

    /// Header size field disagrees with the fixed header layout
    #[error("Bad {what} header size: expected {expected}, found {found}")]
    BadHeaderSize {
        what: &'static str,
        expected: u16,
        found: u16,
    },

    /// Buffer ends inside the declared header
    #[error("Too little data for fragment header: declared {declared} bytes, have {available}")]
    TruncatedHeader { declared: usize, available: usize },

    /// Buffer ends inside the declared payload
    #[error("Too little data for {what}: declared {declared} bytes, have {available}")]
    TruncatedPayload {
        what: &'static str,
        declared: usize,
        available: usize,
    },

    /// Buffer length differs from header_size + payload_size
    #[error("{what} size does not match header information: declared {declared}, got {actual}")]
    SizeMismatch {
        what: &'static str,
        declared: usize,
        actual: usize,
    },

    /// Declared payload exceeds what a stream reader is willing to allocate
    #[error("Payload size too large: {size} > {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Event header fragment count disagrees with the decoded payload
    #[error("Fragment count mismatch: header declares {declared}, payload holds {found}")]
    FragmentCountMismatch { declared: usize, found: usize },
}
