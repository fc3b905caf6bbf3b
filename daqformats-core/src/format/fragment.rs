//! Event fragment: one detector payload behind a fixed 36-byte header
//!
//! Wire layout (little-endian, packed):
//!
//! ```text
//! marker u8 | tag u8 | trigger_bits u16 | version u16 | header_size u16 |
//! payload_size u32 | source_id u32 | event_id u64 | bc_id u16 | status u16 |
//! timestamp u64 | payload[payload_size]
//! ```

use crate::types::{now_micros, SourceFamily, FRAGMENT_MARKER, FRAGMENT_VERSION};
use crate::{FormatError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Fragment header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentHeader {
    pub marker: u8,
    pub fragment_tag: u8,
    pub trigger_bits: u16,
    pub version: u16,
    pub header_size: u16,
    pub payload_size: u32,
    pub source_id: u32,
    pub event_id: u64,
    pub bc_id: u16,
    pub status: u16,
    pub timestamp: u64,
}

impl FragmentHeader {
    /// Header size in bytes
    pub const SIZE: usize = 36;

    /// Bytes needed to see marker, version and header size
    const PREAMBLE: usize = 8;

    /// Append the header to a buffer
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.marker);
        buf.put_u8(self.fragment_tag);
        buf.put_u16_le(self.trigger_bits);
        buf.put_u16_le(self.version);
        buf.put_u16_le(self.header_size);
        buf.put_u32_le(self.payload_size);
        buf.put_u32_le(self.source_id);
        buf.put_u64_le(self.event_id);
        buf.put_u16_le(self.bc_id);
        buf.put_u16_le(self.status);
        buf.put_u64_le(self.timestamp);
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Deserialize from bytes without validating the field values
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(FormatError::TooShort {
                what: "fragment header",
                needed: Self::SIZE,
                available: data.len(),
            }
            .into());
        }

        let mut cursor = std::io::Cursor::new(data);
        Ok(Self {
            marker: cursor.get_u8(),
            fragment_tag: cursor.get_u8(),
            trigger_bits: cursor.get_u16_le(),
            version: cursor.get_u16_le(),
            header_size: cursor.get_u16_le(),
            payload_size: cursor.get_u32_le(),
            source_id: cursor.get_u32_le(),
            event_id: cursor.get_u64_le(),
            bc_id: cursor.get_u16_le(),
            status: cursor.get_u16_le(),
            timestamp: cursor.get_u64_le(),
        })
    }
}

/// A detector payload together with its header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    header: FragmentHeader,
    payload: Vec<u8>,
}

impl Fragment {
    /// Wrap a detector payload, stamping marker, version and the current time
    pub fn new(
        fragment_tag: u8,
        source_id: u32,
        event_id: u64,
        bc_id: u16,
        payload: &[u8],
    ) -> Self {
        Self {
            header: FragmentHeader {
                marker: FRAGMENT_MARKER,
                fragment_tag,
                trigger_bits: 0,
                version: FRAGMENT_VERSION,
                header_size: FragmentHeader::SIZE as u16,
                payload_size: payload.len() as u32,
                source_id,
                event_id,
                bc_id,
                status: 0,
                timestamp: now_micros(),
            },
            payload: payload.to_vec(),
        }
    }

    /// Decode an encoded fragment
    ///
    /// With `allow_excess_data` the buffer may continue past the fragment, which
    /// is how fragments are read back-to-back out of an event payload.
    pub fn from_bytes(data: &[u8], allow_excess_data: bool) -> Result<Self> {
        if data.len() < FragmentHeader::PREAMBLE {
            return Err(FormatError::TooShort {
                what: "fragment header",
                needed: FragmentHeader::PREAMBLE,
                available: data.len(),
            }
            .into());
        }

        let mut cursor = std::io::Cursor::new(data);
        let marker = cursor.get_u8();
        if marker != FRAGMENT_MARKER {
            return Err(FormatError::BadMarker {
                what: "fragment",
                expected: FRAGMENT_MARKER,
                found: marker,
            }
            .into());
        }
        cursor.advance(3);
        let version = cursor.get_u16_le();
        if version != FRAGMENT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                what: "fragment",
                found: version,
            }
            .into());
        }
        let header_size = cursor.get_u16_le();
        if header_size as usize != FragmentHeader::SIZE {
            return Err(FormatError::BadHeaderSize {
                what: "fragment",
                expected: FragmentHeader::SIZE as u16,
                found: header_size,
            }
            .into());
        }
        if data.len() < FragmentHeader::SIZE {
            return Err(FormatError::TruncatedHeader {
                declared: FragmentHeader::SIZE,
                available: data.len(),
            }
            .into());
        }

        let header = FragmentHeader::from_bytes(data)?;
        let total = FragmentHeader::SIZE + header.payload_size as usize;
        if data.len() < total {
            return Err(FormatError::TruncatedPayload {
                what: "fragment",
                declared: total,
                available: data.len(),
            }
            .into());
        }
        if data.len() != total && !allow_excess_data {
            return Err(FormatError::SizeMismatch {
                what: "fragment",
                declared: total,
                actual: data.len(),
            }
            .into());
        }

        Ok(Self {
            payload: data[FragmentHeader::SIZE..total].to_vec(),
            header,
        })
    }

    /// Full encoded fragment
    pub fn raw(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size() as usize);
        self.raw_append(&mut buf);
        buf.freeze()
    }

    /// Append the encoded fragment to an existing buffer (for building events)
    pub fn raw_append(&self, buf: &mut BytesMut) {
        buf.reserve(self.size() as usize);
        self.header.encode(buf);
        buf.put_slice(&self.payload);
    }

    /// Overwrite the status bits
    pub fn set_status(&mut self, status: u16) {
        self.header.status = status;
    }

    /// Overwrite the trigger bits
    pub fn set_trigger_bits(&mut self, trigger_bits: u16) {
        self.header.trigger_bits = trigger_bits;
    }

    pub fn header(&self) -> &FragmentHeader {
        &self.header
    }

    /// Detector payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn event_id(&self) -> u64 {
        self.header.event_id
    }

    pub fn fragment_tag(&self) -> u8 {
        self.header.fragment_tag
    }

    pub fn source_id(&self) -> u32 {
        self.header.source_id
    }

    pub fn source_family(&self) -> Option<SourceFamily> {
        SourceFamily::of(self.header.source_id)
    }

    pub fn bc_id(&self) -> u16 {
        self.header.bc_id
    }

    pub fn status(&self) -> u16 {
        self.header.status
    }

    pub fn trigger_bits(&self) -> u16 {
        self.header.trigger_bits
    }

    /// Encoded size: header plus payload
    pub fn size(&self) -> u32 {
        self.header.header_size as u32 + self.header.payload_size
    }

    pub fn payload_size(&self) -> u32 {
        self.header.payload_size
    }

    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " Fragment: tag={} source=0x{:04x} bc={:4} status=0x{:04x} payload={:5} bytes",
            self.fragment_tag(),
            self.source_id(),
            self.bc_id(),
            self.status(),
            self.payload_size()
        )
    }
}
