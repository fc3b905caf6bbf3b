//! Full event: header plus either a fragment set or a compressed blob

use super::{read_fully, Fragment, MAX_STREAM_PAYLOAD_SIZE};
use crate::compression::{PayloadDecoder, StandaloneDecoder};
use crate::types::{now_micros, status, AlgorithmId, CompressedState, EVENT_MARKER, EVENT_VERSION};
use crate::{DaqError, FormatError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use tracing::{debug, warn};

/// Event header
///
/// Format (44 bytes):
/// - 1 byte: marker (0xBB)
/// - 1 byte: event tag
/// - 2 bytes: trigger bits
/// - 1 byte: format version
/// - 1 byte: compression code
/// - 2 bytes: header size
/// - 4 bytes: payload size
/// - 1 byte: fragment count
/// - 3 bytes: run number
/// - 8 bytes: event id
/// - 8 bytes: event counter
/// - 2 bytes: BC ID
/// - 2 bytes: status
/// - 8 bytes: timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    pub marker: u8,
    pub event_tag: u8,
    pub trigger_bits: u16,
    pub version: u8,
    pub compression_code: u8,
    pub header_size: u16,
    pub payload_size: u32,
    pub fragment_count: u8,
    /// Only the low 24 bits are stored
    pub run_number: u32,
    pub event_id: u64,
    pub event_counter: u64,
    pub bc_id: u16,
    pub status: u16,
    pub timestamp: u64,
}

impl EventHeader {
    /// Header size in bytes
    pub const SIZE: usize = 44;

    /// Mask for the 24-bit run number
    pub const RUN_NUMBER_MASK: u32 = 0x00FF_FFFF;

    /// Append the header to a buffer
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.marker);
        buf.put_u8(self.event_tag);
        buf.put_u16_le(self.trigger_bits);
        buf.put_u8(self.version);
        buf.put_u8(self.compression_code);
        buf.put_u16_le(self.header_size);
        buf.put_u32_le(self.payload_size);
        buf.put_u8(self.fragment_count);
        buf.put_uint_le((self.run_number & Self::RUN_NUMBER_MASK) as u64, 3);
        buf.put_u64_le(self.event_id);
        buf.put_u64_le(self.event_counter);
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
                what: "event header",
                needed: Self::SIZE,
                available: data.len(),
            }
            .into());
        }

        let mut cursor = std::io::Cursor::new(data);
        Ok(Self {
            marker: cursor.get_u8(),
            event_tag: cursor.get_u8(),
            trigger_bits: cursor.get_u16_le(),
            version: cursor.get_u8(),
            compression_code: cursor.get_u8(),
            header_size: cursor.get_u16_le(),
            payload_size: cursor.get_u32_le(),
            fragment_count: cursor.get_u8(),
            run_number: cursor.get_uint_le(3) as u32,
            event_id: cursor.get_u64_le(),
            event_counter: cursor.get_u64_le(),
            bc_id: cursor.get_u16_le(),
            status: cursor.get_u16_le(),
            timestamp: cursor.get_u64_le(),
        })
    }

    /// Check marker, version and header size
    pub fn validate(&self) -> Result<()> {
        if self.marker != EVENT_MARKER {
            return Err(FormatError::BadMarker {
                what: "event",
                expected: EVENT_MARKER,
                found: self.marker,
            }
            .into());
        }
        if self.version != EVENT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                what: "event",
                found: self.version as u16,
            }
            .into());
        }
        if self.header_size as usize != Self::SIZE {
            return Err(FormatError::BadHeaderSize {
                what: "event",
                expected: Self::SIZE as u16,
                found: self.header_size,
            }
            .into());
        }
        Ok(())
    }

    /// Encoded event size: header plus payload
    pub fn size(&self) -> usize {
        self.header_size as usize + self.payload_size as usize
    }

    /// Whether status bit 11 marks the payload as compressed
    pub fn compressed_state(&self) -> CompressedState {
        CompressedState::from_status(self.status)
    }
}

/// Payload representation; the Compressed status bit says which one is live
#[derive(Debug, Clone, PartialEq, Eq)]
enum EventBody {
    Fragments(BTreeMap<u32, Fragment>),
    Compressed(Vec<u8>),
}

/// An event: header plus fragments keyed by source id, or a compressed blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    header: EventHeader,
    body: EventBody,
}

impl Event {
    /// Create an empty event; fragments are added later
    pub fn new(event_tag: u8, run_number: u32, event_counter: u64) -> Self {
        Self {
            header: EventHeader {
                marker: EVENT_MARKER,
                event_tag,
                trigger_bits: 0,
                version: EVENT_VERSION,
                compression_code: AlgorithmId::None.code(),
                header_size: EventHeader::SIZE as u16,
                payload_size: 0,
                fragment_count: 0,
                run_number: run_number & EventHeader::RUN_NUMBER_MASK,
                event_id: 0,
                event_counter,
                bc_id: 0xFFFF,
                status: 0,
                timestamp: now_micros(),
            },
            body: EventBody::Fragments(BTreeMap::new()),
        }
    }

    /// Decode an event occupying exactly `data`
    ///
    /// Compressed payloads are restored with a [`StandaloneDecoder`], which
    /// handles every algorithm except dictionary-based zstd.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with(data, &mut StandaloneDecoder)
    }

    /// Decode an event occupying exactly `data`, restoring compressed payloads
    /// with the given decoder
    pub fn from_bytes_with<D: PayloadDecoder + ?Sized>(
        data: &[u8],
        decoder: &mut D,
    ) -> Result<Self> {
        let header = EventHeader::from_bytes(data)?;
        header.validate()?;
        if header.size() != data.len() {
            return Err(FormatError::SizeMismatch {
                what: "event",
                declared: header.size(),
                actual: data.len(),
            }
            .into());
        }
        Self::from_parts(header, &data[EventHeader::SIZE..], decoder)
    }

    /// Read the next event from a stream
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        Self::read_from_with(reader, &mut StandaloneDecoder)
    }

    /// Read the next event from a stream, restoring compressed payloads with
    /// the given decoder
    pub fn read_from_with<R, D>(reader: &mut R, decoder: &mut D) -> Result<Self>
    where
        R: Read + ?Sized,
        D: PayloadDecoder + ?Sized,
    {
        let mut raw_header = [0u8; EventHeader::SIZE];
        let read = read_fully(reader, &mut raw_header)?;
        Self::read_body(reader, &raw_header[..read], decoder)
    }

    /// Finish reading an event whose header bytes were already pulled from the stream
    pub(crate) fn read_body<R, D>(
        reader: &mut R,
        raw_header: &[u8],
        decoder: &mut D,
    ) -> Result<Self>
    where
        R: Read + ?Sized,
        D: PayloadDecoder + ?Sized,
    {
        let header = EventHeader::from_bytes(raw_header)?;
        header.validate()?;

        let payload_size = header.payload_size as usize;
        if payload_size > MAX_STREAM_PAYLOAD_SIZE {
            return Err(FormatError::PayloadTooLarge {
                size: payload_size,
                limit: MAX_STREAM_PAYLOAD_SIZE,
            }
            .into());
        }

        let mut payload = vec![0u8; payload_size];
        let read = read_fully(reader, &mut payload)?;
        if read != payload_size {
            return Err(FormatError::TruncatedPayload {
                what: "event",
                declared: payload_size,
                available: read,
            }
            .into());
        }

        Self::from_parts(header, &payload, decoder)
    }

    fn from_parts<D: PayloadDecoder + ?Sized>(
        mut header: EventHeader,
        payload: &[u8],
        decoder: &mut D,
    ) -> Result<Self> {
        if header.compressed_state() == CompressedState::Uncompressed {
            let fragments = Self::parse_fragments(&header, payload)?;
            return Ok(Self {
                header,
                body: EventBody::Fragments(fragments),
            });
        }

        let algorithm = AlgorithmId::try_from(header.compression_code)?;
        let restored = decoder.decode_payload(&header, payload).map_err(|e| match e {
            DaqError::CodecOperation(reason) => {
                warn!(
                    "Failed to restore {} payload of event {}: {}",
                    algorithm, header.event_counter, reason
                );
                DaqError::CorruptedPayload { algorithm, reason }
            }
            other => other,
        })?;

        debug!(
            "Restored event {} payload: {} -> {} bytes ({})",
            header.event_counter,
            payload.len(),
            restored.len(),
            algorithm
        );

        header.status &= !status::COMPRESSED;
        header.compression_code = AlgorithmId::None.code();
        header.payload_size = restored.len() as u32;

        let fragments = Self::parse_fragments(&header, &restored)?;
        Ok(Self {
            header,
            body: EventBody::Fragments(fragments),
        })
    }

    fn parse_fragments(header: &EventHeader, payload: &[u8]) -> Result<BTreeMap<u32, Fragment>> {
        let mut fragments = BTreeMap::new();
        let mut data = payload;

        for found in 0..header.fragment_count as usize {
            if data.is_empty() {
                return Err(FormatError::FragmentCountMismatch {
                    declared: header.fragment_count as usize,
                    found,
                }
                .into());
            }
            let fragment = Fragment::from_bytes(data, true)?;
            data = &data[fragment.size() as usize..];

            let source_id = fragment.source_id();
            if fragments.insert(source_id, fragment).is_some() {
                return Err(DaqError::DuplicateFragment(source_id));
            }
        }

        if !data.is_empty() {
            return Err(FormatError::SizeMismatch {
                what: "event payload",
                declared: payload.len(),
                actual: payload.len() - data.len(),
            }
            .into());
        }

        Ok(fragments)
    }

    /// Add a fragment, taking ownership of it
    ///
    /// Returns the status bits raised by this addition (currently only
    /// BCID mismatch, which does not prevent the fragment being added).
    pub fn add_fragment(&mut self, fragment: Fragment) -> Result<u16> {
        let fragments = match &mut self.body {
            EventBody::Fragments(fragments) => fragments,
            EventBody::Compressed(_) => {
                return Err(DaqError::InvalidState("cannot add fragments to a compressed event"))
            }
        };

        let source_id = fragment.source_id();
        if fragments.contains_key(&source_id) {
            return Err(DaqError::DuplicateFragment(source_id));
        }
        let fragment_count = self
            .header
            .fragment_count
            .checked_add(1)
            .ok_or(DaqError::InvalidState("event already holds 255 fragments"))?;
        let payload_size = self
            .header
            .payload_size
            .checked_add(fragment.size())
            .ok_or(DaqError::InvalidState("event payload size exceeds 32 bits"))?;

        if self.header.fragment_count == 0 {
            self.header.bc_id = fragment.bc_id();
            self.header.event_id = fragment.event_id();
        }
        self.header.fragment_count = fragment_count;
        self.header.trigger_bits |= fragment.trigger_bits();
        self.header.payload_size = payload_size;

        let mut raised = 0;
        if self.header.bc_id != fragment.bc_id() {
            debug!(
                "BCID mismatch in event {}: event {} vs fragment 0x{:06x} {}",
                self.header.event_counter,
                self.header.bc_id,
                source_id,
                fragment.bc_id()
            );
            raised |= status::BCID_MISMATCH;
        }
        self.header.status |= fragment.status() | raised;

        fragments.insert(source_id, fragment);
        Ok(raised)
    }

    /// OR new error flags into the existing ones
    pub fn update_status(&mut self, status: u16) {
        self.header.status |= status;
    }

    /// Full encoded event
    pub fn raw(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size() as usize);
        self.header.encode(&mut buf);
        match &self.body {
            EventBody::Fragments(fragments) => {
                for fragment in fragments.values() {
                    fragment.raw_append(&mut buf);
                }
            }
            EventBody::Compressed(data) => buf.put_slice(data),
        }
        buf.freeze()
    }

    /// Concatenated encoded fragments without the event header
    ///
    /// This is the exact byte stream handed to a compression codec. Empty for
    /// a compressed event.
    pub fn raw_fragments(&self) -> Bytes {
        let mut buf = BytesMut::new();
        if let EventBody::Fragments(fragments) = &self.body {
            buf.reserve(self.header.payload_size as usize);
            for fragment in fragments.values() {
                fragment.raw_append(&mut buf);
            }
        }
        buf.freeze()
    }

    /// Replace all fragments by a compressed blob
    ///
    /// Sets the payload size to the blob length and raises the Compressed
    /// status bit. The fragment count keeps describing the original payload.
    pub fn load_compressed_data(&mut self, data: Vec<u8>) {
        self.header.payload_size = data.len() as u32;
        self.header.status |= status::COMPRESSED;
        self.body = EventBody::Compressed(data);
    }

    /// Record which algorithm produced the payload
    pub fn set_compression_algo(&mut self, algorithm: AlgorithmId) {
        self.header.compression_code = algorithm.code();
    }

    /// Algorithm recorded in the header
    pub fn compression_algo(&self) -> Result<AlgorithmId> {
        AlgorithmId::try_from(self.header.compression_code)
    }

    /// Set or clear the Compressed status bit
    ///
    /// The bit must describe the payload actually held: a fragment body can
    /// only be marked uncompressed and a blob only compressed.
    pub fn set_compressed_state(&mut self, state: CompressedState) -> Result<()> {
        match (&self.body, state) {
            (EventBody::Compressed(_), CompressedState::Compressed) => {
                self.header.status |= status::COMPRESSED;
                Ok(())
            }
            (EventBody::Fragments(_), CompressedState::Uncompressed) => {
                self.header.status &= !status::COMPRESSED;
                Ok(())
            }
            (EventBody::Fragments(_), CompressedState::Compressed) => Err(DaqError::InvalidState(
                "an event holding fragments cannot be marked compressed",
            )),
            (EventBody::Compressed(_), CompressedState::Uncompressed) => Err(
                DaqError::InvalidState("a compressed payload cannot be marked uncompressed"),
            ),
        }
    }

    pub fn compressed_state(&self) -> CompressedState {
        self.header.compressed_state()
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed_state() == CompressedState::Compressed
    }

    /// Compressed blob, if the event is in compressed state
    pub fn compressed_payload(&self) -> Option<&[u8]> {
        match &self.body {
            EventBody::Compressed(data) => Some(data),
            EventBody::Fragments(_) => None,
        }
    }

    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    pub fn event_tag(&self) -> u8 {
        self.header.event_tag
    }

    pub fn status(&self) -> u16 {
        self.header.status
    }

    pub fn event_id(&self) -> u64 {
        self.header.event_id
    }

    pub fn event_counter(&self) -> u64 {
        self.header.event_counter
    }

    pub fn bc_id(&self) -> u16 {
        self.header.bc_id
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

    pub fn run_number(&self) -> u32 {
        self.header.run_number
    }

    pub fn trigger_bits(&self) -> u16 {
        self.header.trigger_bits
    }

    pub fn fragment_count(&self) -> u8 {
        self.header.fragment_count
    }

    /// Source ids of the contained fragments, ascending
    pub fn fragment_ids(&self) -> Vec<u32> {
        match &self.body {
            EventBody::Fragments(fragments) => fragments.keys().copied().collect(),
            EventBody::Compressed(_) => Vec::new(),
        }
    }

    /// Find the fragment with a specific source id
    pub fn find_fragment(&self, source_id: u32) -> Option<&Fragment> {
        match &self.body {
            EventBody::Fragments(fragments) => fragments.get(&source_id),
            EventBody::Compressed(_) => None,
        }
    }

    /// Iterate over fragments in source id order
    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        let fragments = match &self.body {
            EventBody::Fragments(fragments) => Some(fragments.values()),
            EventBody::Compressed(_) => None,
        };
        fragments.into_iter().flatten()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event: {:8} (0x{:08x})  tag={} bc={:4} trig=0x{:04x} status=0x{:04x} \
             time={} #fragments={} payload={:6} bytes",
            self.event_counter(),
            self.event_id(),
            self.event_tag(),
            self.bc_id(),
            self.trigger_bits(),
            self.status(),
            self.timestamp(),
            self.fragment_count(),
            self.payload_size()
        )?;
        if self.is_compressed() {
            let algorithm = self
                .compression_algo()
                .map(|a| a.name())
                .unwrap_or("unknown");
            write!(f, " [compressed: {}]", algorithm)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventTag;
    use std::io::Cursor;

    fn fragment(source_id: u32, bc_id: u16, payload: &[u8]) -> Fragment {
        Fragment::new(0, source_id, 77, bc_id, payload)
    }

    fn sample_event() -> Event {
        let mut event = Event::new(EventTag::Physics as u8, 9015, 3);
        let mut trigger = fragment(0x020000, 100, &[1, 2, 3, 4]);
        trigger.set_trigger_bits(0x0004);
        event.add_fragment(trigger).unwrap();
        event.add_fragment(fragment(0x030000, 100, &[5; 64])).unwrap();
        event.add_fragment(fragment(0x040000, 100, &[])).unwrap();
        event
    }

    #[test]
    fn test_new_event() {
        let event = Event::new(EventTag::Calibration as u8, 0x1234_5678, 11);
        assert_eq!(event.run_number(), 0x34_5678);
        assert_eq!(event.bc_id(), 0xFFFF);
        assert_eq!(event.payload_size(), 0);
        assert_eq!(event.size(), EventHeader::SIZE as u32);
        assert!(!event.is_compressed());
        assert_eq!(event.compression_algo().unwrap(), AlgorithmId::None);
    }

    #[test]
    fn test_add_fragment_bookkeeping() {
        let event = sample_event();
        assert_eq!(event.fragment_count(), 3);
        assert_eq!(event.fragment_ids(), vec![0x020000, 0x030000, 0x040000]);
        assert_eq!(event.payload_size(), (36 + 4) + (36 + 64) + 36);
        assert_eq!(event.trigger_bits(), 0x0004);
        assert_eq!(event.bc_id(), 100);
        assert_eq!(event.event_id(), 77);
        assert_eq!(event.status(), 0);
        assert_eq!(event.raw_fragments().len(), event.payload_size() as usize);
    }

    #[test]
    fn test_duplicate_fragment() {
        let mut event = sample_event();
        let result = event.add_fragment(fragment(0x030000, 100, &[9]));
        assert!(matches!(result, Err(DaqError::DuplicateFragment(0x030000))));
        assert_eq!(event.fragment_count(), 3);
        assert_eq!(event.find_fragment(0x030000).unwrap().payload(), &[5; 64]);
    }

    #[test]
    fn test_bcid_mismatch() {
        let mut event = sample_event();
        let raised = event.add_fragment(fragment(0x020001, 101, &[7])).unwrap();
        assert_eq!(raised, status::BCID_MISMATCH);
        assert_ne!(event.status() & status::BCID_MISMATCH, 0);
        assert!(event.find_fragment(0x020001).is_some());
        assert_eq!(event.bc_id(), 100);
    }

    #[test]
    fn test_fragment_status_propagates() {
        let mut event = Event::new(0, 1, 1);
        let mut frag = fragment(0x030000, 5, &[1]);
        frag.set_status(status::CORRUPTED_FRAGMENT);
        event.add_fragment(frag).unwrap();
        assert_eq!(event.status(), status::CORRUPTED_FRAGMENT);
    }

    #[test]
    fn test_header_wire_layout() {
        let event = sample_event();
        let raw = event.raw();
        assert_eq!(raw.len(), event.size() as usize);
        assert_eq!(raw[0], 0xBB);
        assert_eq!(raw[4], EVENT_VERSION);
        assert_eq!(raw[5], 0x00);
        assert_eq!(&raw[6..8], &[44, 0]);
        assert_eq!(raw[12], 3);
        assert_eq!(&raw[13..16], &[0x37, 0x23, 0x00]);
        assert_eq!(&raw[24..32], &3u64.to_le_bytes());
        assert_eq!(raw[44], 0xAA);
    }

    #[test]
    fn test_event_roundtrip() {
        let event = sample_event();
        let decoded = Event::from_bytes(&event.raw()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.raw(), event.raw());
    }

    #[test]
    fn test_stream_roundtrip() {
        let event = sample_event();
        let mut cursor = Cursor::new(event.raw().to_vec());
        let decoded = Event::read_from(&mut cursor).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_size_mismatch() {
        let mut raw = sample_event().raw().to_vec();
        raw.push(0);
        assert!(matches!(
            Event::from_bytes(&raw),
            Err(DaqError::Format(FormatError::SizeMismatch { .. }))
        ));
    }

    #[test]
    fn test_bad_header() {
        let mut raw = sample_event().raw().to_vec();
        raw[0] = 0x00;
        assert!(matches!(
            Event::from_bytes(&raw),
            Err(DaqError::Format(FormatError::BadMarker { .. }))
        ));

        assert!(matches!(
            Event::from_bytes(&raw[..10]),
            Err(DaqError::Format(FormatError::TooShort { .. }))
        ));
    }

    #[test]
    fn test_stream_truncated_payload() {
        let raw = sample_event().raw();
        let mut cursor = Cursor::new(raw[..raw.len() - 5].to_vec());
        assert!(matches!(
            Event::read_from(&mut cursor),
            Err(DaqError::Format(FormatError::TruncatedPayload { .. }))
        ));
    }

    #[test]
    fn test_stream_payload_too_large() {
        let mut header = sample_event().header().clone();
        header.payload_size = (MAX_STREAM_PAYLOAD_SIZE + 1) as u32;
        let mut cursor = Cursor::new(header.to_bytes().to_vec());
        assert!(matches!(
            Event::read_from(&mut cursor),
            Err(DaqError::Format(FormatError::PayloadTooLarge { .. }))
        ));
    }

    #[test]
    fn test_fragment_count_mismatch() {
        let event = sample_event();
        let mut header = event.header().clone();
        header.fragment_count = 4;
        let mut raw = header.to_bytes().to_vec();
        raw.extend_from_slice(&event.raw_fragments());
        assert!(matches!(
            Event::from_bytes(&raw),
            Err(DaqError::Format(FormatError::FragmentCountMismatch { declared: 4, found: 3 }))
        ));
    }

    #[test]
    fn test_load_compressed_data() {
        let mut event = sample_event();
        event.load_compressed_data(vec![1, 2, 3]);
        event.set_compression_algo(AlgorithmId::Zlib);

        assert!(event.is_compressed());
        assert_eq!(event.payload_size(), 3);
        assert_eq!(event.fragment_count(), 3);
        assert!(event.fragment_ids().is_empty());
        assert!(event.raw_fragments().is_empty());
        assert_eq!(event.compressed_payload(), Some(&[1u8, 2, 3][..]));
        assert_eq!(event.compression_algo().unwrap(), AlgorithmId::Zlib);
        assert_eq!(&event.raw()[EventHeader::SIZE..], &[1, 2, 3]);

        let result = event.add_fragment(fragment(0x020005, 100, &[1]));
        assert!(matches!(result, Err(DaqError::InvalidState(_))));
    }

    #[test]
    fn test_compression_mutators_are_idempotent() {
        let mut event = sample_event();
        event.set_compressed_state(CompressedState::Uncompressed).unwrap();
        assert!(!event.is_compressed());

        event.load_compressed_data(vec![1, 2, 3]);
        event.set_compressed_state(CompressedState::Compressed).unwrap();
        event.set_compressed_state(CompressedState::Compressed).unwrap();
        assert!(event.is_compressed());
        event.set_compression_algo(AlgorithmId::Brotli);
        event.set_compression_algo(AlgorithmId::Brotli);
        assert_eq!(event.compression_algo().unwrap(), AlgorithmId::Brotli);
    }

    #[test]
    fn test_compressed_state_must_match_payload() {
        let mut event = sample_event();
        let before = event.clone();
        assert!(matches!(
            event.set_compressed_state(CompressedState::Compressed),
            Err(DaqError::InvalidState(_))
        ));
        assert_eq!(event, before);
        assert!(!event.is_compressed());
        assert_eq!(Event::from_bytes(&event.raw()).unwrap().raw(), before.raw());

        event.load_compressed_data(vec![1, 2, 3]);
        assert!(matches!(
            event.set_compressed_state(CompressedState::Uncompressed),
            Err(DaqError::InvalidState(_))
        ));
        assert!(event.is_compressed());
        assert_eq!(event.compressed_payload(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_fragment_count_limit() {
        let mut event = Event::new(0, 1, 1);
        for i in 0..255u32 {
            event
                .add_fragment(Fragment::new(0, 0x030000 + i, 5, 10, &[i as u8]))
                .unwrap();
        }
        assert_eq!(event.fragment_count(), 255);
        let before = event.clone();

        let result = event.add_fragment(Fragment::new(0, 0x030000 + 255, 99, 77, &[0]));
        assert!(matches!(result, Err(DaqError::InvalidState(_))));
        assert_eq!(event, before);
        assert_eq!(event.fragments().count(), 255);
        assert_eq!(event.bc_id(), 10);
        assert_eq!(event.event_id(), 5);

        let reparsed = Event::from_bytes(&event.raw()).unwrap();
        assert_eq!(reparsed.fragment_count(), 255);
        assert_eq!(reparsed.raw(), event.raw());
    }

    #[test]
    fn test_corrupted_compressed_payload_is_reported() {
        let mut event = sample_event();
        event.load_compressed_data(vec![0xde, 0xad, 0xbe, 0xef, 0x00, 0x11]);
        event.set_compression_algo(AlgorithmId::Zlib);

        let result = Event::from_bytes(&event.raw());
        assert!(matches!(
            result,
            Err(DaqError::CorruptedPayload {
                algorithm: AlgorithmId::Zlib,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_compression_code() {
        let mut event = sample_event();
        event.load_compressed_data(vec![1, 2, 3]);
        let mut raw = event.raw().to_vec();
        raw[5] = 0x07;
        assert!(matches!(
            Event::from_bytes(&raw),
            Err(DaqError::UnsupportedCompressionCode(0x07))
        ));
    }

    #[test]
    fn test_display() {
        let line = sample_event().to_string();
        assert!(line.starts_with("Event:        3"));
        assert!(line.contains("#fragments=3"));
    }
}
