//! DAQ wire formats
//!
//! Two nested record types, both little-endian and packed:
//!
//! - **Fragment**: one detector sub-system's payload behind a 36-byte header
//! - **Event**: a 44-byte header followed by either the concatenated fragments
//!   or, when status bit 11 is set, one opaque compressed blob

mod event;
mod fragment;
mod reader;

pub use event::{Event, EventHeader};
pub use fragment::{Fragment, FragmentHeader};
pub use reader::EventReader;

use std::io::{ErrorKind, Read};

/// Largest payload a stream reader allocates for a single event
pub const MAX_STREAM_PAYLOAD_SIZE: usize = 1_000_000;

/// Read until `buf` is full or the stream ends, returning the bytes read
pub(crate) fn read_fully<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
