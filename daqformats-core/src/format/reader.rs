//! Sequential reader over a stream of back-to-back events

use super::{read_fully, Event, EventHeader};
use crate::compression::{PayloadDecoder, StandaloneDecoder};
use crate::{FormatError, Result};
use std::io::Read;
use tracing::debug;

/// Iterator yielding each event of a raw data stream
///
/// Iteration ends cleanly when the stream ends on a record boundary. A partial
/// or malformed record is yielded as an error, after which the reader stops.
pub struct EventReader<R: Read, D: PayloadDecoder = StandaloneDecoder> {
    inner: R,
    decoder: D,
    events_read: usize,
    finished: bool,
}

impl<R: Read> EventReader<R> {
    /// Create a reader restoring compressed events without a dictionary
    pub fn new(reader: R) -> Self {
        Self::with_decoder(reader, StandaloneDecoder)
    }
}

impl<R: Read, D: PayloadDecoder> EventReader<R, D> {
    /// Create a reader restoring compressed events with the given decoder
    pub fn with_decoder(reader: R, decoder: D) -> Self {
        Self {
            inner: reader,
            decoder,
            events_read: 0,
            finished: false,
        }
    }

    /// Number of events successfully read so far
    pub fn events_read(&self) -> usize {
        self.events_read
    }

    pub fn decoder_mut(&mut self) -> &mut D {
        &mut self.decoder
    }

    pub fn into_inner(self) -> (R, D) {
        (self.inner, self.decoder)
    }

    fn read_event(&mut self) -> Result<Option<Event>> {
        let mut raw_header = [0u8; EventHeader::SIZE];
        let read = read_fully(&mut self.inner, &mut raw_header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < EventHeader::SIZE {
            return Err(FormatError::TooShort {
                what: "event header",
                needed: EventHeader::SIZE,
                available: read,
            }
            .into());
        }
        Event::read_body(&mut self.inner, &raw_header, &mut self.decoder).map(Some)
    }
}

impl<R: Read, D: PayloadDecoder> Iterator for EventReader<R, D> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_event() {
            Ok(Some(event)) => {
                self.events_read += 1;
                Some(Ok(event))
            }
            Ok(None) => {
                debug!("End of event stream after {} events", self.events_read);
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
