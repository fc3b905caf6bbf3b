//! Event-level compressor: one backend plus configuration and metrics logs

use super::config::{CompressorConfig, COMPRESSOR_KEY};
use super::metrics::{EventMetrics, MetricsLog};
use super::{Backend, Codec, CodecKind, PayloadDecoder};
use crate::format::{Event, EventHeader};
use crate::types::{status, AlgorithmId};
use crate::{DaqError, Result};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of a [`Compressor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressorState {
    /// No configuration merged yet
    Unconfigured,
    /// Configuration merged, backend context not allocated
    Configured,
    /// Backend context allocated; compress and decompress are available
    Ready,
}

/// Compresses events in place and restores them
///
/// One instance per thread: the backend keeps mutable stream state between
/// calls. The native context is released on [`close`](Self::close) or drop.
#[derive(Debug)]
pub struct Compressor {
    backend: Backend,
    config: CompressorConfig,
    state: CompressorState,
    decompression_armed: bool,
    compression_log: Option<MetricsLog>,
    decompression_log: Option<MetricsLog>,
}

impl Compressor {
    /// Create an unconfigured compressor for the given backend
    pub fn new(kind: CodecKind) -> Self {
        Self {
            backend: Backend::new(kind),
            config: CompressorConfig::new(),
            state: CompressorState::Unconfigured,
            decompression_armed: false,
            compression_log: None,
            decompression_log: None,
        }
    }

    /// Pick the backend from the `Compressor` key (ZSTD when absent) and
    /// merge the whole configuration
    pub fn from_config(config: &CompressorConfig) -> Result<Self> {
        let kind = config.lookup::<CodecKind>(COMPRESSOR_KEY)?.unwrap_or(CodecKind::Zstd);
        let mut compressor = Self::new(kind);
        compressor.config_compression(config);
        Ok(compressor)
    }

    pub fn kind(&self) -> CodecKind {
        self.backend.kind()
    }

    /// Code written into the header of compressed events
    pub fn algorithm(&self) -> AlgorithmId {
        self.backend.algorithm()
    }

    pub fn state(&self) -> CompressorState {
        self.state
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    pub fn is_logging(&self) -> bool {
        self.compression_log.is_some()
    }

    pub fn is_decompressing(&self) -> bool {
        self.decompression_armed
    }

    /// Merge key/value settings; nothing is validated until setup
    pub fn config_compression(&mut self, config: &CompressorConfig) {
        self.config.merge(config);
        if self.state == CompressorState::Unconfigured {
            self.state = CompressorState::Configured;
        }
    }

    /// Apply the configuration and allocate the backend context
    ///
    /// Missing settings fall back to the backend's defaults; a present but
    /// malformed or out-of-range value fails with [`DaqError::CodecSetup`].
    pub fn setup_compression(&mut self) -> Result<()> {
        if let Err(e) = self.backend.setup(&self.config) {
            warn!("Failed to set up {} compressor: {}", self.kind(), e);
            self.backend.release();
            self.decompression_armed = false;
            if self.state == CompressorState::Ready {
                self.state = CompressorState::Configured;
            }
            return Err(e);
        }
        self.state = CompressorState::Ready;
        info!("{} compressor ready ({})", self.kind(), self.algorithm());
        Ok(())
    }

    /// Set up and start a metrics log named `label`
    pub fn setup_compression_and_logging(&mut self, label: &str) -> Result<()> {
        self.setup_compression()?;
        self.compression_log =
            Some(MetricsLog::new(label, self.kind().name(), self.config.clone()));
        if self.decompression_armed {
            self.start_decompression_log();
        }
        debug!("Metrics logging enabled for {}", label);
        Ok(())
    }

    /// Prepare the decompression side; with logging on, also start the
    /// decompression log
    pub fn support_decompression(&mut self) -> Result<()> {
        if self.state != CompressorState::Ready {
            return Err(DaqError::InvalidState(
                "compressor must be set up before enabling decompression",
            ));
        }
        self.backend.prepare_decompression()?;
        self.decompression_armed = true;
        self.start_decompression_log();
        Ok(())
    }

    /// Open the decompression log next to an existing compression log
    fn start_decompression_log(&mut self) {
        if let Some(log) = &self.compression_log {
            self.decompression_log = Some(MetricsLog::new(
                format!("{}_decompression", log.file_name),
                self.kind().name(),
                self.config.clone(),
            ));
        }
    }

    /// Replace the fragments of `event` by their compressed form
    ///
    /// On failure the event is left untouched.
    pub fn compress(&mut self, event: &mut Event) -> Result<()> {
        if self.state != CompressorState::Ready {
            return Err(DaqError::InvalidState("compressor is not set up"));
        }
        if event.is_compressed() {
            return Err(DaqError::InvalidState("event is already compressed"));
        }

        let input = event.raw_fragments();
        let started = Instant::now();
        let output = self.backend.compress(&input).map_err(|e| {
            warn!("Compression of event {} failed: {}", event.event_counter(), e);
            e
        })?;
        let elapsed = started.elapsed();

        debug!(
            "Event {}: {} -> {} bytes with {}",
            event.event_counter(),
            input.len(),
            output.len(),
            self.algorithm()
        );
        event.load_compressed_data(output);
        event.set_compression_algo(self.backend.algorithm());

        if let Some(log) = &mut self.compression_log {
            let output = event.compressed_payload().unwrap_or_default();
            log.record(EventMetrics::new(event.header(), &input, output, elapsed));
        }
        Ok(())
    }

    /// Restore the fragment bytes of a compressed event into `out`
    ///
    /// Dispatches on the compression code in the event header, not on this
    /// compressor's own backend. `out` is only written on success.
    pub fn decompress(
        &mut self,
        event: &Event,
        compressed: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<()> {
        *out = self.restore(event.header(), compressed)?;
        Ok(())
    }

    fn restore(&mut self, header: &EventHeader, compressed: &[u8]) -> Result<Vec<u8>> {
        let algorithm = AlgorithmId::try_from(header.compression_code)?;
        let started = Instant::now();
        let restored = self.decode(algorithm, compressed)?;
        let elapsed = started.elapsed();

        if let (true, Some(log)) = (self.decompression_armed, &mut self.decompression_log) {
            let mut restored_header = header.clone();
            restored_header.status &= !status::COMPRESSED;
            restored_header.compression_code = AlgorithmId::None.code();
            restored_header.payload_size = restored.len() as u32;
            log.record(EventMetrics::new(&restored_header, compressed, &restored, elapsed));
        }
        Ok(restored)
    }

    fn decode(&mut self, algorithm: AlgorithmId, compressed: &[u8]) -> Result<Vec<u8>> {
        if algorithm == AlgorithmId::None {
            return Err(DaqError::UnsupportedCompressionCode(algorithm.code()));
        }
        if self.state == CompressorState::Ready && self.backend.algorithm() == algorithm {
            return self.backend.decompress(compressed);
        }
        debug!("Decoding {} payload with a transient backend", algorithm);
        Backend::for_decoding(algorithm)?.decompress(compressed)
    }

    /// Compression metrics collected so far
    pub fn compression_log(&self) -> Option<&MetricsLog> {
        self.compression_log.as_ref()
    }

    pub fn decompression_log(&self) -> Option<&MetricsLog> {
        self.decompression_log.as_ref()
    }

    /// Hand the compression log over, leaving logging off
    pub fn take_compression_log(&mut self) -> Option<MetricsLog> {
        self.compression_log.take()
    }

    pub fn take_decompression_log(&mut self) -> Option<MetricsLog> {
        self.decompression_log.take()
    }

    /// Release the backend context; setup may be called again afterwards
    pub fn close(&mut self) {
        if self.state == CompressorState::Ready {
            debug!("Releasing {} compressor", self.kind());
        }
        self.backend.release();
        self.decompression_armed = false;
        if self.state == CompressorState::Ready {
            self.state = CompressorState::Configured;
        }
    }
}

impl PayloadDecoder for Compressor {
    fn decode_payload(&mut self, header: &EventHeader, compressed: &[u8]) -> Result<Vec<u8>> {
        self.restore(header, compressed)
    }
}

impl Drop for Compressor {
    fn drop(&mut self) {
        self.close();
    }
}
