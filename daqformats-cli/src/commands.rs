//! Subcommand implementations

use anyhow::{bail, Context, Result};
use daqformats_core::compression::{self, Compressor, CompressorConfig, MetricsLog};
use daqformats_core::format::{Event, EventReader};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Load a compressor configuration from a flat JSON object
///
/// Numbers and booleans are accepted and stored in their string form.
pub fn load_config(path: Option<&Path>) -> Result<CompressorConfig> {
    let Some(path) = path else {
        return Ok(CompressorConfig::new());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
    let Value::Object(entries) = value else {
        bail!("config {} must be a JSON object", path.display());
    };

    entries
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => bail!("config key {} has unsupported value {}", key, other),
            };
            Ok::<_, anyhow::Error>((key, value))
        })
        .collect()
}

fn open_events(file: &Path) -> Result<BufReader<File>> {
    let input = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    Ok(BufReader::new(input))
}

fn create_output(file: &Path) -> Result<BufWriter<File>> {
    let output = File::create(file).with_context(|| format!("creating {}", file.display()))?;
    Ok(BufWriter::new(output))
}

/// Compressor able to restore any payload the configuration can produce
fn decoding_compressor(config: Option<&Path>) -> Result<Compressor> {
    let config = load_config(config)?;
    let mut compressor = Compressor::from_config(&config)?;
    compressor.setup_compression()?;
    compressor.support_decompression()?;
    Ok(compressor)
}

/// Print event lines, and fragment lines when asked; returns the number of events
pub fn dump(
    file: &Path,
    config: Option<&Path>,
    fragments: bool,
    max_events: Option<usize>,
    out: &mut impl Write,
) -> Result<usize> {
    let mut compressor = decoding_compressor(config)?;
    let reader = EventReader::with_decoder(open_events(file)?, &mut compressor);

    let mut count = 0;
    for event in reader.take(max_events.unwrap_or(usize::MAX)) {
        let event =
            event.with_context(|| format!("reading event {} of {}", count, file.display()))?;
        writeln!(out, "{}", event)?;
        if fragments {
            for fragment in event.fragments() {
                writeln!(out, "{}", fragment)?;
            }
        }
        count += 1;
    }
    Ok(count)
}

/// Compress every event of `file` into `output`
///
/// With `log_dir`, metrics logs are written as `<label>_<uuid>.json` (and
/// `<label>_<uuid>_decompression.json` when verifying). Returns the log files.
pub fn compress(
    file: &Path,
    config: Option<&Path>,
    output: &Path,
    log_dir: Option<&Path>,
    verify: bool,
) -> Result<Vec<PathBuf>> {
    let config = load_config(config)?;
    let mut compressor = Compressor::from_config(&config)?;
    let label = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "events".to_string());

    if log_dir.is_some() {
        compressor.setup_compression_and_logging(&label)?;
    } else {
        compressor.setup_compression()?;
    }
    if verify {
        compressor.support_decompression()?;
    }

    let mut writer = create_output(output)?;
    let (mut events, mut bytes_in, mut bytes_out) = (0usize, 0usize, 0usize);
    let mut restored = Vec::new();
    for event in EventReader::new(open_events(file)?) {
        let mut event =
            event.with_context(|| format!("reading event {} of {}", events, file.display()))?;
        let original = event.raw_fragments();
        bytes_in += event.size() as usize;

        compressor
            .compress(&mut event)
            .with_context(|| format!("compressing event {}", event.event_counter()))?;
        if verify {
            let compressed = event.compressed_payload().unwrap_or_default();
            compressor
                .decompress(&event, compressed, &mut restored)
                .with_context(|| format!("verifying event {}", event.event_counter()))?;
            if restored[..] != original[..] {
                bail!("event {} does not survive a compression round trip", event.event_counter());
            }
        }

        let raw = event.raw();
        bytes_out += raw.len();
        writer.write_all(&raw)?;
        events += 1;
    }
    writer.flush()?;

    info!(
        "Compressed {} events with {}: {} -> {} bytes",
        events,
        compressor.algorithm(),
        bytes_in,
        bytes_out
    );

    let mut logs = Vec::new();
    if let (Some(dir), Some(log)) = (log_dir, compressor.take_compression_log()) {
        let run_id = log.run_id;
        logs.push(write_log(dir, &label, &run_id, "", &log)?);
        if let Some(log) = compressor.take_decompression_log() {
            logs.push(write_log(dir, &label, &run_id, "_decompression", &log)?);
        }
    }
    Ok(logs)
}

fn write_log(
    dir: &Path,
    label: &str,
    run_id: &Uuid,
    suffix: &str,
    log: &MetricsLog,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{}_{}{}.json", label, run_id, suffix));
    let file = create_output(&path)?;
    serde_json::to_writer_pretty(file, log).with_context(|| format!("writing {}", path.display()))?;

    let summary = log.summary();
    info!(
        "Wrote {} ({} events, ratio {:.2}, {} us)",
        path.display(),
        summary.events,
        summary.ratio,
        summary.total_time
    );
    Ok(path)
}

/// Restore every event of `file` and write the uncompressed stream to `output`
pub fn decompress(file: &Path, config: Option<&Path>, output: &Path) -> Result<usize> {
    let mut compressor = decoding_compressor(config)?;
    let mut writer = create_output(output)?;

    let mut events = 0;
    for event in EventReader::with_decoder(open_events(file)?, &mut compressor) {
        let event =
            event.with_context(|| format!("restoring event {} of {}", events, file.display()))?;
        writer.write_all(&event.raw())?;
        events += 1;
    }
    writer.flush()?;

    info!("Restored {} events into {}", events, output.display());
    Ok(events)
}

/// Train a zstd dictionary on the events of `file`
pub fn train_dictionary(
    file: &Path,
    output: &Path,
    max_size: usize,
    max_events: Option<usize>,
) -> Result<usize> {
    let events = EventReader::new(open_events(file)?)
        .take(max_events.unwrap_or(usize::MAX))
        .collect::<daqformats_core::Result<Vec<Event>>>()
        .with_context(|| format!("reading {}", file.display()))?;
    debug!("Training on {} events", events.len());

    let dictionary = compression::train_dictionary(&events, max_size)?;
    fs::write(output, &dictionary).with_context(|| format!("writing {}", output.display()))?;
    info!("Wrote {} byte dictionary to {}", dictionary.len(), output.display());
    Ok(dictionary.len())
}
