//! daqformats - inspect, compress and restore DAQ event files

mod commands;

use clap::{Parser, Subcommand};
use daqformats_core::defaults::DEFAULT_DICTIONARY_SIZE;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Parser)]
#[command(name = "daqformats", version, about = "Inspect, compress and restore DAQ event files")]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print one line per event
    Dump {
        /// Raw event file
        file: PathBuf,
        /// Also print one line per fragment
        #[arg(short, long)]
        fragments: bool,
        /// Stop after this many events
        #[arg(short = 'n', long)]
        max_events: Option<usize>,
        /// Compressor configuration (JSON), needed for dictionary-compressed files
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Compress every event of a file
    Compress {
        file: PathBuf,
        /// Compressor configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
        /// Write compression metrics logs into this directory
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Decompress each event again and compare with the original
        #[arg(long)]
        verify: bool,
    },
    /// Restore a compressed file to its uncompressed form
    Decompress {
        file: PathBuf,
        /// Compressor configuration (JSON), needed for dictionary-compressed files
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Train a zstd dictionary on the events of a file
    TrainDictionary {
        file: PathBuf,
        /// Dictionary file to write
        #[arg(short, long)]
        output: PathBuf,
        /// Maximum dictionary size in bytes
        #[arg(long, default_value_t = DEFAULT_DICTIONARY_SIZE)]
        max_size: usize,
        /// Train on at most this many events
        #[arg(short = 'n', long)]
        max_events: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Command::Dump {
            file,
            fragments,
            max_events,
            config,
        } => {
            let stdout = std::io::stdout();
            commands::dump(&file, config.as_deref(), fragments, max_events, &mut stdout.lock())?;
        }
        Command::Compress {
            file,
            config,
            output,
            log_dir,
            verify,
        } => {
            commands::compress(&file, config.as_deref(), &output, log_dir.as_deref(), verify)?;
        }
        Command::Decompress { file, config, output } => {
            commands::decompress(&file, config.as_deref(), &output)?;
        }
        Command::TrainDictionary {
            file,
            output,
            max_size,
            max_events,
        } => {
            commands::train_dictionary(&file, &output, max_size, max_events)?;
        }
    }

    Ok(())
}
