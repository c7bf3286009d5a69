//! GRIB extraction tap.
//!
//! Reads a configuration of GRIB file patterns, discovers one stream per
//! file (or per message group), and writes either the stream catalog or
//! every stream's records as JSON lines on stdout. Logs go to stderr.

mod output;

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use extraction::{discover, TapConfig};

#[derive(Parser, Debug)]
#[command(name = "tap-grib")]
#[command(about = "Extract GRIB grids as JSON-lines records")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "TAP_GRIB_CONFIG")]
    config: PathBuf,

    /// Print the stream catalog instead of extracting records
    #[arg(long)]
    discover: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format)?;

    let config = TapConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    info!(paths = config.paths.len(), "Loaded configuration");

    let streams = discover(&config).context("Stream discovery failed")?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if args.discover {
        output::write_catalog(&mut out, &streams)?;
        out.flush()?;
        info!(streams = streams.len(), "Wrote catalog");
        return Ok(());
    }

    let mut records = 0;
    for stream in &streams {
        records += output::write_stream(&mut out, stream)
            .with_context(|| format!("Failed to extract stream '{}'", stream.name()))?;
    }
    out.flush()?;

    info!(streams = streams.len(), records, "Extraction complete");
    Ok(())
}

fn init_tracing(log_level: &str, format: LogFormat) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(io::stderr);

    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}
