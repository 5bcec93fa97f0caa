//! Scrollback - chat and NPC dialogue reconstruction
//!
//! Turns the formatted text stream of a game server into audience-tagged chat
//! lines and discrete dialogue events, either from a recorded transcript or
//! live from a relay.

mod config;
mod core;
mod network;
mod output;
mod text;
mod transcript;

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use std::path::PathBuf;

use crate::core::audience::{AudienceClassifier, MessageChannel};
use crate::core::ChatPageProcessor;
use crate::output::{EventPrinter, OutputFormat};
use crate::text::FormattedLine;
use crate::transcript::{apply_record, TranscriptReader};

#[derive(ClapParser)]
#[command(name = "scrollback")]
#[command(about = "Chat and NPC dialogue reconstruction for screen-dumping game servers", long_about = None)]
struct Cli {
    /// Configuration file path (replaces the profile's config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Profile name for loading profile-specific settings
    #[arg(long)]
    profile: Option<String>,

    /// Custom data directory (default: ~/.scrollback)
    /// Can also be set via SCROLLBACK_DIR environment variable
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Log file (use RUST_LOG to control the level)
    #[arg(long, value_name = "FILE", default_value = "scrollback.log")]
    log_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recorded transcript through the engine
    Replay {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Stream transcript records from a relay
    Connect {
        /// Relay host (default from config)
        #[arg(long)]
        host: Option<String>,
        /// Relay port (default from config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the audience category of one line
    Classify {
        /// Line text, with § codes
        text: String,
        /// Classify as a line recovered from a screen dump
        #[arg(long)]
        background: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Output goes to stdout, so logs go to a file
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.log_file)
        .with_context(|| format!("Failed to open log file {:?}", cli.log_file))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false) // No color codes in log file
        .init();

    if let Some(data_dir) = &cli.data_dir {
        std::env::set_var("SCROLLBACK_DIR", data_dir);
        tracing::info!("Using custom data directory: {:?}", data_dir);
    }

    let config = config::Config::load(cli.profile.as_deref(), cli.config.as_deref())?;
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Replay { file } => run_replay(&config, &file, format),
        Commands::Connect { host, port } => {
            let host = host.unwrap_or_else(|| config.connection.host.clone());
            let port = port.unwrap_or(config.connection.port);
            // Use tokio runtime for async network I/O
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_connect(config, host, port, format))
        }
        Commands::Classify { text, background } => {
            let classifier = AudienceClassifier::new(&config.audiences);
            let channel = if background {
                MessageChannel::Background
            } else {
                MessageChannel::Foreground
            };
            let category = classifier.classify(&FormattedLine::new(text), channel);
            println!("{}", category.display_name());
            Ok(())
        }
    }
}

/// Replay a transcript file. Malformed records are reported and skipped.
fn run_replay(config: &config::Config, path: &std::path::Path, format: OutputFormat) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript {:?}", path))?;

    let mut processor = ChatPageProcessor::new(config);
    let mut reader = TranscriptReader::new();
    let mut printer = EventPrinter::new(std::io::stdout().lock(), format);
    let mut skipped = 0usize;

    for raw in contents.lines() {
        match reader.feed(raw) {
            Ok(Some(record)) => {
                let events = apply_record(&mut processor, record);
                printer.print_all(&events)?;
            }
            Ok(None) => {}
            Err(e) => {
                skipped += 1;
                tracing::warn!("Skipping malformed record: {:#}", e);
                eprintln!("warning: {:#}", e);
            }
        }
    }

    if let Err(e) = reader.finish() {
        tracing::warn!("Transcript ended early: {:#}", e);
        eprintln!("warning: {:#}", e);
    }

    tracing::info!(
        "Replay finished: {} lines, {} skipped, {} ticks, signal active: {}",
        reader.line_number(),
        skipped,
        processor.current_tick(),
        processor.has_signal()
    );
    Ok(())
}

/// Live mode: records from the relay, ticks from a local interval
async fn run_connect(
    config: config::Config,
    host: String,
    port: u16,
    format: OutputFormat,
) -> Result<()> {
    use network::{RelayConnection, ServerMessage};
    use tokio::sync::mpsc;

    let (server_tx, mut server_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let network_handle = tokio::spawn(async move {
        if let Err(e) = RelayConnection::start(&host, port, server_tx).await {
            tracing::error!(error = ?e, "Network connection error");
        }
    });

    let mut processor = ChatPageProcessor::new(&config);
    let mut reader = TranscriptReader::new();
    let mut printer = EventPrinter::new(std::io::stdout(), format);
    let mut ticker =
        tokio::time::interval(std::time::Duration::from_millis(config.connection.tick_millis.max(1)));

    loop {
        tokio::select! {
            message = server_rx.recv() => match message {
                Some(ServerMessage::Connected) => processor.on_connect(),
                Some(ServerMessage::Text(raw)) => match reader.feed(&raw) {
                    Ok(Some(record)) => {
                        let events = apply_record(&mut processor, record);
                        printer.print_all(&events)?;
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Skipping malformed record: {:#}", e),
                },
                Some(ServerMessage::Disconnected) | None => {
                    tracing::info!(
                        "Relay closed after {} ticks, signal active: {}",
                        processor.current_tick(),
                        processor.has_signal()
                    );
                    processor.on_disconnect();
                    let events: Vec<_> = processor
                        .drain_dialogues()
                        .into_iter()
                        .map(transcript::SessionEvent::Dialogue)
                        .collect();
                    printer.print_all(&events)?;
                    break;
                }
            },
            _ = ticker.tick() => {
                processor.on_tick();
                let events: Vec<_> = processor
                    .drain_dialogues()
                    .into_iter()
                    .map(transcript::SessionEvent::Dialogue)
                    .collect();
                printer.print_all(&events)?;
            }
        }
    }

    network_handle.await.ok();
    Ok(())
}
