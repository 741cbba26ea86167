//! CLI Entry Point for am60-bench
//!
//! Provides command-line interface for:
//! - Listing serial ports
//! - Monitoring a unit under test (with an optional barcode scanner)
//! - Replaying a captured serial log through the same pipeline
//!
//! # Usage
//!
//! ```bash
//! am60-bench ports
//! am60-bench monitor --port /dev/ttyUSB0 --baud 115200 --scanner-port /dev/ttyACM0
//! am60-bench replay capture.log --csv AM60.csv
//! am60-bench --json replay capture.log
//! ```

use am60_bench::config::{BenchConfig, DEFAULT_CONFIG_PATH};
use am60_bench::logging;
use am60_bench::monitor::{
    forward_events, ByteSource, ForwardExit, MonitorEvent, MonitorSession, MonitorSettings,
};
use am60_bench::ports::{self, SUPPORTED_BAUD_RATES};
use am60_bench::record::Column;
use am60_bench::storage::{CaptureLogWriter, CsvRecordWriter, RecordSink};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "am60-bench")]
#[command(about = "Serial test bench for AM60 units", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print each result as a JSON line instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports and supported baud rates
    Ports,

    /// Connect to a unit and record each diagnostic report
    Monitor {
        /// Serial port of the unit under test
        #[arg(long)]
        port: Option<String>,

        /// Baud rate of the unit link
        #[arg(long)]
        baud: Option<u32>,

        /// Serial port of the barcode scanner
        #[arg(long)]
        scanner_port: Option<String>,

        /// Baud rate of the barcode scanner
        #[arg(long)]
        scanner_baud: Option<u32>,

        /// CSV output file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Feed a captured serial log through the pipeline
    Replay {
        /// Captured log file
        file: PathBuf,

        /// CSV output file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Echo every line of the log
        #[arg(long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BenchConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    match &cli.command {
        Commands::Monitor {
            port,
            baud,
            scanner_port,
            scanner_baud,
            csv,
        } => {
            if let Some(port) = port {
                config.device.port = Some(port.clone());
            }
            if let Some(baud) = baud {
                config.device.baud_rate = *baud;
            }
            if let Some(port) = scanner_port {
                config.scanner.enabled = true;
                config.scanner.port = Some(port.clone());
            }
            if let Some(baud) = scanner_baud {
                config.scanner.baud_rate = *baud;
            }
            if let Some(csv) = csv {
                config.storage.csv_path = csv.clone();
            }
        }
        Commands::Replay { csv: Some(csv), .. } => config.storage.csv_path = csv.clone(),
        _ => {}
    }

    config.validate()?;
    logging::init_from_config(&config)?;
    info!(name = %config.application.name, "Configuration loaded");

    match cli.command {
        Commands::Ports => list_ports(),
        Commands::Monitor { .. } => monitor(config, cli.json).await,
        Commands::Replay { file, verbose, .. } => replay(config, file, verbose, cli.json).await,
    }
}

fn list_ports() -> Result<()> {
    let ports = ports::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found!");
    } else {
        println!("Found {} serial ports:", ports.len());
        for port in &ports {
            println!("  {} - {}", port.name, port.kind);
        }
    }

    let rates = SUPPORTED_BAUD_RATES
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    println!("Supported baud rates: {}", rates);
    Ok(())
}

fn build_sinks(config: &BenchConfig) -> Vec<Box<dyn RecordSink>> {
    let mut sinks: Vec<Box<dyn RecordSink>> =
        vec![Box::new(CsvRecordWriter::new(&config.storage.csv_path))];
    if let Some(capture) = config.storage.capture_path() {
        sinks.push(Box::new(CaptureLogWriter::new(capture)));
    }
    sinks
}

async fn monitor(config: BenchConfig, json: bool) -> Result<()> {
    let port = config
        .device
        .port
        .clone()
        .ok_or_else(|| anyhow!("No serial port given. Use --port or set device.port"))?;
    let baud = config.device.baud_rate;

    let device = ports::open_port(&port, baud)?;
    println!("Connected to {} at {} baud", port, baud);

    let scanner: Option<ByteSource> = match (&config.scanner.port, config.scanner.enabled) {
        (Some(scanner_port), true) => {
            let stream = ports::open_port(scanner_port, config.scanner.baud_rate)?;
            println!("Waiting for barcode on {}...", scanner_port);
            Some(Box::new(stream))
        }
        _ => None,
    };

    let (mut session, mut events) = MonitorSession::start(
        device,
        scanner,
        MonitorSettings::from_config(&config),
        build_sinks(&config),
    );
    println!("Reading from port... (Ctrl+C to stop)");

    let exit = forward_events(&mut events, tokio::signal::ctrl_c(), |event| {
        report(&event, true, json)
    })
    .await?;
    if exit == ForwardExit::Shutdown {
        info!("Stop requested");
    }

    let stats = session.stop().await?;
    println!("Disconnected");
    info!(lines = stats.lines, frames = stats.frames, "Session summary");
    Ok(())
}

async fn replay(config: BenchConfig, file: PathBuf, verbose: bool, json: bool) -> Result<()> {
    let source = tokio::fs::File::open(&file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let (mut session, mut events) = MonitorSession::start(
        source,
        None,
        MonitorSettings::from_config(&config),
        build_sinks(&config),
    );

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            report(&event, verbose, json)?;
        }
        Ok::<_, anyhow::Error>(())
    });

    let stats = session.wait().await?;
    printer.await??;

    println!(
        "Replayed {} lines, {} messages; latest result in {}",
        stats.lines,
        stats.frames,
        config.storage.csv_path.display()
    );
    if stats.sink_failures > 0 {
        return Err(anyhow!("{} result writes failed", stats.sink_failures));
    }
    Ok(())
}

fn report(event: &MonitorEvent, echo_lines: bool, json: bool) -> Result<()> {
    match event {
        MonitorEvent::Line(line) if echo_lines && !json => print!("{}", line),
        MonitorEvent::Line(_) => {}
        MonitorEvent::Frame(_) if json => {}
        MonitorEvent::Record(record) if json => {
            println!("{}", record.to_json()?);
        }
        MonitorEvent::Frame(frame) => {
            println!();
            println!("New Message Received:");
            println!("{}", frame.log_entry());
        }
        MonitorEvent::Record(record) => {
            println!(
                "Serial: {}  Status: {}",
                record.get(Column::SerialNumber).unwrap_or("-"),
                record.get(Column::Status).unwrap_or("-")
            );
        }
        MonitorEvent::SerialScanned(serial) => println!("Scanned barcode: {}", serial),
        MonitorEvent::Error(message) => eprintln!("Error: {}", message),
        MonitorEvent::Disconnected => println!("Disconnected"),
    }
    Ok(())
}
