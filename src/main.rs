//! CLI entry point for osa-daq.
//!
//! Provides a command-line interface for:
//! - One-shot spectrum acquisition (`acquire`)
//! - An interactive shell for iterating on sweep parameters (`shell`)
//!
//! Both modes run against the real analyzer over VISA (with
//! `--features instrument_visa`) or against the built-in simulated
//! instrument (`--offline`), so the application is usable with no hardware
//! attached.

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use osa_daq::acquisition::{AcquisitionCoordinator, SweepRequest};
use osa_daq::config::Settings;
use osa_daq::instrument::aq6315::{OsaSession, Sensitivity, TraceSelector};
use osa_daq::instrument::mock::SimulatedOsa;
use osa_daq::instrument::transport::OsaTransport;
use osa_daq::quantity::Quantity;
use osa_daq::spectrum::Spectrum;
use osa_daq::worker;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
#[command(name = "osa_daq")]
#[command(about = "Optical spectrum analyzer acquisition over GPIB/VISA", long_about = None)]
struct Cli {
    /// Named configuration under config/ (defaults to config/default.toml)
    #[arg(long)]
    config: Option<String>,

    /// Run against the built-in simulated instrument instead of VISA
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire one spectrum and print a summary
    Acquire {
        /// Start wavelength in nm
        #[arg(long)]
        start: f64,

        /// Stop wavelength in nm
        #[arg(long)]
        stop: f64,

        /// Resolution bandwidth in nm
        #[arg(long, default_value = "0.1")]
        resolution: f64,

        /// Reference level in dBm
        #[arg(long, default_value = "-10")]
        reference: f64,

        /// Sensitivity mode: hold, auto, high1, high2, high3
        #[arg(long, default_value = "auto")]
        sensitivity: Sensitivity,

        /// Trace to acquire into: A, B or C
        #[arg(long, default_value = "A")]
        trace: TraceSelector,

        /// Sample point count (leave unset to keep the device setting)
        #[arg(long)]
        points: Option<u32>,
    },

    /// Interactive parameter shell driving repeated sweeps
    Shell,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = match Settings::new(cli.config.as_deref()) {
        Ok(settings) => settings,
        // A config the operator named explicitly must load; only the
        // implicit default file may be absent or unusable.
        Err(e) if cli.config.is_some() => return Err(e.into()),
        Err(e) => {
            eprintln!("⚠️  Using built-in defaults: {}", e);
            Settings::default()
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(
            settings
                .log_level
                .parse()
                .unwrap_or(log::LevelFilter::Info),
        )
        .format_timestamp(None)
        .init();

    let transport = open_transport(&settings, cli.offline)?;
    let session = OsaSession::new(transport, &settings);
    let coordinator = Arc::new(AcquisitionCoordinator::new(session));

    match cli.command {
        Commands::Acquire {
            start,
            stop,
            resolution,
            reference,
            sensitivity,
            trace,
            points,
        } => {
            let request = SweepRequest {
                trace,
                start: Quantity::nanometers(start),
                stop: Quantity::nanometers(stop),
                reference: Quantity::dbm(reference),
                resolution: Quantity::nanometers(resolution),
                sensitivity,
                sample_points: points,
            };
            let spectrum = worker::spawn_acquisition(coordinator, request).await??;
            print_summary(&spectrum);
            Ok(())
        }
        Commands::Shell => run_shell(coordinator).await,
    }
}

fn open_transport(settings: &Settings, offline: bool) -> Result<Arc<dyn OsaTransport>> {
    if offline {
        println!("🔧 Offline mode: using simulated instrument");
        return Ok(Arc::new(SimulatedOsa::new().with_polls_until_idle(1)));
    }

    #[cfg(feature = "instrument_visa")]
    {
        use osa_daq::instrument::transport::VisaTransport;
        let transport = VisaTransport::open(
            &settings.instrument.resource_string,
            settings.instrument.query_timeout,
        )?;
        println!("🔌 Connected to {}", transport.resource_string());
        Ok(Arc::new(transport))
    }

    #[cfg(not(feature = "instrument_visa"))]
    {
        let _ = settings;
        Err(osa_daq::error::OsaError::VisaFeatureDisabled.into())
    }
}

fn print_summary(spectrum: &Spectrum) {
    println!(
        "✅ Acquired {} points on trace {}",
        spectrum.len(),
        spectrum.parameters.trace
    );
    if let Some((wavelength, power)) = spectrum.peak() {
        println!(
            "   Peak: {:.3} nm at {:.2} {}",
            wavelength,
            power,
            spectrum.power.unit()
        );
    }
}

/// Line-oriented shell: set parameters one at a time, then `sweep`.
async fn run_shell(coordinator: Arc<AcquisitionCoordinator>) -> Result<()> {
    let mut request = SweepRequest {
        trace: TraceSelector::A,
        start: Quantity::nanometers(1520.0),
        stop: Quantity::nanometers(1570.0),
        reference: Quantity::dbm(-10.0),
        resolution: Quantity::nanometers(0.1),
        sensitivity: Sensitivity::Auto,
        sample_points: None,
    };

    println!("Commands: start <nm>, stop <nm>, ref <dBm>, resolution <nm>,");
    println!("          points <n>, sensitivity <mode>, trace <A|B|C>, show, sweep, exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"osa> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let mut parts = line.trim().split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let argument = parts.next();

        let outcome = match (command, argument) {
            ("exit" | "quit", _) => break,
            ("start", Some(v)) => parse_nm(v).map(|q| request.start = q),
            ("stop", Some(v)) => parse_nm(v).map(|q| request.stop = q),
            ("ref", Some(v)) => v
                .parse::<f64>()
                .map(|dbm| request.reference = Quantity::dbm(dbm))
                .map_err(|e| anyhow::anyhow!("bad reference level: {}", e)),
            ("resolution", Some(v)) => parse_nm(v).map(|q| request.resolution = q),
            ("points", Some(v)) => v
                .parse::<u32>()
                .map(|n| request.sample_points = Some(n))
                .map_err(|e| anyhow::anyhow!("bad point count: {}", e)),
            ("sensitivity", Some(v)) => v
                .parse::<Sensitivity>()
                .map(|s| request.sensitivity = s)
                .map_err(Into::into),
            ("trace", Some(v)) => v
                .parse::<TraceSelector>()
                .map(|t| request.trace = t)
                .map_err(Into::into),
            ("show", _) => {
                println!(
                    "  {} .. {}, ref {}, res {}, {} sensitivity, trace {}, points {:?}",
                    request.start,
                    request.stop,
                    request.reference,
                    request.resolution,
                    request.sensitivity,
                    request.trace,
                    request.sample_points
                );
                Ok(())
            }
            ("sweep", _) => match worker::spawn_acquisition(coordinator.clone(), request).await? {
                Ok(spectrum) => {
                    print_summary(&spectrum);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            (cmd, _) => Err(anyhow::anyhow!("unknown or incomplete command '{}'", cmd)),
        };

        if let Err(e) = outcome {
            eprintln!("❌ {}", e);
        }
    }

    Ok(())
}

fn parse_nm(value: &str) -> Result<Quantity> {
    value
        .parse::<f64>()
        .map(Quantity::nanometers)
        .map_err(|e| anyhow::anyhow!("bad wavelength value: {}", e))
}
