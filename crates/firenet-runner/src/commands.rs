//! Subcommand implementations.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use firenet_modem::{CycleReport, ModemSession, ModemTransport, ScriptedTransport};
use firenet_node::host::{self, TcpModemTransport};
use firenet_node::{ConfigError, DeploymentConfig, NodeError};
use firenet_packet::{decode_hex_packet, PacketError, Scale, SensorReading};
use thiserror::Error;
use tracing::{info, warn};

use crate::cli::{Command, DecodeArgs, EncodeArgs, GatewayArgs, TransmitterArgs, UploadArgs};

/// Errors that end the process with a non-zero status.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A node failed to start.
    #[error(transparent)]
    Node(#[from] NodeError),

    /// The deployment file could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A packet argument could not be decoded.
    #[error("{0}")]
    Packet(#[from] PacketError),

    /// The Ctrl-C handler could not be installed.
    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    /// One or more exchanges of a one-shot upload failed.
    #[error("upload failed at: {0}")]
    UploadFailed(String),
}

/// Run a parsed subcommand.
pub fn run(command: Command) -> Result<(), RunnerError> {
    match command {
        Command::Encode(args) => {
            print!("{}", encode(&args));
            Ok(())
        }
        Command::Decode(args) => {
            print!("{}", decode(&args)?);
            Ok(())
        }
        Command::Transmitter(args) => transmitter(&args),
        Command::Gateway(args) => gateway(&args),
        Command::Upload(args) => upload(&args),
    }
}

// ============================================================================
// Packet Tools
// ============================================================================

/// Encode the reading and render the packet.
pub fn encode(args: &EncodeArgs) -> String {
    let scale = Scale {
        factor: args.voltage_scale,
    };
    let reading = args.reading.to_reading(args.id, scale);
    let packet = reading.encode(args.layout);

    let mut out = String::new();
    let _ = writeln!(out, "{}", packet.to_hex());
    let names = args.layout.field_names();
    for &index in packet.overflowed() {
        let name = names.get(index).copied().unwrap_or("unknown");
        let _ = writeln!(out, "warning: {} out of range, sent as error value", name);
    }
    out
}

/// Decode a hex packet and render its fields.
pub fn decode(args: &DecodeArgs) -> Result<String, PacketError> {
    let decoded = decode_hex_packet(args.hex.trim(), args.layout.field_count())?;
    let reading = SensorReading::from_decoded(&decoded, args.layout);
    let scale = Scale {
        factor: args.voltage_scale,
    };

    let mut out = String::new();
    let _ = writeln!(out, "transmitter: 0x{:02x}", decoded.id);
    for (name, value) in args.layout.field_names().iter().zip(&decoded.fields) {
        let _ = writeln!(out, "{:<12} {}", format!("{}:", name), value);
    }
    if decoded.valid {
        let _ = writeln!(
            out,
            "probability: {:.4}",
            Scale::PROBABILITY.to_real(field_u16(reading.fire_probability))
        );
        if let Some(battery) = reading.battery {
            let _ = writeln!(out, "battery:     {:.3} V", scale.to_real(field_u16(battery)));
        }
    }
    let _ = writeln!(out, "valid:       {}", decoded.valid);
    Ok(out)
}

fn field_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

// ============================================================================
// Nodes
// ============================================================================

fn stop_flag() -> Result<Arc<AtomicBool>, RunnerError> {
    let stop = Arc::new(AtomicBool::new(false));
    let handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler.store(true, Ordering::Relaxed);
    })?;
    Ok(stop)
}

fn transmitter(args: &TransmitterArgs) -> Result<(), RunnerError> {
    let config = DeploymentConfig::from_file(&args.config)?;
    let reading = args
        .reading
        .to_reading(config.node.id, config.node.voltage_scale);
    let mut node = host::start_transmitter(&config)?;
    let stop = stop_flag()?;
    node.run(|| reading.clone(), &stop);
    Ok(())
}

fn gateway(args: &GatewayArgs) -> Result<(), RunnerError> {
    let config = DeploymentConfig::from_file(&args.config)?;
    let mut node = host::start_gateway(&config)?;
    let stop = stop_flag()?;
    node.run(&stop);
    Ok(())
}

fn upload(args: &UploadArgs) -> Result<(), RunnerError> {
    let config = DeploymentConfig::from_file(&args.config)?;
    let reading = args
        .reading
        .to_reading(config.node.id, config.node.voltage_scale);
    let report = upload_reading(&config, &reading, args.dry_run)?;
    print!("{}", render_report(&report));

    if report.succeeded() {
        Ok(())
    } else {
        let failed: Vec<_> = report.failed_steps().iter().map(|s| s.as_str()).collect();
        Err(RunnerError::UploadFailed(failed.join(", ")))
    }
}

/// Run one upload cycle for `reading`, against the bridge or a scripted modem.
pub fn upload_reading(
    config: &DeploymentConfig,
    reading: &SensorReading,
    dry_run: bool,
) -> Result<CycleReport, RunnerError> {
    let session_config = config.modem.session.clone();
    let transport: Box<dyn ModemTransport> = if dry_run {
        info!("dry run, using a scripted modem");
        Box::new(ScriptedTransport::happy_path(&session_config))
    } else {
        let transport =
            TcpModemTransport::connect(&config.modem.address, config.modem.connect_timeout())
                .map_err(NodeError::from)?;
        Box::new(transport)
    };

    let request =
        config
            .upload
            .build_request(reading, config.node.layout, config.node.voltage_scale);
    if config.upload.api_key.is_empty() {
        warn!("upload.api_key is empty");
    }
    let mut session = ModemSession::new(transport, session_config);
    Ok(session.run_upload_cycle(&request))
}

/// Render a cycle report, one exchange per line.
pub fn render_report(report: &CycleReport) -> String {
    let mut out = String::new();
    for exchange in &report.exchanges {
        let _ = writeln!(
            out,
            "{:<5} {:<22} {:>5}ms  {}",
            if exchange.matched { "ok" } else { "FAIL" },
            exchange.step.as_str(),
            exchange.elapsed.as_millis(),
            exchange.request
        );
    }
    let _ = writeln!(out, "final state: {}", report.final_state);
    out
}
