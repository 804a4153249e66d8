//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use firenet_packet::{PacketLayout, Scale, SensorReading};

/// Fire-detection sensor network node runner.
#[derive(Debug, Parser)]
#[command(name = "firenet", version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Encode a reading and print the packet as hex.
    Encode(EncodeArgs),
    /// Decode a hex packet and print its fields.
    Decode(DecodeArgs),
    /// Run a transmitting node until interrupted.
    Transmitter(TransmitterArgs),
    /// Run a gateway node until interrupted.
    Gateway(GatewayArgs),
    /// Upload a single reading through the modem.
    Upload(UploadArgs),
}

/// Measurement values, defaulting to a quiet-room reading.
#[derive(Debug, Clone, Args)]
pub struct ReadingArgs {
    /// Smoke sensor value.
    #[arg(long, default_value_t = 273, allow_negative_numbers = true)]
    pub smoke: i64,

    /// Flame sensor value.
    #[arg(long, default_value_t = 514, allow_negative_numbers = true)]
    pub flame: i64,

    /// Gas sensor value.
    #[arg(long, default_value_t = 4021, allow_negative_numbers = true)]
    pub gas: i64,

    /// Fire probability, 0.0 to 1.0.
    #[arg(long, default_value_t = 0.053, allow_negative_numbers = true)]
    pub probability: f64,

    /// Battery voltage in volts.
    #[arg(long, allow_negative_numbers = true)]
    pub battery: Option<f64>,
}

impl ReadingArgs {
    /// Scale the values into a reading from `id`.
    ///
    /// Values that do not fit pass through as out-of-range raw values so
    /// the encoder flags them.
    pub fn to_reading(&self, id: u8, voltage_scale: Scale) -> SensorReading {
        SensorReading {
            transmitter_id: id,
            smoke: clamp_raw(self.smoke),
            flame: clamp_raw(self.flame),
            gas: clamp_raw(self.gas),
            fire_probability: clamp_raw(Scale::PROBABILITY.to_raw(self.probability)),
            battery: self.battery.map(|volts| clamp_raw(voltage_scale.to_raw(volts))),
        }
    }
}

fn clamp_raw(raw: i64) -> u32 {
    u32::try_from(raw).unwrap_or(u32::MAX)
}

#[derive(Debug, Args)]
pub struct EncodeArgs {
    /// Transmitter address, decimal or 0x-prefixed hex.
    #[arg(long, default_value = "0x11", value_parser = parse_node_id)]
    pub id: u8,

    /// Packet layout: basic or with-battery.
    #[arg(long, default_value = "basic", value_parser = parse_layout)]
    pub layout: PacketLayout,

    /// Battery scale factor.
    #[arg(long, default_value_t = 1000)]
    pub voltage_scale: u32,

    #[command(flatten)]
    pub reading: ReadingArgs,
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Packet bytes as hex.
    pub hex: String,

    /// Packet layout: basic or with-battery.
    #[arg(long, default_value = "basic", value_parser = parse_layout)]
    pub layout: PacketLayout,

    /// Battery scale factor.
    #[arg(long, default_value_t = 1000)]
    pub voltage_scale: u32,
}

#[derive(Debug, Args)]
pub struct TransmitterArgs {
    /// Deployment file.
    #[arg(short, long)]
    pub config: PathBuf,

    #[command(flatten)]
    pub reading: ReadingArgs,
}

#[derive(Debug, Args)]
pub struct GatewayArgs {
    /// Deployment file.
    #[arg(short, long)]
    pub config: PathBuf,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Deployment file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Run the cycle against a scripted modem instead of the bridge.
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub reading: ReadingArgs,
}

/// Parse a node address such as `17` or `0x11`.
pub fn parse_node_id(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid node id '{}': {}", s, e))
}

/// Parse a packet layout name.
pub fn parse_layout(s: &str) -> Result<PacketLayout, String> {
    match s {
        "basic" => Ok(PacketLayout::Basic),
        "with-battery" => Ok(PacketLayout::WithBattery),
        other => Err(format!(
            "unknown layout '{}', expected basic or with-battery",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_id() {
        assert_eq!(parse_node_id("0x11"), Ok(0x11));
        assert_eq!(parse_node_id("17"), Ok(17));
        assert!(parse_node_id("0x100").is_err());
        assert!(parse_node_id("node").is_err());
    }

    #[test]
    fn test_parse_layout() {
        assert_eq!(parse_layout("with-battery"), Ok(PacketLayout::WithBattery));
        assert!(parse_layout("full").is_err());
    }

    #[test]
    fn test_encode_defaults() {
        let cli = Cli::try_parse_from(["firenet", "encode"]).unwrap();
        let Command::Encode(args) = cli.command else {
            panic!("expected encode");
        };
        assert_eq!(args.id, 0x11);
        assert_eq!(args.layout, PacketLayout::Basic);

        let reading = args.reading.to_reading(args.id, Scale::VOLTAGE_MILLI);
        assert_eq!(reading.fire_probability, 530);
        assert_eq!(reading.battery, None);
    }

    #[test]
    fn test_reading_args_out_of_range() {
        let cli = Cli::try_parse_from([
            "firenet",
            "-v",
            "encode",
            "--probability",
            "-0.5",
            "--battery",
            "4.1",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Encode(args) = cli.command else {
            panic!("expected encode");
        };
        let reading = args.reading.to_reading(1, Scale::VOLTAGE_MILLI);
        assert_eq!(reading.fire_probability, u32::MAX);
        assert_eq!(reading.battery, Some(4100));
    }

    #[test]
    fn test_upload_requires_config() {
        assert!(Cli::try_parse_from(["firenet", "upload"]).is_err());
        let cli = Cli::try_parse_from(["firenet", "upload", "-c", "gw.yaml", "--dry-run"]).unwrap();
        assert!(matches!(cli.command, Command::Upload(UploadArgs { dry_run: true, .. })));
    }
}
