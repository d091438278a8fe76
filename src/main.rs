//! Serial to MQTT forwarder
//!
//! Reads integer readings (one per line) from a serial-connected
//! microcontroller such as a BBC micro:bit and publishes each one to a
//! fixed topic on an MQTT broker.
//!
//! # Features
//!
//! - **Forwarding**: read, parse, publish, one reading at a time
//!   (serial input requires the `serial` feature, enabled by default)
//! - **Port Discovery**: list serial ports and auto-detect known boards
//! - **Device Profiles**: built-in board profiles with default settings
//! - **Config Files**: TOML configuration with command line overrides
//!
//! # Usage
//!
//! ```bash
//! # Forward from an auto-detected micro:bit to a broker
//! serial-mqtt run --broker 192.168.1.20
//!
//! # Explicit port, baud rate and topic
//! serial-mqtt run -p /dev/ttyUSB0 -b 9600 --broker mqtt.local -t lab/light
//!
//! # Forward lines piped on stdin
//! some-sensor-tool | serial-mqtt run --stdin --broker localhost
//!
//! # List available serial ports
//! serial-mqtt ports list
//!
//! # Write a starter config file
//! serial-mqtt config generate -o serial-mqtt.toml
//! ```

mod broker;
mod config;
mod devices;
mod forwarder;
mod reading;
#[cfg(feature = "serial")]
mod serial;
mod shutdown;
mod source;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use broker::{MqttSession, Publisher};
use config::{Config, ConfigOverrides};
use devices::{get_profile, profile_names, DeviceProfile};
use forwarder::Forwarder;
use shutdown::Shutdown;
use source::{LineSource, ReaderSource};

#[cfg(feature = "serial")]
use serial::{PortConfig, SerialConnection};
#[cfg(feature = "serial")]
use std::time::Instant;

/// Serial to MQTT forwarder
///
/// Publishes integer readings from a serial device to an MQTT broker
#[derive(Parser)]
#[command(name = "serial-mqtt")]
#[command(author = "Prasanna Gautam")]
#[command(version = "0.1.0")]
#[command(about = "Forward integer readings from a serial device to an MQTT broker")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward readings until Ctrl+C
    Run(RunArgs),

    /// Serial port operations (requires --features serial)
    #[cfg(feature = "serial")]
    #[command(subcommand)]
    Ports(PortCommands),

    /// Device profile operations
    #[command(subcommand)]
    Devices(DeviceCommands),

    /// Configuration file operations
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args)]
struct RunArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port path (e.g., /dev/ttyACM0); auto-detected when omitted
    #[arg(short, long)]
    port: Option<String>,

    /// Device profile used for auto-detection and the default baud rate
    #[arg(short, long)]
    device: Option<String>,

    /// Baud rate (defaults to the device profile's rate)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Broker host name or IP address
    #[arg(long)]
    broker: Option<String>,

    /// Broker TCP port
    #[arg(long)]
    broker_port: Option<u16>,

    /// MQTT client identifier
    #[arg(long)]
    client_id: Option<String>,

    /// Topic every reading is published on
    #[arg(short, long)]
    topic: Option<String>,

    /// Read lines from standard input instead of a serial port
    #[arg(long)]
    stdin: bool,

    /// Disable timestamps
    #[arg(long)]
    no_timestamps: bool,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port.clone(),
            device: self.device.clone(),
            baud_rate: self.baud,
            broker_host: self.broker.clone(),
            broker_port: self.broker_port,
            client_id: self.client_id.clone(),
            topic: self.topic.clone(),
        }
    }
}

#[cfg(feature = "serial")]
#[derive(Subcommand)]
enum PortCommands {
    /// List available serial ports
    List,

    /// Auto-detect boards with a known device profile
    Detect {
        /// Device profile for USB VID/PID matching (default: all profiles)
        #[arg(short, long)]
        device: Option<String>,
    },
}

#[derive(Subcommand)]
enum DeviceCommands {
    /// List all supported device profiles
    List,

    /// Show detailed information about a device profile
    Show {
        /// Device profile name (e.g., microbit, generic)
        device: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Generate a configuration file with default values
    Generate {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => handle_run(args),
        #[cfg(feature = "serial")]
        Commands::Ports(cmd) => handle_ports(cmd),
        Commands::Devices(cmd) => handle_devices(cmd),
        Commands::Config(cmd) => handle_config(cmd),
    }
}

fn handle_run(args: RunArgs) -> Result<()> {
    let config = Config::resolve(args.config.as_deref(), args.overrides())?;
    let shutdown = Shutdown::install()?;

    println!(
        "{} Connecting to MQTT broker {}:{}...",
        "[*]".cyan().bold(),
        config.broker.host.white(),
        config.broker.port
    );
    let session = MqttSession::connect(&config.broker).with_context(|| {
        format!(
            "Failed to connect to MQTT broker {}:{}",
            config.broker.host, config.broker.port
        )
    })?;
    println!(
        "{} Connected to MQTT broker: {}",
        "[OK]".green().bold(),
        config.broker.host.white().bold()
    );

    if shutdown.is_requested() {
        return stop_before_forwarding(session);
    }

    if args.stdin {
        let source = ReaderSource::new(BufReader::new(std::io::stdin()), "stdin")
            .with_poll_timeout(Duration::from_millis(config.serial.timeout_ms));
        return forward(source, session, &config, !args.no_timestamps, &shutdown);
    }

    #[cfg(feature = "serial")]
    {
        let source = open_serial(&config, &shutdown)?;
        if shutdown.is_requested() {
            return stop_before_forwarding(session);
        }
        forward(source, session, &config, !args.no_timestamps, &shutdown)
    }

    #[cfg(not(feature = "serial"))]
    {
        let _ = session;
        anyhow::bail!("Built without serial support; use --stdin or rebuild with --features serial")
    }
}

/// Ctrl+C arrived while connecting or waiting for the board
fn stop_before_forwarding(mut session: MqttSession) -> Result<()> {
    println!("\n{}", "Stopped by user.".yellow().bold());
    if let Err(e) = session.disconnect() {
        log::warn!("Error while disconnecting from broker: {}", e);
    }
    Ok(())
}

fn forward<S: LineSource>(
    source: S,
    session: MqttSession,
    config: &Config,
    show_timestamps: bool,
    shutdown: &Shutdown,
) -> Result<()> {
    println!(
        "{} Forwarding readings to topic {}\n",
        "[*]".cyan().bold(),
        config.broker.topic.white()
    );

    let stats = Forwarder::new(source, session, &config.broker.topic)
        .with_timestamps(show_timestamps)
        .run(shutdown)?;

    log::info!(
        "Forwarded {} readings ({} lines discarded)",
        stats.published,
        stats.discarded
    );
    Ok(())
}

/// Granularity of the settle delay, so Ctrl+C is noticed while waiting
#[cfg(feature = "serial")]
const SETTLE_SLICE: Duration = Duration::from_millis(100);

/// Open the configured port, or find one that matches the device profile
#[cfg(feature = "serial")]
fn open_serial(config: &Config, shutdown: &Shutdown) -> Result<SerialConnection> {
    let port_path = match config.serial.port {
        Some(ref p) => p.clone(),
        None => {
            let profile = get_profile(&config.serial.device).ok_or_else(|| {
                anyhow::anyhow!("Unknown device profile: {}", config.serial.device)
            })?;
            let detected = serial::port::detect_ports(&[profile])?;
            let first = detected.first().ok_or_else(|| {
                anyhow::anyhow!(
                    "No {} serial port detected; use -p to specify the port manually",
                    profile.name
                )
            })?;
            println!(
                "{} Auto-detected {}: {}",
                "[OK]".green().bold(),
                profile.name,
                first.path.white()
            );
            first.path.clone()
        }
    };

    let port_config = PortConfig::new(&port_path)
        .with_baud_rate(config.baud_rate()?)
        .with_timeout(Duration::from_millis(config.serial.timeout_ms));

    let mut conn = SerialConnection::open(port_config)?;
    println!(
        "{} Connected to serial port: {} at {} baud",
        "[OK]".green().bold(),
        conn.config().port_path.white().bold(),
        conn.config().baud_rate
    );

    // Opening the port resets some boards; let them boot before reading
    let settle_until = Instant::now() + Duration::from_millis(config.serial.settle_ms);
    while !shutdown.is_requested() {
        let remaining = settle_until.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        std::thread::sleep(remaining.min(SETTLE_SLICE));
    }
    conn.clear_input()?;

    Ok(conn)
}

#[cfg(feature = "serial")]
fn handle_ports(cmd: PortCommands) -> Result<()> {
    match cmd {
        PortCommands::List => {
            serial::port::print_ports()?;
        }

        PortCommands::Detect { device } => {
            let profiles: Vec<&DeviceProfile> = match device {
                Some(ref name) => vec![get_profile(name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown device profile: {}", name))?],
                None => profile_names().into_iter().filter_map(get_profile).collect(),
            };

            println!("{} Detecting serial connections...", "[*]".cyan().bold());

            let ports = serial::port::detect_ports(&profiles)?;

            if ports.is_empty() {
                println!("{}", "No matching serial devices detected".yellow());
                println!("\n{}", "Troubleshooting:".white().bold());
                println!("  1. Connect the board with a data-capable USB cable");
                println!("  2. Check permissions: sudo usermod -aG dialout $USER");
                println!("  3. Check dmesg for connection events");
            } else {
                println!("\n{}", "Detected serial ports:".green().bold());
                for port in &ports {
                    println!("\n  {}", port.path.white().bold());
                    if let Some(ref prod) = port.product {
                        println!("    Product: {}", prod);
                    }
                    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                        println!("    VID:PID: {:04x}:{:04x}", vid, pid);
                    }
                }
                println!("\n{}", "To forward:".cyan());
                println!(
                    "  serial-mqtt run -p {} --broker <HOST>",
                    ports[0].path.white()
                );
            }
        }
    }

    Ok(())
}

fn handle_devices(cmd: DeviceCommands) -> Result<()> {
    match cmd {
        DeviceCommands::List => {
            println!("{}", "=".repeat(60));
            println!("{}", "Supported Device Profiles".cyan().bold());
            println!("{}", "=".repeat(60));

            for name in profile_names() {
                if let Some(profile) = get_profile(name) {
                    println!("\n  {}: {}", name.white().bold(), profile.description);
                    println!("    Manufacturer: {}", profile.manufacturer);
                    println!("    Default baud: {}", profile.baud_rate);
                }
            }

            println!("\n{}", "=".repeat(60));
            println!(
                "Use {} to see detailed profile information",
                "serial-mqtt devices show <device>".cyan()
            );
        }

        DeviceCommands::Show { device } => {
            let profile = get_profile(&device).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown device profile: {}. Use 'serial-mqtt devices list' to see available profiles.",
                    device
                )
            })?;

            print_device_profile(profile);
        }
    }

    Ok(())
}

fn print_device_profile(profile: &DeviceProfile) {
    println!("{}", "=".repeat(70));
    println!("{}", format!("Device Profile: {}", profile.name).cyan().bold());
    println!("{}", "=".repeat(70));

    println!("\n{}", "Basic Information:".white().bold());
    println!("  ID: {}", profile.id);
    println!("  Description: {}", profile.description);
    println!("  Manufacturer: {}", profile.manufacturer);
    println!("  Readings: {}", profile.reading);

    println!("\n{}", "Serial Settings:".white().bold());
    println!("  Default baud rate: {}", profile.baud_rate);
    println!("  Framing: 8N1, no flow control");

    println!("\n{}", "USB Identification:".white().bold());
    for id in &profile.usb_ids {
        println!("  VID:PID {:04x}:{:04x}", id.vid, id.pid);
    }
    if !profile.product_keywords.is_empty() {
        println!(
            "  Product keywords: {}",
            profile.product_keywords.join(", ").dimmed()
        );
    }

    println!("\n{}", "=".repeat(70));
}

fn handle_config(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show { config } => {
            let resolved = Config::resolve(config.as_deref(), ConfigOverrides::default())?;
            println!("{}", resolved.to_toml()?);
        }

        ConfigCommands::Generate { output } => {
            let text = Config::default().to_toml()?;

            if let Some(path) = output {
                std::fs::write(&path, &text)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!(
                    "{} Default config written to {}",
                    "[OK]".green().bold(),
                    path.display()
                );
            } else {
                println!("{}", text);
            }
        }
    }

    Ok(())
}
