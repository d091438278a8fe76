//! Serial port configuration and connection management
//!
//! Handles USB serial port discovery and the line-oriented connection to
//! the board producing readings.

use crate::devices::DeviceProfile;
use crate::source::{LineBuffer, LineRead, LineSource};
use anyhow::{Context, Result};
use colored::Colorize;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Read;
use std::time::Duration;

/// Default micro:bit serial console baud rate
pub const DEFAULT_BAUD: u32 = 115200;

/// Configuration for serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyACM0, /dev/ttyUSB0, COM3)
    pub port_path: String,
    /// Baud rate (default: 115200)
    pub baud_rate: u32,
    /// Data bits (default: 8)
    pub data_bits: DataBits,
    /// Parity (default: None)
    pub parity: Parity,
    /// Stop bits (default: 1)
    pub stop_bits: StopBits,
    /// Flow control (default: None)
    pub flow_control: FlowControl,
    /// Read timeout
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::from("/dev/ttyACM0"),
            baud_rate: DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: Duration::from_millis(1000),
        }
    }
}

impl PortConfig {
    /// Create a new configuration with default 8N1 settings
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Line-oriented serial connection to the board
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    config: PortConfig,
    lines: LineBuffer,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration
    pub fn open(config: PortConfig) -> Result<Self> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()
            .with_context(|| format!("Failed to open serial port: {}", config.port_path))?;

        log::info!(
            "Opened serial port: {} at {} baud",
            config.port_path,
            config.baud_rate
        );

        Ok(Self {
            port,
            config,
            lines: LineBuffer::new(),
        })
    }

    /// Get the port configuration
    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Read a line from the serial port (until newline)
    ///
    /// Returns `Ok(None)` when the read timeout expires before a complete
    /// line is available. Partial data is kept for the next call.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let mut chunk = [0u8; 256];

        loop {
            if let Some(line) = self.lines.next_line() {
                return Ok(Some(line));
            }

            match self.port.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => self.lines.push(&chunk[..n]),
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(None),
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to read from serial port: {}", self.config.port_path)
                    })
                }
            }
        }
    }

    /// Discard anything the board sent before we were ready
    pub fn clear_input(&mut self) -> Result<()> {
        self.lines.clear();
        self.port
            .clear(serialport::ClearBuffer::Input)
            .with_context(|| "Failed to clear serial input buffer")
    }
}

impl LineSource for SerialConnection {
    fn read_line(&mut self) -> Result<LineRead> {
        Ok(match SerialConnection::read_line(self)? {
            Some(line) => LineRead::Line(line),
            None => LineRead::Idle,
        })
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.config.port_path, self.config.baud_rate)
    }
}

/// Information about a detected serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub path: String,
    pub port_type: PortType,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PortType {
    UsbSerial,
    PciSerial,
    Bluetooth,
    Unknown,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortType::UsbSerial => write!(f, "USB Serial"),
            PortType::PciSerial => write!(f, "PCI Serial"),
            PortType::Bluetooth => write!(f, "Bluetooth"),
            PortType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// List all available serial ports
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().with_context(|| "Failed to enumerate serial ports")?;

    let port_infos: Vec<PortInfo> = ports
        .into_iter()
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    PortType::UsbSerial,
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::PciPort => {
                    (PortType::PciSerial, None, None, None, None, None)
                }
                serialport::SerialPortType::BluetoothPort => {
                    (PortType::Bluetooth, None, None, None, None, None)
                }
                serialport::SerialPortType::Unknown => {
                    (PortType::Unknown, None, None, None, None, None)
                }
            };

            PortInfo {
                path: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect();

    Ok(port_infos)
}

/// Print formatted list of available serial ports
pub fn print_ports() -> Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("\n{}", "Troubleshooting tips:".cyan().bold());
        println!("  1. Connect the board with a data-capable USB cable");
        println!("  2. Check if the device is recognized: ls -la /dev/ttyACM* /dev/ttyUSB*");
        println!("  3. Add your user to the 'dialout' group: sudo usermod -aG dialout $USER");
        return Ok(());
    }

    println!("{}", "Available Serial Ports:".green().bold());
    println!("{}", "=".repeat(60));

    for port in ports {
        println!("\n{}: {}", "Port".cyan(), port.path.white().bold());
        println!("  Type: {}", port.port_type);

        if let Some(ref mfg) = port.manufacturer {
            println!("  Manufacturer: {}", mfg);
        }
        if let Some(ref prod) = port.product {
            println!("  Product: {}", prod);
        }
        if let Some(ref sn) = port.serial_number {
            println!("  Serial: {}", sn);
        }
        if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            println!("  VID:PID: {:04x}:{:04x}", vid, pid);
        }
    }

    println!("\n{}", "=".repeat(60));
    println!(
        "{}",
        "Use: serial-mqtt run -p <PORT> to start forwarding".yellow()
    );

    Ok(())
}

/// Keep only USB serial ports that belong to one of the given profiles
pub fn filter_ports(ports: Vec<PortInfo>, profiles: &[&DeviceProfile]) -> Vec<PortInfo> {
    ports
        .into_iter()
        .filter(|p| {
            p.port_type == PortType::UsbSerial
                && profiles
                    .iter()
                    .any(|profile| profile.matches_usb(p.vid, p.pid, p.product.as_deref()))
        })
        .collect()
}

/// Auto-detect serial ports of likely reading sources
pub fn detect_ports(profiles: &[&DeviceProfile]) -> Result<Vec<PortInfo>> {
    Ok(filter_ports(list_ports()?, profiles))
}
