//! Serial port communication module
//!
//! This module provides functionality for:
//! - Listing available serial ports (micro:bit, USB-to-serial adapters)
//! - Opening the board's console and reading it line by line

pub mod port;

pub use port::{PortConfig, SerialConnection};
