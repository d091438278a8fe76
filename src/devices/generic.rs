//! Generic device profile
//!
//! Any board behind a common USB-to-serial adapter chip.

use super::profile::{DeviceProfile, UsbId};
use once_cell::sync::Lazy;

/// Generic device profile
pub static GENERIC_PROFILE: Lazy<DeviceProfile> = Lazy::new(|| DeviceProfile {
    id: "generic".to_string(),
    name: "Generic Device".to_string(),
    description: "Serial device printing one integer per line".to_string(),
    manufacturer: "Unknown".to_string(),
    baud_rate: 115200,
    reading: "one integer per line".to_string(),
    usb_ids: vec![
        // FTDI
        UsbId { vid: 0x0403, pid: 0x6001 },
        UsbId { vid: 0x0403, pid: 0x6015 },
        // Silicon Labs CP210x
        UsbId { vid: 0x10c4, pid: 0xea60 },
        UsbId { vid: 0x10c4, pid: 0xea70 },
        // WCH CH340/CH341
        UsbId { vid: 0x1a86, pid: 0x7523 },
        UsbId { vid: 0x1a86, pid: 0x5523 },
        // Prolific PL2303
        UsbId { vid: 0x067b, pid: 0x2303 },
    ],
    product_keywords: vec![
        "serial".to_string(),
        "uart".to_string(),
        "ftdi".to_string(),
        "ch340".to_string(),
    ],
});
