//! BBC micro:bit profile
//!
//! The micro:bit exposes its UART through the DAPLink interface chip as a
//! USB CDC device (`/dev/ttyACM*` on Linux, `COMx` on Windows).

use super::profile::{DeviceProfile, UsbId};
use once_cell::sync::Lazy;

/// ARM mbed / DAPLink vendor ID
pub const DAPLINK_VID: u16 = 0x0d28;
/// DAPLink CMSIS-DAP product ID
pub const DAPLINK_PID: u16 = 0x0204;

pub static MICROBIT_PROFILE: Lazy<DeviceProfile> = Lazy::new(|| DeviceProfile {
    id: "microbit".to_string(),
    name: "BBC micro:bit".to_string(),
    description: "micro:bit v1/v2 streaming light level readings over USB serial".to_string(),
    manufacturer: "Micro:bit Educational Foundation".to_string(),
    baud_rate: 115200,
    reading: "light level, one integer per line (0-255)".to_string(),
    usb_ids: vec![UsbId {
        vid: DAPLINK_VID,
        pid: DAPLINK_PID,
    }],
    product_keywords: vec![
        "micro:bit".to_string(),
        "microbit".to_string(),
        "daplink".to_string(),
        "mbed".to_string(),
    ],
});
