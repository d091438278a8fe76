//! Device profile definitions
//!
//! Describes the boards that produce readings: how to talk to them and how
//! to recognise them on the USB bus.

/// USB vendor/product pair used for port auto-detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

/// Board profile
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    /// Short identifier (e.g., "microbit")
    pub id: String,
    /// Display name
    pub name: String,
    /// Device description
    pub description: String,
    /// Device manufacturer
    pub manufacturer: String,
    /// Default baud rate of the board's serial console
    pub baud_rate: u32,
    /// What a single line of output carries
    pub reading: String,
    /// USB IDs the board enumerates with
    pub usb_ids: Vec<UsbId>,
    /// Keywords matched against the USB product string when IDs are unknown
    pub product_keywords: Vec<String>,
}

impl DeviceProfile {
    /// Check whether a USB port belongs to this board
    pub fn matches_usb(&self, vid: Option<u16>, pid: Option<u16>, product: Option<&str>) -> bool {
        if let (Some(vid), Some(pid)) = (vid, pid) {
            if self.usb_ids.iter().any(|id| id.vid == vid && id.pid == pid) {
                return true;
            }
        }

        if let Some(product) = product {
            let product = product.to_lowercase();
            return self
                .product_keywords
                .iter()
                .any(|k| product.contains(&k.to_lowercase()));
        }

        false
    }
}
