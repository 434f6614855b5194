//! Host peripheral notifications.
//!
//! Attach and detach events come from a host device-enumeration source that
//! lives outside this crate. They are reported for display and logging only
//! and never change a machine profile.

use std::fmt;
use tokio::sync::mpsc;

/// USB device class code of a hub.
pub const USB_CLASS_HUB: u8 = 9;

/// Identity and location of a host USB device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsbDevice {
    pub name: Option<String>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub vendor_name: Option<String>,
    pub product_name: Option<String>,
    pub serial_number: Option<String>,
    pub device_class: Option<u8>,
    pub location_id: Option<u32>,
    pub session_id: Option<u64>,
}

impl UsbDevice {
    pub fn is_hub(&self) -> bool {
        self.device_class == Some(USB_CLASS_HUB)
    }
}

impl fmt::Display for UsbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or("<unknown>"))?;
        if let (Some(vendor), Some(product)) = (self.vendor_id, self.product_id) {
            write!(f, " [{vendor:04x}:{product:04x}]")?;
        }
        match self.location_id {
            Some(location) => write!(f, " (locationID={location:#010x}")?,
            None => write!(f, " (locationID=-1")?,
        }
        match self.session_id {
            Some(session) => write!(f, "; sessionID={session})"),
            None => write!(f, "; sessionID=-1)"),
        }
    }
}

/// A host peripheral came or went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    Attached(UsbDevice),
    Detached(UsbDevice),
}

/// Log peripheral events until the source closes its sender.
///
/// Returns the number of events seen.
pub async fn watch_peripherals(mut events: mpsc::Receiver<PeripheralEvent>) -> usize {
    let mut seen = 0;

    while let Some(event) = events.recv().await {
        seen += 1;
        match &event {
            PeripheralEvent::Attached(device) => {
                tracing::info!(device = %device, hub = device.is_hub(), "Peripheral attached");
            }
            PeripheralEvent::Detached(device) => {
                tracing::info!(device = %device, hub = device.is_hub(), "Peripheral detached");
            }
        }
    }

    tracing::debug!(seen, "Peripheral source closed");
    seen
}
