// SPDX-License-Identifier: AGPL-3.0-or-later
//! Device enumeration and vendor/mode classification.
//!
//! Scans `nusb::list_devices()` against a VID/PID table covering every
//! vendor mode this crate flashes, rather than a single MediaTek-only
//! table.

use std::time::Duration;

use log::{debug, trace};
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::error::Result;

/// What a recognized port turned out to be, independent of how it's wired
/// (USB interface vs TTY path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    QualcommSahara,
    QualcommFirehose,
    MtkBrom,
    MtkPreloader,
    SprdDownload,
    SprdDiag,
    Adb,
    Fastboot,
}

impl DeviceMode {
    pub fn label(&self) -> &'static str {
        match self {
            DeviceMode::QualcommSahara => "qualcomm-sahara",
            DeviceMode::QualcommFirehose => "qualcomm-firehose",
            DeviceMode::MtkBrom => "mtk-brom",
            DeviceMode::MtkPreloader => "mtk-preloader",
            DeviceMode::SprdDownload => "sprd-download",
            DeviceMode::SprdDiag => "sprd-diag",
            DeviceMode::Adb => "adb",
            DeviceMode::Fastboot => "fastboot",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub mode: DeviceMode,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus: u8,
    pub address: u8,
    pub interface_number: u8,
    pub serial: Option<String>,
}

#[derive(Debug, Clone)]
pub enum WatchEvent {
    Arrived(DiscoveredDevice),
    Removed { vendor_id: u16, product_id: u16, bus: u8, address: u8 },
}

/// `(vendor_id, product_id, mode)` rows that can be resolved from the
/// device descriptor alone — Fastboot and ADB additionally need the
/// interface descriptor, so they're classified in [`classify_interface`].
const KNOWN_DEVICES: &[(u16, u16, DeviceMode)] = &[
    (0x05C6, 0x9008, DeviceMode::QualcommSahara),
    (0x0E8D, 0x0003, DeviceMode::MtkBrom),
    (0x0E8D, 0x2000, DeviceMode::MtkPreloader),
    (0x1782, 0x4D00, DeviceMode::SprdDownload),
];

const SPRD_VENDOR_ID: u16 = 0x1782;

/// Interface-descriptor based classification for composite devices that
/// share a VID/PID across several functions (ADB/Fastboot gadget ports).
pub fn classify_interface(class: u8, subclass: u8, protocol: u8) -> Option<DeviceMode> {
    match (class, subclass, protocol) {
        (0xFF, 0x42, 0x01) => Some(DeviceMode::Adb),
        (0xFF, 0x42, 0x03) => Some(DeviceMode::Fastboot),
        _ => None,
    }
}

pub fn classify_device(vendor_id: u16, product_id: u16) -> Option<DeviceMode> {
    KNOWN_DEVICES
        .iter()
        .find(|(v, p, _)| *v == vendor_id && *p == product_id)
        .map(|(_, _, m)| *m)
        .or_else(|| {
            // Any other Unisoc product ID in diag mode enumerates under
            // the same vendor with a device-specific PID.
            if vendor_id == SPRD_VENDOR_ID {
                Some(DeviceMode::SprdDiag)
            } else {
                None
            }
        })
}

/// Polls `nusb::list_devices()` on an interval and emits arrive/remove
/// events over a bounded mailbox. Bounded so a stalled consumer applies
/// backpressure rather than growing memory without limit.
pub struct Watcher {
    rx: mpsc::Receiver<WatchEvent>,
}

impl Watcher {
    pub fn spawn(poll_interval: Duration, mailbox_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(mailbox_capacity);

        tokio::spawn(async move {
            let mut known: Vec<(u16, u16, u8, u8)> = Vec::new();
            let mut ticker = interval(poll_interval);

            loop {
                ticker.tick().await;

                let devices = match nusb::list_devices().await {
                    Ok(d) => d,
                    Err(e) => {
                        trace!("device enumeration failed: {e}");
                        continue;
                    }
                };

                let mut seen: Vec<(u16, u16, u8, u8)> = Vec::new();

                for dev in devices {
                    let key = (dev.vendor_id(), dev.product_id(), dev.bus_number(), dev.device_address());
                    seen.push(key);

                    if known.contains(&key) {
                        continue;
                    }

                    let Some(mode) = classify_device(dev.vendor_id(), dev.product_id()) else {
                        continue;
                    };

                    let interface_number = dev
                        .interfaces()
                        .find(|i| {
                            i.class() == 0xFF
                                || matches!(mode, DeviceMode::MtkBrom | DeviceMode::MtkPreloader)
                        })
                        .map(|i| i.interface_number())
                        .unwrap_or(0);

                    let discovered = DiscoveredDevice {
                        mode,
                        vendor_id: dev.vendor_id(),
                        product_id: dev.product_id(),
                        bus: dev.bus_number(),
                        address: dev.device_address(),
                        interface_number,
                        serial: dev.serial_number().map(|s| s.to_string()),
                    };

                    debug!("device arrived: {:?}", discovered);
                    if tx.send(WatchEvent::Arrived(discovered)).await.is_err() {
                        return;
                    }
                }

                for (vendor_id, product_id, bus, address) in
                    known.iter().filter(|k| !seen.contains(k))
                {
                    let event = WatchEvent::Removed {
                        vendor_id: *vendor_id,
                        product_id: *product_id,
                        bus: *bus,
                        address: *address,
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }

                known = seen;
            }
        });

        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}

/// Re-scans `nusb::list_devices()` for the first device matching `mode`
/// and returns the raw `nusb::DeviceInfo` plus the interface number to
/// claim, so a caller (the CLI's device-selection step) can hand both
/// straight to [`crate::transport::UsbTransport::new`]. The watcher's own
/// arrive/remove stream only carries [`DiscoveredDevice`], which drops the
/// `DeviceInfo` handle once classified — this is the one place that keeps
/// it.
pub async fn find_usb_device(mode: DeviceMode) -> Result<nusb::DeviceInfo> {
    let devices = nusb::list_devices()
        .await
        .map_err(|e| crate::error::Error::UsbError(crate::error::UsbError::Open(e.to_string())))?;

    devices
        .into_iter()
        .find(|dev| classify_device(dev.vendor_id(), dev.product_id()) == Some(mode))
        .ok_or(crate::error::Error::UsbError(crate::error::UsbError::NotFound))
}

/// Picks the interface to claim for an already-identified device: the
/// first vendor-specific (class `0xFF`) interface, or interface 0 for
/// MediaTek ports whose payload interface isn't marked vendor-specific.
pub fn select_interface_number(info: &nusb::DeviceInfo, mode: DeviceMode) -> u8 {
    info.interfaces()
        .find(|i| i.class() == 0xFF || matches!(mode, DeviceMode::MtkBrom | DeviceMode::MtkPreloader))
        .map(|i| i.interface_number())
        .unwrap_or(0)
}

pub async fn list_known_devices() -> Result<Vec<DiscoveredDevice>> {
    let devices = nusb::list_devices().await.map_err(|e| {
        crate::error::Error::UsbError(crate::error::UsbError::Open(e.to_string()))
    })?;

    let mut out = Vec::new();
    for dev in devices {
        if let Some(mode) = classify_device(dev.vendor_id(), dev.product_id()) {
            out.push(DiscoveredDevice {
                mode,
                vendor_id: dev.vendor_id(),
                product_id: dev.product_id(),
                bus: dev.bus_number(),
                address: dev.device_address(),
                interface_number: 0,
                serial: dev.serial_number().map(|s| s.to_string()),
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_devices() {
        assert_eq!(classify_device(0x05C6, 0x9008), Some(DeviceMode::QualcommSahara));
        assert_eq!(classify_device(0x0E8D, 0x0003), Some(DeviceMode::MtkBrom));
        assert_eq!(classify_device(0x0E8D, 0x2000), Some(DeviceMode::MtkPreloader));
        assert_eq!(classify_device(0x1782, 0x4D00), Some(DeviceMode::SprdDownload));
        assert_eq!(classify_device(0x1782, 0x1234), Some(DeviceMode::SprdDiag));
        assert_eq!(classify_device(0x1234, 0x5678), None);
    }

    #[test]
    fn classifies_composite_interfaces() {
        assert_eq!(classify_interface(0xFF, 0x42, 0x01), Some(DeviceMode::Adb));
        assert_eq!(classify_interface(0xFF, 0x42, 0x03), Some(DeviceMode::Fastboot));
        assert_eq!(classify_interface(0x08, 0x06, 0x50), None);
    }
}
