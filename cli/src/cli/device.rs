// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resolves a classified [`DeviceMode`] to an openable [`UsbTransport`],
//! polling the way `mft-core`'s own watcher loop does rather than failing
//! on the first empty enumeration.

use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use log::info;
use mft_core::error::{Error, UsbError};
use mft_core::transport::UsbTransport;
use mft_core::watcher::{find_usb_device, select_interface_number, DeviceMode};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub async fn wait_for_usb(mode: DeviceMode, timeout: Duration) -> Result<UsbTransport> {
    let deadline = Instant::now() + timeout;
    info!("waiting for a {} device...", mode.label());

    loop {
        match find_usb_device(mode).await {
            Ok(info) => {
                let interface_number = select_interface_number(&info, mode);
                return Ok(UsbTransport::new(info, interface_number));
            }
            Err(Error::UsbError(UsbError::NotFound)) => {
                if Instant::now() >= deadline {
                    bail!(Error::UsbError(UsbError::NotFound));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
