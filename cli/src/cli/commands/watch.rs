// SPDX-License-Identifier: AGPL-3.0-or-later
//! `watch`: streams device arrive/remove events as they're classified,
//! for scripting around hot-plug flows instead of polling `list_known_devices`.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use mft_core::watcher::{Watcher, WatchEvent};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAILBOX_CAPACITY: usize = 32;

#[derive(Args, Debug)]
pub struct WatchArgs {}

pub async fn run(_args: &WatchArgs) -> Result<i32> {
    let mut watcher = Watcher::spawn(POLL_INTERVAL, MAILBOX_CAPACITY);
    println!("watching for devices (ctrl-c to stop)...");
    while let Some(event) = watcher.recv().await {
        match event {
            WatchEvent::Arrived(device) => {
                println!(
                    "+ {} {:04x}:{:04x} bus={} addr={} iface={}",
                    device.mode.label(),
                    device.vendor_id,
                    device.product_id,
                    device.bus,
                    device.address,
                    device.interface_number
                );
            }
            WatchEvent::Removed { vendor_id, product_id, bus, address } => {
                println!("- {vendor_id:04x}:{product_id:04x} bus={bus} addr={address}");
            }
        }
    }
    Ok(0)
}
