// SPDX-License-Identifier: AGPL-3.0-or-later
//! `fastboot`: the ASCII command/response protocol against a device sitting
//! in bootloader or userspace (fastbootd) mode.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use mft_core::adbfb::FastbootEngine;
use mft_core::watcher::DeviceMode;

use crate::cli::common::install_ctrlc_cancellation;
use crate::cli::device::wait_for_usb;
use crate::cli::progress::FlashProgress;

const USB_WAIT: Duration = Duration::from_secs(30);

#[derive(Args, Debug)]
pub struct FastbootArgs {
    #[command(subcommand)]
    pub command: FastbootCommand,
}

#[derive(Subcommand, Debug)]
pub enum FastbootCommand {
    /// Read a bootloader variable
    Getvar { var: String },
    /// Download an image and flash it to a partition
    Flash { partition: String, image: PathBuf },
    /// Erase a partition
    Erase { partition: String },
    /// `reboot system|bootloader|fastboot|none`
    Reboot { target: String },
    /// Switch the active A/B slot
    SetActive { slot: String },
    /// Create a dynamic (logical) partition
    CreateLp { name: String, size: u64 },
    /// Resize a dynamic partition
    ResizeLp { name: String, size: u64 },
    /// Delete a dynamic partition
    DeleteLp { name: String },
}

pub async fn run(args: &FastbootArgs) -> Result<i32> {
    let mut transport = wait_for_usb(DeviceMode::Fastboot, USB_WAIT).await?;
    let mut engine = FastbootEngine::new(&mut transport);

    match &args.command {
        FastbootCommand::Getvar { var } => {
            let value = engine.getvar(var).await?;
            println!("{var}: {value}");
        }
        FastbootCommand::Flash { partition, image } => {
            let data = tokio::fs::read(image).await?;
            let progress = FlashProgress::new(data.len() as u64);
            let mut cb = |done: u64, total: u64| {
                progress.update(&mft_core::orchestrator::ProgressEvent {
                    partition: partition.clone(),
                    bytes_done: done,
                    bytes_total: total,
                });
            };
            let cancel = install_ctrlc_cancellation();
            engine.download(&data, &cancel, Some(&mut cb)).await?;
            progress.finish(&format!("downloaded {} bytes", data.len()));
            engine.flash(partition).await?;
            println!("flashed {partition} ({} bytes)", data.len());
        }
        FastbootCommand::Erase { partition } => {
            engine.erase(partition).await?;
            println!("erased {partition}");
        }
        FastbootCommand::Reboot { target } => match target.to_ascii_lowercase().as_str() {
            "system" => engine.reboot().await?,
            "bootloader" => engine.reboot_bootloader().await?,
            "fastboot" | "fastbootd" => engine.reboot_fastboot().await?,
            "none" => engine.continue_boot().await?,
            other => bail!("unknown reboot target '{other}' (expected system|bootloader|fastboot|none)"),
        },
        FastbootCommand::SetActive { slot } => {
            engine.set_active(slot).await?;
            println!("active slot set to {slot}");
        }
        FastbootCommand::CreateLp { name, size } => {
            engine.create_logical_partition(name, *size).await?;
            println!("created logical partition {name} ({size} bytes)");
        }
        FastbootCommand::ResizeLp { name, size } => {
            engine.resize_logical_partition(name, *size).await?;
            println!("resized logical partition {name} to {size} bytes");
        }
        FastbootCommand::DeleteLp { name } => {
            engine.delete_logical_partition(name).await?;
            println!("deleted logical partition {name}");
        }
    }

    Ok(0)
}
