// SPDX-License-Identifier: AGPL-3.0-or-later
//! `adb`: a direct ADB client driven over this crate's own protocol
//! engine. `devices` goes through a running host server (`MFT_ADB_SERVER`,
//! default `127.0.0.1:5037`); every other subcommand opens the device's
//! USB transport directly and speaks `CNXN`/`AUTH`/`OPEN` itself.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use mft_core::adbfb::{load_or_generate_host_key, AdbConnection, ServerClient, SyncSession, HOST_FEATURES};
use mft_core::watcher::DeviceMode;

use crate::cli::common::install_ctrlc_cancellation;
use crate::cli::device::wait_for_usb;
use crate::cli::planutil::parse_reboot_target;

const USB_WAIT: Duration = Duration::from_secs(30);

#[derive(Args, Debug)]
pub struct AdbArgs {
    #[command(subcommand)]
    pub command: AdbCommand,
}

#[derive(Subcommand, Debug)]
pub enum AdbCommand {
    /// List devices known to the adb host server
    Devices,
    /// Run a shell command and print its output
    Shell { command: Vec<String> },
    /// Push a local file to a device path
    Push { local: PathBuf, remote: String },
    /// Pull a device path to a local file
    Pull { remote: String, local: PathBuf },
    /// Push an APK to /data/local/tmp and install it
    Install { apk: PathBuf },
    /// `reboot system|bootloader|recovery|fastboot|none`
    Reboot { target: String },
}

pub async fn run(args: &AdbArgs) -> Result<i32> {
    match &args.command {
        AdbCommand::Devices => devices().await,
        AdbCommand::Shell { command } => shell(&command.join(" ")).await,
        AdbCommand::Push { local, remote } => push(local, remote).await,
        AdbCommand::Pull { remote, local } => pull(remote, local).await,
        AdbCommand::Install { apk } => install(apk).await,
        AdbCommand::Reboot { target } => reboot(target).await,
    }
}

async fn devices() -> Result<i32> {
    let mut client = ServerClient::connect().await?;
    for (serial, state) in client.devices().await? {
        println!("{serial}\t{state}");
    }
    Ok(0)
}

async fn open_connection(transport: &mut mft_core::transport::UsbTransport) -> Result<AdbConnection<'_>> {
    let host_key = load_or_generate_host_key(None).await?;
    Ok(AdbConnection::connect(transport, HOST_FEATURES, Some(&host_key)).await?)
}

async fn shell(command: &str) -> Result<i32> {
    let mut transport = wait_for_usb(DeviceMode::Adb, USB_WAIT).await?;
    let mut conn = open_connection(&mut transport).await?;
    let mut stream = conn.open(&format!("shell,v2,raw:{command}")).await?;
    let out = stream.read_to_end().await?;
    print!("{}", String::from_utf8_lossy(&out));
    Ok(0)
}

async fn push(local: &PathBuf, remote: &str) -> Result<i32> {
    let data = tokio::fs::read(local).await?;
    let mtime = std::fs::metadata(local)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);

    let mut transport = wait_for_usb(DeviceMode::Adb, USB_WAIT).await?;
    let mut conn = open_connection(&mut transport).await?;
    let stream = conn.open("sync:").await?;
    let mut sync = SyncSession::new(stream);
    let cancel = install_ctrlc_cancellation();
    sync.push(remote, &data, mtime, &cancel).await?;
    sync.close().await?;
    println!("pushed {} -> {remote}", local.display());
    Ok(0)
}

async fn pull(remote: &str, local: &PathBuf) -> Result<i32> {
    let mut transport = wait_for_usb(DeviceMode::Adb, USB_WAIT).await?;
    let mut conn = open_connection(&mut transport).await?;
    let stream = conn.open("sync:").await?;
    let mut sync = SyncSession::new(stream);
    let data = sync.pull(remote).await?;
    sync.close().await?;
    tokio::fs::write(local, &data).await?;
    println!("pulled {remote} -> {}", local.display());
    Ok(0)
}

async fn install(apk: &PathBuf) -> Result<i32> {
    let Some(file_name) = apk.file_name().and_then(|n| n.to_str()) else {
        bail!("'{}' has no file name", apk.display());
    };
    let remote = format!("/data/local/tmp/{file_name}");
    push(apk, &remote).await?;
    let result = shell(&format!("pm install -r \"{remote}\"")).await;
    let _ = shell(&format!("rm -f \"{remote}\"")).await;
    result
}

async fn reboot(target: &str) -> Result<i32> {
    let reboot_target = parse_reboot_target(target)?;
    let arg = match reboot_target {
        mft_core::plan::RebootTarget::System | mft_core::plan::RebootTarget::None => "",
        mft_core::plan::RebootTarget::Bootloader => "bootloader",
        mft_core::plan::RebootTarget::Recovery => "recovery",
        mft_core::plan::RebootTarget::Fastboot => "fastboot",
        mft_core::plan::RebootTarget::Edl | mft_core::plan::RebootTarget::Download => "edl",
        mft_core::plan::RebootTarget::PowerOff => bail!("adb has no power-off reboot target"),
    };

    let mut transport = wait_for_usb(DeviceMode::Adb, USB_WAIT).await?;
    let mut conn = open_connection(&mut transport).await?;
    let mut stream = conn.open(&format!("reboot:{arg}")).await?;
    stream.read_to_end().await.ok();
    Ok(0)
}
