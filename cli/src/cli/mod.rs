// SPDX-License-Identifier: AGPL-3.0-or-later
mod commands;
mod common;
mod device;
mod planutil;
pub mod progress;

use clap::{Args, Parser, Subcommand};

use crate::cli::commands::{AdbArgs, FastbootArgs, FlashMtkArgs, FlashQcomArgs, FlashSprdArgs, WatchArgs};
use crate::error::exit_code_for;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-vendor mobile flashing core")]
pub struct CliArgs {
    /// Enable verbose logging, including debug information
    #[arg(short, long)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Program partitions onto a device (`flash qcom|mtk|sprd`)
    Flash(FlashArgs),
    /// Talk to a device over ADB
    Adb(AdbArgs),
    /// Talk to a device over Fastboot
    Fastboot(FastbootArgs),
    /// Stream device arrive/remove events
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
pub struct FlashArgs {
    #[command(subcommand)]
    pub vendor: FlashVendor,
}

#[derive(Subcommand, Debug)]
pub enum FlashVendor {
    /// Qualcomm EDL/Sahara/Firehose
    Qcom(FlashQcomArgs),
    /// MediaTek BROM/DA
    Mtk(FlashMtkArgs),
    /// Unisoc/Spreadtrum PAC/FDL
    Sprd(FlashSprdArgs),
}

/// Runs the selected subcommand and returns the process exit code (spec.md
/// §6's table), computed from the root `mft_core::error::Error` cause when
/// the command failed with one, or `EXIT_USAGE` for anything else.
pub async fn run_cli(args: &CliArgs) -> i32 {
    let result = match &args.command {
        Commands::Flash(f) => match &f.vendor {
            FlashVendor::Qcom(a) => commands::flash_qcom::run(a).await,
            FlashVendor::Mtk(a) => commands::flash_mtk::run(a).await,
            FlashVendor::Sprd(a) => commands::flash_sprd::run(a).await,
        },
        Commands::Adb(a) => commands::adb::run(a).await,
        Commands::Fastboot(a) => commands::fastboot::run(a).await,
        Commands::Watch(a) => commands::watch::run(a).await,
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err:#}");
            match err.downcast_ref::<mft_core::error::Error>() {
                Some(core_err) => exit_code_for(core_err),
                None => crate::error::EXIT_USAGE,
            }
        }
    }
}
