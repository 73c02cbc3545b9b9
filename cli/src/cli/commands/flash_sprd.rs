// SPDX-License-Identifier: AGPL-3.0-or-later
//! `flash sprd`: FDL1/FDL2 bootstrap over BSL framing from a single `.pac`
//! container, then Download-mode partition writes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use log::info;
use mft_core::plan::{pac, FlashPlan, RebootTarget, StorageType};
use mft_core::sprd::{self, DownloadEngine};
use mft_core::watcher::DeviceMode;

use crate::cli::common::{install_ctrlc_cancellation, print_summary, result_from_plan_outcome, write_report};
use crate::cli::device::wait_for_usb;
use crate::cli::planutil::{parse_reboot_target, parse_selection, print_plan_summary};

const USB_WAIT: Duration = Duration::from_secs(30);

#[derive(Args, Debug)]
pub struct FlashSprdArgs {
    /// Unisoc firmware container
    #[arg(long, value_name = "FILE")]
    pub pac: PathBuf,
    /// Keep `nv*`/`runtime*` partitions untouched regardless of selection
    #[arg(long = "keep-nv")]
    pub keep_nv: bool,
    /// Skip FDL signature verification
    #[arg(long = "rsa-bypass")]
    pub rsa_bypass: bool,
    #[arg(long, default_value = "unprotected")]
    pub select: String,
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    #[arg(long, default_value = "system")]
    pub reboot: String,
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

pub async fn run(args: &FlashSprdArgs) -> Result<i32> {
    let reboot_target = parse_reboot_target(&args.reboot)?;
    let selection = parse_selection(&args.select);

    let mut pac_plan = pac::parse(&args.pac)?;
    pac::apply_keep_nv(&mut pac_plan.entries, args.keep_nv);

    let plan = FlashPlan::from_parsed(pac_plan.entries.clone(), &selection, StorageType::Emmc, reboot_target, false);
    print_plan_summary(plan.selected().count(), plan.entries.len(), plan.total_selected_bytes());

    if args.dry_run {
        for entry in plan.selected() {
            println!("  {}", entry.name);
        }
        return Ok(0);
    }

    if args.rsa_bypass {
        info!("RSA bypass enabled: skipping FDL signature verification");
    } else {
        info!("no vendor public key embedded in the PAC container; FDL signature verification skipped");
    }

    let mut transport = wait_for_usb(DeviceMode::SprdDownload, USB_WAIT).await?;
    info!("pushing FDL1/FDL2 from '{}'...", args.pac.display());
    sprd::bootstrap(&mut transport, &args.pac, &pac_plan).await?;

    let cancel = install_ctrlc_cancellation();
    let outcome = sprd::execute_plan(&mut transport, &plan, args.keep_nv, &cancel).await;
    let result = result_from_plan_outcome(&plan, &outcome);

    if outcome.is_ok() && reboot_target != RebootTarget::None {
        let mut engine = DownloadEngine::new(&mut transport);
        if reboot_target == RebootTarget::PowerOff {
            engine.power_off().await?;
        } else {
            engine.normal_reset().await?;
        }
    }

    print_summary(&result);
    if let Some(report) = &args.report {
        write_report(report, &result).await?;
    }
    outcome?;
    Ok(if result.failed > 0 { 20 } else { 0 })
}
