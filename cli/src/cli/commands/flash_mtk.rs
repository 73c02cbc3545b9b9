// SPDX-License-Identifier: AGPL-3.0-or-later
//! `flash mtk`: BROM handshake + SLA + DA upload, then whichever of the
//! three DA wire variants the uploaded DA reports.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use log::info;
use mft_core::loader::LoaderBundle;
use mft_core::mtk::sla::SlaKeyStore;
use mft_core::mtk::{self};
use mft_core::plan::{mtk_scatter, FlashPlan, RebootTarget, StorageType};
use mft_core::watcher::DeviceMode;

use crate::cli::common::{install_ctrlc_cancellation, print_summary, result_from_plan_outcome, write_report};
use crate::cli::device::wait_for_usb;
use crate::cli::planutil::{parse_reboot_target, parse_selection, print_plan_summary};

const USB_WAIT: Duration = Duration::from_secs(30);

#[derive(Args, Debug)]
pub struct FlashMtkArgs {
    /// Scatter file: `MT<chip>_Android_scatter.txt` (v3) or `.xml` (v6)
    #[arg(long, value_name = "FILE")]
    pub scatter: PathBuf,
    /// Download Agent to upload over BROM before executing the plan
    #[arg(long, value_name = "FILE")]
    pub da: Option<PathBuf>,
    /// Preloader image, accepted for completeness; not required by the BROM path
    #[arg(long, value_name = "FILE")]
    pub preloader: Option<PathBuf>,
    #[arg(long)]
    pub protect: bool,
    #[arg(long = "super-meta")]
    pub super_meta: bool,
    #[arg(long, default_value = "unprotected")]
    pub select: String,
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    #[arg(long, default_value = "system")]
    pub reboot: String,
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

fn storage_type_from_scatter(s: &str) -> StorageType {
    if s.eq_ignore_ascii_case("UFS") {
        StorageType::Ufs
    } else {
        StorageType::Emmc
    }
}

pub async fn run(args: &FlashMtkArgs) -> Result<i32> {
    let Some(da_path) = &args.da else {
        bail!("--da is required: the BROM path needs an uploaded Download Agent before a plan can execute");
    };
    if let Some(pl) = &args.preloader {
        info!("preloader '{}' noted but not required by the BROM upload path", pl.display());
    }

    let reboot_target = parse_reboot_target(&args.reboot)?;
    let selection = parse_selection(&args.select);

    let scatter = mtk_scatter::parse(&args.scatter)?;
    let storage_type = storage_type_from_scatter(&scatter.storage_type);
    let firmware_dir = args.scatter.parent().unwrap_or_else(|| std::path::Path::new("."));

    let plan = FlashPlan::from_parsed(scatter.entries, &selection, storage_type, reboot_target, args.protect);
    print_plan_summary(plan.selected().count(), plan.entries.len(), plan.total_selected_bytes());

    let super_meta = if args.super_meta { mft_core::image::super_meta::discover(firmware_dir).await? } else { None };

    if args.dry_run {
        for entry in plan.selected() {
            println!("  {} ({} sectors @ {})", entry.name, entry.num_sectors, entry.start_sector);
        }
        return Ok(0);
    }

    let bundle = LoaderBundle {
        loader_path: da_path.clone(),
        digest_path: None,
        sign_path: None,
        storage_type: mft_core::loader::StorageType::Emmc,
        vendor: "mtk".into(),
        chip: "generic".into(),
        auth_strategy: mft_core::loader::AuthStrategy::Nothing,
    };
    bundle.validate()?;

    let mut transport = wait_for_usb(DeviceMode::MtkBrom, USB_WAIT).await?;
    let sla_keys = SlaKeyStore::new();

    info!("uploading DA '{}' via BROM...", bundle.loader_path.display());
    let (profile, da_entry) = mtk::identify_and_upload_da(&mut transport, &bundle, &sla_keys).await?;
    info!("chip identified as {} (da_type={:?})", profile.name, da_entry.da_type);

    let cancel = install_ctrlc_cancellation();
    let outcome = mtk::execute_plan(&mut transport, &plan, &da_entry, super_meta.as_ref(), &cancel).await;
    let result = result_from_plan_outcome(&plan, &outcome);

    if outcome.is_ok() && reboot_target != RebootTarget::None {
        mtk::reboot(&mut transport, &da_entry).await?;
    }

    print_summary(&result);
    if let Some(report) = &args.report {
        write_report(report, &result).await?;
    }
    outcome?;
    Ok(if result.failed > 0 { 20 } else { 0 })
}
