// SPDX-License-Identifier: AGPL-3.0-or-later
//! `flash qcom`: Sahara loader bootstrap, then Firehose partition
//! programming against a `rawprogram*.xml` + `patch*.xml` firmware
//! directory.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use log::info;
use mft_core::edl::firehose::{FirehoseEngine, PatchEntry, PowerMode};
use mft_core::edl::{self};
use mft_core::loader::cache::LocalCacheResolver;
use mft_core::loader::{AuthStrategy, LoaderBundle, LoaderResolver};
use mft_core::plan::{qcom, FlashPlan, RebootTarget};
use mft_core::watcher::DeviceMode;

use crate::cli::common::{install_ctrlc_cancellation, print_summary, result_from_plan_outcome, write_report};
use crate::cli::device::wait_for_usb;
use crate::cli::planutil::{parse_reboot_target, parse_selection, parse_storage_plan, plan_storage_to_loader, print_plan_summary};

const USB_WAIT: Duration = Duration::from_secs(30);
const REQUESTED_MAX_PAYLOAD: u32 = 1024 * 1024;

#[derive(Args, Debug)]
pub struct FlashQcomArgs {
    /// Firmware directory carrying rawprogram*.xml/patch*.xml and images
    #[arg(long, value_name = "DIR")]
    pub xml: PathBuf,
    /// Programmer (loader) to push via Sahara; falls back to the local loader cache
    #[arg(long, value_name = "FILE")]
    pub loader: Option<PathBuf>,
    #[arg(long, value_parser = ["standard", "vip", "xiaomi", "oneplus", "nothing"])]
    pub auth: Option<String>,
    #[arg(long, default_value = "emmc")]
    pub storage: String,
    /// Skip selected-but-protected partitions instead of aborting on them
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

fn memory_name_for(storage: mft_core::plan::StorageType) -> &'static str {
    use mft_core::plan::StorageType::*;
    match storage {
        Emmc => "eMMC",
        Ufs => "UFS",
        Nand => "NAND",
    }
}

fn power_mode_for(target: RebootTarget) -> Option<PowerMode> {
    match target {
        RebootTarget::None => None,
        RebootTarget::Edl | RebootTarget::Download => Some(PowerMode::ResetToEdl),
        RebootTarget::PowerOff => Some(PowerMode::Off),
        _ => Some(PowerMode::Reset),
    }
}

pub async fn run(args: &FlashQcomArgs) -> Result<i32> {
    let storage_type = parse_storage_plan(&args.storage)?;
    let reboot_target = parse_reboot_target(&args.reboot)?;
    let selection = parse_selection(&args.select);

    // Lenovo firmware occasionally needs the save-persist unsparse variant
    // instead of the standard one; spec.md §9 asks this be a flag rather
    // than hard-coded, but the distilled CLI surface doesn't carry one yet.
    let prefer_save_persist = false;
    let raw_files = qcom::discover_rawprogram_files(&args.xml, prefer_save_persist)?;
    if raw_files.is_empty() {
        bail!("no rawprogram*.xml found under {}", args.xml.display());
    }
    let patch_files = qcom::discover_patch_files(&args.xml)?;
    let parsed = qcom::parse_rawprogram(&raw_files, &args.xml)?;
    let patches = qcom::parse_patches(&patch_files)?;

    let plan = FlashPlan::from_parsed(parsed, &selection, storage_type, reboot_target, args.protect);
    print_plan_summary(plan.selected().count(), plan.entries.len(), plan.total_selected_bytes());

    let super_meta = if args.super_meta { mft_core::image::super_meta::discover(&args.xml).await? } else { None };

    if args.dry_run {
        for entry in plan.selected() {
            println!("  {} (lun {}, {} sectors @ {})", entry.name, entry.lun, entry.num_sectors, entry.start_sector);
        }
        return Ok(0);
    }

    let bundle = resolve_bundle(args, storage_type)?;
    bundle.validate()?;

    let mut transport = wait_for_usb(DeviceMode::QualcommSahara, USB_WAIT).await?;
    info!("pushing loader '{}' via Sahara...", bundle.loader_path.display());
    let hello = edl::bootstrap(&mut transport, &bundle).await?;
    info!("Sahara hello: mode={:?} version={}", hello.mode, hello.version);

    let cancel = install_ctrlc_cancellation();
    let outcome =
        edl::execute_plan(&mut transport, &plan, memory_name_for(storage_type), REQUESTED_MAX_PAYLOAD, super_meta.as_ref(), &cancel).await;
    let result = result_from_plan_outcome(&plan, &outcome);

    if outcome.is_ok() && !patches.is_empty() {
        let mut engine = FirehoseEngine::new(&mut transport);
        engine.configure(memory_name_for(storage_type), REQUESTED_MAX_PAYLOAD).await?;
        for patch in &patches {
            engine.patch(&PatchEntry {
                byte_offset: patch.byte_offset,
                filename: patch.filename.clone(),
                physical_partition_number: patch.physical_partition_number,
                size_in_bytes: patch.size_in_bytes as u32,
                start_sector: patch.start_sector.clone(),
                value: patch.value.clone(),
                what: "patch DISK".into(),
            })
            .await?;
        }
        if let Some(mode) = power_mode_for(reboot_target) {
            engine.power(mode).await?;
        }
    }

    print_summary(&result);
    if let Some(report) = &args.report {
        write_report(report, &result).await?;
    }
    outcome?;
    Ok(if result.failed > 0 { 20 } else { 0 })
}

fn resolve_bundle(args: &FlashQcomArgs, storage_type: mft_core::plan::StorageType) -> Result<LoaderBundle> {
    let auth = args.auth.as_deref().and_then(AuthStrategy::parse);
    match &args.loader {
        Some(path) => Ok(LoaderBundle {
            loader_path: path.clone(),
            digest_path: None,
            sign_path: None,
            storage_type: plan_storage_to_loader(storage_type),
            vendor: "qcom".into(),
            chip: "generic".into(),
            auth_strategy: auth.unwrap_or(AuthStrategy::Standard),
        }),
        None => {
            let resolver = LocalCacheResolver::from_env();
            Ok(resolver.resolve("qcom", "generic", plan_storage_to_loader(storage_type), auth)?)
        }
    }
}
