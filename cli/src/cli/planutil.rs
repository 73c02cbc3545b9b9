// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared `--select`/`--storage`/reboot-target parsing for the three
//! `flash <vendor>` subcommands.

use anyhow::{bail, Result};
use mft_core::plan::{RebootTarget, Selection};

pub fn parse_selection(s: &str) -> Selection {
    match s {
        "all" => Selection::All,
        "unprotected" => Selection::Unprotected,
        csv => Selection::Named(csv.split(',').map(|s| s.trim().to_string()).collect()),
    }
}

/// `plan::StorageType` and `loader::StorageType` are distinct types (one
/// describes the partition plan, the other the loader-bundle cache key) —
/// these two parse into whichever one the call site needs.
pub fn parse_storage_plan(s: &str) -> Result<mft_core::plan::StorageType> {
    use mft_core::plan::StorageType;
    match s.to_ascii_lowercase().as_str() {
        "emmc" => Ok(StorageType::Emmc),
        "ufs" => Ok(StorageType::Ufs),
        "nand" => Ok(StorageType::Nand),
        other => bail!("unknown --storage '{other}' (expected emmc|ufs|nand)"),
    }
}

pub fn parse_storage_loader(s: &str) -> Result<mft_core::loader::StorageType> {
    use mft_core::loader::StorageType;
    match s.to_ascii_lowercase().as_str() {
        "emmc" => Ok(StorageType::Emmc),
        "ufs" => Ok(StorageType::Ufs),
        "nand" => Ok(StorageType::Nand),
        other => bail!("unknown --storage '{other}' (expected emmc|ufs|nand)"),
    }
}

pub fn plan_storage_to_loader(s: mft_core::plan::StorageType) -> mft_core::loader::StorageType {
    use mft_core::plan::StorageType as Plan;
    match s {
        Plan::Emmc => mft_core::loader::StorageType::Emmc,
        Plan::Ufs => mft_core::loader::StorageType::Ufs,
        Plan::Nand => mft_core::loader::StorageType::Nand,
    }
}

pub fn parse_reboot_target(s: &str) -> Result<RebootTarget> {
    match s.to_ascii_lowercase().as_str() {
        "system" => Ok(RebootTarget::System),
        "bootloader" => Ok(RebootTarget::Bootloader),
        "recovery" => Ok(RebootTarget::Recovery),
        "fastboot" | "fastbootd" => Ok(RebootTarget::Fastboot),
        "edl" => Ok(RebootTarget::Edl),
        "download" => Ok(RebootTarget::Download),
        "poweroff" | "power-off" => Ok(RebootTarget::PowerOff),
        "none" => Ok(RebootTarget::None),
        other => bail!("unknown reboot target '{other}'"),
    }
}

pub fn print_plan_summary(entries_selected: usize, entries_total: usize, total_bytes: u64) {
    println!(
        "{}/{} partitions selected, {} to write",
        entries_selected,
        entries_total,
        human_bytes::human_bytes(total_bytes as f64)
    );
}
