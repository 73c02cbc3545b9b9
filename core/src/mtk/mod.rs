// SPDX-License-Identifier: AGPL-3.0-or-later
//! MediaTek BROM/DA engine: BROM command set + SLA signer +
//! DA uploader + one of three DA command engines (Legacy/XFlash/XML v6).
//!
//! `mft-core` never picks a DA variant on its own — [`chip::ChipProfile`]
//! names a default, but [`da::DaFile::parse`] is authoritative (the
//! header tells us which of the three we actually got).

pub mod brom;
pub mod chip;
pub mod da;
pub mod exploits;
pub mod sla;

use log::info;

use crate::error::{Error, Result};
use crate::image::super_meta::SuperMeta;
use crate::loader::LoaderBundle;
use crate::orchestrator::CancellationHandle;
use crate::plan::FlashPlan;
use crate::transport::Transport;

pub use chip::{ChipProfile, DaMode};
pub use da::{legacy::LegacyDa, xflash::XFlashDa, xml::XmlDa, DaEntry, DaFile, DaType};

/// Negotiates the BROM handshake and pushes a DA, returning the parsed
/// entry whose embedded second stage the caller should now talk to via
/// [`da::xflash::XFlashDa`], [`da::legacy::LegacyDa`] or [`da::xml::XmlDa`]
/// depending on `DaEntry::da_type`.
pub async fn identify_and_upload_da(
    transport: &mut dyn Transport,
    bundle: &LoaderBundle,
    sla_keys: &sla::SlaKeyStore,
) -> Result<(ChipProfile, DaEntry)> {
    let hw_code = {
        let mut brom = brom::BromClient::new(transport);
        match brom.get_hw_code().await {
            Ok(code) => code,
            Err(Error::AuthFailed(_)) => {
                return Err(Error::AuthFailed(
                    "BROM requires SLA authorization before GetHwCode completes".into(),
                ));
            }
            Err(e) => return Err(e),
        }
    };
    let profile = chip::lookup(hw_code);

    let da_bytes = std::fs::read(&bundle.loader_path).map_err(Error::Io)?;
    let da_file = DaFile::parse(&da_bytes)?;
    let entry = da_file
        .entry_for_hw_code(hw_code)
        .cloned()
        .ok_or_else(|| Error::ImageInvalid(format!("no DA entry for hw_code 0x{hw_code:04X}")))?;

    let da1 = entry.da1().ok_or_else(|| Error::ImageInvalid("DA file missing DA1 region".into()))?;

    {
        let mut brom = brom::BromClient::new(transport);
        match brom.send_da(da1.addr, da1.length, da1.sig_len, &da1.data).await {
            Err(Error::AuthFailed(_)) if sla_keys.has_no_keys() => {
                return Err(Error::AuthFailed(
                    "SLA authorization required for SendDA but no key is registered".into(),
                ));
            }
            other => other?,
        }
        brom.jump_da(da1.addr).await?;
    }

    Ok((profile, entry))
}

/// Walks `plan`'s selected entries against an already-booted DA2,
/// dispatching to whichever of the three wire variants `da_entry.da_type`
/// names. Protected partitions are skipped with an `INFO` log rather than
/// attempted, same policy as [`crate::edl::execute_plan`] and
/// [`crate::sprd::execute_plan`].
pub async fn execute_plan(
    transport: &mut dyn Transport,
    plan: &FlashPlan,
    da_entry: &DaEntry,
    super_meta: Option<&SuperMeta>,
    cancel: &CancellationHandle,
) -> Result<()> {
    match da_entry.da_type {
        DaType::Legacy => execute_plan_legacy(transport, plan, super_meta, cancel).await,
        DaType::XFlash => execute_plan_xflash(transport, plan, super_meta, cancel).await,
        DaType::XmlV6 => execute_plan_xml(transport, plan, super_meta, cancel).await,
    }
}

/// Ends the DA session and boots the device, dispatching on `da_entry.da_type`
/// the same way [`execute_plan`] does.
pub async fn reboot(transport: &mut dyn Transport, da_entry: &DaEntry) -> Result<()> {
    match da_entry.da_type {
        DaType::Legacy => LegacyDa::new(transport).shutdown().await,
        DaType::XFlash => XFlashDa::new(transport).boot_to().await,
        DaType::XmlV6 => XmlDa::new(transport).boot_to().await,
    }
}

fn partition_addr_and_size(entry: &crate::plan::PartitionEntry) -> (u64, u64) {
    (entry.start_sector * entry.sector_size as u64, entry.byte_len())
}

async fn execute_plan_legacy(
    transport: &mut dyn Transport,
    plan: &FlashPlan,
    super_meta: Option<&SuperMeta>,
    cancel: &CancellationHandle,
) -> Result<()> {
    let mut da = LegacyDa::new(transport);

    for entry in plan.entries.iter().filter(|e| e.is_selected) {
        cancel.check()?;
        if entry.is_protected {
            info!("skipping protected partition '{}'", entry.name);
            continue;
        }
        let Some(path) = entry.effective_image_path() else { continue };
        let data = crate::image::read_expanded(path).await?;
        let (addr, _) = partition_addr_and_size(entry);
        da.write_partition(addr as u32, &data, cancel, |_, _| {}).await?;
    }

    if let Some(meta) = super_meta.filter(|m| m.is_supported) {
        if let Some(super_entry) = plan.entries.iter().find(|e| e.name.eq_ignore_ascii_case("super")) {
            if !super_entry.is_protected {
                cancel.check()?;
                info!("writing Super-Meta bundle '{}' to 'super'", meta.super_meta_path.display());
                let raw = crate::image::read_expanded(&meta.super_meta_path).await?;
                let (addr, _) = partition_addr_and_size(super_entry);
                da.write_partition(addr as u32, &raw, cancel, |_, _| {}).await?;
            }
        }
    }

    Ok(())
}

async fn execute_plan_xflash(
    transport: &mut dyn Transport,
    plan: &FlashPlan,
    super_meta: Option<&SuperMeta>,
    cancel: &CancellationHandle,
) -> Result<()> {
    let mut da = XFlashDa::new(transport);

    for entry in plan.entries.iter().filter(|e| e.is_selected) {
        cancel.check()?;
        if entry.is_protected {
            info!("skipping protected partition '{}'", entry.name);
            continue;
        }
        let Some(path) = entry.effective_image_path() else { continue };
        let data = crate::image::read_expanded(path).await?;
        let (addr, size) = partition_addr_and_size(entry);
        da.write_flash_stream(addr, size, &data, cancel).await?;
    }

    if let Some(meta) = super_meta.filter(|m| m.is_supported) {
        if let Some(super_entry) = plan.entries.iter().find(|e| e.name.eq_ignore_ascii_case("super")) {
            if !super_entry.is_protected {
                cancel.check()?;
                info!("writing Super-Meta bundle '{}' to 'super'", meta.super_meta_path.display());
                let raw = crate::image::read_expanded(&meta.super_meta_path).await?;
                let (addr, _) = partition_addr_and_size(super_entry);
                da.write_flash_stream(addr, raw.len() as u64, &raw, cancel).await?;
            }
        }
    }

    Ok(())
}

async fn execute_plan_xml(
    transport: &mut dyn Transport,
    plan: &FlashPlan,
    super_meta: Option<&SuperMeta>,
    cancel: &CancellationHandle,
) -> Result<()> {
    let mut da = XmlDa::new(transport);

    for entry in plan.entries.iter().filter(|e| e.is_selected) {
        cancel.check()?;
        if entry.is_protected {
            info!("skipping protected partition '{}'", entry.name);
            continue;
        }
        let Some(path) = entry.effective_image_path() else { continue };
        let data = crate::image::read_expanded(path).await?;
        da.write_partition(&entry.name, "update", &data).await?;
    }

    if let Some(meta) = super_meta.filter(|m| m.is_supported) {
        cancel.check()?;
        info!("writing Super-Meta bundle '{}' via v6 super_meta command", meta.super_meta_path.display());
        let raw = crate::image::read_expanded(&meta.super_meta_path).await?;
        da.write_super_meta(&raw).await?;
    }

    Ok(())
}
