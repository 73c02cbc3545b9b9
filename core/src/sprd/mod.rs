// SPDX-License-Identifier: AGPL-3.0-or-later
//! Unisoc/Spreadtrum engine: PAC container bootstrap (FDL1/FDL2 push
//! over Download-mode BSL framing), Download-mode partition I/O, and
//! Diag-mode IMEI/factory-reset commands.

pub mod bsl;
pub mod diag;
pub mod download;
pub mod fdl;

use log::info;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::orchestrator::CancellationHandle;
use crate::plan::pac::PacPlan;
use crate::plan::FlashPlan;
use crate::transport::Transport;

pub use diag::DiagEngine;
pub use download::DownloadEngine;

/// Fallback RAM addresses used when a PAC's FDL entries don't carry
/// their own load address (`PacEntry::address == 0`).
pub const DEFAULT_FDL1_ADDR: u32 = 0x5000_0000;
pub const DEFAULT_FDL2_ADDR: u32 = 0x9EFFFE00;

fn resolve_addr(entry_addr: u32, default: u32) -> u32 {
    if entry_addr == 0 { default } else { entry_addr }
}

/// Verifies a FDL blob's SHA-256 against a PKCS#1 v1.5 signature using
/// the vendor's public key, unless `bypass` is set — bypass means "do
/// not verify", not "verification always passes".
pub fn check_fdl_signature(fdl_bytes: &[u8], signature: &[u8], public_key: &RsaPublicKey, bypass: bool) -> Result<()> {
    if bypass {
        info!("RSA bypass enabled: skipping FDL signature verification");
        return Ok(());
    }

    let digest = Sha256::digest(fdl_bytes);
    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .map_err(|_| Error::AuthFailed("FDL signature verification failed".into()))
}

/// Runs FDL1/FDL2 bootstrap over a Download-mode transport, reading
/// both loader payloads out of the PAC container this `plan` was parsed
/// from.
pub async fn bootstrap(transport: &mut dyn Transport, pac_path: &std::path::Path, plan: &PacPlan) -> Result<()> {
    let raw = std::fs::read(pac_path).map_err(Error::Io)?;

    let fdl1_entry = plan.fdl1.as_ref().ok_or_else(|| Error::ImageInvalid("PAC has no FDL1 entry".into()))?;
    let fdl2_entry = plan.fdl2.as_ref().ok_or_else(|| Error::ImageInvalid("PAC has no FDL2 entry".into()))?;

    let slice = |offset: u64, length: u64| -> Result<&[u8]> {
        let start = offset as usize;
        let end = start + length as usize;
        raw.get(start..end).ok_or_else(|| Error::ImageInvalid("FDL region exceeds PAC file bounds".into()))
    };

    let fdl1_bytes = slice(fdl1_entry.offset, fdl1_entry.length)?;
    let fdl2_bytes = slice(fdl2_entry.offset, fdl2_entry.length)?;

    fdl::bootstrap(
        transport,
        resolve_addr(fdl1_entry.address, DEFAULT_FDL1_ADDR),
        fdl1_bytes,
        resolve_addr(fdl2_entry.address, DEFAULT_FDL2_ADDR),
        fdl2_bytes,
    )
    .await
}

/// Walks `plan`'s selected entries against an already-bootstrapped
/// Download-mode transport: protected partitions are skipped with an
/// `INFO` log, `keep_nv` additionally skips `nv*`/`runtime*` names
/// regardless of selection.
pub async fn execute_plan(
    transport: &mut dyn Transport,
    plan: &FlashPlan,
    keep_nv: bool,
    cancel: &CancellationHandle,
) -> Result<()> {
    let mut engine = DownloadEngine::new(transport);

    for entry in plan.entries.iter().filter(|e| e.is_selected) {
        cancel.check()?;
        if entry.is_protected {
            info!("skipping protected partition '{}'", entry.name);
            continue;
        }
        if download::should_keep_nv_skip(&entry.name, keep_nv) {
            info!("keep-nv: skipping '{}'", entry.name);
            continue;
        }

        let Some(path) = entry.effective_image_path() else { continue };
        // A `--custom-image` override is always a standalone file, never a
        // range inside the original `.pac`; only honor `pac_range` when
        // still reading from the parsed source path.
        let pac_range = if entry.custom_image_path.is_some() { None } else { entry.pac_range };
        let data = crate::image::read_partition_bytes(path, pac_range).await?;
        engine.write_partition(entry, &data, cancel).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_addr_falls_back_only_when_entry_address_is_zero() {
        assert_eq!(resolve_addr(0, DEFAULT_FDL1_ADDR), DEFAULT_FDL1_ADDR);
        assert_eq!(resolve_addr(0x1234, DEFAULT_FDL1_ADDR), 0x1234);
    }

    #[test]
    fn bypass_skips_verification_entirely() {
        use rsa::RsaPrivateKey;
        let mut rng = rand::rngs::OsRng;
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public = RsaPublicKey::from(&key);
        // Garbage signature: would fail verification, but bypass short-circuits.
        assert!(check_fdl_signature(b"fdl-bytes", &[0u8; 128], &public, true).is_ok());
    }
}
