// SPDX-License-Identifier: AGPL-3.0-or-later
//! Qualcomm EDL engine: Sahara loader bootstrap, then the Firehose XML
//! command engine for partition read/write/erase/patch once the loader
//! has booted.

pub mod firehose;
pub mod sahara;

use log::info;

use crate::error::Result;
use crate::image::super_meta::SuperMeta;
use crate::loader::LoaderBundle;
use crate::orchestrator::CancellationHandle;
use crate::plan::FlashPlan;
use crate::transport::Transport;

pub use firehose::{FirehoseEngine, PatchEntry, PowerMode};
pub use sahara::{HelloInfo, SaharaSession};

/// Runs Sahara to push `bundle`'s loader, returning once the device has
/// accepted it and is expected to boot Firehose next.
pub async fn bootstrap(transport: &mut dyn Transport, bundle: &LoaderBundle) -> Result<HelloInfo> {
    SaharaSession::new(transport).run(bundle).await
}

/// Negotiates Firehose's payload size and walks `plan`'s selected
/// entries: protected partitions are skipped with an `INFO` log line
/// rather than attempted, and when `super_meta` names a supported
/// bundle its sub-partitions are written ahead of the rest of the plan.
pub async fn execute_plan(
    transport: &mut dyn Transport,
    plan: &FlashPlan,
    memory_name: &str,
    requested_max_payload: u32,
    super_meta: Option<&SuperMeta>,
    cancel: &CancellationHandle,
) -> Result<()> {
    let mut engine = FirehoseEngine::new(transport);
    engine.configure(memory_name, requested_max_payload).await?;

    if let Some(meta) = super_meta.filter(|m| m.is_supported) {
        write_super_meta(&mut engine, plan, meta, cancel).await?;
    }

    for entry in plan.entries.iter().filter(|e| e.is_selected) {
        cancel.check()?;
        if entry.is_protected {
            info!("skipping protected partition '{}'", entry.name);
            continue;
        }

        let Some(path) = entry.effective_image_path() else {
            continue;
        };
        let window = engine.max_payload().max(1) as usize;
        let mut source = crate::image::WindowedSource::open(path, window).await?;
        engine.program(entry, &mut source, cancel).await?;
    }

    Ok(())
}

/// Writes each Super-Meta sub-partition's standalone image into the matching
/// plan entry when one exists (some firmware bundles ship sub-partitions as
/// separate rawprogram entries already selected in the plan), then falls
/// back to writing the single bundled `super_meta_path` image into the
/// `super` entry for bundles that don't.
async fn write_super_meta(
    engine: &mut FirehoseEngine<'_>,
    plan: &FlashPlan,
    meta: &SuperMeta,
    cancel: &CancellationHandle,
) -> Result<()> {
    let window = engine.max_payload().max(1) as usize;
    let mut wrote_any_sub = false;

    for sub in meta.sub_partitions.iter().filter(|s| s.slot.eq_ignore_ascii_case("a")) {
        cancel.check()?;
        let Some(entry) = plan.entries.iter().find(|e| e.name == sub.name) else {
            continue;
        };
        if entry.is_protected {
            info!("skipping protected Super-Meta sub-partition '{}'", entry.name);
            continue;
        }
        let Some(path) = entry.effective_image_path() else { continue };
        info!("writing Super-Meta sub-partition '{}' -> {}", sub.name, sub.path);
        let mut source = crate::image::WindowedSource::open(path, window).await?;
        engine.program(entry, &mut source, cancel).await?;
        wrote_any_sub = true;
    }

    if !wrote_any_sub {
        if let Some(super_entry) = plan.entries.iter().find(|e| e.name.eq_ignore_ascii_case("super")) {
            if !super_entry.is_protected {
                cancel.check()?;
                info!("writing super_meta bundle '{}' to 'super'", meta.super_meta_path.display());
                let mut source = crate::image::WindowedSource::open(&meta.super_meta_path, window).await?;
                engine.program(super_entry, &mut source, cancel).await?;
            }
        }
    }

    Ok(())
}
