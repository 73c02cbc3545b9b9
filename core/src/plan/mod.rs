// SPDX-License-Identifier: AGPL-3.0-or-later
//! Unified partition plan: the three vendor-specific parsers below all
//! reduce to the same [`PartitionEntry`]/[`FlashPlan`] shape so the
//! orchestrator never has to know whether it's driving Firehose, a
//! MediaTek DA, or Unisoc FDL2.
//!
//! The PAC half follows a fixed-header binary parse; the Qualcomm half
//! follows a two-pass validate-then-execute parser over `rawprogram` XML,
//! with an `allow_missing_files` tolerance knob for partial firmware
//! directories.

pub mod mtk_scatter;
pub mod pac;
pub mod qcom;

use std::path::PathBuf;

use crate::error::Result;

/// Case-insensitive name heuristic shared by every parser: any partition
/// matching one of these is flagged protected regardless of what the
/// vendor metadata says.
const PROTECTED_NAME_HEURISTIC: &[&str] = &[
    "nvram",
    "nvdata",
    "nvcfg",
    "protect1",
    "protect2",
    "protect_f",
    "protect_s",
    "persist",
    "persistbk",
    "frp",
    "seccfg",
    "sec1",
    "sec2",
    "secro",
    "seckeyblob",
    "proinfo",
    "efuse",
    "expdb",
    "otp",
    "md_udc",
    "cdt_engineering",
];

pub fn is_protected_by_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    PROTECTED_NAME_HEURISTIC.iter().any(|p| *p == lower)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Emmc,
    Ufs,
    Nand,
}

/// A single partition's read/write/erase description, unified across
/// Qualcomm rawprogram rows, MediaTek scatter entries, and Unisoc PAC TOC
/// records.
#[derive(Debug, Clone)]
pub struct PartitionEntry {
    pub name: String,
    pub lun: u8,
    pub start_sector: u64,
    pub num_sectors: u64,
    pub sector_size: u32,
    pub source_image_path: Option<PathBuf>,
    pub custom_image_path: Option<PathBuf>,
    pub is_selected: bool,
    pub is_protected: bool,
    pub is_sparse: bool,
    /// Set only for PAC-sourced entries: the `(offset, length)` byte range
    /// inside `source_image_path` (the `.pac` container itself, not a
    /// standalone file) where this partition's image bytes live. A PAC
    /// bundles every image as a range within one file rather than as
    /// separate files, so this is required for PAC entries to resolve to
    /// real bytes at all.
    pub pac_range: Option<(u64, u64)>,
}

impl PartitionEntry {
    /// The path execution should actually read from: an explicit override
    /// always wins over the parsed source path.
    pub fn effective_image_path(&self) -> Option<&PathBuf> {
        self.custom_image_path.as_ref().or(self.source_image_path.as_ref())
    }

    pub fn byte_len(&self) -> u64 {
        self.num_sectors * self.sector_size as u64
    }
}

/// What to do with the device once the plan has finished executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootTarget {
    System,
    Bootloader,
    Recovery,
    Fastboot,
    Edl,
    Download,
    PowerOff,
    None,
}

/// Selection policy applied when building a [`FlashPlan`] from parsed
/// entries: `--select all|unprotected|<csv>` on the CLI surface.
#[derive(Debug, Clone)]
pub enum Selection {
    All,
    Unprotected,
    Named(Vec<String>),
}

impl Selection {
    pub fn wants(&self, entry: &PartitionEntry) -> bool {
        match self {
            Selection::All => true,
            Selection::Unprotected => !entry.is_protected,
            Selection::Named(names) => names.iter().any(|n| n == &entry.name),
        }
    }
}

/// Ordered, immutable-once-building-starts list of partition operations
/// plus a post-action. Built by applying a [`Selection`] over parsed
/// entries.
#[derive(Debug, Clone)]
pub struct FlashPlan {
    pub entries: Vec<PartitionEntry>,
    pub reboot_target: RebootTarget,
    pub storage_type: StorageType,
    pub protect_toggle: bool,
}

impl FlashPlan {
    pub fn from_parsed(
        parsed: Vec<PartitionEntry>,
        selection: &Selection,
        storage_type: StorageType,
        reboot_target: RebootTarget,
        protect_toggle: bool,
    ) -> Self {
        let entries = parsed
            .into_iter()
            .map(|mut e| {
                e.is_selected = selection.wants(&e);
                e
            })
            .collect();
        Self { entries, reboot_target, storage_type, protect_toggle }
    }

    pub fn selected(&self) -> impl Iterator<Item = &PartitionEntry> {
        self.entries.iter().filter(|e| e.is_selected)
    }

    pub fn total_selected_bytes(&self) -> u64 {
        self.selected().map(|e| e.byte_len()).sum()
    }
}

/// De-duplicates entries by `(name, lun, start_sector)`, keeping the
/// first occurrence. Needed for multi-segment Qualcomm images where the
/// same logical name can repeat across rows.
pub fn dedup_entries(entries: Vec<PartitionEntry>) -> Vec<PartitionEntry> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for e in entries {
        let key = (e.name.clone(), e.lun, e.start_sector);
        if seen.insert(key) {
            out.push(e);
        }
    }
    out
}

pub trait PlanParser {
    fn parse(&self) -> Result<Vec<PartitionEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_name_heuristic_is_case_insensitive() {
        assert!(is_protected_by_name("PERSIST"));
        assert!(is_protected_by_name("frp"));
        assert!(!is_protected_by_name("boot"));
    }

    #[test]
    fn dedup_keeps_first_occurrence_by_name_lun_sector() {
        let make = |name: &str, start: u64| PartitionEntry {
            name: name.into(),
            lun: 0,
            start_sector: start,
            num_sectors: 10,
            sector_size: 512,
            source_image_path: None,
            custom_image_path: None,
            is_selected: true,
            is_protected: false,
            is_sparse: false,
            pac_range: None,
        };
        let entries = vec![make("boot", 10), make("boot", 10), make("boot", 20)];
        let deduped = dedup_entries(entries);
        assert_eq!(deduped.len(), 2);
    }
}
