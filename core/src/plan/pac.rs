// SPDX-License-Identifier: AGPL-3.0-or-later
//! Derives a [`super::PartitionEntry`] list from a parsed PAC container's
//! table of contents: FDL1/FDL2 entries are cross-checked and excluded
//! from the partition write list, everything else becomes a write
//! addressed by on-device partition name (Unisoc has no LUN/sector
//! geometry exposed in the container itself — FDL2 resolves the name).

use crate::error::{Error, Result};
use crate::framing::pac::{PacEntry, PacHeader, parse_entries, parse_header};
use crate::plan::{PartitionEntry, is_protected_by_name};

pub struct PacPlan {
    pub header: PacHeader,
    pub fdl1: Option<PacEntry>,
    pub fdl2: Option<PacEntry>,
    pub entries: Vec<PartitionEntry>,
}

pub fn parse(pac_path: &std::path::Path) -> Result<PacPlan> {
    let buf = std::fs::read(pac_path).map_err(Error::Io)?;
    let header = parse_header(&buf)?;
    let toc = parse_entries(&buf, &header)?;

    let fdl1 = toc.iter().find(|e| e.is_fdl && e.name.eq_ignore_ascii_case("FDL1")).cloned();
    let fdl2 = toc.iter().find(|e| e.is_fdl && e.name.eq_ignore_ascii_case("FDL2")).cloned();

    let entries = toc
        .iter()
        .filter(|e| e.is_partition)
        .map(|e| PartitionEntry {
            name: e.name.clone(),
            lun: 0,
            start_sector: 0,
            num_sectors: e.length.div_ceil(512),
            sector_size: 512,
            // A PAC bundles every partition image as a byte range inside
            // the container itself, not as a standalone file, so the
            // "source path" execution should read from is the `.pac` path
            // with `pac_range` set, rather than `e.file_name` (which is
            // only the entry's internal display name).
            source_image_path: Some(pac_path.to_path_buf()),
            custom_image_path: None,
            is_selected: false,
            is_protected: is_protected_by_name(&e.name),
            is_sparse: false,
            pac_range: Some((e.offset, e.length)),
        })
        .collect();

    Ok(PacPlan { header, fdl1, fdl2, entries: super::dedup_entries(entries) })
}

/// Keep-NV policy: partitions named `nv*`/`runtime*` are excluded from
/// writes regardless of selection when the flag is set.
pub fn apply_keep_nv(entries: &mut Vec<PartitionEntry>, keep_nv: bool) {
    if !keep_nv {
        return;
    }
    entries.retain(|e| {
        let lower = e.name.to_ascii_lowercase();
        !(lower.starts_with("nv") || lower.starts_with("runtime"))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_nv_filters_nv_and_runtime_prefixed_partitions() {
        let make = |name: &str| PartitionEntry {
            name: name.into(),
            lun: 0,
            start_sector: 0,
            num_sectors: 1,
            sector_size: 512,
            source_image_path: None,
            custom_image_path: None,
            is_selected: true,
            is_protected: false,
            is_sparse: false,
            pac_range: None,
        };
        let mut entries = vec![make("nvitem"), make("runtime_nv"), make("boot")];
        apply_keep_nv(&mut entries, true);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "boot");
    }
}
