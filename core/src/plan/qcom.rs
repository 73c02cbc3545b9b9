// SPDX-License-Identifier: AGPL-3.0-or-later
//! Qualcomm `rawprogram*.xml` + `patch*.xml` parsing.
//!
//! Adapted from `qualcomm-qdlrs/cli/src/programfile.rs`'s attribute set
//! and tolerance knobs (`allow_missing_files`), generalized to produce
//! [`super::PartitionEntry`] rows instead of driving the Firehose channel
//! directly — that's `crate::edl::firehose`'s job here.

use std::path::{Path, PathBuf};

use xmltree::Element;

use crate::error::{Error, Result};
use crate::plan::{PartitionEntry, StorageType, is_protected_by_name};

const SKIPPED_LABELS: &[&str] = &["PrimaryGPT", "BackupGPT", "last_parti"];

#[derive(Debug, Clone)]
pub struct PatchEntry {
    pub filename: String,
    pub byte_offset: u64,
    pub physical_partition_number: u8,
    pub size_in_bytes: u64,
    pub start_sector: String,
    pub value: String,
}

fn attr_ci<'a>(el: &'a Element, key: &str) -> Option<&'a str> {
    el.attributes.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v.as_str())
}

/// Firmware directories may carry `rawprogram<N>.xml`, a Lenovo
/// "unsparse" variant, and a "save-persist unsparse" variant. Standard
/// `unsparse` wins when both exist; `prefer_save_persist` inverts that.
pub fn discover_rawprogram_files(dir: &Path, prefer_save_persist: bool) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(Error::Io)?;
    let mut standard = Vec::new();
    let mut unsparse = Vec::new();
    let mut save_persist_unsparse = Vec::new();

    for entry in entries {
        let entry = entry.map_err(Error::Io)?;
        let name = entry.file_name().to_string_lossy().to_string();
        let lower = name.to_ascii_lowercase();
        if !lower.ends_with(".xml") || !lower.contains("rawprogram") {
            continue;
        }
        if lower.contains("save_persist_unsparse") {
            save_persist_unsparse.push(entry.path());
        } else if lower.contains("unsparse") {
            unsparse.push(entry.path());
        } else {
            standard.push(entry.path());
        }
    }

    let chosen = if prefer_save_persist && !save_persist_unsparse.is_empty() {
        save_persist_unsparse
    } else if !unsparse.is_empty() {
        unsparse
    } else if !save_persist_unsparse.is_empty() {
        save_persist_unsparse
    } else {
        standard
    };

    let mut chosen = chosen;
    chosen.sort();
    Ok(chosen)
}

pub fn discover_patch_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(Error::Io)?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(Error::Io)?;
        let name = entry.file_name().to_string_lossy().to_string();
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".xml") && lower.contains("patch") {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

fn parse_u64_attr(el: &Element, key: &str) -> Option<u64> {
    attr_ci(el, key).and_then(|v| v.trim().parse::<u64>().ok())
}

/// `start_sector` is sometimes a literal integer, sometimes an expression
/// like `NUM_DISK_SECTORS-33` referring to the device's total sector
/// count, which this crate cannot resolve offline — such rows are
/// reported but never auto-selected for write.
fn is_dynamic_start_sector(raw: &str) -> bool {
    raw.contains("NUM_DISK_SECTORS")
}

pub fn parse_rawprogram(paths: &[PathBuf], firmware_dir: &Path) -> Result<Vec<PartitionEntry>> {
    let mut out = Vec::new();

    for path in paths {
        let data = std::fs::read_to_string(path).map_err(Error::Io)?;
        let root = Element::parse(data.as_bytes())
            .map_err(|e| Error::ImageInvalid(format!("{}: {e}", path.display())))?;

        for node in &root.children {
            let Some(el) = node.as_element() else { continue };
            if !el.name.eq_ignore_ascii_case("program") {
                continue;
            }

            let label = attr_ci(el, "label").unwrap_or("").to_string();
            if SKIPPED_LABELS.iter().any(|s| s.eq_ignore_ascii_case(&label)) {
                continue;
            }

            let start_sector_raw = attr_ci(el, "start_sector").unwrap_or("0").to_string();
            if is_dynamic_start_sector(&start_sector_raw) {
                continue;
            }
            let start_sector: u64 = start_sector_raw.trim().parse().unwrap_or(0);

            let sector_size =
                parse_u64_attr(el, "SECTOR_SIZE_IN_BYTES").unwrap_or(512) as u32;
            let lun = parse_u64_attr(el, "physical_partition_number").unwrap_or(0) as u8;

            let num_sectors = match parse_u64_attr(el, "num_partition_sectors") {
                Some(n) if n > 0 => n,
                _ => {
                    let size_kb = parse_u64_attr(el, "size_in_KB").unwrap_or(0);
                    (size_kb * 1024).div_ceil(sector_size as u64)
                }
            };

            let filename = attr_ci(el, "filename").unwrap_or("").to_string();
            let source_image_path = if filename.is_empty() {
                None
            } else {
                Some(firmware_dir.join(&filename))
            };

            let is_protected = is_protected_by_name(&label);

            out.push(PartitionEntry {
                name: label,
                lun,
                start_sector,
                num_sectors,
                sector_size,
                source_image_path,
                custom_image_path: None,
                is_selected: false,
                is_protected,
                is_sparse: false,
                pac_range: None,
            });
        }
    }

    Ok(super::dedup_entries(out))
}

pub fn parse_patches(paths: &[PathBuf]) -> Result<Vec<PatchEntry>> {
    let mut out = Vec::new();
    for path in paths {
        let data = std::fs::read_to_string(path).map_err(Error::Io)?;
        let root = Element::parse(data.as_bytes())
            .map_err(|e| Error::ImageInvalid(format!("{}: {e}", path.display())))?;

        for node in &root.children {
            let Some(el) = node.as_element() else { continue };
            if !el.name.eq_ignore_ascii_case("patch") {
                continue;
            }

            let Some(filename) = attr_ci(el, "filename") else { continue };
            if filename != "DISK" {
                continue;
            }

            out.push(PatchEntry {
                filename: filename.to_string(),
                byte_offset: parse_u64_attr(el, "byte_offset").unwrap_or(0),
                physical_partition_number: parse_u64_attr(el, "physical_partition_number")
                    .unwrap_or(0) as u8,
                size_in_bytes: parse_u64_attr(el, "size_in_bytes").unwrap_or(0),
                start_sector: attr_ci(el, "start_sector").unwrap_or("0").to_string(),
                value: attr_ci(el, "value").unwrap_or("0").to_string(),
            });
        }
    }
    Ok(out)
}

/// Detects the on-disk storage type from a scatter/rawprogram directory's
/// naming convention (`emmc`/`ufs` appear in the file name on most OEM
/// exports); falls back to EMMC when ambiguous.
pub fn detect_storage_type(paths: &[PathBuf]) -> StorageType {
    for path in paths {
        let lower = path.to_string_lossy().to_ascii_lowercase();
        if lower.contains("ufs") {
            return StorageType::Ufs;
        }
    }
    StorageType::Emmc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "mft-qcom-test-{}",
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn skips_gpt_rows_and_dynamic_start_sector() {
        let xml = r#"<?xml version="1.0"?>
        <data>
          <program label="PrimaryGPT" filename="" physical_partition_number="0" start_sector="0" num_partition_sectors="6" SECTOR_SIZE_IN_BYTES="4096"/>
          <program label="boot" filename="boot.img" physical_partition_number="0" start_sector="8192" num_partition_sectors="131072" SECTOR_SIZE_IN_BYTES="4096"/>
          <program label="userdata" filename="userdata.img" physical_partition_number="0" start_sector="NUM_DISK_SECTORS-33." num_partition_sectors="2000000" SECTOR_SIZE_IN_BYTES="4096"/>
        </data>"#;
        let (dir, path) = write_temp("rawprogram0.xml", xml);
        let entries = parse_rawprogram(&[path], &dir).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "boot");
        assert_eq!(entries[0].num_sectors, 131072);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn derives_num_sectors_from_size_in_kb_when_missing() {
        let xml = r#"<?xml version="1.0"?>
        <data>
          <program label="modem" filename="modem.img" physical_partition_number="0" start_sector="100" size_in_KB="64" SECTOR_SIZE_IN_BYTES="512"/>
        </data>"#;
        let (dir, path) = write_temp("rawprogram1.xml", xml);
        let entries = parse_rawprogram(&[path], &dir).unwrap();
        assert_eq!(entries[0].num_sectors, 64 * 1024 / 512);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unsparse_variant_takes_precedence_over_standard() {
        let dir = std::env::temp_dir().join(format!(
            "mft-qcom-prec-{}",
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("rawprogram0.xml"), "<data/>").unwrap();
        std::fs::write(dir.join("rawprogram_unsparse0.xml"), "<data/>").unwrap();
        let chosen = discover_rawprogram_files(&dir, false).unwrap();
        assert_eq!(chosen.len(), 1);
        assert!(chosen[0].to_string_lossy().contains("unsparse"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
