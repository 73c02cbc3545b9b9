// SPDX-License-Identifier: AGPL-3.0-or-later
//! MediaTek scatter file parsing: legacy TXT v3 (YAML-flavored,
//! line-oriented) and XML v6 (`<roms><rom>` children).
//!
//! A typed parser over a known attribute set, with unknown attributes
//! tolerated rather than rejected — the same posture `qcom.rs` takes for
//! `rawprogram` XML.

use std::path::{Path, PathBuf};

use xmltree::Element;

use crate::error::{Error, Result};
use crate::plan::{PartitionEntry, is_protected_by_name};

const V6_PROTECTED_PARTITIONS: &[&str] =
    &["preloader", "persistent", "sec1", "seccfg", "proinfo", "nvram", "protect1", "protect2"];

#[derive(Debug, Clone)]
pub struct ScatterInfo {
    pub entries: Vec<PartitionEntry>,
    pub is_v6: bool,
    pub skip_partition_table: bool,
    pub storage_type: String,
    pub platform: String,
    pub project: String,
}

pub fn parse(path: &Path) -> Result<ScatterInfo> {
    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    let firmware_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let trimmed = raw.trim_start();
    if trimmed.starts_with('<') {
        parse_xml_v6(&raw, firmware_dir)
    } else {
        parse_txt_v3(&raw, firmware_dir)
    }
}

/// Legacy v3 scatter: a sequence of `- partition_index:` blocks, each with
/// indented `key: value` children. We don't need a YAML parser — the
/// grammar is a strict subset used only by MediaTek's own generator.
fn parse_txt_v3(raw: &str, firmware_dir: &Path) -> Result<ScatterInfo> {
    let mut entries = Vec::new();
    let mut current: Vec<(String, String)> = Vec::new();
    let mut platform = String::new();
    let mut project = String::new();

    let flush = |fields: &[(String, String)], out: &mut Vec<PartitionEntry>| {
        let get = |key: &str| fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

        let Some(name) = get("partition_name") else { return };
        let is_download = get("is_download").map(|v| v == "true").unwrap_or(false);
        if !is_download {
            return;
        }

        let start_sector: u64 =
            get("linear_start_addr").and_then(|v| parse_hex_or_dec(v)).unwrap_or(0);
        let num_sectors: u64 =
            get("partition_size").and_then(|v| parse_hex_or_dec(v)).unwrap_or(0) / 512;
        let file_name = get("file_name").unwrap_or("").to_string();

        out.push(PartitionEntry {
            name: name.to_string(),
            lun: 0,
            start_sector,
            num_sectors,
            sector_size: 512,
            source_image_path: if file_name.is_empty() {
                None
            } else {
                Some(firmware_dir.join(&file_name))
            },
            custom_image_path: None,
            is_selected: false,
            is_protected: is_protected_by_name(name),
            is_sparse: false,
            pac_range: None,
        });
    };

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("- ") {
            if !current.is_empty() {
                flush(&current, &mut entries);
                current.clear();
            }
            if let Some((k, v)) = rest.split_once(':') {
                current.push((k.trim().to_string(), v.trim().to_string()));
            }
            continue;
        }

        if let Some((k, v)) = trimmed.split_once(':') {
            let k = k.trim();
            let v = v.trim().to_string();
            if k == "platform" {
                platform = v.clone();
            } else if k == "project" {
                project = v.clone();
            }
            if !current.is_empty() || trimmed.starts_with(char::is_alphabetic) {
                current.push((k.to_string(), v));
            }
        }
    }
    if !current.is_empty() {
        flush(&current, &mut entries);
    }

    Ok(ScatterInfo {
        entries: super::dedup_entries(entries),
        is_v6: false,
        skip_partition_table: false,
        storage_type: "EMMC".into(),
        platform,
        project,
    })
}

fn parse_hex_or_dec(v: &str) -> Option<u64> {
    let v = v.trim();
    if let Some(hex) = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        v.parse::<u64>().ok()
    }
}

fn attr_ci<'a>(el: &'a Element, key: &str) -> Option<&'a str> {
    el.attributes.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v.as_str())
}

/// XML v6 scatter: `<data>` elements with `<partition>` children carrying
/// `partition_name`, `operation_type`, `is_upgradable`, plus a
/// skip-partition-table flag and protected-partition list.
fn parse_xml_v6(raw: &str, firmware_dir: &Path) -> Result<ScatterInfo> {
    let root = Element::parse(raw.as_bytes())
        .map_err(|e| Error::ImageInvalid(format!("malformed v6 scatter: {e}")))?;

    let mut entries = Vec::new();
    let mut skip_partition_table = false;
    let storage_type = root
        .attributes
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("storage"))
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| "EMMC".into());

    for data_node in root.children.iter().filter_map(|n| n.as_element()) {
        if data_node.name.eq_ignore_ascii_case("option") {
            if let Some(v) = attr_ci(data_node, "skip_partition_table") {
                skip_partition_table = v.eq_ignore_ascii_case("true");
            }
            continue;
        }
        if !data_node.name.eq_ignore_ascii_case("data") {
            continue;
        }

        for part in data_node.children.iter().filter_map(|n| n.as_element()) {
            if !part.name.eq_ignore_ascii_case("partition") {
                continue;
            }

            let Some(name) = attr_ci(part, "partition_name") else { continue };
            let operation_type = attr_ci(part, "operation_type").unwrap_or("");
            if operation_type.eq_ignore_ascii_case("no_download") {
                continue;
            }

            let file_name = attr_ci(part, "file_name").unwrap_or("").to_string();
            let start_sector = attr_ci(part, "linear_start_addr")
                .and_then(parse_hex_or_dec)
                .unwrap_or(0);
            let num_sectors =
                attr_ci(part, "partition_size").and_then(parse_hex_or_dec).unwrap_or(0) / 512;
            let declared_protected = attr_ci(part, "is_protected")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
                || V6_PROTECTED_PARTITIONS.iter().any(|p| p.eq_ignore_ascii_case(name));

            entries.push(PartitionEntry {
                name: name.to_string(),
                lun: 0,
                start_sector,
                num_sectors,
                sector_size: 512,
                source_image_path: if file_name.is_empty() {
                    None
                } else {
                    Some(firmware_dir.join(&file_name))
                },
                custom_image_path: None,
                is_selected: false,
                is_protected: declared_protected || is_protected_by_name(name),
                is_sparse: false,
                pac_range: None,
            });
        }
    }

    Ok(ScatterInfo {
        entries: super::dedup_entries(entries),
        is_v6: true,
        skip_partition_table,
        storage_type,
        platform: String::new(),
        project: String::new(),
    })
}

pub fn load_sibling(path_hint: &Path, suffix: &str) -> Option<PathBuf> {
    let dir = path_hint.parent()?;
    let candidate = dir.join(suffix);
    candidate.exists().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_txt_v3_download_entries() {
        let txt = "\
platform: MT6765
project: demo
- partition_index: SYS0
  partition_name: preloader
  file_name: preloader.bin
  is_download: true
  linear_start_addr: 0x0
  partition_size: 0x40000
- partition_index: SYS1
  partition_name: nvram
  file_name: nvram.bin
  is_download: true
  linear_start_addr: 0x40000
  partition_size: 0x200000
- partition_index: SYS2
  partition_name: logo
  file_name: \"\"
  is_download: false
";
        let dir = std::env::temp_dir().join(format!(
            "mft-scatter-test-{}",
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("MT6765_Android_scatter.txt");
        std::fs::write(&path, txt).unwrap();

        let info = parse(&path).unwrap();
        assert!(!info.is_v6);
        assert_eq!(info.entries.len(), 2);
        assert!(info.entries.iter().any(|e| e.name == "nvram" && e.is_protected));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn parses_xml_v6_protected_partitions() {
        let xml = r#"<?xml version="1.0"?>
        <roms storage="UFS">
          <option skip_partition_table="true"/>
          <data>
            <partition partition_name="boot" file_name="boot.img" operation_type="update" linear_start_addr="0x1000" partition_size="0x10000"/>
            <partition partition_name="seccfg" file_name="seccfg.bin" operation_type="update" linear_start_addr="0x2000" partition_size="0x1000"/>
          </data>
        </roms>"#;
        let dir = std::env::temp_dir().join(format!(
            "mft-scatterxml-test-{}",
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scatter.xml");
        std::fs::write(&path, xml).unwrap();

        let info = parse(&path).unwrap();
        assert!(info.is_v6);
        assert!(info.skip_partition_table);
        assert!(info.entries.iter().any(|e| e.name == "seccfg" && e.is_protected));
        std::fs::remove_dir_all(&dir).ok();
    }
}
