// SPDX-License-Identifier: AGPL-3.0-or-later
//! Super-Meta (`META/super_def.*.json`) discovery: OPLUS-style firmware
//! directories carry a side-table naming which sub-partitions belong to
//! the dynamic `super` partition and where their standalone images live.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct SubPartition {
    pub name: String,
    pub slot: String,
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct SuperMeta {
    pub nv_id: String,
    pub nv_text: Option<String>,
    pub super_meta_path: PathBuf,
    pub sub_partitions: Vec<SubPartition>,
    pub is_supported: bool,
}

#[derive(Debug, Deserialize)]
struct SuperDefFile {
    #[serde(default)]
    sub_partitions: Vec<SubPartition>,
    #[serde(default)]
    nv_text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub nv_id: Option<String>,
    #[serde(default)]
    pub version_name: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub market_name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

/// Reads `version_info.txt` if present, tolerating the `key=value`
/// line format real OPLUS firmware packages use (not strict JSON).
pub async fn read_version_info(firmware_dir: &Path) -> Option<VersionInfo> {
    let path = firmware_dir.join("version_info.txt");
    let raw = tokio::fs::read_to_string(&path).await.ok()?;

    let mut info = VersionInfo::default();
    for line in raw.lines() {
        let Some((key, value)) = line.split_once('=') else { continue };
        let value = value.trim().to_string();
        match key.trim() {
            "nv_id" => info.nv_id = Some(value),
            "version_name" => info.version_name = Some(value),
            "product_name" => info.product_name = Some(value),
            "market_name" => info.market_name = Some(value),
            "platform" => info.platform = Some(value),
            _ => {}
        }
    }
    Some(info)
}

/// Scans `firmware_dir/META` for `super_def.*.json` candidates and picks
/// the one matching `version_info.txt`'s `nv_id`, falling back to the
/// first non-`00000000` candidate.
pub async fn discover(firmware_dir: &Path) -> Result<Option<SuperMeta>> {
    let meta_dir = firmware_dir.join("META");
    let mut entries = match tokio::fs::read_dir(&meta_dir).await {
        Ok(e) => e,
        Err(_) => return Ok(None),
    };

    let mut candidates: Vec<(String, PathBuf)> = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(Error::Io)? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if let Some(rest) = name.strip_prefix("super_def.") {
            if let Some(nv_id) = rest.strip_suffix(".json") {
                candidates.push((nv_id.to_string(), path));
            }
        }
    }

    if candidates.is_empty() {
        return Ok(None);
    }

    let version_info = read_version_info(firmware_dir).await;
    let wanted_nv_id = version_info.as_ref().and_then(|v| v.nv_id.clone());

    let chosen = wanted_nv_id
        .as_ref()
        .and_then(|wanted| candidates.iter().find(|(nv_id, _)| nv_id == wanted))
        .or_else(|| candidates.iter().find(|(nv_id, _)| nv_id != "00000000"))
        .or_else(|| candidates.first())
        .cloned();

    let Some((nv_id, path)) = chosen else { return Ok(None) };

    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| Error::ImageInvalid(format!("{}: {e}", path.display())))?;
    let parsed: SuperDefFile = serde_json::from_str(&raw)
        .map_err(|e| Error::ImageInvalid(format!("{}: malformed super_def JSON: {e}", path.display())))?;

    Ok(Some(SuperMeta {
        nv_id,
        nv_text: parsed.nv_text,
        super_meta_path: path,
        sub_partitions: parsed.sub_partitions,
        is_supported: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn picks_candidate_matching_version_info_nv_id() {
        let dir = std::env::temp_dir().join(format!(
            "mft-supermeta-test-{}",
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        ));
        let meta_dir = dir.join("META");
        tokio::fs::create_dir_all(&meta_dir).await.unwrap();

        tokio::fs::write(dir.join("version_info.txt"), "nv_id=1A2B\nproduct_name=Test\n")
            .await
            .unwrap();
        tokio::fs::write(meta_dir.join("super_def.00000000.json"), r#"{"sub_partitions":[]}"#)
            .await
            .unwrap();
        tokio::fs::write(
            meta_dir.join("super_def.1A2B.json"),
            r#"{"sub_partitions":[{"name":"system","slot":"a","path":"system.img","size":10}]}"#,
        )
        .await
        .unwrap();

        let found = discover(&dir).await.unwrap().unwrap();
        assert_eq!(found.nv_id, "1A2B");
        assert_eq!(found.sub_partitions.len(), 1);
        assert_eq!(found.sub_partitions[0].name, "system");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
