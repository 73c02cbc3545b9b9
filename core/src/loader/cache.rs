// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local filesystem loader cache, rooted at `MFT_LOADER_CACHE_DIR`
//! (default `~/.cache/mft/loaders` when unset).
//!
//! Layout: `<root>/<vendor>/<chip>/<storage>/<auth_strategy>/` holding
//! `loader.bin` and, for strategies that need them, `digest.bin` and
//! `sign.bin`. Reads are lock-free; the cache is read-mostly and writes
//! (`store`) are the caller's responsibility to serialise externally.

use std::path::{Path, PathBuf};

use super::{AuthStrategy, LoaderBundle, LoaderResolver, StorageType};
use crate::error::{Error, Result};

pub const ENV_CACHE_DIR: &str = "MFT_LOADER_CACHE_DIR";

pub struct LocalCacheResolver {
    root: PathBuf,
}

impl LocalCacheResolver {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Reads `MFT_LOADER_CACHE_DIR`, falling back to a dot-cache default.
    pub fn from_env() -> Self {
        let root = std::env::var(ENV_CACHE_DIR).map(PathBuf::from).unwrap_or_else(|_| {
            dirs_home().join(".cache").join("mft").join("loaders")
        });
        Self::new(root)
    }

    fn bundle_dir(&self, vendor: &str, chip: &str, storage_type: StorageType, auth: AuthStrategy) -> PathBuf {
        self.root
            .join(vendor.to_ascii_lowercase())
            .join(chip.to_ascii_lowercase())
            .join(storage_dir_name(storage_type))
            .join(auth.as_str())
    }

    /// Copies `loader`/`digest`/`sign` into the cache directory for this
    /// key, overwriting any existing bundle. Callers are responsible for
    /// not racing two refreshes of the same key.
    pub fn store(
        &self,
        vendor: &str,
        chip: &str,
        storage_type: StorageType,
        auth: AuthStrategy,
        loader: &Path,
        digest: Option<&Path>,
        sign: Option<&Path>,
    ) -> Result<LoaderBundle> {
        let dir = self.bundle_dir(vendor, chip, storage_type, auth);
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let loader_path = dir.join("loader.bin");
        std::fs::copy(loader, &loader_path).map_err(Error::Io)?;

        let digest_path = match digest {
            Some(p) => {
                let dst = dir.join("digest.bin");
                std::fs::copy(p, &dst).map_err(Error::Io)?;
                Some(dst)
            }
            None => None,
        };
        let sign_path = match sign {
            Some(p) => {
                let dst = dir.join("sign.bin");
                std::fs::copy(p, &dst).map_err(Error::Io)?;
                Some(dst)
            }
            None => None,
        };

        Ok(LoaderBundle {
            loader_path,
            digest_path,
            sign_path,
            storage_type,
            vendor: vendor.to_string(),
            chip: chip.to_string(),
            auth_strategy: auth,
        })
    }
}

impl LoaderResolver for LocalCacheResolver {
    fn resolve(
        &self,
        vendor: &str,
        chip: &str,
        storage_type: StorageType,
        auth_strategy: Option<AuthStrategy>,
    ) -> Result<LoaderBundle> {
        let candidates = match auth_strategy {
            Some(a) => vec![a],
            None => vec![
                AuthStrategy::Standard,
                AuthStrategy::Vip,
                AuthStrategy::Xiaomi,
                AuthStrategy::OnePlus,
                AuthStrategy::Nothing,
            ],
        };

        for auth in candidates {
            let dir = self.bundle_dir(vendor, chip, storage_type, auth);
            let loader_path = dir.join("loader.bin");
            if !loader_path.is_file() {
                continue;
            }
            let digest_path = Some(dir.join("digest.bin")).filter(|p| p.is_file());
            let sign_path = Some(dir.join("sign.bin")).filter(|p| p.is_file());
            return Ok(LoaderBundle {
                loader_path,
                digest_path,
                sign_path,
                storage_type,
                vendor: vendor.to_string(),
                chip: chip.to_string(),
                auth_strategy: auth,
            });
        }

        Err(Error::PathNotFound(self.bundle_dir(vendor, chip, storage_type, AuthStrategy::Standard)))
    }
}

fn storage_dir_name(t: StorageType) -> &'static str {
    match t {
        StorageType::Emmc => "emmc",
        StorageType::Ufs => "ufs",
        StorageType::Nand => "nand",
    }
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!(
            "mft-loadercache-test-{}",
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        ))
    }

    #[test]
    fn stores_then_resolves_a_bundle_round_trip() {
        let root = temp_root();
        let src_dir = root.join("src");
        std::fs::create_dir_all(&src_dir).unwrap();
        let loader = src_dir.join("da.bin");
        std::fs::write(&loader, b"loader-bytes").unwrap();

        let cache = LocalCacheResolver::new(root.join("cache"));
        cache.store("mtk", "mt6765", StorageType::Emmc, AuthStrategy::Standard, &loader, None, None).unwrap();

        let bundle = cache.resolve("mtk", "mt6765", StorageType::Emmc, None).unwrap();
        assert_eq!(bundle.auth_strategy, AuthStrategy::Standard);
        assert!(bundle.loader_path.is_file());
        assert!(bundle.digest_path.is_none());

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn resolve_without_cached_bundle_reports_path_not_found() {
        let cache = LocalCacheResolver::new(temp_root());
        let err = cache.resolve("qcom", "sm8250", StorageType::Ufs, Some(AuthStrategy::Vip)).unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Internal);
    }
}
