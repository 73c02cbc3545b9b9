// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTPS loader-bundle lookup, gated behind the `loader_lookup` feature
//! so the default build stays offline-only.
//!
//! The server contract is a single `GET <base>/<vendor>/<chip>` returning
//! a JSON manifest naming the bundle's artefact URLs; artefacts are then
//! fetched and written into a [`super::cache::LocalCacheResolver`] so
//! later lookups hit disk instead of re-fetching per call.

use serde::Deserialize;

use super::cache::LocalCacheResolver;
use super::{AuthStrategy, LoaderBundle, StorageType};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct Manifest {
    loader_url: String,
    #[serde(default)]
    digest_url: Option<String>,
    #[serde(default)]
    sign_url: Option<String>,
    #[serde(default)]
    auth_strategy: Option<String>,
}

pub struct RemoteLookup {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteLookup {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client: reqwest::Client::new() }
    }

    /// Fetches the manifest for `(vendor, chip)`, downloads its artefacts,
    /// and stores them in `cache` keyed by `(vendor, chip, storage_type,
    /// auth_strategy)` so the resolved bundle can be reused offline.
    pub async fn fetch(
        &self,
        cache: &LocalCacheResolver,
        vendor: &str,
        chip: &str,
        storage_type: StorageType,
    ) -> Result<LoaderBundle> {
        let url = format!("{}/{vendor}/{chip}", self.base_url.trim_end_matches('/'));
        let manifest: Manifest = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("loader lookup request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Internal(format!("loader lookup rejected: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Internal(format!("malformed loader manifest: {e}")))?;

        let auth = manifest
            .auth_strategy
            .as_deref()
            .and_then(AuthStrategy::parse)
            .unwrap_or(AuthStrategy::Standard);

        let tmp_dir = std::env::temp_dir().join(format!("mft-loader-fetch-{vendor}-{chip}"));
        tokio::fs::create_dir_all(&tmp_dir).await.map_err(Error::Io)?;

        let loader_path = self.download(&tmp_dir, "loader.bin", &manifest.loader_url).await?;
        let digest_path = match &manifest.digest_url {
            Some(u) => Some(self.download(&tmp_dir, "digest.bin", u).await?),
            None => None,
        };
        let sign_path = match &manifest.sign_url {
            Some(u) => Some(self.download(&tmp_dir, "sign.bin", u).await?),
            None => None,
        };

        let bundle = cache.store(
            vendor,
            chip,
            storage_type,
            auth,
            &loader_path,
            digest_path.as_deref(),
            sign_path.as_deref(),
        )?;

        tokio::fs::remove_dir_all(&tmp_dir).await.ok();
        Ok(bundle)
    }

    async fn download(&self, dir: &std::path::Path, name: &str, url: &str) -> Result<std::path::PathBuf> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("fetching {url}: {e}")))?
            .bytes()
            .await
            .map_err(|e| Error::Internal(format!("reading {url}: {e}")))?;
        let path = dir.join(name);
        tokio::fs::write(&path, &bytes).await.map_err(Error::Io)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_without_auth_strategy_defaults_to_standard() {
        let raw = r#"{"loader_url":"https://example.invalid/loader.bin"}"#;
        let m: Manifest = serde_json::from_str(raw).unwrap();
        let auth = m.auth_strategy.as_deref().and_then(AuthStrategy::parse).unwrap_or(AuthStrategy::Standard);
        assert_eq!(auth, AuthStrategy::Standard);
    }
}
