// SPDX-License-Identifier: AGPL-3.0-or-later
//! Loader-bundle acquisition.
//!
//! A bundle maps a classified device fingerprint to the binaries an engine
//! needs to push before it can do anything else: a Sahara/BROM/FDL1 image,
//! optional VIP digest/sign artefacts, and the auth strategy those
//! artefacts imply. Bundles are resolved once at session construction,
//! never mutated, and dropped when the session ends — nothing here
//! persists across runs except the on-disk cache directory itself.

pub mod cache;
#[cfg(feature = "loader_lookup")]
pub mod remote;

use std::path::PathBuf;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    Standard,
    Vip,
    Xiaomi,
    OnePlus,
    Nothing,
}

impl AuthStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStrategy::Standard => "standard",
            AuthStrategy::Vip => "vip",
            AuthStrategy::Xiaomi => "xiaomi",
            AuthStrategy::OnePlus => "oneplus",
            AuthStrategy::Nothing => "nothing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Some(AuthStrategy::Standard),
            "vip" => Some(AuthStrategy::Vip),
            "xiaomi" => Some(AuthStrategy::Xiaomi),
            "oneplus" => Some(AuthStrategy::OnePlus),
            "nothing" => Some(AuthStrategy::Nothing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Emmc,
    Ufs,
    Nand,
}

/// Everything an engine needs before it can begin the authenticate step.
///
/// Construction-only: once built, a bundle is read-only for the rest of
/// the session.
#[derive(Debug, Clone)]
pub struct LoaderBundle {
    pub loader_path: PathBuf,
    pub digest_path: Option<PathBuf>,
    pub sign_path: Option<PathBuf>,
    pub storage_type: StorageType,
    pub vendor: String,
    pub chip: String,
    pub auth_strategy: AuthStrategy,
}

impl LoaderBundle {
    /// When the caller didn't pin a strategy explicitly: presence of both
    /// digest and sign implies VIP.
    pub fn infer_auth_strategy(digest_path: &Option<PathBuf>, sign_path: &Option<PathBuf>) -> AuthStrategy {
        if digest_path.is_some() && sign_path.is_some() {
            AuthStrategy::Vip
        } else {
            AuthStrategy::Standard
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.loader_path.is_file() {
            return Err(Error::PathNotFound(self.loader_path.clone()));
        }
        if let Some(p) = &self.digest_path {
            if !p.is_file() {
                return Err(Error::PathNotFound(p.clone()));
            }
        }
        if let Some(p) = &self.sign_path {
            if !p.is_file() {
                return Err(Error::PathNotFound(p.clone()));
            }
        }
        Ok(())
    }
}

/// Resolves loader bundles from some backing store (local cache dir,
/// HTTPS lookup, or a caller's own manifest).
pub trait LoaderResolver {
    fn resolve(
        &self,
        vendor: &str,
        chip: &str,
        storage_type: StorageType,
        auth_strategy: Option<AuthStrategy>,
    ) -> Result<LoaderBundle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_vip_only_when_both_artefacts_present() {
        assert_eq!(
            LoaderBundle::infer_auth_strategy(&Some("d".into()), &Some("s".into())),
            AuthStrategy::Vip
        );
        assert_eq!(LoaderBundle::infer_auth_strategy(&Some("d".into()), &None), AuthStrategy::Standard);
        assert_eq!(LoaderBundle::infer_auth_strategy(&None, &None), AuthStrategy::Standard);
    }

    #[test]
    fn auth_strategy_round_trips_through_string() {
        for s in ["standard", "vip", "xiaomi", "oneplus", "nothing"] {
            assert_eq!(AuthStrategy::parse(s).unwrap().as_str(), s);
        }
        assert!(AuthStrategy::parse("bogus").is_none());
    }
}
