// SPDX-License-Identifier: AGPL-3.0-or-later
//! OEM configuration-partition data plug-point.
//!
//! The proprietary generation algorithm is not public and this crate
//! does not guess it. [`NullOcdt`] is the default implementation and
//! always reports [`crate::Error::NotImplemented`].

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::plan::PartitionEntry;

#[async_trait]
pub trait OcdtService: Send + Sync {
    async fn backup_ocdt(&self, partitions: &[PartitionEntry]) -> Result<Option<Vec<u8>>>;
    async fn repair_ocdt(&self, partitions: &[PartitionEntry], project_id: Option<&str>) -> Result<()>;
}

/// Default no-op implementation: absence of a real OCDT service means
/// the feature is disabled, not an error condition callers need to guard
/// against separately.
pub struct NullOcdt;

#[async_trait]
impl OcdtService for NullOcdt {
    async fn backup_ocdt(&self, _partitions: &[PartitionEntry]) -> Result<Option<Vec<u8>>> {
        Err(Error::NotImplemented("OCDT backup"))
    }

    async fn repair_ocdt(&self, _partitions: &[PartitionEntry], _project_id: Option<&str>) -> Result<()> {
        Err(Error::NotImplemented("OCDT repair"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_service_reports_not_implemented() {
        let svc = NullOcdt;
        let err = svc.backup_ocdt(&[]).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::NotImplemented);
    }
}
