// SPDX-License-Identifier: AGPL-3.0-or-later
//! Exploit hooks: capability-gated by the chip profile's
//! `kamakiri`/`kamakiri2`/`cqdma`/`gcpu` flags. The core only specifies
//! the interface — per-chip payloads are supplied out-of-band by the
//! caller; nothing else depends on a given exploit succeeding.
//!
//! `try_unlock` treats its exploit stage as an optional, fallible
//! pre-step ahead of the normal DA upload rather than a hard dependency:
//! attempt each applicable hook in turn, continue regardless of whether
//! any of them actually unlocked the device.

use async_trait::async_trait;

use crate::error::Result;
use crate::mtk::chip::ChipProfile;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked,
    NotSupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockResult {
    Unlocked,
    NotSupported,
    Failed(String),
}

/// Implemented by whoever supplies the chip-specific register-write /
/// payload-staging sequence for a given exploit; `mft-core` ships no
/// concrete implementation, only this trait and the feature-flag gate
/// (`no_exploits`) that disables the call sites entirely.
#[async_trait]
pub trait ExploitHook: Send + Sync {
    fn name(&self) -> &'static str;
    fn applies_to(&self, profile: &ChipProfile) -> bool;
    async fn run(&self, transport: &mut dyn Transport, profile: &ChipProfile) -> Result<UnlockOutcome>;
}

/// Runs every registered hook that `applies_to` the profile, in order,
/// stopping at the first one that reports [`UnlockOutcome::Unlocked`].
pub async fn try_unlock(
    hooks: &[Box<dyn ExploitHook>],
    transport: &mut dyn Transport,
    profile: &ChipProfile,
) -> UnlockResult {
    for hook in hooks {
        if !hook.applies_to(profile) {
            continue;
        }
        match hook.run(transport, profile).await {
            Ok(UnlockOutcome::Unlocked) => return UnlockResult::Unlocked,
            Ok(UnlockOutcome::NotSupported) => continue,
            Err(e) => return UnlockResult::Failed(format!("{}: {e}", hook.name())),
        }
    }
    UnlockResult::NotSupported
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtk::chip::{DaMode, ExploitSupport};

    struct AlwaysUnsupported;

    #[async_trait]
    impl ExploitHook for AlwaysUnsupported {
        fn name(&self) -> &'static str {
            "always-unsupported"
        }
        fn applies_to(&self, _profile: &ChipProfile) -> bool {
            false
        }
        async fn run(&self, _t: &mut dyn Transport, _p: &ChipProfile) -> Result<UnlockOutcome> {
            Ok(UnlockOutcome::Unlocked)
        }
    }

    fn test_profile() -> ChipProfile {
        ChipProfile {
            hw_code: 0,
            name: "test",
            watchdog_addr: 0,
            uart_addr: 0,
            brom_payload_addr: 0,
            da_payload_addr: 0,
            cqdma_base: None,
            gcpu_base: None,
            sej_base: None,
            dxcc_base: None,
            efuse_base: None,
            meid_addr: None,
            socid_addr: None,
            var1_byte: 0,
            da_mode: DaMode::XFlash,
            exploits: ExploitSupport::default(),
        }
    }

    #[tokio::test]
    async fn no_applicable_hooks_reports_not_supported() {
        let hooks: Vec<Box<dyn ExploitHook>> = vec![Box::new(AlwaysUnsupported)];
        struct NullTransport;
        #[async_trait]
        impl Transport for NullTransport {
            async fn open(&mut self) -> Result<()> {
                Ok(())
            }
            async fn close(&mut self) -> Result<()> {
                Ok(())
            }
            async fn read_exact(&mut self, _buf: &mut [u8]) -> Result<()> {
                Ok(())
            }
            async fn read_some(&mut self, _buf: &mut [u8]) -> Result<usize> {
                Ok(0)
            }
            async fn write_all(&mut self, _buf: &[u8]) -> Result<()> {
                Ok(())
            }
            async fn flush(&mut self) -> Result<()> {
                Ok(())
            }
            async fn control_out(&mut self, _: u8, _: u8, _: u16, _: u16, _: &[u8]) -> Result<()> {
                Ok(())
            }
            async fn control_in(&mut self, _: u8, _: u8, _: u16, _: u16, _: usize) -> Result<Vec<u8>> {
                Ok(Vec::new())
            }
            fn descriptor(&self) -> crate::transport::PortDescriptor {
                crate::transport::PortDescriptor::Serial { path: "test".into() }
            }
        }
        let mut transport = NullTransport;
        let result = try_unlock(&hooks, &mut transport, &test_profile()).await;
        assert_eq!(result, UnlockResult::NotSupported);
    }
}
