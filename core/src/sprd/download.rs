// SPDX-License-Identifier: AGPL-3.0-or-later
//! Download-mode partition I/O, spoken once FDL2 has booted: read, write
//! (with the same start/mid/end push sequence FDL bootstrap uses, just
//! addressed by partition name instead of a RAM address), erase, and the
//! two reboot variants.

use crate::error::{Error, Result};
use crate::orchestrator::CancellationHandle;
use crate::plan::PartitionEntry;
use crate::sprd::bsl::{self, BslCmd, BslRep};
use crate::transport::Transport;

const MID_DATA_CHUNK: usize = 4096;

pub struct DownloadEngine<'t> {
    transport: &'t mut dyn Transport,
}

fn encode_name(name: &str) -> Vec<u8> {
    let mut out = name.as_bytes().to_vec();
    out.push(0);
    out
}

impl<'t> DownloadEngine<'t> {
    pub fn new(transport: &'t mut dyn Transport) -> Self {
        Self { transport }
    }

    /// `CMD_START_DATA(part_name, size)` + a stream of `CMD_MID_DATA`
    /// chunks + `CMD_END_DATA`.
    pub async fn write_partition(&mut self, entry: &PartitionEntry, data: &[u8], cancel: &CancellationHandle) -> Result<()> {
        let mut start_body = encode_name(&entry.name);
        start_body.extend_from_slice(&(data.len() as u64).to_be_bytes());
        bsl::send_expect_ack(self.transport, BslCmd::StartData, &start_body).await?;

        for chunk in data.chunks(MID_DATA_CHUNK) {
            cancel.check()?;
            bsl::send_expect_ack(self.transport, BslCmd::MidData, chunk).await?;
        }

        bsl::send_expect_ack(self.transport, BslCmd::EndData, &[]).await
    }

    /// `CMD_READ_FLASH(part_name, offset, size)`, returning the raw data
    /// phase that follows the device's ack.
    pub async fn read_partition(&mut self, name: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
        let mut body = encode_name(name);
        body.extend_from_slice(&offset.to_be_bytes());
        body.extend_from_slice(&size.to_be_bytes());

        self.transport.write_all(&bsl::encode_packet(BslCmd::ReadFlash, &body)).await?;
        let reply = bsl::read_reply(self.transport).await?;
        match reply.kind {
            BslRep::Data => Ok(reply.body),
            other => Err(Error::proto(format!("CMD_READ_FLASH rejected: {other:?}"))),
        }
    }

    pub async fn erase_partition(&mut self, name: &str) -> Result<()> {
        bsl::send_expect_ack(self.transport, BslCmd::EraseFlash, &encode_name(name)).await
    }

    pub async fn normal_reset(&mut self) -> Result<()> {
        bsl::send_expect_ack(self.transport, BslCmd::NormalReset, &[]).await
    }

    pub async fn power_off(&mut self) -> Result<()> {
        bsl::send_expect_ack(self.transport, BslCmd::PowerOff, &[]).await
    }
}

/// Keep-NV policy applied just before executing the plan: skip any
/// partition whose name matches `nv*`/`runtime*`.
pub fn should_keep_nv_skip(name: &str, keep_nv: bool) -> bool {
    if !keep_nv {
        return false;
    }
    let lower = name.to_ascii_lowercase();
    lower.starts_with("nv") || lower.starts_with("runtime")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_name_is_null_terminated_on_the_wire() {
        let encoded = encode_name("boot_a");
        assert_eq!(encoded.last(), Some(&0u8));
        assert_eq!(&encoded[..encoded.len() - 1], b"boot_a");
    }

    #[test]
    fn keep_nv_skip_matches_nv_and_runtime_prefixes_only_when_enabled() {
        assert!(should_keep_nv_skip("nvitem", true));
        assert!(should_keep_nv_skip("runtime_nv", true));
        assert!(!should_keep_nv_skip("boot", true));
        assert!(!should_keep_nv_skip("nvitem", false));
    }
}
