// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fastboot command engine: `getvar`/`download`/`flash`/`erase`/`reboot`
//! plus the dynamic (super) partition management commands, driven over
//! any [`Transport`] speaking the ASCII command/response grammar in
//! [`crate::framing::fastboot`].

use crate::error::{Error, Result};
use crate::framing::fastboot::{self, Reply};
use crate::orchestrator::CancellationHandle;
use crate::transport::Transport;

/// `download:` transfers are chunked to this size; large images (super.img)
/// are downloaded in several rounds rather than one giant transfer, mirroring
/// how real `fastboot` caps a single download against the device's buffer.
const MAX_DOWNLOAD_CHUNK: usize = 512 * 1024 * 1024;
const READ_CHUNK: usize = 16 * 1024;

pub struct FastbootEngine<'t> {
    transport: &'t mut dyn Transport,
}

/// Callback invoked with cumulative bytes transferred, for progress UIs.
pub type ProgressFn<'a> = dyn FnMut(u64, u64) + Send + 'a;

impl<'t> FastbootEngine<'t> {
    pub fn new(transport: &'t mut dyn Transport) -> Self {
        Self { transport }
    }

    async fn send(&mut self, cmd: Vec<u8>) -> Result<Reply> {
        self.transport.write_all(&cmd).await?;
        self.recv_reply().await
    }

    async fn recv_reply(&mut self) -> Result<Reply> {
        let mut buf = [0u8; fastboot::MAX_REPLY_LEN];
        let n = self.transport.read_some(&mut buf).await?;
        if n == 0 {
            return Err(Error::DeviceLost);
        }
        Ok(fastboot::parse_reply(&buf[..n]))
    }

    fn reply_to_unit(reply: Reply, context: &str) -> Result<()> {
        match reply {
            Reply::Okay(_) => Ok(()),
            Reply::Fail(msg) => Err(Error::ProtocolReject(format!("{context}: {msg}"))),
            other => Err(Error::proto(format!("{context}: unexpected reply {other:?}"))),
        }
    }

    pub async fn getvar(&mut self, var: &str) -> Result<String> {
        let reply = self.send(fastboot::getvar_command(var)?).await?;
        match reply {
            Reply::Okay(value) => Ok(value),
            Reply::Fail(msg) => Err(Error::ProtocolReject(format!("getvar {var}: {msg}"))),
            other => Err(Error::proto(format!("getvar {var}: unexpected reply {other:?}"))),
        }
    }

    /// Downloads `data` into the device's transfer buffer, splitting into
    /// `MAX_DOWNLOAD_CHUNK`-sized rounds when needed. Each round is its own
    /// `download:` + raw data phase.
    pub async fn download(
        &mut self,
        data: &[u8],
        cancel: &CancellationHandle,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<()> {
        for chunk in data.chunks(MAX_DOWNLOAD_CHUNK) {
            cancel.check()?;
            let reply = self.send(fastboot::download_command(chunk.len())?).await?;
            let expected = match reply {
                Reply::Data(size) if size == chunk.len() => size,
                Reply::Data(size) => {
                    return Err(Error::proto(format!(
                        "device advertised DATA size {size}, expected {}",
                        chunk.len()
                    )));
                }
                Reply::Fail(msg) => return Err(Error::ProtocolReject(format!("download: {msg}"))),
                other => return Err(Error::proto(format!("download: unexpected reply {other:?}"))),
            };

            let mut sent = 0usize;
            for piece in chunk.chunks(READ_CHUNK) {
                cancel.check()?;
                self.transport.write_all(piece).await?;
                sent += piece.len();
                if let Some(cb) = progress.as_deref_mut() {
                    cb(sent as u64, expected as u64);
                }
            }

            let reply = self.recv_reply().await?;
            Self::reply_to_unit(reply, "download")?;
        }
        Ok(())
    }

    pub async fn flash(&mut self, partition: &str) -> Result<()> {
        let reply = self.send(fastboot::flash_command(partition)?).await?;
        Self::reply_to_unit(reply, &format!("flash {partition}"))
    }

    pub async fn erase(&mut self, partition: &str) -> Result<()> {
        let reply = self.send(fastboot::erase_command(partition)?).await?;
        Self::reply_to_unit(reply, &format!("erase {partition}"))
    }

    pub async fn set_active(&mut self, slot: &str) -> Result<()> {
        let reply = self.send(fastboot::set_active_command(slot)?).await?;
        Self::reply_to_unit(reply, &format!("set_active {slot}"))
    }

    pub async fn create_logical_partition(&mut self, name: &str, size: u64) -> Result<()> {
        let reply = self.send(fastboot::create_logical_partition_command(name, size)?).await?;
        Self::reply_to_unit(reply, &format!("create-logical-partition {name}"))
    }

    pub async fn resize_logical_partition(&mut self, name: &str, size: u64) -> Result<()> {
        let reply = self.send(fastboot::resize_logical_partition_command(name, size)?).await?;
        Self::reply_to_unit(reply, &format!("resize-logical-partition {name}"))
    }

    pub async fn delete_logical_partition(&mut self, name: &str) -> Result<()> {
        let reply = self.send(fastboot::delete_logical_partition_command(name)?).await?;
        Self::reply_to_unit(reply, &format!("delete-logical-partition {name}"))
    }

    pub async fn is_logical(&mut self, name: &str) -> Result<bool> {
        match self.send(fastboot::is_logical_command(name)?).await? {
            Reply::Okay(value) => Ok(value.trim() == "yes"),
            Reply::Fail(_) => Ok(false),
            other => Err(Error::proto(format!("is-logical {name}: unexpected reply {other:?}"))),
        }
    }

    pub async fn reboot(&mut self) -> Result<()> {
        let reply = self.send(fastboot::encode_command("reboot")?).await?;
        Self::reply_to_unit(reply, "reboot")
    }

    pub async fn reboot_bootloader(&mut self) -> Result<()> {
        let reply = self.send(fastboot::encode_command("reboot-bootloader")?).await?;
        Self::reply_to_unit(reply, "reboot-bootloader")
    }

    pub async fn reboot_fastboot(&mut self) -> Result<()> {
        let reply = self.send(fastboot::encode_command("reboot-fastboot")?).await?;
        Self::reply_to_unit(reply, "reboot-fastboot")
    }

    pub async fn continue_boot(&mut self) -> Result<()> {
        let reply = self.send(fastboot::encode_command("continue")?).await?;
        Self::reply_to_unit(reply, "continue")
    }

    /// `is-userspace` tells the caller whether the bootloader is running
    /// userspace fastbootd (dynamic partitions) rather than bootloader
    /// fastboot, which gates whether logical-partition commands apply.
    pub async fn is_userspace(&mut self) -> Result<bool> {
        match self.getvar("is-userspace").await {
            Ok(value) => Ok(value.trim().eq_ignore_ascii_case("yes")),
            Err(Error::ProtocolReject(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_to_unit_maps_fail_to_protocol_reject() {
        let err = FastbootEngine::reply_to_unit(Reply::Fail("bad slot".into()), "set_active a").unwrap_err();
        assert!(matches!(err, Error::ProtocolReject(_)));
    }

    #[test]
    fn reply_to_unit_accepts_okay() {
        assert!(FastbootEngine::reply_to_unit(Reply::Okay(String::new()), "flash boot").is_ok());
    }
}
