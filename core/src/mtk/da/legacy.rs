// SPDX-License-Identifier: AGPL-3.0-or-later
//! Legacy DA command set: single-byte opcodes, no framing header, the
//! oldest of the three DA variants. Progress is reported in 512-byte
//! checkpoints.

use crate::error::{Error, Result};
use crate::orchestrator::CancellationHandle;
use crate::transport::Transport;

const CHECKPOINT: usize = 512;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyOp {
    Format = 0xD4,
    WritePartition = 0xD7,
    ReadPartition = 0xD6,
    Shutdown = 0xB8,
}

pub struct LegacyDa<'t> {
    transport: &'t mut dyn Transport,
}

impl<'t> LegacyDa<'t> {
    pub fn new(transport: &'t mut dyn Transport) -> Self {
        Self { transport }
    }

    async fn send_opcode(&mut self, op: LegacyOp) -> Result<()> {
        self.transport.write_all(&[op as u8]).await?;
        let mut echoed = [0u8; 1];
        self.transport.read_exact(&mut echoed).await?;
        if echoed[0] != op as u8 {
            return Err(Error::framing("legacy DA did not echo opcode"));
        }
        Ok(())
    }

    async fn read_status(&mut self) -> Result<()> {
        let mut status = [0u8; 2];
        self.transport.read_exact(&mut status).await?;
        let code = u16::from_be_bytes(status);
        if code != 0 {
            return Err(Error::proto(format!("legacy DA rejected, status 0x{code:04X}")));
        }
        Ok(())
    }

    pub async fn format(&mut self, addr: u32, size: u32) -> Result<()> {
        self.send_opcode(LegacyOp::Format).await?;
        self.transport.write_all(&addr.to_be_bytes()).await?;
        self.transport.write_all(&size.to_be_bytes()).await?;
        self.read_status().await
    }

    pub async fn write_partition(
        &mut self,
        addr: u32,
        data: &[u8],
        cancel: &CancellationHandle,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<()> {
        self.send_opcode(LegacyOp::WritePartition).await?;
        self.transport.write_all(&addr.to_be_bytes()).await?;
        self.transport.write_all(&(data.len() as u32).to_be_bytes()).await?;
        self.read_status().await?;

        let mut written = 0usize;
        for chunk in data.chunks(CHECKPOINT) {
            cancel.check()?;
            self.transport.write_all(chunk).await?;
            written += chunk.len();
            progress(written, data.len());
        }
        self.read_status().await
    }

    pub async fn read_partition(
        &mut self,
        addr: u32,
        size: usize,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<Vec<u8>> {
        self.send_opcode(LegacyOp::ReadPartition).await?;
        self.transport.write_all(&addr.to_be_bytes()).await?;
        self.transport.write_all(&(size as u32).to_be_bytes()).await?;
        self.read_status().await?;

        let mut out = vec![0u8; size];
        let mut read = 0usize;
        while read < size {
            let end = (read + CHECKPOINT).min(size);
            self.transport.read_exact(&mut out[read..end]).await?;
            read = end;
            progress(read, size);
        }
        self.read_status().await?;
        Ok(out)
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.send_opcode(LegacyOp::Shutdown).await?;
        self.read_status().await
    }
}
