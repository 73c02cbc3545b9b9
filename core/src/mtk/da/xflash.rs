// SPDX-License-Identifier: AGPL-3.0-or-later
//! XFlash DA wire protocol: a 12-byte header (`magic=0xFEEEEEEF`,
//! data-type, length) in front of every frame, commands as little-endian
//! `u32` opcodes, flash writes chunked with an additive 16-bit checksum
//! ahead of each chunk.
//!
//! A `GetPacketLength` round trip negotiates the chunk size before the
//! first streamed write; each chunk is preceded by its checksum as a
//! zero-padded `u32` rather than appended after the data.

use crate::error::{Error, Result};
use crate::orchestrator::CancellationHandle;
use crate::transport::Transport;

const MAGIC: u32 = 0xFEEE_EEEF;
const DT_PROTOCOL_FLOW: u32 = 1;
const SYNC_SIGNAL: u32 = 0x434E_5953;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XFlashCmd {
    Download = 0x01_0001,
    Upload = 0x01_0002,
    Format = 0x01_0003,
    WriteData = 0x01_0004,
    ReadData = 0x01_0005,
    BootTo = 0x01_0008,
    SetupEnvironment = 0x01_0100,
    SetupHwInitParams = 0x01_0101,
    GetEmmcInfo = 0x04_0001,
    GetUfsInfo = 0x04_0004,
    GetPacketLength = 0x04_0007,
    DeviceCtrl = 0x01_0009,
}

pub struct XFlashDa<'t> {
    transport: &'t mut dyn Transport,
    write_packet_len: Option<usize>,
}

impl<'t> XFlashDa<'t> {
    pub fn new(transport: &'t mut dyn Transport) -> Self {
        Self { transport, write_packet_len: None }
    }

    fn header(len: usize) -> [u8; 12] {
        let mut hdr = [0u8; 12];
        hdr[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        hdr[4..8].copy_from_slice(&DT_PROTOCOL_FLOW.to_le_bytes());
        hdr[8..12].copy_from_slice(&(len as u32).to_le_bytes());
        hdr
    }

    async fn send_frame(&mut self, data: &[u8]) -> Result<()> {
        let hdr = Self::header(data.len());
        self.transport.write_all(&hdr).await?;
        self.transport.write_all(data).await
    }

    async fn send_cmd(&mut self, cmd: XFlashCmd) -> Result<()> {
        self.send_frame(&(cmd as u32).to_le_bytes()).await
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut hdr = [0u8; 12];
        self.transport.read_exact(&mut hdr).await?;
        let magic = u32::from_le_bytes(hdr[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::framing("XFlash frame has wrong magic"));
        }
        let len = u32::from_le_bytes(hdr[8..12].try_into().unwrap()) as usize;
        let mut data = vec![0u8; len];
        self.transport.read_exact(&mut data).await?;
        Ok(data)
    }

    /// Reads a status frame: 2 or 4 byte payloads are a status code,
    /// `SYNC_SIGNAL` (4 bytes) collapses to success.
    pub async fn get_status(&mut self) -> Result<u32> {
        let data = self.read_frame().await?;
        let status = match data.len() {
            2 => u16::from_le_bytes(data[0..2].try_into().unwrap()) as u32,
            4 => {
                let v = u32::from_le_bytes(data[0..4].try_into().unwrap());
                if v == SYNC_SIGNAL { 0 } else { v }
            }
            _ if data.len() >= 4 => u32::from_le_bytes(data[0..4].try_into().unwrap()),
            _ if !data.is_empty() => data[0] as u32,
            _ => 0xFFFF_FFFF,
        };
        if status != 0 && status != SYNC_SIGNAL {
            return Err(Error::proto(format!("XFlash command rejected, status 0x{status:08X}")));
        }
        Ok(status)
    }

    pub async fn get_packet_length(&mut self) -> Result<(usize, usize)> {
        self.send_cmd(XFlashCmd::DeviceCtrl).await?;
        self.send_cmd(XFlashCmd::GetPacketLength).await?;
        let data = self.read_frame().await?;
        self.get_status().await?;
        if data.len() < 8 {
            return Err(Error::proto("packet length response too short"));
        }
        let write_len = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        let read_len = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
        Ok((write_len, read_len))
    }

    async fn write_packet_length(&mut self) -> Result<usize> {
        if let Some(l) = self.write_packet_len {
            return Ok(l);
        }
        let (write_len, _) = self.get_packet_length().await?;
        self.write_packet_len = Some(write_len);
        Ok(write_len)
    }

    /// Writes `data` (already padded/truncated by the caller to `size`
    /// bytes) to `addr`, in ≤64 KiB frames, each preceded by an additive
    /// 16-bit checksum, then a zero `u32`, then the chunk itself — an
    /// undocumented quirk of the MTK wire format.
    pub async fn write_flash_stream(
        &mut self,
        addr: u64,
        size: u64,
        data: &[u8],
        cancel: &CancellationHandle,
    ) -> Result<()> {
        let chunk_size = self.write_packet_length().await?.max(1).min(0x1_0000);

        self.send_cmd(XFlashCmd::WriteData).await?;
        self.get_status().await?;

        let mut param = Vec::new();
        param.extend_from_slice(&1u32.to_le_bytes()); // storage type: EMMC user
        param.extend_from_slice(&0u32.to_le_bytes()); // partition type
        param.extend_from_slice(&addr.to_le_bytes());
        param.extend_from_slice(&size.to_le_bytes());
        self.send_frame(&param).await?;

        let mut pos = 0usize;
        while pos < data.len() {
            cancel.check()?;
            let end = (pos + chunk_size).min(data.len());
            let chunk = &data[pos..end];
            let checksum: u32 = chunk.iter().fold(0u32, |acc, &b| acc + b as u32) & 0xFFFF;

            self.send_frame(&0u32.to_le_bytes()).await?;
            self.send_frame(&checksum.to_le_bytes()).await?;
            self.send_frame(chunk).await?;

            pos = end;
        }

        self.get_status().await?;
        Ok(())
    }

    pub async fn read_flash_stream(&mut self, addr: u64, size: u64) -> Result<Vec<u8>> {
        let mut param = Vec::new();
        param.extend_from_slice(&1u32.to_le_bytes());
        param.extend_from_slice(&0u32.to_le_bytes());
        param.extend_from_slice(&addr.to_le_bytes());
        param.extend_from_slice(&size.to_le_bytes());

        self.send_cmd(XFlashCmd::ReadData).await?;
        self.get_status().await?;
        self.send_frame(&param).await?;
        self.get_status().await?;

        let mut buffer = Vec::with_capacity(size as usize);
        loop {
            let chunk = self.read_frame().await?;
            if chunk.is_empty() {
                break;
            }
            buffer.extend_from_slice(&chunk);

            let ack = 0u32.to_le_bytes();
            self.send_frame(&ack).await?;

            if self.get_status().await? != 0 || buffer.len() as u64 >= size {
                break;
            }
        }
        Ok(buffer)
    }

    pub async fn get_emmc_info(&mut self) -> Result<Vec<u8>> {
        self.send_cmd(XFlashCmd::DeviceCtrl).await?;
        self.send_cmd(XFlashCmd::GetEmmcInfo).await?;
        let data = self.read_frame().await?;
        self.get_status().await?;
        Ok(data)
    }

    pub async fn get_ufs_info(&mut self) -> Result<Vec<u8>> {
        self.send_cmd(XFlashCmd::DeviceCtrl).await?;
        self.send_cmd(XFlashCmd::GetUfsInfo).await?;
        let data = self.read_frame().await?;
        self.get_status().await?;
        Ok(data)
    }

    pub async fn format(&mut self, addr: u64, size: u64) -> Result<()> {
        self.send_cmd(XFlashCmd::Format).await?;
        self.get_status().await?;
        let mut param = Vec::new();
        param.extend_from_slice(&1u32.to_le_bytes());
        param.extend_from_slice(&0u32.to_le_bytes());
        param.extend_from_slice(&addr.to_le_bytes());
        param.extend_from_slice(&size.to_le_bytes());
        self.send_frame(&param).await?;
        self.get_status().await
    }

    pub async fn boot_to(&mut self) -> Result<()> {
        self.send_cmd(XFlashCmd::BootTo).await?;
        self.get_status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_encodes_magic_and_length() {
        let hdr = XFlashDa::header(4);
        assert_eq!(&hdr[0..4], &MAGIC.to_le_bytes());
        assert_eq!(&hdr[8..12], &4u32.to_le_bytes());
    }
}
