// SPDX-License-Identifier: AGPL-3.0-or-later
//! BROM command set: single-byte opcodes over the MTK preloader/BROM
//! serial port, every command echoing its opcode back before the
//! device's reply.
//!
//! Each call follows the same shape: write opcode, read the echo, write
//! parameters, read a trailing big-endian `u16` status.

use crate::error::{Error, Result};
use crate::mtk::sla::SLA_AUTH_REQUIRED_STATUS;
use crate::transport::Transport;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BromOp {
    GetHwCode = 0xA0,
    GetHwSubCode = 0xA1,
    GetHwVersion = 0xA2,
    GetSwVersion = 0xA3,
    GetMeId = 0xB1,
    JumpDa = 0xD0,
    SendDa = 0xD5,
    ReadReg32 = 0xE1,
    WriteReg32 = 0xE2,
    GetChipId = 0xFE,
}

pub struct BromClient<'t> {
    transport: &'t mut dyn Transport,
}

impl<'t> BromClient<'t> {
    pub fn new(transport: &'t mut dyn Transport) -> Self {
        Self { transport }
    }

    async fn echo_opcode(&mut self, op: BromOp) -> Result<()> {
        self.transport.write_all(&[op as u8]).await?;
        let mut echoed = [0u8; 1];
        self.transport.read_exact(&mut echoed).await?;
        if echoed[0] != op as u8 {
            return Err(Error::framing(format!(
                "BROM did not echo opcode 0x{:02X} (got 0x{:02X})",
                op as u8, echoed[0]
            )));
        }
        Ok(())
    }

    async fn read_u16_status(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.transport.read_exact(&mut buf).await?;
        let status = u16::from_be_bytes(buf);
        Ok(status)
    }

    async fn check_status(&mut self) -> Result<()> {
        let status = self.read_u16_status().await?;
        if status == SLA_AUTH_REQUIRED_STATUS {
            return Err(Error::AuthFailed("BROM requires SLA authorization".into()));
        }
        if status != 0 {
            return Err(Error::proto(format!("BROM command rejected, status 0x{status:04X}")));
        }
        Ok(())
    }

    pub async fn get_hw_code(&mut self) -> Result<u16> {
        self.echo_opcode(BromOp::GetHwCode).await?;
        let mut code = [0u8; 2];
        self.transport.read_exact(&mut code).await?;
        self.check_status().await?;
        Ok(u16::from_be_bytes(code))
    }

    pub async fn get_hw_sub_code(&mut self) -> Result<u16> {
        self.echo_opcode(BromOp::GetHwSubCode).await?;
        let mut code = [0u8; 2];
        self.transport.read_exact(&mut code).await?;
        self.check_status().await?;
        Ok(u16::from_be_bytes(code))
    }

    pub async fn get_hw_version(&mut self) -> Result<u16> {
        self.echo_opcode(BromOp::GetHwVersion).await?;
        let mut v = [0u8; 2];
        self.transport.read_exact(&mut v).await?;
        self.check_status().await?;
        Ok(u16::from_be_bytes(v))
    }

    pub async fn get_sw_version(&mut self) -> Result<u16> {
        self.echo_opcode(BromOp::GetSwVersion).await?;
        let mut v = [0u8; 2];
        self.transport.read_exact(&mut v).await?;
        self.check_status().await?;
        Ok(u16::from_be_bytes(v))
    }

    pub async fn get_chip_id(&mut self) -> Result<(u16, u16, u16)> {
        self.echo_opcode(BromOp::GetChipId).await?;
        let mut hw_code = [0u8; 2];
        let mut hw_sub = [0u8; 2];
        let mut hw_ver = [0u8; 2];
        self.transport.read_exact(&mut hw_code).await?;
        self.transport.read_exact(&mut hw_sub).await?;
        self.transport.read_exact(&mut hw_ver).await?;
        self.check_status().await?;
        Ok((u16::from_be_bytes(hw_code), u16::from_be_bytes(hw_sub), u16::from_be_bytes(hw_ver)))
    }

    pub async fn get_meid(&mut self) -> Result<Vec<u8>> {
        self.echo_opcode(BromOp::GetMeId).await?;
        let mut len_buf = [0u8; 4];
        self.transport.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut meid = vec![0u8; len];
        self.transport.read_exact(&mut meid).await?;
        self.check_status().await?;
        Ok(meid)
    }

    pub async fn read_reg32(&mut self, addr: u32, count: u32) -> Result<Vec<u32>> {
        self.echo_opcode(BromOp::ReadReg32).await?;
        self.transport.write_all(&addr.to_be_bytes()).await?;
        self.transport.write_all(&count.to_be_bytes()).await?;
        self.check_status().await?;

        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut buf = [0u8; 4];
            self.transport.read_exact(&mut buf).await?;
            out.push(u32::from_be_bytes(buf));
        }
        self.check_status().await?;
        Ok(out)
    }

    pub async fn write_reg32(&mut self, addr: u32, values: &[u32]) -> Result<()> {
        self.echo_opcode(BromOp::WriteReg32).await?;
        self.transport.write_all(&addr.to_be_bytes()).await?;
        self.transport.write_all(&(values.len() as u32).to_be_bytes()).await?;
        self.check_status().await?;
        for v in values {
            self.transport.write_all(&v.to_be_bytes()).await?;
        }
        self.check_status().await
    }

    /// Sends the DA payload at `addr`, total length `len`, signature
    /// trailer `sig_len` bytes, followed by the raw payload.
    pub async fn send_da(&mut self, addr: u32, len: u32, sig_len: u32, data: &[u8]) -> Result<()> {
        self.echo_opcode(BromOp::SendDa).await?;
        self.transport.write_all(&addr.to_be_bytes()).await?;
        self.transport.write_all(&len.to_be_bytes()).await?;
        self.transport.write_all(&sig_len.to_be_bytes()).await?;
        self.check_status().await?;

        self.transport.write_all(data).await?;

        let mut checksum = [0u8; 2];
        self.transport.read_exact(&mut checksum).await?;
        self.check_status().await
    }

    pub async fn jump_da(&mut self, addr: u32) -> Result<()> {
        self.echo_opcode(BromOp::JumpDa).await?;
        self.transport.write_all(&addr.to_be_bytes()).await?;
        self.check_status().await
    }
}
