// SPDX-License-Identifier: AGPL-3.0-or-later
//! XML DA v6: the same 12-byte `magic`/`data-type`/`length` frame header
//! as [`super::xflash`], but the payload is an XML command document
//! bracketed by `CMD:START`/`CMD:END` lifetime markers instead of a raw
//! `u32` opcode.
//!
//! A response frame is expected to carry the `CMD:START`/`CMD:END`
//! marker before its XML payload is trusted. The v6 command surface adds
//! `skip_pt`, a per-partition `operation_type`, and a dedicated
//! Super-Meta write command on top of that shared framing.

use xmltree::Element;

use crate::error::{Error, Result};
use crate::transport::Transport;

const MAGIC: u32 = 0xFEEE_EEEF;
const DT_PROTOCOL_FLOW: u32 = 1;
const CMD_START: &[u8] = b"CMD:START";
const CMD_END: &[u8] = b"CMD:END";

pub struct XmlDa<'t> {
    transport: &'t mut dyn Transport,
}

impl<'t> XmlDa<'t> {
    pub fn new(transport: &'t mut dyn Transport) -> Self {
        Self { transport }
    }

    fn header(len: usize) -> [u8; 12] {
        let mut hdr = [0u8; 12];
        hdr[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        hdr[4..8].copy_from_slice(&DT_PROTOCOL_FLOW.to_le_bytes());
        hdr[8..12].copy_from_slice(&(len as u32).to_le_bytes());
        hdr
    }

    async fn send_frame(&mut self, data: &[u8]) -> Result<()> {
        self.transport.write_all(&Self::header(data.len())).await?;
        self.transport.write_all(data).await
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut hdr = [0u8; 12];
        self.transport.read_exact(&mut hdr).await?;
        if u32::from_le_bytes(hdr[0..4].try_into().unwrap()) != MAGIC {
            return Err(Error::framing("XML DA frame has wrong magic"));
        }
        let len = u32::from_le_bytes(hdr[8..12].try_into().unwrap()) as usize;
        let mut data = vec![0u8; len];
        self.transport.read_exact(&mut data).await?;
        Ok(data)
    }

    async fn expect_lifetime(&mut self, marker: &[u8]) -> Result<()> {
        let frame = self.read_frame().await?;
        if frame.windows(marker.len()).any(|w| w == marker) {
            Ok(())
        } else {
            Err(Error::proto(format!(
                "expected XML DA lifetime marker {}",
                String::from_utf8_lossy(marker)
            )))
        }
    }

    /// Sends an XML command document, expecting `CMD:START`, the command
    /// itself is echoed back as a `<response>`, then `CMD:END`.
    pub async fn send_command(&mut self, xml: &str) -> Result<Element> {
        self.expect_lifetime(CMD_START).await?;
        self.send_frame(xml.as_bytes()).await?;

        let response_raw = self.read_frame().await?;
        let response = Element::parse(response_raw.as_slice())
            .map_err(|e| Error::proto(format!("malformed XML DA response: {e}")))?;

        self.expect_lifetime(CMD_END).await?;

        let ack = response
            .attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("value"))
            .map(|(_, v)| v.as_str())
            .unwrap_or("");
        if ack.eq_ignore_ascii_case("NAK") {
            return Err(Error::proto("device NAKed XML DA command"));
        }

        Ok(response)
    }

    pub async fn write_partition(
        &mut self,
        partition_name: &str,
        operation_type: &str,
        data: &[u8],
    ) -> Result<()> {
        let xml = format!(
            "<da><cmd><program partition_name=\"{partition_name}\" operation_type=\"{operation_type}\" \
             size=\"{}\"/></cmd></da>",
            data.len()
        );
        self.send_command(&xml).await?;
        self.send_frame(data).await?;
        let ack = self.read_frame().await?;
        if ack.windows(3).any(|w| w == b"NAK") {
            return Err(Error::proto(format!("device rejected write to {partition_name}")));
        }
        Ok(())
    }

    /// Super-Meta v6 write: a v6-only command, distinct from writing
    /// `super_meta.raw` as a plain partition.
    pub async fn write_super_meta(&mut self, data: &[u8]) -> Result<()> {
        let xml = format!("<da><cmd><super_meta size=\"{}\"/></cmd></da>", data.len());
        self.send_command(&xml).await?;
        self.send_frame(data).await?;
        let ack = self.read_frame().await?;
        if ack.windows(3).any(|w| w == b"NAK") {
            return Err(Error::proto("device rejected Super-Meta write"));
        }
        Ok(())
    }

    pub async fn set_skip_partition_table(&mut self, skip: bool) -> Result<()> {
        let xml = format!("<da><cmd><skip_pt value=\"{}\"/></cmd></da>", if skip { "true" } else { "false" });
        self.send_command(&xml).await.map(|_| ())
    }

    pub async fn boot_to(&mut self) -> Result<()> {
        self.send_command("<da><cmd><boot_to/></cmd></da>").await.map(|_| ())
    }
}
