// SPDX-License-Identifier: AGPL-3.0-or-later
//! FDL1/FDL2 bootstrap: pushes a loader blob to `addr` as
//! `CMD_START_DATA` / a stream of `CMD_MID_DATA` / `CMD_END_DATA`,
//! then starts it with `CMD_EXEC_DATA`. FDL1 and FDL2 are pushed with
//! the exact same sequence; only the address and payload differ.

use crate::error::Result;
use crate::sprd::bsl::{self, BslCmd};
use crate::transport::Transport;

/// Chunk size for `CMD_MID_DATA` packets; kept well under typical serial
/// buffer sizes so a single BSL packet never needs re-framing.
const MID_DATA_CHUNK: usize = 4096;

/// Pushes `data` to `addr` and executes it. Returns once the device has
/// ACKed `CMD_EXEC_DATA` — it's the caller's responsibility to know
/// whether that means "FDL1 is now running" or "FDL2 is now running".
pub async fn send_stage(transport: &mut dyn Transport, addr: u32, data: &[u8]) -> Result<()> {
    let mut start_body = Vec::with_capacity(8);
    start_body.extend_from_slice(&addr.to_be_bytes());
    start_body.extend_from_slice(&(data.len() as u32).to_be_bytes());
    bsl::send_expect_ack(transport, BslCmd::StartData, &start_body).await?;

    for chunk in data.chunks(MID_DATA_CHUNK) {
        bsl::send_expect_ack(transport, BslCmd::MidData, chunk).await?;
    }

    bsl::send_expect_ack(transport, BslCmd::EndData, &[]).await?;
    bsl::send_expect_ack(transport, BslCmd::ExecData, &[]).await
}

/// Runs FDL1 then FDL2 in sequence over an already-open Download-mode
/// serial port (BootROM side). Both loaders share the same push
/// sequence; this just sequences the two calls with their own
/// addresses.
pub async fn bootstrap(
    transport: &mut dyn Transport,
    fdl1_addr: u32,
    fdl1: &[u8],
    fdl2_addr: u32,
    fdl2: &[u8],
) -> Result<()> {
    send_stage(transport, fdl1_addr, fdl1).await?;
    send_stage(transport, fdl2_addr, fdl2).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sprd::bsl::BslRep;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedTransport {
        inbound: Mutex<VecDeque<u8>>,
        outbound: Mutex<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn acking(num_acks: usize) -> Self {
            let mut bytes = Vec::new();
            for _ in 0..num_acks {
                bytes.extend(ack_frame());
            }
            Self { inbound: Mutex::new(bytes.into()), outbound: Mutex::new(Vec::new()) }
        }
    }

    fn ack_frame() -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(BslRep::Ack as u16).to_be_bytes());
        payload.extend_from_slice(&0u16.to_be_bytes());
        crate::framing::hdlc::encode_frame(&payload)
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open(&mut self) -> Result<()> {
            Ok(())
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
        async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
            let mut inbound = self.inbound.lock().unwrap();
            if inbound.len() < buf.len() {
                return Err(Error::DeviceLost);
            }
            for slot in buf.iter_mut() {
                *slot = inbound.pop_front().unwrap();
            }
            Ok(())
        }
        async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
            let mut inbound = self.inbound.lock().unwrap();
            // Return one byte at a time, like a real serial port would
            // under load, so a single read never spans more than one
            // framed reply.
            let n = buf.len().min(inbound.len()).min(1);
            for slot in buf.iter_mut().take(n) {
                *slot = inbound.pop_front().unwrap();
            }
            if n == 0 {
                return Err(Error::DeviceLost);
            }
            Ok(n)
        }
        async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
            self.outbound.lock().unwrap().extend_from_slice(buf);
            Ok(())
        }
        async fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        async fn control_out(&mut self, _: u8, _: u8, _: u16, _: u16, _: &[u8]) -> Result<()> {
            Err(Error::NotImplemented("control transfers"))
        }
        async fn control_in(&mut self, _: u8, _: u8, _: u16, _: u16, _: usize) -> Result<Vec<u8>> {
            Err(Error::NotImplemented("control transfers"))
        }
        fn descriptor(&self) -> crate::transport::PortDescriptor {
            crate::transport::PortDescriptor::Serial { path: "test".into() }
        }
    }

    #[tokio::test]
    async fn send_stage_issues_start_mid_end_exec_in_order() {
        // One ACK per packet: START, one MID (data fits in one chunk), END, EXEC.
        let mut transport = ScriptedTransport::acking(4);
        send_stage(&mut transport, 0x1000_0000, b"tiny-fdl-payload").await.unwrap();

        let outbound = transport.outbound.lock().unwrap().clone();
        let mut reader = crate::framing::hdlc::FrameReader::new();
        let mut frames = Vec::new();
        for &b in &outbound {
            if let Some(payload) = reader.feed(b) {
                frames.push(payload);
            }
        }

        assert_eq!(frames.len(), 4);
        let cmd_of = |f: &[u8]| u16::from_be_bytes([f[0], f[1]]);
        assert_eq!(cmd_of(&frames[0]), BslCmd::StartData as u16);
        assert_eq!(cmd_of(&frames[1]), BslCmd::MidData as u16);
        assert_eq!(cmd_of(&frames[2]), BslCmd::EndData as u16);
        assert_eq!(cmd_of(&frames[3]), BslCmd::ExecData as u16);
    }
}
