// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sahara protocol: the loader-bootstrap handshake EDL devices speak
//! before Firehose exists. Binary little-endian frames, each an 8-byte
//! `{cmd: u32, length: u32}` header followed by a command-specific body;
//! `ReadData`/`ReadData64` responses are raw bytes with no header of
//! their own.

use crate::error::{Error, Result};
use crate::loader::{AuthStrategy, LoaderBundle};
use crate::transport::Transport;

const HEADER_LEN: usize = 8;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaharaCmd {
    Hello = 0x01,
    HelloResp = 0x02,
    ReadData = 0x03,
    EndImageTransfer = 0x04,
    Done = 0x05,
    DoneResp = 0x06,
    Reset = 0x07,
    ResetResp = 0x08,
    MemoryDebug64 = 0x0E,
    MemoryRead64 = 0x0F,
    ReadData64 = 0x12,
}

impl SaharaCmd {
    fn from_u32(v: u32) -> Result<Self> {
        Ok(match v {
            0x01 => Self::Hello,
            0x02 => Self::HelloResp,
            0x03 => Self::ReadData,
            0x04 => Self::EndImageTransfer,
            0x05 => Self::Done,
            0x06 => Self::DoneResp,
            0x07 => Self::Reset,
            0x08 => Self::ResetResp,
            0x0E => Self::MemoryDebug64,
            0x0F => Self::MemoryRead64,
            0x12 => Self::ReadData64,
            other => return Err(Error::framing(format!("unknown Sahara command 0x{other:02X}"))),
        })
    }
}

/// Negotiated mode from the device's `Hello` packet. `ImageTransferPending`
/// is the only one this engine drives all the way through; `MemoryDebug`
/// shows up ahead of it for VIP-style authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaharaMode {
    ImageTransferPending,
    ImageTransferComplete,
    MemoryDebug,
    Command,
}

impl SaharaMode {
    fn from_u32(v: u32) -> Self {
        match v {
            0x1 => Self::ImageTransferComplete,
            0x2 => Self::MemoryDebug,
            0x3 => Self::Command,
            _ => Self::ImageTransferPending,
        }
    }

    fn as_u32(self) -> u32 {
        match self {
            Self::ImageTransferPending => 0x0,
            Self::ImageTransferComplete => 0x1,
            Self::MemoryDebug => 0x2,
            Self::Command => 0x3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HelloInfo {
    pub version: u32,
    pub version_compatible: u32,
    pub max_cmd_packet_length: u32,
    pub mode: SaharaMode,
}

struct Header {
    cmd: u32,
    length: u32,
}

async fn read_header(transport: &mut dyn Transport) -> Result<Header> {
    let mut buf = [0u8; HEADER_LEN];
    transport.read_exact(&mut buf).await?;
    Ok(Header {
        cmd: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
        length: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
    })
}

async fn read_body(transport: &mut dyn Transport, header: &Header) -> Result<Vec<u8>> {
    let body_len = (header.length as usize)
        .checked_sub(HEADER_LEN)
        .ok_or_else(|| Error::framing("Sahara frame shorter than its own header"))?;
    let mut body = vec![0u8; body_len];
    transport.read_exact(&mut body).await?;
    Ok(body)
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    buf.get(offset..offset + 4)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
        .ok_or_else(|| Error::framing("Sahara packet body too short"))
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64> {
    buf.get(offset..offset + 8)
        .map(|s| u64::from_le_bytes(s.try_into().unwrap()))
        .ok_or_else(|| Error::framing("Sahara packet body too short"))
}

/// Drives one Sahara session end to end: reads the device's `Hello`,
/// authenticates if the bundle's [`AuthStrategy`] calls for it, serves
/// `loader_path` bytes on every `ReadData`/`ReadData64`, and returns once
/// `Done`/`DoneResp` has been exchanged.
pub struct SaharaSession<'t> {
    transport: &'t mut dyn Transport,
}

impl<'t> SaharaSession<'t> {
    pub fn new(transport: &'t mut dyn Transport) -> Self {
        Self { transport }
    }

    async fn send_frame(&mut self, cmd: SaharaCmd, body: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
        frame.extend_from_slice(&(cmd as u32).to_le_bytes());
        frame.extend_from_slice(&((HEADER_LEN + body.len()) as u32).to_le_bytes());
        frame.extend_from_slice(body);
        self.transport.write_all(&frame).await
    }

    async fn read_hello(&mut self) -> Result<HelloInfo> {
        let header = read_header(self.transport).await?;
        if SaharaCmd::from_u32(header.cmd)? != SaharaCmd::Hello {
            return Err(Error::proto("expected Sahara Hello as the first frame"));
        }
        let body = read_body(self.transport, &header).await?;
        Ok(HelloInfo {
            version: read_u32(&body, 0)?,
            version_compatible: read_u32(&body, 4)?,
            max_cmd_packet_length: read_u32(&body, 8)?,
            mode: SaharaMode::from_u32(read_u32(&body, 12)?),
        })
    }

    async fn send_hello_resp(&mut self, hello: &HelloInfo, mode: SaharaMode) -> Result<()> {
        let mut body = Vec::with_capacity(24);
        body.extend_from_slice(&hello.version.to_le_bytes());
        body.extend_from_slice(&hello.version_compatible.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes()); // status
        body.extend_from_slice(&mode.as_u32().to_le_bytes());
        body.extend_from_slice(&[0u8; 24]); // reserved
        self.send_frame(SaharaCmd::HelloResp, &body).await
    }

    /// Reads a `MemoryDebug64` challenge and replies with `digest`, used
    /// by VIP/OnePlus/Nothing/Xiaomi authentication ahead of the normal
    /// loader push.
    async fn serve_memory_debug(&mut self, digest: &[u8]) -> Result<()> {
        let header = read_header(self.transport).await?;
        match SaharaCmd::from_u32(header.cmd)? {
            SaharaCmd::MemoryDebug64 => {
                let _body = read_body(self.transport, &header).await?;
                self.transport.write_all(digest).await
            }
            other => Err(Error::proto(format!("expected MemoryDebug64, got {other:?}"))),
        }
    }

    /// Reads the follow-up `MemoryRead64` challenge and replies with the
    /// bundle's `sign` bytes.
    async fn serve_memory_read(&mut self, sign: &[u8]) -> Result<()> {
        let header = read_header(self.transport).await?;
        match SaharaCmd::from_u32(header.cmd)? {
            SaharaCmd::MemoryRead64 => {
                let _body = read_body(self.transport, &header).await?;
                self.transport.write_all(sign).await
            }
            other => Err(Error::proto(format!("expected MemoryRead64, got {other:?}"))),
        }
    }

    async fn authenticate(&mut self, bundle: &LoaderBundle) -> Result<()> {
        let digest_path = bundle
            .digest_path
            .as_ref()
            .ok_or_else(|| Error::AuthFailed("loader bundle has no digest artefact for VIP auth".into()))?;
        let sign_path = bundle
            .sign_path
            .as_ref()
            .ok_or_else(|| Error::AuthFailed("loader bundle has no sign artefact for VIP auth".into()))?;

        let digest = std::fs::read(digest_path).map_err(Error::Io)?;
        let sign = std::fs::read(sign_path).map_err(Error::Io)?;

        self.serve_memory_debug(&digest).await?;
        self.serve_memory_read(&sign).await
    }

    /// Serves loader bytes until `Done`/`DoneResp` has been exchanged.
    async fn serve_image_transfer(&mut self, loader: &[u8]) -> Result<()> {
        loop {
            let header = read_header(self.transport).await?;
            match SaharaCmd::from_u32(header.cmd)? {
                SaharaCmd::ReadData => {
                    let body = read_body(self.transport, &header).await?;
                    let _image_id = read_u32(&body, 0)?;
                    let offset = read_u32(&body, 4)? as usize;
                    let length = read_u32(&body, 8)? as usize;
                    self.serve_slice(loader, offset, length).await?;
                }
                SaharaCmd::ReadData64 => {
                    let body = read_body(self.transport, &header).await?;
                    let _image_id = read_u64(&body, 0)?;
                    let offset = read_u64(&body, 8)? as usize;
                    let length = read_u64(&body, 16)? as usize;
                    self.serve_slice(loader, offset, length).await?;
                }
                SaharaCmd::EndImageTransfer => {
                    let body = read_body(self.transport, &header).await?;
                    let status = read_u32(&body, body.len().saturating_sub(4))?;
                    if status != 0 {
                        return Err(Error::proto(format!("device aborted image transfer, status {status}")));
                    }
                    return Ok(());
                }
                other => return Err(Error::proto(format!("unexpected Sahara command {other:?} during image transfer"))),
            }
        }
    }

    async fn serve_slice(&mut self, loader: &[u8], offset: usize, length: usize) -> Result<()> {
        let end = offset
            .checked_add(length)
            .ok_or_else(|| Error::proto("Sahara ReadData range overflowed"))?;
        let slice = loader
            .get(offset..end)
            .ok_or_else(|| Error::proto(format!("Sahara ReadData range {offset}..{end} out of bounds")))?;
        self.transport.write_all(slice).await
    }

    async fn finish(&mut self) -> Result<()> {
        let header = read_header(self.transport).await?;
        if SaharaCmd::from_u32(header.cmd)? != SaharaCmd::Done {
            return Err(Error::proto("expected Sahara Done"));
        }
        let _body = read_body(self.transport, &header).await?;
        self.send_frame(SaharaCmd::DoneResp, &0u32.to_le_bytes()).await
    }

    /// Runs the full handshake: `Hello` -> (authenticate if the bundle's
    /// strategy needs it) -> `HelloResp` -> serve the loader -> `Done`.
    pub async fn run(&mut self, bundle: &LoaderBundle) -> Result<HelloInfo> {
        let hello = self.read_hello().await?;

        let needs_auth = !matches!(bundle.auth_strategy, AuthStrategy::Standard);
        if needs_auth {
            self.send_hello_resp(&hello, SaharaMode::MemoryDebug).await?;
            self.authenticate(bundle).await?;
        } else {
            self.send_hello_resp(&hello, SaharaMode::ImageTransferPending).await?;
        }

        let loader = std::fs::read(&bundle.loader_path).map_err(Error::Io)?;
        self.serve_image_transfer(&loader).await?;
        self.finish().await?;

        Ok(hello)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::StorageType;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory transport that replays a scripted sequence of inbound
    /// frames and records every outbound write.
    struct ScriptedTransport {
        inbound: Mutex<VecDeque<u8>>,
        outbound: Mutex<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(inbound: Vec<u8>) -> Self {
            Self { inbound: Mutex::new(inbound.into()), outbound: Mutex::new(Vec::new()) }
        }
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
            let n = buf.len().min(inbound.len());
            for slot in buf.iter_mut().take(n) {
                *slot = inbound.pop_front().unwrap();
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

    fn sahara_frame(cmd: u32, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&cmd.to_le_bytes());
        out.extend_from_slice(&((HEADER_LEN + body.len()) as u32).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    fn test_bundle() -> LoaderBundle {
        LoaderBundle {
            loader_path: std::env::temp_dir().join("mft-sahara-test-loader.bin"),
            digest_path: None,
            sign_path: None,
            storage_type: StorageType::Ufs,
            vendor: "qcom".into(),
            chip: "sdm845".into(),
            auth_strategy: AuthStrategy::Standard,
        }
    }

    #[tokio::test]
    async fn standard_auth_serves_loader_and_completes() {
        let loader_bytes = b"loader-payload-bytes".to_vec();
        std::fs::write(
            std::env::temp_dir().join("mft-sahara-test-loader.bin"),
            &loader_bytes,
        )
        .unwrap();

        let mut hello_body = Vec::new();
        hello_body.extend_from_slice(&2u32.to_le_bytes()); // version
        hello_body.extend_from_slice(&1u32.to_le_bytes()); // version_compatible
        hello_body.extend_from_slice(&0x1000u32.to_le_bytes()); // max_cmd_packet_length
        hello_body.extend_from_slice(&0u32.to_le_bytes()); // mode: ImageTransferPending
        hello_body.extend_from_slice(&[0u8; 4]); // reserved padding so body parses cleanly

        let mut read_data_body = Vec::new();
        read_data_body.extend_from_slice(&0u32.to_le_bytes()); // image_id
        read_data_body.extend_from_slice(&0u32.to_le_bytes()); // offset
        read_data_body.extend_from_slice(&(loader_bytes.len() as u32).to_le_bytes());

        let mut end_body = Vec::new();
        end_body.extend_from_slice(&0u32.to_le_bytes()); // image_id
        end_body.extend_from_slice(&0u32.to_le_bytes()); // status = success

        let mut script = Vec::new();
        script.extend(sahara_frame(SaharaCmd::Hello as u32, &hello_body));
        script.extend(sahara_frame(SaharaCmd::ReadData as u32, &read_data_body));
        script.extend(sahara_frame(SaharaCmd::EndImageTransfer as u32, &end_body));
        script.extend(sahara_frame(SaharaCmd::Done as u32, &[]));

        let mut transport = ScriptedTransport::new(script);
        let mut session = SaharaSession::new(&mut transport);
        let hello = session.run(&test_bundle()).await.unwrap();
        assert_eq!(hello.version, 2);

        let outbound = transport.outbound.lock().unwrap().clone();
        assert!(outbound.windows(loader_bytes.len()).any(|w| w == loader_bytes.as_slice()));

        std::fs::remove_file(std::env::temp_dir().join("mft-sahara-test-loader.bin")).ok();
    }

    #[test]
    fn sahara_mode_round_trips_through_u32() {
        for mode in [
            SaharaMode::ImageTransferPending,
            SaharaMode::ImageTransferComplete,
            SaharaMode::MemoryDebug,
            SaharaMode::Command,
        ] {
            assert_eq!(SaharaMode::from_u32(mode.as_u32()), mode);
        }
    }
}
