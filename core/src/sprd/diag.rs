// SPDX-License-Identifier: AGPL-3.0-or-later
//! Diag mode: a second, AT-command-like serial port exposed alongside
//! Download mode, used for IMEI read/write and factory reset rather than
//! partition I/O. Lines are CRLF-terminated; a command's response ends
//! with a trailing `OK` or `ERROR` line.

use crate::error::{Error, Result};
use crate::transport::Transport;

const READ_CHUNK: usize = 256;

pub struct DiagEngine<'t> {
    transport: &'t mut dyn Transport,
}

impl<'t> DiagEngine<'t> {
    pub fn new(transport: &'t mut dyn Transport) -> Self {
        Self { transport }
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        let mut framed = line.as_bytes().to_vec();
        framed.extend_from_slice(b"\r\n");
        self.transport.write_all(&framed).await
    }

    /// Reads until a trailing `OK`/`ERROR` line, returning every line in
    /// between as the command's payload.
    async fn read_response(&mut self) -> Result<Vec<String>> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let n = self.transport.read_some(&mut chunk).await?;
            if n == 0 {
                return Err(Error::DeviceLost);
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if text.trim_end().ends_with("OK") || text.trim_end().ends_with("ERROR") {
                let mut lines: Vec<String> =
                    text.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect();
                let Some(last) = lines.pop() else {
                    return Err(Error::proto("diag response had no status line"));
                };
                if last == "ERROR" {
                    return Err(Error::proto("diag command returned ERROR"));
                }
                return Ok(lines);
            }
        }
    }

    async fn command(&mut self, line: &str) -> Result<Vec<String>> {
        self.send_line(line).await?;
        self.read_response().await
    }

    /// `slot` selects which of the device's IMEI slots (dual-SIM devices
    /// carry two) to read.
    pub async fn read_imei(&mut self, slot: u8) -> Result<String> {
        let lines = self.command(&format!("AT+EGMR=0,{slot}")).await?;
        lines
            .into_iter()
            .find_map(|l| l.strip_prefix("+EGMR: ").map(|s| s.trim_matches('"').to_string()))
            .ok_or_else(|| Error::proto("diag response carried no +EGMR line"))
    }

    pub async fn write_imei(&mut self, slot: u8, digits: &str) -> Result<()> {
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::Internal(format!("IMEI must be all digits, got {digits:?}")));
        }
        self.command(&format!("AT+EGMR=1,{slot},\"{digits}\"")).await.map(|_| ())
    }

    pub async fn factory_reset(&mut self) -> Result<()> {
        self.command("AT+SPRESET=1").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedTransport {
        inbound: Mutex<VecDeque<u8>>,
        outbound: Mutex<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(response: &str) -> Self {
            Self { inbound: Mutex::new(response.bytes().collect()), outbound: Mutex::new(Vec::new()) }
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
            if n == 0 {
                return Err(Error::DeviceLost);
            }
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

    #[tokio::test]
    async fn read_imei_parses_egmr_response_line() {
        let mut transport = ScriptedTransport::new("+EGMR: \"123456789012345\"\r\nOK\r\n");
        let mut diag = DiagEngine::new(&mut transport);
        let imei = diag.read_imei(7).await.unwrap();
        assert_eq!(imei, "123456789012345");
    }

    #[tokio::test]
    async fn write_imei_rejects_non_digit_payload() {
        let mut transport = ScriptedTransport::new("OK\r\n");
        let mut diag = DiagEngine::new(&mut transport);
        assert!(diag.write_imei(7, "12AB").await.is_err());
    }

    #[tokio::test]
    async fn error_status_line_surfaces_as_protocol_reject() {
        let mut transport = ScriptedTransport::new("ERROR\r\n");
        let mut diag = DiagEngine::new(&mut transport);
        assert!(diag.factory_reset().await.is_err());
    }
}
