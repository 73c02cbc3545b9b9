// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the long-running `adb` host server's own wire protocol:
//! a 4-hex-digit ASCII length prefix followed by a request string, and
//! either `OKAY`/`FAIL` or a raw reply. Used when a transport talks to
//! the server on `127.0.0.1:5037` instead of driving a USB/serial
//! device directly — letting this crate cooperate with an
//! already-running `adb` rather than fighting it over the device.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};

const DEFAULT_HOST: &str = "127.0.0.1:5037";

/// Host/port the ADB server listens on; overridable so a non-standard
/// server (or a forwarded port in a container) can be targeted without
/// recompiling.
pub fn server_addr() -> String {
    std::env::var("MFT_ADB_SERVER").unwrap_or_else(|_| DEFAULT_HOST.to_string())
}

pub struct ServerClient {
    stream: TcpStream,
}

impl ServerClient {
    pub async fn connect() -> Result<Self> {
        Self::connect_to(&server_addr()).await
    }

    pub async fn connect_to(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::Internal(format!("connecting to adb server at {addr}: {e}")))?;
        Ok(Self { stream })
    }

    async fn write_request(&mut self, request: &str) -> Result<()> {
        let framed = format!("{:04x}{request}", request.len());
        self.stream.write_all(framed.as_bytes()).await.map_err(Error::Io)
    }

    async fn read_status(&mut self) -> Result<bool> {
        let mut status = [0u8; 4];
        self.stream.read_exact(&mut status).await.map_err(Error::Io)?;
        match &status {
            b"OKAY" => Ok(true),
            b"FAIL" => Ok(false),
            other => Err(Error::proto(format!("unexpected adb server status {:?}", String::from_utf8_lossy(other)))),
        }
    }

    async fn read_length_prefixed(&mut self) -> Result<String> {
        let mut len_hex = [0u8; 4];
        self.stream.read_exact(&mut len_hex).await.map_err(Error::Io)?;
        let len = u32::from_str_radix(std::str::from_utf8(&len_hex).unwrap_or("0"), 16)
            .map_err(|e| Error::framing(format!("bad adb server length prefix: {e}")))?;
        let mut body = vec![0u8; len as usize];
        self.stream.read_exact(&mut body).await.map_err(Error::Io)?;
        Ok(String::from_utf8_lossy(&body).to_string())
    }

    async fn read_fail_message(&mut self) -> Result<Error> {
        let msg = self.read_length_prefixed().await?;
        Ok(Error::proto(format!("adb server rejected request: {msg}")))
    }

    /// Sends `request`, expects `OKAY`, and returns the subsequent
    /// length-prefixed payload (e.g. `host:devices-l`, `host:version`).
    pub async fn request_text(&mut self, request: &str) -> Result<String> {
        self.write_request(request).await?;
        if !self.read_status().await? {
            return Err(self.read_fail_message().await?);
        }
        self.read_length_prefixed().await
    }

    /// Sends `request` and expects a bare `OKAY`/`FAIL` with no payload
    /// (e.g. `host:transport:<serial>`, `host:kill`).
    pub async fn request_ack(&mut self, request: &str) -> Result<()> {
        self.write_request(request).await?;
        if self.read_status().await? {
            Ok(())
        } else {
            Err(self.read_fail_message().await?)
        }
    }

    /// Consumes this client as a raw duplex stream, used once a
    /// `host:transport:<serial>` switch has put the server in passthrough
    /// mode so ADB message frames can be exchanged directly.
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    pub async fn devices(&mut self) -> Result<Vec<(String, String)>> {
        let raw = self.request_text("host:devices-l").await?;
        Ok(raw
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let serial = fields.next()?;
                let state = fields.next()?;
                Some((serial.to_string(), state.to_string()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_addr_defaults_without_env_override() {
        std::env::remove_var("MFT_ADB_SERVER");
        assert_eq!(server_addr(), DEFAULT_HOST);
    }

    #[test]
    fn server_addr_honors_env_override() {
        std::env::set_var("MFT_ADB_SERVER", "127.0.0.1:9999");
        assert_eq!(server_addr(), "127.0.0.1:9999");
        std::env::remove_var("MFT_ADB_SERVER");
    }
}
