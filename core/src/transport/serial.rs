// SPDX-License-Identifier: AGPL-3.0-or-later
//! `tokio-serial`-backed [`Transport`], used for Unisoc diag-mode ports and
//! any MediaTek/EDL cable that enumerates as a CDC-ACM port rather than a
//! raw bulk interface.

#![cfg(feature = "serial")]

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::SerialStream;

use crate::error::{Error, Result, UsbError};
use crate::transport::{PortDescriptor, Transport};

pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self { path: path.into(), baud_rate, stream: None }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let builder = tokio_serial::new(&self.path, self.baud_rate);
        let stream = SerialStream::open(&builder)
            .map_err(|e| UsbError::Open(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.stream = None;
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(UsbError::Disconnected)?;
        stream.read_exact(buf).await.map_err(Error::Io)?;
        Ok(())
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(UsbError::Disconnected)?;
        let n = stream.read(buf).await.map_err(Error::Io)?;
        Ok(n)
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(UsbError::Disconnected)?;
        stream.write_all(buf).await.map_err(Error::Io)?;
        stream.flush().await.map_err(Error::Io)?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn control_out(
        &mut self,
        _request_type: u8,
        _request: u8,
        _value: u16,
        _index: u16,
        _data: &[u8],
    ) -> Result<()> {
        Err(Error::NotImplemented("serial transports have no USB control pipe"))
    }

    async fn control_in(
        &mut self,
        _request_type: u8,
        _request: u8,
        _value: u16,
        _index: u16,
        _length: usize,
    ) -> Result<Vec<u8>> {
        Err(Error::NotImplemented("serial transports have no USB control pipe"))
    }

    fn descriptor(&self) -> PortDescriptor {
        PortDescriptor::Serial { path: self.path.clone() }
    }
}
