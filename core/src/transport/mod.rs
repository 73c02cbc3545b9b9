// SPDX-License-Identifier: AGPL-3.0-or-later
//! A file-like duplex byte pipe with optional USB control transfers.
//!
//! Every engine (Sahara/Firehose, BROM/DA, SPRD FDL/diag, ADB, Fastboot)
//! rides over one of two physical carriers: a USB bulk interface or a
//! serial port. [`Transport`] is the single trait they all speak, so the
//! rest of the crate never has to know which backend is underneath.

pub mod serial;
pub mod usb;

use async_trait::async_trait;

use crate::error::Result;

pub use usb::UsbTransport;

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

/// A descriptor identifying a physical port before it's opened, kept apart
/// from the open [`Transport`] itself since the watcher needs to enumerate
/// ports it never opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortDescriptor {
    Usb { vendor_id: u16, product_id: u16, bus: u8, address: u8 },
    Serial { path: String },
}

impl std::fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDescriptor::Usb { vendor_id, product_id, .. } => {
                write!(f, "USB {:04X}:{:04X}", vendor_id, product_id)
            }
            PortDescriptor::Serial { path } => write!(f, "serial {path}"),
        }
    }
}

/// Duplex byte pipe abstraction shared by every protocol engine.
///
/// Implementations are not required to be `Send` across an `.await` if the
/// underlying handle isn't, but `mft-core` always uses them from a single
/// task per session, so `Send + 'static` is required for the trait object
/// to live inside an orchestrator session.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn open(&mut self) -> Result<()>;
    async fn close(&mut self) -> Result<()>;

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;
    async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize>;
    async fn write_all(&mut self, buf: &[u8]) -> Result<()>;
    async fn flush(&mut self) -> Result<()>;

    /// USB control OUT transfer. Serial backends return
    /// [`crate::Error::NotImplemented`].
    async fn control_out(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<()>;

    /// USB control IN transfer. Serial backends return
    /// [`crate::Error::NotImplemented`].
    async fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    ) -> Result<Vec<u8>>;

    fn descriptor(&self) -> PortDescriptor;
}
