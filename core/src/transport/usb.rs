// SPDX-License-Identifier: AGPL-3.0-or-later
//! nusb-backed [`Transport`], carrying any of the four engines over a
//! bulk USB pipe rather than just MediaTek's BROM/DA transfer.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use nusb::descriptors::TransferType;
use nusb::io::{EndpointRead, EndpointWrite};
use nusb::transfer::{Bulk, ControlIn, ControlOut, ControlType, Direction, In, Out, Recipient};
use nusb::{DeviceInfo, Interface};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result, UsbError};
use crate::transport::{PortDescriptor, Transport};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
const BULK_IN_SZ: usize = 0x8_0000;
const BULK_OUT_SZ: usize = 0x8_0000;

/// USB bulk transport. `interface_number` selects which interface to claim
/// on `open()` — BROM/preloader/DA ports, EDL, Fastboot and ADB each
/// enumerate their payload on a different interface index.
pub struct UsbTransport {
    info: DeviceInfo,
    interface_number: u8,
    interface: Option<Interface>,
    reader: Option<EndpointRead<Bulk>>,
    writer: Option<EndpointWrite<Bulk>>,
    ep_in: u8,
    ep_out: u8,
}

impl UsbTransport {
    pub fn new(info: DeviceInfo, interface_number: u8) -> Self {
        Self {
            info,
            interface_number,
            interface: None,
            reader: None,
            writer: None,
            ep_in: 0,
            ep_out: 0,
        }
    }

    fn select_endpoints(&mut self, iface: &Interface) -> Result<()> {
        for alt in iface.descriptors() {
            let mut in_ep = None;
            let mut out_ep = None;

            for ep in alt.endpoints() {
                if !matches!(ep.transfer_type(), TransferType::Bulk) {
                    continue;
                }
                match ep.direction() {
                    Direction::In => in_ep = Some(ep.address()),
                    Direction::Out => out_ep = Some(ep.address()),
                }
            }

            if let (Some(i), Some(o)) = (in_ep, out_ep) {
                self.ep_in = i;
                self.ep_out = o;
                return Ok(());
            }
        }

        Err(UsbError::Open("no bulk endpoints on claimed interface".into()).into())
    }
}

#[async_trait]
impl Transport for UsbTransport {
    async fn open(&mut self) -> Result<()> {
        if self.interface.is_some() {
            return Ok(());
        }

        let device = self
            .info
            .open()
            .await
            .map_err(|e| UsbError::Open(e.to_string()))?;
        let iface = device
            .detach_and_claim_interface(self.interface_number)
            .await
            .map_err(|e| UsbError::Open(e.to_string()))?;

        self.select_endpoints(&iface)?;

        #[cfg(windows)]
        let num_transfers = 1;
        #[cfg(not(windows))]
        let num_transfers = 8;

        let ep_in = iface
            .endpoint::<Bulk, In>(self.ep_in)
            .map_err(|e| UsbError::Open(e.to_string()))?;
        let reader = ep_in
            .reader(BULK_IN_SZ)
            .with_num_transfers(num_transfers)
            .with_read_timeout(DEFAULT_TIMEOUT);

        let ep_out = iface
            .endpoint::<Bulk, Out>(self.ep_out)
            .map_err(|e| UsbError::Open(e.to_string()))?;
        let writer = ep_out
            .writer(BULK_OUT_SZ)
            .with_num_transfers(num_transfers)
            .with_write_timeout(DEFAULT_TIMEOUT);

        self.reader = Some(reader);
        self.writer = Some(writer);
        self.interface = Some(iface);

        debug!("opened usb transport on interface {}", self.interface_number);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.reader = None;
        self.writer = None;
        self.interface = None;
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let reader = self.reader.as_mut().ok_or(UsbError::Disconnected)?;
        reader
            .read_exact(buf)
            .await
            .map_err(|e| UsbError::Transfer(e.to_string()))?;
        Ok(())
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let reader = self.reader.as_mut().ok_or(UsbError::Disconnected)?;
        let n = reader
            .read(buf)
            .await
            .map_err(|e| UsbError::Transfer(e.to_string()))?;
        Ok(n)
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(UsbError::Disconnected)?;
        writer
            .write_all(buf)
            .await
            .map_err(|e| UsbError::Transfer(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| UsbError::Transfer(e.to_string()))?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn control_out(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<()> {
        let iface = self.interface.as_ref().ok_or(UsbError::Disconnected)?;
        let (control_type, recipient) = decode_bmrequest(request_type);

        iface
            .control_out(
                ControlOut { control_type, recipient, request, value, index, data },
                DEFAULT_TIMEOUT,
            )
            .await
            .map_err(|e| UsbError::Transfer(e.to_string()))?;
        Ok(())
    }

    async fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    ) -> Result<Vec<u8>> {
        let iface = self.interface.as_ref().ok_or(UsbError::Disconnected)?;
        let (control_type, recipient) = decode_bmrequest(request_type);

        let buf = iface
            .control_in(
                ControlIn {
                    control_type,
                    recipient,
                    request,
                    value,
                    index,
                    length: length as u16,
                },
                DEFAULT_TIMEOUT,
            )
            .await
            .map_err(|e| UsbError::Transfer(e.to_string()))?;
        Ok(buf)
    }

    fn descriptor(&self) -> PortDescriptor {
        PortDescriptor::Usb {
            vendor_id: self.info.vendor_id(),
            product_id: self.info.product_id(),
            bus: self.info.bus_number(),
            address: self.info.device_address(),
        }
    }
}

fn decode_bmrequest(request_type: u8) -> (ControlType, Recipient) {
    let control_type = match (request_type >> 5) & 0b11 {
        0 => ControlType::Standard,
        1 => ControlType::Class,
        2 => ControlType::Vendor,
        _ => ControlType::Standard,
    };

    let recipient = match request_type & 0b1_1111 {
        0 => Recipient::Device,
        1 => Recipient::Interface,
        2 => Recipient::Endpoint,
        _ => Recipient::Other,
    };

    (control_type, recipient)
}

impl From<nusb::Error> for Error {
    fn from(e: nusb::Error) -> Self {
        Error::UsbError(UsbError::Open(e.to_string()))
    }
}
