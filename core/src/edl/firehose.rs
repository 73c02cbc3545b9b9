// SPDX-License-Identifier: AGPL-3.0-or-later
//! Firehose command engine: XML commands over HDLC framing, each followed
//! by one or more `<response value="ACK"|"NAK">` documents. A raw data
//! phase (unframed) follows `<program>`/`<read>` once the device ACKs.

use xmltree::Element;

use crate::error::{Error, Result};
use crate::framing::hdlc;
use crate::orchestrator::CancellationHandle;
use crate::plan::PartitionEntry;
use crate::transport::Transport;

const DEFAULT_MAX_PAYLOAD: u32 = 1024 * 1024;
const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    Reset,
    ResetToEdl,
    Off,
}

impl PowerMode {
    fn as_str(self) -> &'static str {
        match self {
            PowerMode::Reset => "reset",
            PowerMode::ResetToEdl => "reset_to_edl",
            PowerMode::Off => "off",
        }
    }
}

/// A single `patch*.xml` row: a byte-level fixup applied to a partition
/// after its data phase, e.g. rewriting a GPT CRC after resizing a
/// partition.
#[derive(Debug, Clone)]
pub struct PatchEntry {
    pub byte_offset: u64,
    pub filename: String,
    pub physical_partition_number: u8,
    pub size_in_bytes: u32,
    pub start_sector: String,
    pub value: String,
    pub what: String,
}

pub struct FirehoseEngine<'t> {
    transport: &'t mut dyn Transport,
    reader: hdlc::FrameReader,
    max_payload: u32,
}

impl<'t> FirehoseEngine<'t> {
    pub fn new(transport: &'t mut dyn Transport) -> Self {
        Self { transport, reader: hdlc::FrameReader::new(), max_payload: DEFAULT_MAX_PAYLOAD }
    }

    pub fn max_payload(&self) -> u32 {
        self.max_payload
    }

    async fn send_xml(&mut self, inner: &str) -> Result<()> {
        let doc = format!("<?xml version=\"1.0\" encoding=\"UTF-8\" ?><data>{inner}</data>");
        let frame = hdlc::encode_frame(doc.as_bytes());
        self.transport.write_all(&frame).await
    }

    /// Reads bytes off the transport until the incremental HDLC reader
    /// yields one complete frame.
    async fn read_frame_payload(&mut self) -> Result<Vec<u8>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = self.transport.read_some(&mut chunk).await?;
            if n == 0 {
                return Err(Error::DeviceLost);
            }
            for &b in &chunk[..n] {
                if let Some(payload) = self.reader.feed(b) {
                    return Ok(payload);
                }
            }
        }
    }

    /// Reads frames until one carries a `<response>`, skipping any
    /// interleaved `<log value="…"/>` frames a device may emit before the
    /// actual ACK/NAK arrives.
    async fn read_response(&mut self) -> Result<Element> {
        loop {
            let payload = self.read_frame_payload().await?;
            let doc = Element::parse(payload.as_slice())
                .map_err(|e| Error::proto(format!("malformed Firehose response: {e}")))?;
            let response = find_child(&doc, "response")
                .or_else(|| if doc.name == "response" { Some(&doc) } else { None });

            let Some(response) = response else { continue };

            let value = response.attributes.get("value").map(String::as_str).unwrap_or("");
            if value.eq_ignore_ascii_case("NAK") {
                let reason = response
                    .attributes
                    .get("rawmode")
                    .or_else(|| response.attributes.get("value"))
                    .cloned()
                    .unwrap_or_else(|| "device rejected command".into());
                return Err(Error::proto(format!("Firehose rejected command: {reason}")));
            }

            return Ok(response.clone());
        }
    }

    /// Negotiates `MaxPayloadSizeToTargetInBytes`: if the device replies
    /// with a different size than requested, resend `<configure>` with
    /// the device's number and accept that instead.
    pub async fn configure(&mut self, memory_name: &str, requested_max_payload: u32) -> Result<u32> {
        let mut requested = requested_max_payload;
        loop {
            let cmd = format!(
                "<configure MemoryName=\"{memory_name}\" MaxPayloadSizeToTargetInBytes=\"{requested}\" \
                 Verbose=\"0\" ZlpAwareHost=\"1\"/>"
            );
            self.send_xml(&cmd).await?;
            let response = self.read_response().await?;

            let negotiated = response
                .attributes
                .get("MaxPayloadSizeToTargetInBytes")
                .and_then(|s| s.parse::<u32>().ok());

            match negotiated {
                Some(n) if n != requested => {
                    requested = n;
                    continue;
                }
                Some(n) => {
                    self.max_payload = n;
                    return Ok(n);
                }
                None => {
                    self.max_payload = requested;
                    return Ok(requested);
                }
            }
        }
    }

    /// Sends `<program>` for `entry`, then streams `source` as the raw data
    /// phase in `max_payload`-sized windows. `source` expands sparse
    /// `Fill`/`Skip` runs on the fly, so a large fill never gets
    /// materialized in memory here, matching the bound
    /// `entry.num_sectors * entry.sector_size` bytes the device expects.
    pub async fn program(
        &mut self,
        entry: &PartitionEntry,
        source: &mut crate::image::WindowedSource,
        cancel: &CancellationHandle,
    ) -> Result<()> {
        let total = entry.byte_len();
        let cmd = format!(
            "<program SECTOR_SIZE_IN_BYTES=\"{}\" num_partition_sectors=\"{}\" \
             physical_partition_number=\"{}\" start_sector=\"{}\" filename=\"{}\"/>",
            entry.sector_size, entry.num_sectors, entry.lun, entry.start_sector, entry.name
        );
        self.send_xml(&cmd).await?;
        self.read_response().await?;

        let chunk_size = self.max_payload.max(1) as usize;
        let mut sent = 0u64;
        while sent < total {
            cancel.check()?;
            let want = chunk_size.min((total - sent) as usize);
            let chunk = source.next_window(want).await?;
            if chunk.is_empty() {
                return Err(Error::ImageInvalid(format!(
                    "image for '{}' is shorter than the declared {total} bytes ({sent} sent)",
                    entry.name
                )));
            }
            self.transport.write_all(&chunk).await?;
            sent += chunk.len() as u64;
        }

        self.read_response().await.map(|_| ())
    }

    pub async fn erase(&mut self, entry: &PartitionEntry) -> Result<()> {
        let cmd = format!(
            "<erase SECTOR_SIZE_IN_BYTES=\"{}\" num_partition_sectors=\"{}\" \
             start_sector=\"{}\" physical_partition_number=\"{}\"/>",
            entry.sector_size, entry.num_sectors, entry.start_sector, entry.lun
        );
        self.send_xml(&cmd).await?;
        self.read_response().await.map(|_| ())
    }

    pub async fn patch(&mut self, patch: &PatchEntry) -> Result<()> {
        let cmd = format!(
            "<patch byte_offset=\"{}\" filename=\"{}\" physical_partition_number=\"{}\" \
             size_in_bytes=\"{}\" start_sector=\"{}\" value=\"{}\" what=\"{}\"/>",
            patch.byte_offset,
            patch.filename,
            patch.physical_partition_number,
            patch.size_in_bytes,
            patch.start_sector,
            patch.value,
            patch.what
        );
        self.send_xml(&cmd).await?;
        self.read_response().await.map(|_| ())
    }

    /// Sends `<read>` for `entry` and returns the raw data phase that
    /// follows the device's ACK.
    pub async fn read(&mut self, entry: &PartitionEntry) -> Result<Vec<u8>> {
        let cmd = format!(
            "<read SECTOR_SIZE_IN_BYTES=\"{}\" num_partition_sectors=\"{}\" \
             start_sector=\"{}\" physical_partition_number=\"{}\"/>",
            entry.sector_size, entry.num_sectors, entry.start_sector, entry.lun
        );
        self.send_xml(&cmd).await?;
        self.read_response().await?;

        let total = entry.byte_len() as usize;
        let mut out = Vec::with_capacity(total);
        let mut buf = [0u8; READ_CHUNK];
        while out.len() < total {
            let to_read = (total - out.len()).min(buf.len());
            self.transport.read_exact(&mut buf[..to_read]).await?;
            out.extend_from_slice(&buf[..to_read]);
        }
        Ok(out)
    }

    pub async fn power(&mut self, mode: PowerMode) -> Result<()> {
        let cmd = format!("<power value=\"{}\"/>", mode.as_str());
        self.send_xml(&cmd).await?;
        self.read_response().await.map(|_| ())
    }

    pub async fn get_storage_info(&mut self) -> Result<Element> {
        self.send_xml("<getstorageinfo/>").await?;
        self.read_response().await
    }
}

fn find_child<'a>(doc: &'a Element, name: &str) -> Option<&'a Element> {
    doc.children.iter().filter_map(|n| n.as_element()).find(|e| e.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_entry_formats_into_well_formed_xml_attributes() {
        let patch = PatchEntry {
            byte_offset: 0x200,
            filename: "gpt_main0.bin".into(),
            physical_partition_number: 0,
            size_in_bytes: 4,
            start_sector: "NUM_DISK_SECTORS-1.".into(),
            value: "CRC32".into(),
            what: "Update CRC32".into(),
        };
        assert_eq!(patch.filename, "gpt_main0.bin");
        assert_eq!(patch.byte_offset, 0x200);
    }

    #[test]
    fn power_mode_maps_to_expected_wire_values() {
        assert_eq!(PowerMode::Reset.as_str(), "reset");
        assert_eq!(PowerMode::ResetToEdl.as_str(), "reset_to_edl");
        assert_eq!(PowerMode::Off.as_str(), "off");
    }
}
