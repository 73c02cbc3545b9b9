// SPDX-License-Identifier: AGPL-3.0-or-later
//! ADB's 24-byte message header: `cmd`, `arg0`, `arg1`, `data_len`,
//! `data_crc`, `magic` (`cmd ^ 0xFFFFFFFF`). Adapted from the reference
//! `AdbPacket`/`send_packet`/`recv_packet` pair, split out as a pure
//! encode/decode codec so `adbfb::adb` only has to own the stream state
//! machine.

use crate::error::{Error, Result};

pub const HEADER_LEN: usize = 24;
pub const MAX_PAYLOAD: usize = 256 * 1024;

const fn cmd_id(tag: [u8; 4]) -> u32 {
    (tag[0] as u32) | ((tag[1] as u32) << 8) | ((tag[2] as u32) << 16) | ((tag[3] as u32) << 24)
}

pub const A_SYNC: u32 = cmd_id(*b"SYNC");
pub const A_CNXN: u32 = cmd_id(*b"CNXN");
pub const A_AUTH: u32 = cmd_id(*b"AUTH");
pub const A_OPEN: u32 = cmd_id(*b"OPEN");
pub const A_OKAY: u32 = cmd_id(*b"OKAY");
pub const A_CLSE: u32 = cmd_id(*b"CLSE");
pub const A_WRTE: u32 = cmd_id(*b"WRTE");

pub const AUTH_TOKEN: u32 = 1;
pub const AUTH_SIGNATURE: u32 = 2;
pub const AUTH_RSAPUBLICKEY: u32 = 3;

#[derive(Debug, Clone)]
pub struct Message {
    pub cmd: u32,
    pub arg0: u32,
    pub arg1: u32,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(cmd: u32, arg0: u32, arg1: u32, payload: Vec<u8>) -> Self {
        Self { cmd, arg0, arg1, payload }
    }

    /// ADB's `data_crc` is historically a sum-of-bytes checksum, not a
    /// CRC-32 despite the field name — real `adbd` stopped verifying it
    /// years ago but still expects a header-shaped value.
    fn data_checksum(&self) -> u32 {
        self.payload.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.cmd.to_le_bytes());
        out.extend_from_slice(&self.arg0.to_le_bytes());
        out.extend_from_slice(&self.arg1.to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.data_checksum().to_le_bytes());
        out.extend_from_slice(&(self.cmd ^ 0xFFFF_FFFF).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<(u32, u32, u32, usize)> {
        let cmd = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let arg0 = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let arg1 = u32::from_le_bytes(header[8..12].try_into().unwrap());
        let len = u32::from_le_bytes(header[12..16].try_into().unwrap()) as usize;
        let magic = u32::from_le_bytes(header[20..24].try_into().unwrap());

        if magic != (cmd ^ 0xFFFF_FFFF) {
            return Err(Error::framing(format!(
                "ADB magic mismatch: cmd=0x{cmd:08X} magic=0x{magic:08X}"
            )));
        }
        if len > MAX_PAYLOAD {
            return Err(Error::framing(format!("ADB payload too large: {len} bytes")));
        }

        Ok((cmd, arg0, arg1, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_is_bitwise_complement_of_cmd() {
        let msg = Message::new(A_OKAY, 1, 2, vec![]);
        let bytes = msg.encode();
        let magic = u32::from_le_bytes(bytes[20..24].try_into().unwrap());
        assert_eq!(magic, A_OKAY ^ 0xFFFF_FFFF);
    }

    #[test]
    fn decode_header_rejects_bad_magic() {
        let mut bytes = Message::new(A_CLSE, 0, 0, vec![]).encode();
        bytes[20] ^= 0xFF;
        let header: [u8; HEADER_LEN] = bytes[..HEADER_LEN].try_into().unwrap();
        assert!(Message::decode_header(&header).is_err());
    }

    #[test]
    fn checksum_is_sum_of_payload_bytes() {
        let payload = vec![1u8, 2, 3, 250];
        let msg = Message::new(A_WRTE, 0, 0, payload.clone());
        let expected: u32 = payload.iter().map(|&b| b as u32).sum();
        assert_eq!(msg.data_checksum(), expected);
    }

    #[test]
    fn round_trips_header_fields() {
        let msg = Message::new(A_OPEN, 7, 0, b"shell:\0".to_vec());
        let bytes = msg.encode();
        let header: [u8; HEADER_LEN] = bytes[..HEADER_LEN].try_into().unwrap();
        let (cmd, arg0, arg1, len) = Message::decode_header(&header).unwrap();
        assert_eq!((cmd, arg0, arg1, len), (A_OPEN, 7, 0, msg.payload.len()));
    }
}
