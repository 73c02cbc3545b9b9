// SPDX-License-Identifier: AGPL-3.0-or-later
//! HDLC-style byte framing used by MediaTek's DA protocols and Unisoc's
//! BSL packets: frames are delimited by `0x7E`, with `0x7E`/`0x7D` bytes
//! inside the frame escaped as `0x7D` followed by the original byte XOR
//! `0x20`, and a trailing CRC-16/CCITT over the unescaped payload.
//!
//! A delimiter-based framing scheme rather than the fixed-offset header
//! MediaTek XFlash DA uses; the checksum itself follows the same
//! CRC-16/CCITT polynomial both MediaTek DA and Unisoc BSL use on the
//! wire.

use crc::{Crc, CRC_16_XMODEM};

use crate::error::{Error, Result};

const FLAG: u8 = 0x7E;
const ESCAPE: u8 = 0x7D;
const ESCAPE_XOR: u8 = 0x20;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Escapes `payload`, appends its CRC-16, and wraps the result in `0x7E`
/// delimiters.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let crc = crc16(payload);
    let mut body = Vec::with_capacity(payload.len() + 2);
    body.extend_from_slice(payload);
    body.extend_from_slice(&crc.to_le_bytes());

    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(FLAG);
    for &b in &body {
        escape_into(b, &mut out);
    }
    out.push(FLAG);
    out
}

fn escape_into(b: u8, out: &mut Vec<u8>) {
    if b == FLAG || b == ESCAPE {
        out.push(ESCAPE);
        out.push(b ^ ESCAPE_XOR);
    } else {
        out.push(b);
    }
}

/// Decodes one `0x7E`-delimited frame from `raw`, which must contain
/// exactly one frame (leading/trailing flag bytes optional). Verifies the
/// trailing CRC-16 and returns the unescaped payload with the CRC
/// stripped.
pub fn decode_frame(raw: &[u8]) -> Result<Vec<u8>> {
    let trimmed = raw
        .iter()
        .position(|&b| b != FLAG)
        .map(|start| &raw[start..])
        .unwrap_or(&[]);
    let trimmed = {
        let end = trimmed.iter().rposition(|&b| b != FLAG).map(|e| e + 1).unwrap_or(0);
        &trimmed[..end]
    };

    let mut unescaped = Vec::with_capacity(trimmed.len());
    let mut iter = trimmed.iter().copied();
    while let Some(b) = iter.next() {
        if b == ESCAPE {
            let next = iter
                .next()
                .ok_or_else(|| Error::framing("dangling escape byte at end of frame"))?;
            unescaped.push(next ^ ESCAPE_XOR);
        } else {
            unescaped.push(b);
        }
    }

    if unescaped.len() < 2 {
        return Err(Error::framing("frame shorter than trailing CRC"));
    }

    let split = unescaped.len() - 2;
    let (payload, crc_bytes) = unescaped.split_at(split);
    let received_crc = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let expected_crc = crc16(payload);

    if received_crc != expected_crc {
        return Err(Error::framing(format!(
            "CRC mismatch: frame says 0x{received_crc:04X}, computed 0x{expected_crc:04X}"
        )));
    }

    Ok(payload.to_vec())
}

/// Incremental framer for reading HDLC frames off a byte stream: feed it
/// bytes as they arrive, and it yields complete, CRC-verified payloads.
/// A resync is as simple as scanning forward to the next `0x7E` — callers
/// do this by discarding everything fed so far and starting again, which
/// this type supports by construction (`feed` never panics on garbage).
#[derive(Default)]
pub struct FrameReader {
    buf: Vec<u8>,
    in_frame: bool,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns `Some(payload)` once a complete, valid frame
    /// has been assembled. Invalid frames are dropped silently and framing
    /// resumes at the next `0x7E` (this is the resync behavior spec'd for
    /// the HDLC layer: bad frames don't wedge the reader).
    pub fn feed(&mut self, byte: u8) -> Option<Vec<u8>> {
        if byte == FLAG {
            if !self.in_frame {
                self.in_frame = true;
                self.buf.clear();
                return None;
            }

            self.in_frame = false;
            if self.buf.is_empty() {
                // Back-to-back flags (empty frame) — treat as a new start.
                self.in_frame = true;
                return None;
            }

            let mut framed = Vec::with_capacity(self.buf.len() + 2);
            framed.push(FLAG);
            framed.extend_from_slice(&self.buf);
            framed.push(FLAG);
            self.buf.clear();

            return decode_frame(&framed).ok();
        }

        if self.in_frame {
            self.buf.push(byte);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_payload() {
        let payload = b"hello framing world";
        let frame = encode_frame(payload);
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn escapes_flag_and_escape_bytes() {
        let payload = [0x7E, 0x01, 0x7D, 0x02, 0x7E];
        let frame = encode_frame(&payload);
        // Every occurrence of 0x7E inside the frame other than the two
        // delimiters must have been escaped.
        let inner = &frame[1..frame.len() - 1];
        assert!(!inner.contains(&FLAG));
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn rejects_corrupted_crc() {
        let mut frame = encode_frame(b"abc");
        let last = frame.len() - 2;
        frame[last] ^= 0xFF;
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn incremental_reader_resyncs_after_garbage() {
        let good = encode_frame(b"second frame");
        let mut reader = FrameReader::new();

        // Feed a corrupted frame first — it should be dropped, not wedge
        // the reader.
        let mut bad = encode_frame(b"first frame");
        let mid = bad.len() / 2;
        bad[mid] ^= 0x01;

        let mut got = None;
        for &b in bad.iter().chain(good.iter()) {
            if let Some(payload) = reader.feed(b) {
                got = Some(payload);
            }
        }

        assert_eq!(got, Some(b"second frame".to_vec()));
    }
}
