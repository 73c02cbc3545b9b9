// SPDX-License-Identifier: AGPL-3.0-or-later
//! BSL packet framing: Unisoc's Download-mode wire format reuses the
//! same `0x7E`-delimited, `0x7D`-escaped, CRC-16 envelope as MediaTek's
//! DA protocols (see [`crate::framing::hdlc`]) — only the inner payload
//! shape differs, a 2-byte big-endian type followed by a 2-byte
//! big-endian length and the command body.

use crate::error::{Error, Result};
use crate::framing::hdlc;
use crate::transport::Transport;

const READ_CHUNK: usize = 4096;

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BslCmd {
    Connect = 0x00,
    StartData = 0x01,
    MidData = 0x02,
    EndData = 0x03,
    ExecData = 0x04,
    NormalReset = 0x05,
    ReadFlash = 0x06,
    EraseFlash = 0x07,
    PowerOff = 0x08,
    ReadChipUid = 0x09,
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BslRep {
    Ack = 0x80,
    Ver = 0x81,
    InvalidCmd = 0x82,
    UnknownCmd = 0x83,
    OperationFailed = 0x84,
    NotSupport = 0x85,
    Data = 0x86,
}

impl BslRep {
    fn from_u16(v: u16) -> Result<Self> {
        Ok(match v {
            0x80 => Self::Ack,
            0x81 => Self::Ver,
            0x82 => Self::InvalidCmd,
            0x83 => Self::UnknownCmd,
            0x84 => Self::OperationFailed,
            0x85 => Self::NotSupport,
            0x86 => Self::Data,
            other => return Err(Error::framing(format!("unknown BSL reply type 0x{other:04X}"))),
        })
    }
}

/// Builds the inner `{type, length, body}` payload and wraps it in the
/// HDLC envelope.
pub fn encode_packet(cmd: BslCmd, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + body.len());
    payload.extend_from_slice(&(cmd as u16).to_be_bytes());
    payload.extend_from_slice(&(body.len() as u16).to_be_bytes());
    payload.extend_from_slice(body);
    hdlc::encode_frame(&payload)
}

pub struct BslReply {
    pub kind: BslRep,
    pub body: Vec<u8>,
}

/// Reads one HDLC-framed BSL reply off `transport`.
pub async fn read_reply(transport: &mut dyn Transport) -> Result<BslReply> {
    let mut reader = hdlc::FrameReader::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = transport.read_some(&mut chunk).await?;
        if n == 0 {
            return Err(Error::DeviceLost);
        }
        for &b in &chunk[..n] {
            if let Some(payload) = reader.feed(b) {
                if payload.len() < 4 {
                    return Err(Error::framing("BSL reply shorter than its own header"));
                }
                let kind = BslRep::from_u16(u16::from_be_bytes([payload[0], payload[1]]))?;
                let len = u16::from_be_bytes([payload[2], payload[3]]) as usize;
                let body = payload.get(4..4 + len).ok_or_else(|| Error::framing("BSL reply body truncated"))?;
                return Ok(BslReply { kind, body: body.to_vec() });
            }
        }
    }
}

/// Sends `cmd`/`body` and expects a plain `BSL_REP_ACK` back, surfacing
/// anything else as a protocol rejection.
pub async fn send_expect_ack(transport: &mut dyn Transport, cmd: BslCmd, body: &[u8]) -> Result<()> {
    transport.write_all(&encode_packet(cmd, body)).await?;
    let reply = read_reply(transport).await?;
    match reply.kind {
        BslRep::Ack => Ok(()),
        other => Err(Error::proto(format!("BSL command {cmd:?} rejected: {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_and_recognizes_command_and_length() {
        let body = [0xAAu8, 0xBB, 0xCC];
        let frame = encode_packet(BslCmd::MidData, &body);
        let unescaped = hdlc::decode_frame(&frame).unwrap();
        assert_eq!(&unescaped[0..2], &(BslCmd::MidData as u16).to_be_bytes());
        assert_eq!(&unescaped[2..4], &3u16.to_be_bytes());
        assert_eq!(&unescaped[4..], &body);
    }
}
