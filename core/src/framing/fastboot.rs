// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fastboot's ASCII command/response grammar. Commands are ≤64-byte ASCII
//! frames; replies are always exactly 4 leading ASCII bytes (`OKAY`,
//! `FAIL`, `INFO`, `DATA`) followed by a short message or, for `DATA`, an
//! 8-hex-digit transfer size.
//!
//! Adapted from the reference `Fastboot` trait's `Reply::from` parser and
//! command-builder helpers; this crate's engine is async, so the
//! request/reply loop itself lives in `adbfb::fastboot` and this module
//! stays a pure codec.

use crate::error::{Error, Result};

pub const MAX_COMMAND_LEN: usize = 64;
pub const MAX_REPLY_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Okay(String),
    Data(usize),
    Fail(String),
    Info(String),
}

pub fn encode_command(cmd: &str) -> Result<Vec<u8>> {
    if cmd.len() > MAX_COMMAND_LEN {
        return Err(Error::framing(format!(
            "fastboot command exceeds {MAX_COMMAND_LEN} bytes: {cmd:?}"
        )));
    }
    Ok(cmd.as_bytes().to_vec())
}

pub fn getvar_command(var: &str) -> Result<Vec<u8>> {
    encode_command(&format!("getvar:{var}"))
}

pub fn download_command(size: usize) -> Result<Vec<u8>> {
    encode_command(&format!("download:{size:08x}"))
}

pub fn flash_command(partition: &str) -> Result<Vec<u8>> {
    encode_command(&format!("flash:{partition}"))
}

pub fn erase_command(partition: &str) -> Result<Vec<u8>> {
    encode_command(&format!("erase:{partition}"))
}

pub fn set_active_command(slot: &str) -> Result<Vec<u8>> {
    encode_command(&format!("set_active:{slot}"))
}

pub fn create_logical_partition_command(name: &str, size: u64) -> Result<Vec<u8>> {
    encode_command(&format!("create-logical-partition:{name}:{size}"))
}

pub fn resize_logical_partition_command(name: &str, size: u64) -> Result<Vec<u8>> {
    encode_command(&format!("resize-logical-partition:{name}:{size}"))
}

pub fn delete_logical_partition_command(name: &str) -> Result<Vec<u8>> {
    encode_command(&format!("delete-logical-partition:{name}"))
}

pub fn is_logical_command(name: &str) -> Result<Vec<u8>> {
    encode_command(&format!("is-logical:{name}"))
}

pub fn parse_reply(raw: &[u8]) -> Reply {
    if raw.len() < 4 {
        return Reply::Fail(format!("reply shorter than 4 bytes: {raw:?}"));
    }

    let (kind, data) = raw.split_at(4);
    let text = String::from_utf8_lossy(data).trim_matches(char::from(0)).to_string();

    match kind {
        b"OKAY" => Reply::Okay(text),
        b"INFO" => Reply::Info(text),
        b"FAIL" => Reply::Fail(text),
        b"DATA" => match usize::from_str_radix(&text, 16) {
            Ok(size) => Reply::Data(size),
            Err(_) => Reply::Fail(format!("malformed DATA size: {text:?}")),
        },
        _ => Reply::Fail(format!("unrecognized reply header: {kind:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_reply_kind() {
        assert_eq!(parse_reply(b"OKAYdone"), Reply::Okay("done".into()));
        assert_eq!(parse_reply(b"FAILnope"), Reply::Fail("nope".into()));
        assert_eq!(parse_reply(b"INFOflashing partition"), Reply::Info("flashing partition".into()));
        assert_eq!(parse_reply(b"DATA00002000"), Reply::Data(0x2000));
    }

    #[test]
    fn rejects_oversized_command() {
        let huge = "x".repeat(MAX_COMMAND_LEN + 1);
        assert!(encode_command(&huge).is_err());
    }

    #[test]
    fn download_command_is_eight_hex_digits() {
        let cmd = download_command(0x1234).unwrap();
        assert_eq!(&cmd, b"download:00001234");
    }
}
