// SPDX-License-Identifier: AGPL-3.0-or-later
//! Exit-code mapping for `mft-core::Error` (spec.md §6's exit code table).
//!
//! `mft_core::Error` already implements `std::error::Error` via `thiserror`,
//! so it converts into `anyhow::Error` with a plain `?` — nothing to wrap.

use mft_core::error::{Error, Kind};

pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_DEVICE_NOT_FOUND: i32 = 10;
pub const EXIT_AUTH_FAILED: i32 = 11;
pub const EXIT_PROTOCOL_REJECT: i32 = 12;
pub const EXIT_IO_TIMEOUT: i32 = 13;
pub const EXIT_IMAGE_INVALID: i32 = 14;
pub const EXIT_CANCELLED: i32 = 15;
pub const EXIT_PARTIAL_FAILURE: i32 = 20;

pub fn exit_code_for(err: &Error) -> i32 {
    match err.kind() {
        Kind::Io => EXIT_DEVICE_NOT_FOUND,
        Kind::Timeout => EXIT_IO_TIMEOUT,
        Kind::Framing | Kind::ProtocolReject => EXIT_PROTOCOL_REJECT,
        Kind::AuthFailed => EXIT_AUTH_FAILED,
        Kind::DeviceLost => EXIT_DEVICE_NOT_FOUND,
        Kind::ImageInvalid => EXIT_IMAGE_INVALID,
        Kind::PartitionProtected => EXIT_OK,
        Kind::Cancelled => EXIT_CANCELLED,
        Kind::NotImplemented | Kind::Internal => EXIT_USAGE,
    }
}
