// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire-format codecs shared across engines. Each submodule is a pure
//! encode/decode layer with no I/O of its own — engines own the
//! [`crate::transport::Transport`] and hand these codecs byte slices.

pub mod adb_message;
pub mod fastboot;
pub mod hdlc;
pub mod pac;
