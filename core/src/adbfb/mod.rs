// SPDX-License-Identifier: AGPL-3.0-or-later
//! ADB and Fastboot protocol engines: the ADB message/stream state
//! machine, its `SYNC` file-transfer sub-protocol, a client for the
//! long-running `adb` host server's own wire protocol, and the Fastboot
//! command engine.

pub mod adb;
pub mod fastboot;
pub mod server;
pub mod sync;

pub use adb::{load_or_generate_host_key, AdbConnection, AdbStream, HostAuthKey};
pub use fastboot::FastbootEngine;
pub use server::ServerClient;
pub use sync::SyncSession;

/// Host feature flags advertised in the `CNXN` banner; `shell_v2` and
/// `cmd` are assumed by modern `adb shell`/`adb install` flows, so this
/// crate advertises exactly what a current `adb` client would.
pub const HOST_FEATURES: &[&str] =
    &["shell_v2", "cmd", "stat_v2", "fixed_push_mkdir", "apex", "abb", "abb_exec"];
