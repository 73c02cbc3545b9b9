// SPDX-License-Identifier: AGPL-3.0-or-later
//! `mft-core` — protocol engines and orchestration for flashing Qualcomm,
//! MediaTek, Unisoc and Android devices from a single host process.
//!
//! This crate has no terminal I/O of its own: callers inject a progress
//! sink and drain the bounded [`orchestrator::LogRing`] for diagnostics.
//! Everything here is `Result`-returning; there is no panicking path in
//! non-test code.

pub mod adbfb;
pub mod edl;
pub mod error;
pub mod framing;
pub mod image;
pub mod loader;
pub mod mtk;
pub mod ocdt;
pub mod orchestrator;
pub mod plan;
pub mod sprd;
pub mod transport;
pub mod watcher;

pub use error::{Error, Result};
