// SPDX-License-Identifier: AGPL-3.0-or-later
pub mod adb;
pub mod fastboot;
pub mod flash_mtk;
pub mod flash_qcom;
pub mod flash_sprd;
pub mod watch;

pub use adb::AdbArgs;
pub use fastboot::FastbootArgs;
pub use flash_mtk::FlashMtkArgs;
pub use flash_qcom::FlashQcomArgs;
pub use flash_sprd::FlashSprdArgs;
pub use watch::WatchArgs;
