// SPDX-License-Identifier: AGPL-3.0-or-later
//! Progress-bar rendering for flash sessions: an `indicatif` wrapper
//! styled to match the logger's prefix/symbol, driven by
//! `orchestrator::ProgressEvent`.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::logger::{INFO_SYMBOL, LOGGER_PREFIX};

pub struct FlashProgress {
    pb: ProgressBar,
}

impl FlashProgress {
    pub fn new(total_bytes: u64) -> Self {
        let prefix = format!("{} {}", LOGGER_PREFIX.bold().yellow(), INFO_SYMBOL.yellow());

        let pb = ProgressBar::new(total_bytes);
        pb.set_style(
            ProgressStyle::with_template(&format!(
                "{prefix}  [{{bar:40.yellow/red}}] {{bytes}}/{{total_bytes}} ({{elapsed}} / ETA: {{eta}}, {{bytes_per_sec}}) {{msg}}"
            ))
            .unwrap()
            .progress_chars("##-"),
        );

        Self { pb }
    }

    pub fn update(&self, event: &mft_core::orchestrator::ProgressEvent) {
        self.pb.set_position(event.bytes_done);
        self.pb.set_message(event.partition.clone());
    }

    pub fn finish(&self, msg: &str) {
        self.pb.finish_with_message(msg.to_string());
    }

    pub fn abandon(&self, msg: &str) {
        self.pb.abandon_with_message(msg.to_string());
    }
}
