// SPDX-License-Identifier: AGPL-3.0-or-later
//! `--report <file>` JSON writer shared by every `flash <vendor>` command.

use std::path::Path;

use anyhow::Result;
use log::warn;
use mft_core::error::Error;
use mft_core::orchestrator::{CancellationHandle, CancellationToken, SessionResult};
use mft_core::plan::FlashPlan;
use serde::Serialize;

/// Builds a cancellation token and spawns a task that fires it on
/// `Ctrl-C`, so every `flash <vendor>`/`push`/fastboot command can poll
/// the returned handle inside its engine's write loop.
pub fn install_ctrlc_cancellation() -> CancellationHandle {
    let (token, handle) = CancellationToken::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received Ctrl-C, cancelling in-flight operation");
            token.cancel();
        }
    });
    handle
}

#[derive(Serialize)]
struct ReportEntry<'a> {
    partition: &'a str,
    detail: &'a str,
}

#[derive(Serialize)]
struct Report<'a> {
    ok: usize,
    skipped: usize,
    failed: usize,
    errors: Vec<ReportEntry<'a>>,
}

/// Writes `result` as the `{ok, skipped, failed, errors}` shape spec.md §7
/// describes for partial-failure reporting.
pub async fn write_report(path: &Path, result: &SessionResult) -> Result<()> {
    let report = Report {
        ok: result.ok,
        skipped: result.skipped,
        failed: result.failed,
        errors: result.errors.iter().map(|(partition, detail)| ReportEntry { partition, detail }).collect(),
    };
    let json = serde_json::to_vec_pretty(&report)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Builds the session's final aggregate from a whole-plan execution
/// result: engines abort the walk on the first error, so a failure only
/// tells us the plan as a whole didn't finish, not which partition broke.
pub fn result_from_plan_outcome(plan: &FlashPlan, outcome: &Result<(), Error>) -> SessionResult {
    let mut result = SessionResult::default();
    match outcome {
        Ok(()) => {
            for entry in plan.selected() {
                if entry.is_protected {
                    result.skipped += 1;
                    result.errors.push((entry.name.clone(), "protected".into()));
                } else {
                    result.ok += 1;
                }
            }
        }
        Err(e) => {
            result.failed = 1;
            result.errors.push(("<plan>".into(), e.to_string()));
        }
    }
    result
}

pub fn print_summary(result: &SessionResult) {
    println!("ok={} skipped={} failed={}", result.ok, result.skipped, result.failed);
    for (partition, detail) in &result.errors {
        println!("  {partition}: {detail}");
    }
}
