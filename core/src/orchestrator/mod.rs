// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flash session state machine: the vendor-agnostic policy layer every
//! engine (`edl`, `mtk`, `sprd`, `adbfb`) reports into. Generalizes the
//! two-phase `init()`/`enter_da_mode()` device lifecycle into an explicit
//! state enum, since four engines now share one driver instead of one.

use std::collections::VecDeque;
use std::time::Instant;

use log::{error, info, warn};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::plan::{FlashPlan, PartitionEntry, RebootTarget};

const LOG_RING_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Identifying,
    Planning,
    Executing,
    Rebooting,
    Done,
    Faulted,
}

impl SessionState {
    /// The state machine's only legal forward edges, plus the universal
    /// `Faulted` escape hatch any non-terminal state can take.
    fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        if next == Faulted {
            return !matches!(self, Done | Faulted);
        }
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Authenticating)
                | (Authenticating, Identifying)
                | (Identifying, Planning)
                | (Planning, Executing)
                | (Executing, Rebooting)
                | (Rebooting, Done)
                | (Faulted, Connecting) // user-retry
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub sequence: u64,
    pub elapsed: std::time::Duration,
    pub level: LogLevel,
    pub message: String,
}

/// Bounded log buffer (spec cap: 500 entries) drained by the CLI's
/// `watch`/progress views and `--report` JSON, independent of whatever
/// `env_logger`/`log` is doing with human-readable output.
pub struct LogRing {
    started_at: Instant,
    next_sequence: u64,
    entries: VecDeque<LogEntry>,
}

impl LogRing {
    pub fn new() -> Self {
        Self { started_at: Instant::now(), next_sequence: 0, entries: VecDeque::with_capacity(LOG_RING_CAPACITY) }
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            sequence: self.next_sequence,
            elapsed: self.started_at.elapsed(),
            level,
            message: message.into(),
        };
        self.next_sequence += 1;

        match level {
            LogLevel::Debug => log::debug!("{}", entry.message),
            LogLevel::Info => info!("{}", entry.message),
            LogLevel::Warn => warn!("{}", entry.message),
            LogLevel::Error => error!("{}", entry.message),
        }

        if self.entries.len() == LOG_RING_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}

/// `progress(partition, bytes_done, bytes_total)` events. Per spec §5,
/// `bytes_done` for a given `partition` must be non-decreasing across the
/// events a caller observes — this type doesn't enforce that itself
/// (the engine emitting it does), it's just the event shape.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub partition: String,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

/// A cooperative cancellation signal polled at every suspension point
/// (transport read/write, chunk yield, progress emit) per spec §5. Built
/// on `watch` rather than a dedicated cancellation-token crate since the
/// rest of this crate already pulls in `tokio::sync::{mpsc,watch}`.
#[derive(Clone)]
pub struct CancellationToken {
    tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct CancellationHandle {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn new() -> (Self, CancellationHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancellationHandle { rx })
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancellationHandle {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns `Err(Cancelled)` if the token has fired; call this at every
    /// suspension point an engine passes through.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-partition outcome the orchestrator aggregates once a plan finishes
/// executing.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Wrote { partition: String, bytes: u64 },
    Skipped { partition: String, reason: String },
    Failed { partition: String, error: String },
}

/// What to do about a single step's failure: the policy spec §4.10
/// describes as "abort by default, skip-and-continue when the entry is
/// protected and the protect toggle is on".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Abort,
    SkipAndContinue,
}

pub fn failure_policy_for(entry: &PartitionEntry, protect_toggle: bool) -> FailurePolicy {
    if entry.is_protected && protect_toggle {
        FailurePolicy::SkipAndContinue
    } else {
        FailurePolicy::Abort
    }
}

/// Final aggregate a session reports once `Executing` finishes, per spec
/// §7's `{ok, skipped, failed, errors}` shape.
#[derive(Debug, Clone, Default)]
pub struct SessionResult {
    pub ok: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<(String, String)>,
}

impl SessionResult {
    pub fn record(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Wrote { .. } => self.ok += 1,
            StepOutcome::Skipped { partition, reason } => {
                self.skipped += 1;
                self.errors.push((partition, reason));
            }
            StepOutcome::Failed { partition, error } => {
                self.failed += 1;
                self.errors.push((partition, error));
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Maps a vendor-neutral [`RebootTarget`] onto the command string the
/// active engine actually speaks; `None` means "do nothing", which the
/// caller should treat as leaving the device exactly where it is.
pub fn reboot_command_for(target: RebootTarget, mode: EngineKind) -> Option<&'static str> {
    use EngineKind::*;
    use RebootTarget::*;
    match (mode, target) {
        (_, None) => Option::None,
        (Adb, System) => Some("reboot"),
        (Adb, Bootloader) => Some("reboot bootloader"),
        (Adb, Recovery) => Some("reboot recovery"),
        (Adb, Fastboot) => Some("reboot fastboot"),
        (Adb, Edl) => Some("reboot edl"),
        (Fastboot, System) => Some("reboot"),
        (Fastboot, Bootloader) => Some("reboot-bootloader"),
        (Fastboot, Fastboot) => Some("reboot-fastboot"),
        (Qcom, Edl) | (Qcom, Download) => Some("<power value=\"reset\"/>"),
        (Qcom, _) => Some("<power value=\"reset_to_edl\"/>"),
        (Mtk, PowerOff) => Some("shutdown"),
        (Mtk, _) => Some("reboot"),
        (Sprd, PowerOff) => Some("power-off"),
        (Sprd, _) => Some("normal-reset"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Qcom,
    Mtk,
    Sprd,
    Adb,
    Fastboot,
}

/// Drives the session state machine and owns the log ring, cancellation
/// handle, and running result. Engine-specific I/O happens outside this
/// type (in `edl`/`mtk`/`sprd`/`adbfb`); the session only decides what
/// state the run is in and whether to keep going.
pub struct Session {
    state: SessionState,
    pub log: LogRing,
    cancel: CancellationHandle,
    result: SessionResult,
}

impl Session {
    pub fn new(cancel: CancellationHandle) -> Self {
        Self { state: SessionState::Disconnected, log: LogRing::new(), cancel, result: SessionResult::default() }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn result(&self) -> &SessionResult {
        &self.result
    }

    /// Transitions to `next`, logging the edge and rejecting illegal
    /// jumps (a logic bug in the caller, not a runtime condition).
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::internal(format!("illegal session transition {:?} -> {:?}", self.state, next)));
        }
        self.log.push(LogLevel::Debug, format!("{:?} -> {:?}", self.state, next));
        self.state = next;
        Ok(())
    }

    pub fn fault(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.log.push(LogLevel::Error, format!("session faulted: {reason}"));
        self.state = SessionState::Faulted;
    }

    pub fn cancellation(&self) -> CancellationHandle {
        self.cancel.clone()
    }

    /// Call at every suspension point; short-circuits to `Faulted` and
    /// returns `Cancelled` if the token has fired.
    pub fn check_cancelled(&mut self) -> Result<()> {
        match self.cancel.check() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.log.push(LogLevel::Warn, "cancellation observed mid-session");
                self.state = SessionState::Faulted;
                Err(e)
            }
        }
    }

    /// Decides, given a per-partition failure and `plan`'s protect
    /// toggle, whether to keep executing the rest of the plan.
    pub fn handle_step_failure(&mut self, entry: &PartitionEntry, plan: &FlashPlan, err: &Error) -> FailurePolicy {
        let policy = failure_policy_for(entry, plan.protect_toggle);
        match policy {
            FailurePolicy::SkipAndContinue => {
                self.log.push(LogLevel::Info, format!("skipping protected partition '{}': {err}", entry.name));
                self.result.record(StepOutcome::Skipped { partition: entry.name.clone(), reason: err.to_string() });
            }
            FailurePolicy::Abort => {
                self.log.push(LogLevel::Error, format!("aborting on '{}': {err}", entry.name));
                self.result.record(StepOutcome::Failed { partition: entry.name.clone(), error: err.to_string() });
            }
        }
        policy
    }

    pub fn record_success(&mut self, partition: &str, bytes: u64) {
        self.result.record(StepOutcome::Wrote { partition: partition.to_string(), bytes });
    }

    pub fn emit_progress(&mut self, event: &ProgressEvent) {
        self.log.push(
            LogLevel::Debug,
            format!("progress {}: {}/{}", event.partition, event.bytes_done, event.bytes_total),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, protected: bool) -> PartitionEntry {
        PartitionEntry {
            name: name.into(),
            lun: 0,
            start_sector: 0,
            num_sectors: 1,
            sector_size: 512,
            source_image_path: None,
            custom_image_path: None,
            is_selected: true,
            is_protected: protected,
            is_sparse: false,
            pac_range: None,
        }
    }

    fn plan(protect_toggle: bool) -> FlashPlan {
        FlashPlan {
            entries: vec![],
            reboot_target: RebootTarget::System,
            storage_type: crate::plan::StorageType::Emmc,
            protect_toggle,
        }
    }

    #[test]
    fn log_ring_evicts_oldest_past_capacity() {
        let mut ring = LogRing::new();
        for i in 0..(LOG_RING_CAPACITY + 10) {
            ring.push(LogLevel::Info, format!("entry {i}"));
        }
        assert_eq!(ring.len(), LOG_RING_CAPACITY);
        assert_eq!(ring.entries().next().unwrap().message, format!("entry {}", 10));
    }

    #[test]
    fn state_machine_rejects_skipped_transitions() {
        let (_tok, handle) = CancellationToken::new();
        let mut session = Session::new(handle);
        assert!(session.transition(SessionState::Executing).is_err());
        assert!(session.transition(SessionState::Connecting).is_ok());
    }

    #[test]
    fn faulted_is_reachable_from_any_non_terminal_state() {
        let (_tok, handle) = CancellationToken::new();
        let mut session = Session::new(handle);
        session.transition(SessionState::Connecting).unwrap();
        assert!(session.transition(SessionState::Faulted).is_ok());
        assert!(session.transition(SessionState::Connecting).is_ok());
    }

    #[test]
    fn cancellation_handle_observes_cancel_call() {
        let (token, handle) = CancellationToken::new();
        assert!(handle.check().is_ok());
        token.cancel();
        assert!(matches!(handle.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn protected_entry_skips_only_when_protect_toggle_is_on() {
        let protected = entry("frp", true);
        assert_eq!(failure_policy_for(&protected, true), FailurePolicy::SkipAndContinue);
        assert_eq!(failure_policy_for(&protected, false), FailurePolicy::Abort);
        assert_eq!(failure_policy_for(&entry("boot", false), true), FailurePolicy::Abort);
    }

    #[test]
    fn session_result_aggregates_every_outcome_kind() {
        let (_tok, handle) = CancellationToken::new();
        let mut session = Session::new(handle);
        session.record_success("boot", 4096);
        let _ = plan(true);
        session.result.record(StepOutcome::Skipped { partition: "frp".into(), reason: "protected".into() });
        session.result.record(StepOutcome::Failed { partition: "system".into(), error: "timeout".into() });

        let result = session.result();
        assert_eq!(result.ok, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 1);
        assert!(!result.is_success());
    }

    #[test]
    fn reboot_command_maps_per_engine() {
        assert_eq!(reboot_command_for(RebootTarget::Bootloader, EngineKind::Adb), Some("reboot bootloader"));
        assert_eq!(reboot_command_for(RebootTarget::Bootloader, EngineKind::Fastboot), Some("reboot-bootloader"));
        assert_eq!(reboot_command_for(RebootTarget::None, EngineKind::Adb), Option::None);
    }
}
