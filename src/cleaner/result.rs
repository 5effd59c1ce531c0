//! Wipe state machine and the immutable result of a run

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Phase, Result, VerificationFailure};

/// Lifecycle of one wipe run. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "pass", rename_all = "snake_case")]
pub enum WipeState {
    Idle,
    PassRunning(usize),
    PassVerifying(usize),
    Completed,
    Failed,
}

impl WipeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WipeState::Completed | WipeState::Failed)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: WipeState) -> bool {
        use WipeState::*;
        match (*self, next) {
            (Completed, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Idle, PassRunning(0)) => true,
            (PassRunning(i), PassVerifying(j)) => i == j,
            (PassRunning(i), PassRunning(j)) | (PassVerifying(i), PassRunning(j)) => j == i + 1,
            (PassRunning(_), Completed) | (PassVerifying(_), Completed) => true,
            _ => false,
        }
    }
}

/// What happened to the directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    EntryRemoved,
    EntryRetainedDueToFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum VerificationOutcome {
    NotRequested,
    Passed,
    Failed(VerificationFailure),
}

/// Record of one pass that reached the disk
#[derive(Debug, Clone, Serialize)]
pub struct PassOutcome {
    pub index: usize,
    pub pattern: String,
    pub bytes_written: u64,
    pub verification: VerificationOutcome,
    pub duration_ms: u64,
}

impl PassOutcome {
    /// Written, synced, and verified when requested
    pub fn succeeded(&self) -> bool {
        !matches!(self.verification, VerificationOutcome::Failed(_))
    }
}

/// Serializable summary of the error that stopped a run
#[derive(Debug, Clone, Serialize)]
pub struct WipeFailure {
    /// Pass that was running, `None` when the failure came before the
    /// first pass or during removal
    pub pass_index: Option<usize>,
    pub phase: Option<Phase>,
    pub message: String,
}

/// Immutable outcome of a wipe run
#[derive(Debug, Serialize)]
pub struct WipeResult {
    pub path: PathBuf,
    pub plan: String,
    pub plan_verified: bool,
    pub file_size: u64,
    pub passes_planned: usize,
    pub passes_completed: usize,
    pub passes: Vec<PassOutcome>,
    pub state: WipeState,
    pub disposition: Disposition,
    /// Where the data still lives when the entry was kept
    pub retained_path: Option<PathBuf>,
    pub directory_synced: bool,
    pub failure: Option<WipeFailure>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip)]
    error: Option<Error>,
}

impl WipeResult {
    pub fn is_success(&self) -> bool {
        self.state == WipeState::Completed && self.disposition == Disposition::EntryRemoved
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Converts a failed run into its error, passing successful runs through
    pub fn check(mut self) -> Result<Self> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidState(format!("cannot serialize wipe result: {}", e)))
    }
}

/// Collects state while a run is in flight; consumed exactly once by
/// [`WipeRecorder::complete`] or [`WipeRecorder::fail`]
#[derive(Debug)]
pub(crate) struct WipeRecorder {
    path: PathBuf,
    current_path: PathBuf,
    plan: String,
    plan_verified: bool,
    file_size: u64,
    passes_planned: usize,
    passes: Vec<PassOutcome>,
    state: WipeState,
    directory_synced: bool,
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl WipeRecorder {
    pub(crate) fn new(path: &Path, plan: &str, plan_verified: bool, file_size: u64, passes: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            current_path: path.to_path_buf(),
            plan: plan.to_string(),
            plan_verified,
            file_size,
            passes_planned: passes,
            passes: Vec::with_capacity(passes),
            state: WipeState::Idle,
            directory_synced: false,
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    pub(crate) fn state(&self) -> WipeState {
        self.state
    }

    pub(crate) fn transition(&mut self, next: WipeState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidState(format!(
                "illegal wipe transition {:?} -> {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn record_pass(&mut self, outcome: PassOutcome) {
        self.passes.push(outcome);
    }

    /// The file now lives under a new name
    pub(crate) fn moved_to(&mut self, path: PathBuf) {
        self.current_path = path;
    }

    pub(crate) fn current_path(&self) -> &Path {
        &self.current_path
    }

    pub(crate) fn directory_synced(&mut self, synced: bool) {
        self.directory_synced = synced;
    }

    fn passes_completed(&self) -> usize {
        self.passes.iter().filter(|p| p.succeeded()).count()
    }

    fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    pub(crate) fn complete(mut self) -> Result<WipeResult> {
        self.transition(WipeState::Completed)?;
        Ok(self.finish(Disposition::EntryRemoved, None, None))
    }

    pub(crate) fn fail(mut self, error: Error) -> WipeResult {
        let pass_index = match self.state {
            WipeState::PassRunning(i) | WipeState::PassVerifying(i) => Some(i),
            _ => None,
        };
        self.state = WipeState::Failed;
        let failure = WipeFailure {
            pass_index,
            phase: error.phase(),
            message: error.to_string(),
        };
        let retained = Some(self.current_path.clone());
        let mut result = self.finish(Disposition::EntryRetainedDueToFailure, Some(failure), retained);
        result.error = Some(error);
        result
    }

    fn finish(
        self,
        disposition: Disposition,
        failure: Option<WipeFailure>,
        retained_path: Option<PathBuf>,
    ) -> WipeResult {
        let duration_ms = self.elapsed().as_millis() as u64;
        let passes_completed = self.passes_completed();
        WipeResult {
            path: self.path,
            plan: self.plan,
            plan_verified: self.plan_verified,
            file_size: self.file_size,
            passes_planned: self.passes_planned,
            passes_completed,
            passes: self.passes,
            state: self.state,
            disposition,
            retained_path,
            directory_synced: self.directory_synced,
            failure,
            started_at: self.started_at,
            duration_ms,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(WipeState::Idle.can_transition_to(WipeState::PassRunning(0)));
        assert!(WipeState::PassRunning(0).can_transition_to(WipeState::PassVerifying(0)));
        assert!(WipeState::PassVerifying(0).can_transition_to(WipeState::PassRunning(1)));
        assert!(WipeState::PassRunning(1).can_transition_to(WipeState::PassRunning(2)));
        assert!(WipeState::PassVerifying(2).can_transition_to(WipeState::Completed));
        assert!(WipeState::Idle.can_transition_to(WipeState::Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!WipeState::Idle.can_transition_to(WipeState::Completed));
        assert!(!WipeState::Idle.can_transition_to(WipeState::PassRunning(1)));
        assert!(!WipeState::PassRunning(0).can_transition_to(WipeState::PassVerifying(1)));
        assert!(!WipeState::Failed.can_transition_to(WipeState::PassRunning(0)));
        assert!(!WipeState::Completed.can_transition_to(WipeState::Failed));
    }

    #[test]
    fn test_recorder_failure_keeps_error_and_path() {
        let mut recorder = WipeRecorder::new(Path::new("/tmp/x"), "custom", true, 10, 2);
        recorder.transition(WipeState::PassRunning(0)).unwrap();
        let result = recorder.fail(Error::Cancelled {
            phase: Phase::Write,
            offset: 4,
        });

        assert_eq!(result.state, WipeState::Failed);
        assert_eq!(result.disposition, Disposition::EntryRetainedDueToFailure);
        assert_eq!(result.retained_path.as_deref(), Some(Path::new("/tmp/x")));
        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.pass_index, Some(0));
        assert_eq!(failure.phase, Some(Phase::Write));
        assert!(matches!(result.check(), Err(Error::Cancelled { .. })));
    }

    #[test]
    fn test_recorder_counts_only_successful_passes() {
        let mut recorder = WipeRecorder::new(Path::new("/tmp/y"), "custom", true, 10, 2);
        recorder.record_pass(PassOutcome {
            index: 0,
            pattern: "fixed:00".into(),
            bytes_written: 10,
            verification: VerificationOutcome::Passed,
            duration_ms: 0,
        });
        recorder.record_pass(PassOutcome {
            index: 1,
            pattern: "fixed:ff".into(),
            bytes_written: 10,
            verification: VerificationOutcome::Failed(VerificationFailure {
                pass_index: 1,
                offset_start: 3,
                offset_end: 4,
                expected: 0xFF,
                observed: 0xFE,
                mismatched_bytes: 1,
            }),
            duration_ms: 0,
        });
        let result = recorder.fail(Error::InvalidState("stop".into()));
        assert_eq!(result.passes_completed, 1);
        assert_eq!(result.passes.len(), 2);
    }
}
