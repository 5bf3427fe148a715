// Auto-save scheduling for one open document.
//
// States: idle, pending (debounce armed), in-flight, cancelled (an in-flight
// auto-save was superseded by a manual save that waits for it to settle).
// Every decision takes an explicit `Instant`, so the runner owns the clock
// and tests never sleep.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSaveConfig {
    /// Quiet period after the last edit. Each edit restarts it.
    pub debounce: Duration,
    /// Minimum spacing between a successful save and the next auto-save.
    pub min_interval: Duration,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self { debounce: Duration::from_secs(2), min_interval: Duration::from_secs(15) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Pending { due: Instant },
    InFlight { trigger: SaveTrigger },
    Cancelled,
}

/// What the runner should do after a manual save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualSave {
    /// Submit now.
    Submit,
    /// Cancel the in-flight auto-save; the manual save follows once it settles.
    CancelInFlight,
    /// A manual save is already in flight or queued.
    AlreadyQueued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Conflict,
    Failed,
    /// The request was cancelled before it was sent.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct AutoSaveScheduler {
    config: AutoSaveConfig,
    state: SaveState,
    /// Local edits not yet included in a submitted save.
    dirty: bool,
    last_saved_at: Option<Instant>,
    /// Set by a conflict; auto-saves stay off until `resolve_conflict`.
    halted: bool,
}

impl AutoSaveScheduler {
    pub fn new(config: AutoSaveConfig) -> Self {
        Self { config, state: SaveState::Idle, dirty: false, last_saved_at: None, halted: false }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, SaveState::InFlight { .. } | SaveState::Cancelled)
    }

    /// When the pending auto-save should fire.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            SaveState::Pending { due } => Some(due),
            _ => None,
        }
    }

    /// Record a local edit.
    pub fn edit_at(&mut self, now: Instant) {
        self.dirty = true;
        if self.halted {
            return;
        }
        if matches!(self.state, SaveState::Idle | SaveState::Pending { .. }) {
            self.state = SaveState::Pending { due: self.due_after_edit(now) };
        }
    }

    /// Fire the pending auto-save once its deadline has passed.
    pub fn poll_at(&mut self, now: Instant) -> Option<SaveTrigger> {
        match self.state {
            SaveState::Pending { due } if now >= due && !self.halted => {
                self.begin(SaveTrigger::Auto);
                Some(SaveTrigger::Auto)
            }
            _ => None,
        }
    }

    /// The user asked to save now.
    pub fn manual_save(&mut self) -> ManualSave {
        match self.state {
            SaveState::Idle | SaveState::Pending { .. } => {
                self.begin(SaveTrigger::Manual);
                ManualSave::Submit
            }
            SaveState::InFlight { trigger: SaveTrigger::Auto } => {
                self.state = SaveState::Cancelled;
                ManualSave::CancelInFlight
            }
            SaveState::InFlight { trigger: SaveTrigger::Manual } | SaveState::Cancelled => {
                ManualSave::AlreadyQueued
            }
        }
    }

    /// The in-flight request settled. Returns a save to submit immediately,
    /// which is the queued manual save after a cancellation. A conflict
    /// drops the queued save since it would carry the same stale token.
    pub fn finished_at(&mut self, now: Instant, outcome: SaveOutcome) -> Option<SaveTrigger> {
        let manual_queued = self.state == SaveState::Cancelled;

        match outcome {
            SaveOutcome::Saved => {
                self.last_saved_at = Some(now);
                self.halted = false;
            }
            SaveOutcome::Conflict => {
                self.halted = true;
                self.dirty = true;
                self.state = SaveState::Idle;
                return None;
            }
            SaveOutcome::Failed | SaveOutcome::Cancelled => {
                self.dirty = true;
            }
        }

        if manual_queued {
            self.begin(SaveTrigger::Manual);
            return Some(SaveTrigger::Manual);
        }

        self.state = if self.dirty {
            SaveState::Pending { due: self.due_after_edit(now) }
        } else {
            SaveState::Idle
        };
        None
    }

    /// The session reloaded or chose to overwrite after a conflict.
    pub fn resolve_conflict_at(&mut self, now: Instant, keep_local_edits: bool) {
        self.halted = false;
        self.dirty = keep_local_edits;
        if !self.is_in_flight() {
            self.state = if self.dirty {
                SaveState::Pending { due: self.due_after_edit(now) }
            } else {
                SaveState::Idle
            };
        }
    }

    fn begin(&mut self, trigger: SaveTrigger) {
        self.dirty = false;
        self.state = SaveState::InFlight { trigger };
    }

    fn due_after_edit(&self, now: Instant) -> Instant {
        let debounced = now + self.config.debounce;
        match self.last_saved_at {
            Some(saved) => debounced.max(saved + self.config.min_interval),
            None => debounced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> AutoSaveScheduler {
        AutoSaveScheduler::new(AutoSaveConfig::default())
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn edits_restart_the_debounce_window() {
        let t0 = Instant::now();
        let mut s = scheduler();

        s.edit_at(t0);
        assert_eq!(s.next_deadline(), Some(t0 + secs(2)));
        s.edit_at(t0 + secs(1));
        assert_eq!(s.next_deadline(), Some(t0 + secs(3)));

        assert_eq!(s.poll_at(t0 + secs(2)), None);
        assert_eq!(s.poll_at(t0 + secs(3)), Some(SaveTrigger::Auto));
        assert_eq!(s.state(), SaveState::InFlight { trigger: SaveTrigger::Auto });
        assert!(!s.is_dirty());
    }

    #[test]
    fn auto_saves_respect_min_interval_after_success() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.edit_at(t0);
        s.poll_at(t0 + secs(2));
        assert_eq!(s.finished_at(t0 + secs(3), SaveOutcome::Saved), None);
        assert_eq!(s.state(), SaveState::Idle);

        s.edit_at(t0 + secs(4));
        assert_eq!(s.next_deadline(), Some(t0 + secs(18)));
        assert_eq!(s.poll_at(t0 + secs(10)), None);
        assert_eq!(s.poll_at(t0 + secs(18)), Some(SaveTrigger::Auto));
    }

    #[test]
    fn idle_scheduler_never_fires() {
        let mut s = scheduler();
        assert_eq!(s.next_deadline(), None);
        assert_eq!(s.poll_at(Instant::now() + secs(100)), None);
    }

    #[test]
    fn manual_save_supersedes_pending_auto_save() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.edit_at(t0);

        assert_eq!(s.manual_save(), ManualSave::Submit);
        assert_eq!(s.state(), SaveState::InFlight { trigger: SaveTrigger::Manual });
        assert_eq!(s.next_deadline(), None);
        assert_eq!(s.poll_at(t0 + secs(5)), None);
    }

    #[test]
    fn manual_save_during_auto_flight_waits_for_settle() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.edit_at(t0);
        s.poll_at(t0 + secs(2));

        assert_eq!(s.manual_save(), ManualSave::CancelInFlight);
        assert_eq!(s.state(), SaveState::Cancelled);
        assert_eq!(s.manual_save(), ManualSave::AlreadyQueued);

        assert_eq!(s.finished_at(t0 + secs(3), SaveOutcome::Cancelled), Some(SaveTrigger::Manual));
        assert_eq!(s.state(), SaveState::InFlight { trigger: SaveTrigger::Manual });
    }

    #[test]
    fn queued_manual_save_still_runs_when_cancelled_save_had_landed() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.edit_at(t0);
        s.poll_at(t0 + secs(2));
        s.manual_save();

        assert_eq!(s.finished_at(t0 + secs(3), SaveOutcome::Saved), Some(SaveTrigger::Manual));
    }

    #[test]
    fn edit_during_flight_rearms_after_response() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.edit_at(t0);
        s.poll_at(t0 + secs(2));

        s.edit_at(t0 + secs(2));
        assert_eq!(s.next_deadline(), None);
        assert!(s.is_dirty());

        assert_eq!(s.finished_at(t0 + secs(3), SaveOutcome::Saved), None);
        assert_eq!(s.next_deadline(), Some(t0 + secs(18)));
    }

    #[test]
    fn conflict_halts_auto_saves_until_resolved() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.edit_at(t0);
        s.poll_at(t0 + secs(2));

        assert_eq!(s.finished_at(t0 + secs(3), SaveOutcome::Conflict), None);
        assert!(s.is_halted());
        s.edit_at(t0 + secs(4));
        assert_eq!(s.next_deadline(), None);
        assert_eq!(s.poll_at(t0 + secs(60)), None);

        s.resolve_conflict_at(t0 + secs(61), true);
        assert!(!s.is_halted());
        assert_eq!(s.next_deadline(), Some(t0 + secs(63)));
    }

    #[test]
    fn reload_after_conflict_drops_local_edits() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.edit_at(t0);
        s.poll_at(t0 + secs(2));
        s.finished_at(t0 + secs(3), SaveOutcome::Conflict);

        s.resolve_conflict_at(t0 + secs(4), false);
        assert_eq!(s.state(), SaveState::Idle);
        assert!(!s.is_dirty());
    }

    #[test]
    fn failed_save_retries_after_debounce() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.edit_at(t0);
        s.poll_at(t0 + secs(2));

        assert_eq!(s.finished_at(t0 + secs(3), SaveOutcome::Failed), None);
        assert!(s.is_dirty());
        assert_eq!(s.next_deadline(), Some(t0 + secs(5)));
    }

    #[test]
    fn manual_save_is_allowed_while_halted() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.edit_at(t0);
        s.poll_at(t0 + secs(2));
        s.finished_at(t0 + secs(3), SaveOutcome::Conflict);

        assert_eq!(s.manual_save(), ManualSave::Submit);
        assert_eq!(s.finished_at(t0 + secs(4), SaveOutcome::Saved), None);
        assert!(!s.is_halted());
    }
}
