use std::sync::Arc;

use chrono::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use quiz_core::Clock;
use quiz_core::model::{
    AttemptId, AttemptResult, Direction, OptionId, QuestionId, QuizAction, QuizSessionState,
};
use quiz_core::snapshot::SessionSnapshot;
use quiz_core::sync::{SyncJob, SyncLedger};
use storage::SnapshotStore;

use super::notice::SessionNotice;
use super::progress::SessionProgress;
use super::pump::SyncPump;
use crate::attempt::{AttemptService, HistoryEntry};
use crate::error::{ExpiryReason, SessionError};

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Drives one quiz attempt: resume from local storage, optimistic answer
/// selection with background sync, navigation and final submission.
///
/// Local selections are authoritative for display. Answer updates run as
/// background tasks tracked in a `SyncLedger`; the controller never awaits
/// them except in [`flush`](Self::flush) and [`submit`](Self::submit).
///
/// Methods that start background syncs must be called from within a tokio
/// runtime. Dropping the controller does not cancel syncs already started or
/// queued; they finish in the background.
pub struct QuizSessionController {
    attempts: Arc<dyn AttemptService>,
    snapshots: SnapshotStore,
    clock: Clock,
    state: Option<QuizSessionState>,
    sync: SyncPump,
    notices_rx: Option<mpsc::UnboundedReceiver<SessionNotice>>,
}

impl QuizSessionController {
    #[must_use]
    pub fn new(attempts: Arc<dyn AttemptService>, snapshots: SnapshotStore) -> Self {
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        Self {
            sync: SyncPump::new(Arc::clone(&attempts), notices_tx),
            attempts,
            snapshots,
            clock: Clock::default(),
            state: None,
            notices_rx: Some(notices_rx),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Take the receiving end of the notice channel. Only the first call
    /// returns `Some`.
    pub fn notices(&mut self) -> Option<mpsc::UnboundedReceiver<SessionNotice>> {
        self.notices_rx.take()
    }

    #[must_use]
    pub fn state(&self) -> Option<&QuizSessionState> {
        self.state.as_ref()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Time since the attempt started, per the controller's clock.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.state.as_ref().map(|s| s.elapsed(self.clock.now()))
    }

    #[must_use]
    pub fn progress(&self) -> Option<SessionProgress> {
        let state = self.state.as_ref()?;
        let unsynced = state
            .answers()
            .iter()
            .filter(|a| !self.sync.ledger().is_synced(&a.question_id, &a.option_id))
            .count();
        Some(SessionProgress {
            total: state.questions().len(),
            answered: state.answers().len(),
            current_index: state.current_index(),
            unsynced,
        })
    }

    /// Whether the backend has acknowledged the current local selection for
    /// `question_id`.
    #[must_use]
    pub fn is_saved(&self, question_id: &QuestionId) -> bool {
        self.state
            .as_ref()
            .and_then(|s| s.selected_option(question_id))
            .is_some_and(|local| self.sync.ledger().is_synced(question_id, local))
    }

    //
    // ─── RESUME ────────────────────────────────────────────────────────────────
    //

    /// Rebuild the session from local storage and the backend's answer history.
    ///
    /// Does nothing if a session is already loaded. On failure the controller
    /// stays unloaded.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionExpired` when nothing resumable is stored
    /// (no backend call is made), `SessionError::HistoryFetchFailed` when the
    /// history cannot be loaded, and `SessionError::Storage` when the start
    /// time cannot be persisted.
    pub async fn resume(&mut self) -> Result<(), SessionError> {
        if self.state.is_some() {
            return Ok(());
        }

        let snapshot = match self.snapshots.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Err(SessionError::SessionExpired(ExpiryReason::Missing)),
            Err(err) => {
                return Err(SessionError::SessionExpired(ExpiryReason::Unreadable(
                    err.to_string(),
                )));
            }
        };
        check_resumable(&snapshot)?;

        let history = self
            .attempts
            .answer_history(&snapshot.attempt_id)
            .await
            .map_err(|source| SessionError::HistoryFetchFailed { source })?;

        let started_at = match snapshot.started_at() {
            Some(at) => at,
            None => {
                let now = self.clock.now();
                self.snapshots.set_started_at(now).await?;
                now
            }
        };

        let attempt_id = snapshot.attempt_id.clone();
        let mut state = QuizSessionState::new(snapshot.attempt_id, snapshot.questions, started_at)
            .map_err(|err| SessionError::SessionExpired(ExpiryReason::Unreadable(err.to_string())))?;
        let ledger = merge_history(&mut state, history);

        info!(
            %attempt_id,
            questions = state.questions().len(),
            answered = state.answers().len(),
            "quiz session resumed"
        );
        self.sync.start(attempt_id, ledger);
        self.state = Some(state);
        Ok(())
    }

    //
    // ─── ANSWERING AND NAVIGATION ──────────────────────────────────────────────
    //

    /// Record a selection locally and sync it in the background.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotLoaded` before a successful resume and
    /// `SessionError::State` for unknown ids or a completed session.
    pub fn select_option(
        &mut self,
        question_id: QuestionId,
        option_id: OptionId,
    ) -> Result<(), SessionError> {
        self.sync.reap();
        let state = self.state.as_mut().ok_or(SessionError::NotLoaded)?;
        state.apply(QuizAction::SelectOption {
            question_id: question_id.clone(),
            option_id: option_id.clone(),
        })?;
        self.sync.enqueue(question_id, option_id);
        Ok(())
    }

    /// Move one question forward or back, clamped to the question range.
    ///
    /// The displayed question's selection is synced first if the backend does
    /// not have it yet. That sync is not awaited. Returns the new index.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotLoaded` or `SessionError::State` once completed.
    pub fn advance(&mut self, direction: Direction) -> Result<usize, SessionError> {
        self.sync.reap();
        self.sync_current()?;
        let state = self.state.as_mut().ok_or(SessionError::NotLoaded)?;
        Ok(state.advance(direction)?)
    }

    /// Move straight to `index`, clamped. Syncs like [`advance`](Self::advance).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotLoaded` or `SessionError::State` once completed.
    pub fn jump_to(&mut self, index: usize) -> Result<usize, SessionError> {
        self.sync.reap();
        self.sync_current()?;
        let state = self.state.as_mut().ok_or(SessionError::NotLoaded)?;
        Ok(state.jump_to(index)?)
    }

    fn sync_current(&mut self) -> Result<(), SessionError> {
        let state = self.state.as_ref().ok_or(SessionError::NotLoaded)?;
        let question_id = state.current_question().id();
        let Some(local) = state.selected_option(question_id) else {
            return Ok(());
        };
        if state.is_completed() || !self.sync.ledger().needs_sync(question_id, local) {
            return Ok(());
        }
        let (question_id, local) = (question_id.clone(), local.clone());
        self.sync.enqueue(question_id, local);
        Ok(())
    }

    //
    // ─── SUBMISSION ────────────────────────────────────────────────────────────
    //

    /// Finalize the attempt.
    ///
    /// Waits for background syncs, re-sends any selection the backend still
    /// lacks, then submits. On success the session is completed and local
    /// storage is cleared. Calling again after success returns the stored
    /// result without contacting the backend.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotOnLastQuestion` unless the last question is displayed
    /// - `SessionError::IncompleteAttempt` if any question is unanswered; no
    ///   backend call is made
    /// - `SessionError::SubmitFailed` if a sync or the submission fails; state
    ///   is unchanged and the call can be retried
    pub async fn submit(&mut self) -> Result<AttemptResult, SessionError> {
        self.sync.reap();
        let state = self.state.as_ref().ok_or(SessionError::NotLoaded)?;
        if let Some(result) = state.result() {
            return Ok(result.clone());
        }
        if !state.is_last_question() {
            return Err(SessionError::NotOnLastQuestion {
                current: state.current_index() + 1,
                total: state.questions().len(),
            });
        }
        if !state.answers().covers(state.questions()) {
            return Err(SessionError::IncompleteAttempt {
                missing: state.unanswered(),
            });
        }
        let attempt_id = state.attempt_id().clone();

        self.flush().await;
        self.sync_outstanding(&attempt_id).await?;

        let result = self
            .attempts
            .submit_attempt(&attempt_id)
            .await
            .map_err(|source| SessionError::SubmitFailed { source })?;

        let state = self.state.as_mut().ok_or(SessionError::NotLoaded)?;
        state.apply(QuizAction::Complete(result.clone()))?;

        if let Err(err) = self.snapshots.clear().await {
            warn!(%attempt_id, %err, "submitted attempt but could not clear local session");
        }
        info!(
            %attempt_id,
            correct = result.correct_count,
            total = result.total_count,
            score = result.score,
            "attempt submitted"
        );
        Ok(result)
    }

    /// Send every selection the backend has not acknowledged, in question order.
    async fn sync_outstanding(&mut self, attempt_id: &AttemptId) -> Result<(), SessionError> {
        let Some(state) = self.state.as_ref() else {
            return Err(SessionError::NotLoaded);
        };
        let outstanding: Vec<SyncJob> = state
            .questions()
            .iter()
            .filter_map(|q| {
                let local = state.selected_option(q.id())?;
                (!self.sync.ledger().is_synced(q.id(), local)).then(|| SyncJob {
                    question_id: q.id().clone(),
                    option_id: local.clone(),
                })
            })
            .collect();

        for job in outstanding {
            debug!(%attempt_id, question_id = %job.question_id, "syncing answer before submit");
            self.attempts
                .update_answer(attempt_id, &job.question_id, &job.option_id)
                .await
                .map_err(|source| SessionError::SubmitFailed { source })?;
            self.sync.mark_synced(job.question_id, job.option_id);
        }
        Ok(())
    }

    /// Wait for every background sync, dispatching queued updates as their
    /// predecessors settle, until nothing is queued or in flight.
    pub async fn flush(&mut self) {
        self.sync.flush().await;
    }
}

impl Drop for QuizSessionController {
    /// Pending syncs outlive the controller: they are handed to a detached
    /// task that drains the queue in order.
    fn drop(&mut self) {
        if self.sync.is_idle() {
            return;
        }
        let mut pending = self.sync.take();
        match Handle::try_current() {
            Ok(runtime) => {
                debug!("finishing pending answer syncs after teardown");
                runtime.spawn(async move { pending.flush().await });
            }
            Err(_) => {
                warn!("no runtime left to finish pending answer syncs; queued answers are dropped");
                pending.detach();
            }
        }
    }
}

/// Reject snapshots that cannot back a session, before any backend call.
fn check_resumable(snapshot: &SessionSnapshot) -> Result<(), SessionError> {
    if !snapshot.attempt_status.is_active() {
        return Err(SessionError::SessionExpired(ExpiryReason::Inactive(
            snapshot.attempt_status.clone(),
        )));
    }
    if snapshot.questions.is_empty() {
        return Err(SessionError::SessionExpired(ExpiryReason::NoQuestions));
    }
    Ok(())
}

/// Apply recorded selections to a fresh state and return a ledger that knows
/// the backend already holds them.
fn merge_history(state: &mut QuizSessionState, history: Vec<HistoryEntry>) -> SyncLedger {
    let mut ledger = SyncLedger::new();
    for entry in history {
        let Some(option_id) = entry.option_id else {
            continue;
        };
        match state.select_option(entry.question_id.clone(), option_id.clone()) {
            Ok(_) => ledger.mark_synced(entry.question_id, option_id),
            Err(err) => {
                warn!(question_id = %entry.question_id, %err, "ignoring answer history entry");
            }
        }
    }
    ledger
}
