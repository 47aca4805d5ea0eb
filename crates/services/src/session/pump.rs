use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, warn};

use quiz_core::model::{AttemptId, OptionId, QuestionId};
use quiz_core::sync::{SyncJob, SyncLedger};

use super::notice::SessionNotice;
use crate::attempt::AttemptService;
use crate::error::{AttemptApiError, SessionError};

type SyncOutcome = Result<(), AttemptApiError>;

/// Background answer syncs for one attempt.
///
/// Every queued or in-flight update is tracked in the ledger; each in-flight
/// update is one task in `tasks`, keyed by task id in `jobs`.
pub(super) struct SyncPump {
    attempts: Arc<dyn AttemptService>,
    attempt_id: Option<AttemptId>,
    ledger: SyncLedger,
    tasks: JoinSet<SyncOutcome>,
    jobs: HashMap<Id, SyncJob>,
    notices: mpsc::UnboundedSender<SessionNotice>,
}

impl SyncPump {
    pub(super) fn new(
        attempts: Arc<dyn AttemptService>,
        notices: mpsc::UnboundedSender<SessionNotice>,
    ) -> Self {
        Self {
            attempts,
            attempt_id: None,
            ledger: SyncLedger::new(),
            tasks: JoinSet::new(),
            jobs: HashMap::new(),
            notices,
        }
    }

    pub(super) fn ledger(&self) -> &SyncLedger {
        &self.ledger
    }

    /// Start syncing for a freshly resumed attempt whose acknowledged answers
    /// are already in `ledger`.
    pub(super) fn start(&mut self, attempt_id: AttemptId, ledger: SyncLedger) {
        self.attempt_id = Some(attempt_id);
        self.ledger = ledger;
    }

    pub(super) fn mark_synced(&mut self, question_id: QuestionId, option_id: OptionId) {
        self.ledger.mark_synced(question_id, option_id);
    }

    /// Queue an update and start it unless one for the same question is in flight.
    pub(super) fn enqueue(&mut self, question_id: QuestionId, option_id: OptionId) {
        if self.ledger.enqueue(question_id, option_id) {
            self.dispatch();
        }
    }

    /// Nothing queued, nothing running.
    pub(super) fn is_idle(&self) -> bool {
        self.tasks.is_empty() && self.ledger.is_quiet()
    }

    /// Settle syncs that already finished without waiting for the rest.
    pub(super) fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next_with_id() {
            self.settle(joined);
        }
        self.dispatch();
    }

    /// Wait for every sync, dispatching queued updates as their predecessors
    /// settle, until nothing is queued or in flight.
    pub(super) async fn flush(&mut self) {
        self.dispatch();
        while let Some(joined) = self.tasks.join_next_with_id().await {
            self.settle(joined);
            self.dispatch();
        }
    }

    /// Move all pending work into a new pump, leaving this one empty.
    pub(super) fn take(&mut self) -> Self {
        Self {
            attempts: Arc::clone(&self.attempts),
            attempt_id: self.attempt_id.clone(),
            ledger: mem::take(&mut self.ledger),
            tasks: mem::take(&mut self.tasks),
            jobs: mem::take(&mut self.jobs),
            notices: self.notices.clone(),
        }
    }

    /// Let running requests finish on their own. Queued updates are lost.
    pub(super) fn detach(&mut self) {
        self.tasks.detach_all();
        self.jobs.clear();
    }

    fn dispatch(&mut self) {
        let Some(attempt_id) = self.attempt_id.clone() else {
            return;
        };
        while let Some(job) = self.ledger.next_dispatch() {
            debug!(%attempt_id, question_id = %job.question_id, option_id = %job.option_id, "dispatching answer sync");
            let attempts = Arc::clone(&self.attempts);
            let attempt_id = attempt_id.clone();
            let (question_id, option_id) = (job.question_id.clone(), job.option_id.clone());
            let handle = self.tasks.spawn(async move {
                attempts
                    .update_answer(&attempt_id, &question_id, &option_id)
                    .await
            });
            self.jobs.insert(handle.id(), job);
        }
    }

    fn settle(&mut self, joined: Result<(Id, SyncOutcome), JoinError>) {
        let (id, outcome) = match joined {
            Ok((id, outcome)) => (id, outcome),
            Err(err) => (err.id(), Err(AttemptApiError::Interrupted(err.to_string()))),
        };
        let Some(job) = self.jobs.remove(&id) else {
            return;
        };

        match outcome {
            Ok(()) => {
                debug!(question_id = %job.question_id, "answer sync acknowledged");
                self.ledger.settle(&job, true);
                self.notify(SessionNotice::AnswerSaved {
                    question_id: job.question_id,
                    option_id: job.option_id,
                });
            }
            Err(source) => {
                warn!(question_id = %job.question_id, error = %source, "answer sync failed");
                self.ledger.settle(&job, false);
                self.notify(SessionNotice::AnswerSyncFailed(SessionError::AnswerSyncFailed {
                    question_id: job.question_id,
                    option_id: job.option_id,
                    source,
                }));
            }
        }
    }

    fn notify(&self, notice: SessionNotice) {
        // Nobody listening is fine; notices are advisory.
        let _ = self.notices.send(notice);
    }
}
