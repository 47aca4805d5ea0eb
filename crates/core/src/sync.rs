//! Bookkeeping for answer syncs sent to the attempt backend.
//!
//! Local selections are authoritative for display. The ledger remembers what
//! the backend last acknowledged per question and coalesces outbound updates:
//! only the newest value per question waits in the queue, and at most one
//! update per question is in flight at a time.

use std::collections::{HashMap, VecDeque};

use crate::model::{OptionId, QuestionId};

/// One outbound answer update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub question_id: QuestionId,
    pub option_id: OptionId,
}

#[derive(Debug, Clone, Default)]
pub struct SyncLedger {
    synced: HashMap<QuestionId, OptionId>,
    in_flight: HashMap<QuestionId, OptionId>,
    queued: HashMap<QuestionId, OptionId>,
    order: VecDeque<QuestionId>,
}

impl SyncLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value the backend is known to hold (e.g. from answer history).
    pub fn mark_synced(&mut self, question_id: QuestionId, option_id: OptionId) {
        self.synced.insert(question_id, option_id);
    }

    /// The value last acknowledged by the backend for `question_id`.
    #[must_use]
    pub fn synced(&self, question_id: &QuestionId) -> Option<&OptionId> {
        self.synced.get(question_id)
    }

    #[must_use]
    pub fn is_synced(&self, question_id: &QuestionId, option_id: &OptionId) -> bool {
        self.synced.get(question_id) == Some(option_id)
    }

    /// True if `option_id` is already queued or in flight for `question_id`.
    #[must_use]
    pub fn is_pending(&self, question_id: &QuestionId, option_id: &OptionId) -> bool {
        if let Some(queued) = self.queued.get(question_id) {
            return queued == option_id;
        }
        self.in_flight.get(question_id) == Some(option_id)
    }

    /// True when the local selection is neither acknowledged nor on its way.
    #[must_use]
    pub fn needs_sync(&self, question_id: &QuestionId, local: &OptionId) -> bool {
        !self.is_pending(question_id, local)
            && (self.queued.contains_key(question_id)
                || self.in_flight.contains_key(question_id)
                || !self.is_synced(question_id, local))
    }

    /// Queue `option_id` for `question_id`, replacing any value still waiting.
    ///
    /// Returns `false` when nothing needed to be queued.
    pub fn enqueue(&mut self, question_id: QuestionId, option_id: OptionId) -> bool {
        if let Some(slot) = self.queued.get_mut(&question_id) {
            *slot = option_id;
            return true;
        }
        let settled_value = self
            .in_flight
            .get(&question_id)
            .or_else(|| self.synced.get(&question_id));
        if settled_value == Some(&option_id) {
            return false;
        }
        self.order.push_back(question_id.clone());
        self.queued.insert(question_id, option_id);
        true
    }

    /// Take the next queued update whose question has nothing in flight and
    /// mark it in flight.
    pub fn next_dispatch(&mut self) -> Option<SyncJob> {
        let pos = self
            .order
            .iter()
            .position(|q| !self.in_flight.contains_key(q))?;
        let question_id = self.order.remove(pos)?;
        let option_id = self.queued.remove(&question_id)?;
        self.in_flight
            .insert(question_id.clone(), option_id.clone());
        Some(SyncJob {
            question_id,
            option_id,
        })
    }

    /// Record the outcome of a dispatched job.
    ///
    /// A successful ack only updates what the backend holds; it never touches
    /// local selections, so a late ack for an older value is harmless.
    pub fn settle(&mut self, job: &SyncJob, ok: bool) {
        if self.in_flight.get(&job.question_id) == Some(&job.option_id) {
            self.in_flight.remove(&job.question_id);
        }
        if ok {
            self.synced
                .insert(job.question_id.clone(), job.option_id.clone());
        }
    }

    /// Nothing queued and nothing in flight.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.in_flight.is_empty() && self.queued.is_empty()
    }
}
