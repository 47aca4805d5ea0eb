use std::sync::Arc;

use quiz_core::model::{
    AnswerOption, AttemptId, AttemptStatus, Direction, OptionId, Question, QuestionId,
    StudentId, StudentSnapshot,
};
use quiz_core::snapshot::SessionSnapshot;
use quiz_core::time::{fixed_clock, fixed_now};
use services::attempt::{AttemptCall, Operation};
use services::{
    AttemptService, Disposition, ExpiryReason, InMemoryAttemptService, QuizSessionController,
    RegistrationService, SessionError, SessionNotice,
};
use storage::{InMemorySessionStore, SessionStore, SnapshotStore};

fn qid(s: &str) -> QuestionId {
    QuestionId::new(s).unwrap()
}

fn oid(s: &str) -> OptionId {
    OptionId::new(s).unwrap()
}

fn question(n: usize) -> Question {
    Question::new(
        qid(&format!("q{n}")),
        format!("Question {n}"),
        vec![
            AnswerOption::new(oid("a"), "Option A"),
            AnswerOption::new(oid("b"), "Option B"),
            AnswerOption::new(oid("c"), "Option C"),
        ],
    )
    .unwrap()
}

struct Harness {
    backend: InMemoryAttemptService,
    raw: InMemorySessionStore,
    snapshots: SnapshotStore,
    attempt_id: AttemptId,
}

impl Harness {
    /// A registered, not yet resumed attempt with `n` questions whose correct
    /// option is always `a`.
    async fn registered(n: usize) -> Self {
        let questions = (1..=n).map(|i| (question(i), oid("a"))).collect();
        let backend = InMemoryAttemptService::new(questions, fixed_clock());
        let raw = InMemorySessionStore::new();
        let snapshots = SnapshotStore::new(Arc::new(raw.clone()));
        let student = StudentSnapshot::new(StudentId::new("s-1").unwrap(), "Ada Lovelace");
        let attempt_id = RegistrationService::new(Arc::new(backend.clone()), snapshots.clone())
            .register(student)
            .await
            .unwrap();
        Self {
            backend,
            raw,
            snapshots,
            attempt_id,
        }
    }

    fn controller(&self) -> QuizSessionController {
        QuizSessionController::new(Arc::new(self.backend.clone()), self.snapshots.clone())
            .with_clock(fixed_clock())
    }

    async fn resumed(&self) -> QuizSessionController {
        let mut controller = self.controller();
        controller.resume().await.unwrap();
        controller
    }

    fn calls_since(&self, mark: usize) -> Vec<AttemptCall> {
        self.backend.calls().split_off(mark)
    }
}

#[tokio::test]
async fn last_selection_wins_locally_and_remotely() {
    let h = Harness::registered(2).await;
    let mut controller = h.resumed().await;

    controller.select_option(qid("q1"), oid("a")).unwrap();
    controller.select_option(qid("q1"), oid("c")).unwrap();
    controller.select_option(qid("q1"), oid("b")).unwrap();
    controller.flush().await;

    let state = controller.state().unwrap();
    assert_eq!(state.selected_option(&qid("q1")), Some(&oid("b")));
    assert_eq!(state.answers().len(), 1);
    assert_eq!(h.backend.recorded_answer(&h.attempt_id, &qid("q1")), Some(oid("b")));
    assert!(controller.is_saved(&qid("q1")));

    // First value goes out immediately, later ones coalesce behind it.
    let updates = h.backend.calls_of(Operation::Update);
    assert_eq!(
        updates,
        vec![
            AttemptCall::Update(h.attempt_id.clone(), qid("q1"), oid("a")),
            AttemptCall::Update(h.attempt_id.clone(), qid("q1"), oid("b")),
        ]
    );
}

#[tokio::test]
async fn navigation_is_clamped() {
    let h = Harness::registered(3).await;
    let mut controller = h.resumed().await;

    assert_eq!(controller.advance(Direction::Previous).unwrap(), 0);
    assert_eq!(controller.advance(Direction::Next).unwrap(), 1);
    assert_eq!(controller.advance(Direction::Next).unwrap(), 2);
    assert_eq!(controller.advance(Direction::Next).unwrap(), 2);
    assert_eq!(controller.jump_to(99).unwrap(), 2);
    assert_eq!(controller.jump_to(0).unwrap(), 0);
}

#[tokio::test]
async fn submitting_an_incomplete_attempt_makes_no_backend_call() {
    let h = Harness::registered(3).await;
    let mut controller = h.resumed().await;

    controller.select_option(qid("q1"), oid("a")).unwrap();
    controller.advance(Direction::Next).unwrap();
    controller.select_option(qid("q2"), oid("b")).unwrap();
    controller.advance(Direction::Next).unwrap();
    controller.flush().await;

    let mark = h.backend.calls().len();
    let err = controller.submit().await.unwrap_err();
    match &err {
        SessionError::IncompleteAttempt { missing } => assert_eq!(missing, &vec![qid("q3")]),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.disposition(), Disposition::FixInput);
    assert!(h.calls_since(mark).is_empty());
    assert!(!controller.state().unwrap().is_completed());
}

#[tokio::test]
async fn submit_requires_the_last_question() {
    let h = Harness::registered(2).await;
    let mut controller = h.resumed().await;
    controller.select_option(qid("q1"), oid("a")).unwrap();
    controller.select_option(qid("q2"), oid("a")).unwrap();

    let err = controller.submit().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::NotOnLastQuestion {
            current: 1,
            total: 2
        }
    ));
    controller.flush().await;
    assert!(h.backend.calls_of(Operation::Submit).is_empty());
}

#[tokio::test]
async fn final_answer_is_synced_before_submit_and_keys_are_cleared() {
    let h = Harness::registered(3).await;
    h.backend
        .update_answer(&h.attempt_id, &qid("q1"), &oid("a"))
        .await
        .unwrap();
    h.backend
        .update_answer(&h.attempt_id, &qid("q2"), &oid("b"))
        .await
        .unwrap();
    let mark = h.backend.calls().len();

    let mut controller = h.resumed().await;
    controller.jump_to(2).unwrap();
    controller.select_option(qid("q3"), oid("a")).unwrap();
    let result = controller.submit().await.unwrap();

    assert_eq!(
        h.calls_since(mark),
        vec![
            AttemptCall::History(h.attempt_id.clone()),
            AttemptCall::Update(h.attempt_id.clone(), qid("q3"), oid("a")),
            AttemptCall::Submit(h.attempt_id.clone()),
        ]
    );
    assert_eq!(result.total_count, 3);
    assert_eq!(result.correct_count, 2);
    assert_eq!(result.status, AttemptStatus::Submitted);

    let state = controller.state().unwrap();
    assert!(state.is_completed());
    assert_eq!(state.result(), Some(&result));
    assert!(h.raw.keys().await.unwrap().is_empty());

    // Submitting again is answered locally.
    let again = controller.submit().await.unwrap();
    assert_eq!(again, result);
    assert_eq!(h.backend.calls_of(Operation::Submit).len(), 1);

    let err = controller.select_option(qid("q1"), oid("b")).unwrap_err();
    assert_eq!(err.disposition(), Disposition::FixInput);
}

#[tokio::test]
async fn failed_submit_keeps_state_and_can_be_retried() {
    let h = Harness::registered(1).await;
    let mut controller = h.resumed().await;
    controller.select_option(qid("q1"), oid("a")).unwrap();
    h.backend.fail_next(Operation::Submit, 1);

    let err = controller.submit().await.unwrap_err();
    assert!(matches!(err, SessionError::SubmitFailed { .. }));
    assert!(err.is_retryable());
    assert!(!controller.state().unwrap().is_completed());
    assert!(!h.raw.keys().await.unwrap().is_empty());

    let result = controller.submit().await.unwrap();
    assert_eq!(result.correct_count, 1);
    assert!(h.raw.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_inline_sync_fails_the_submit() {
    let h = Harness::registered(1).await;
    let mut controller = h.resumed().await;
    h.backend.fail_next(Operation::Update, 2);
    controller.select_option(qid("q1"), oid("b")).unwrap();

    let err = controller.submit().await.unwrap_err();
    assert!(matches!(err, SessionError::SubmitFailed { .. }));
    assert!(h.backend.calls_of(Operation::Submit).is_empty());
    assert_eq!(
        controller.state().unwrap().selected_option(&qid("q1")),
        Some(&oid("b"))
    );
}

#[tokio::test]
async fn inactive_attempt_redirects_without_fetching_history() {
    let h = Harness::registered(2).await;
    let mut snapshot = h.snapshots.load().await.unwrap().unwrap();
    snapshot.attempt_status = AttemptStatus::parse("SUBMITTED");
    h.snapshots.save(&snapshot).await.unwrap();

    let mut controller = h.controller();
    let err = controller.resume().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::SessionExpired(ExpiryReason::Inactive(AttemptStatus::Submitted))
    ));
    assert_eq!(err.disposition(), Disposition::RedirectToRegistration);
    assert!(h.backend.calls_of(Operation::History).is_empty());
    assert!(!controller.is_loaded());
}

#[tokio::test]
async fn missing_session_redirects() {
    let backend = InMemoryAttemptService::new(vec![(question(1), oid("a"))], fixed_clock());
    let snapshots = SnapshotStore::new(Arc::new(InMemorySessionStore::new()));
    let mut controller = QuizSessionController::new(Arc::new(backend.clone()), snapshots);

    let err = controller.resume().await.unwrap_err();
    assert!(matches!(err, SessionError::SessionExpired(ExpiryReason::Missing)));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn unreadable_session_redirects() {
    let raw = InMemorySessionStore::new();
    raw.set(storage::snapshot_store::SNAPSHOT_KEY, "{\"version\":7}")
        .await
        .unwrap();
    let backend = InMemoryAttemptService::new(vec![(question(1), oid("a"))], fixed_clock());
    let mut controller = QuizSessionController::new(
        Arc::new(backend.clone()),
        SnapshotStore::new(Arc::new(raw)),
    );

    let err = controller.resume().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::SessionExpired(ExpiryReason::Unreadable(_))
    ));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn history_failure_leaves_controller_unloaded() {
    let h = Harness::registered(2).await;
    h.backend.fail_next(Operation::History, 1);

    let mut controller = h.controller();
    let err = controller.resume().await.unwrap_err();
    assert!(matches!(err, SessionError::HistoryFetchFailed { .. }));
    assert_eq!(err.disposition(), Disposition::RedirectToRegistration);
    assert!(!controller.is_loaded());
    assert!(controller.select_option(qid("q1"), oid("a")).is_err());

    // No start time is recorded for a resume that never happened.
    let snapshot = h.snapshots.load().await.unwrap().unwrap();
    assert_eq!(snapshot.started_at_ms, None);

    controller.resume().await.unwrap();
    assert!(controller.is_loaded());
}

#[tokio::test]
async fn resume_merges_history_and_records_start_time() {
    let h = Harness::registered(3).await;
    h.backend
        .update_answer(&h.attempt_id, &qid("q2"), &oid("c"))
        .await
        .unwrap();

    let controller = h.resumed().await;
    let state = controller.state().unwrap();
    assert_eq!(state.current_index(), 0);
    assert_eq!(state.selected_option(&qid("q2")), Some(&oid("c")));
    assert_eq!(state.selected_option(&qid("q1")), None);
    assert!(controller.is_saved(&qid("q2")));
    assert_eq!(state.started_at(), fixed_now());

    let persisted = h.snapshots.load().await.unwrap().unwrap();
    assert_eq!(persisted.started_at(), Some(fixed_now()));

    let progress = controller.progress().unwrap();
    assert_eq!(progress.total, 3);
    assert_eq!(progress.answered, 1);
    assert_eq!(progress.unsynced, 0);
}

#[tokio::test]
async fn resume_keeps_a_persisted_start_time() {
    let h = Harness::registered(1).await;
    let earlier = fixed_now() - chrono::Duration::minutes(5);
    h.snapshots.set_started_at(earlier).await.unwrap();

    let mut controller = h.resumed().await;
    assert_eq!(controller.state().unwrap().started_at(), earlier);
    assert_eq!(controller.elapsed(), Some(chrono::Duration::minutes(5)));

    // A second resume is a no-op.
    let mark = h.backend.calls().len();
    controller.resume().await.unwrap();
    assert!(h.calls_since(mark).is_empty());
}

#[tokio::test]
async fn failed_background_sync_is_reported_and_retried_on_advance() {
    let h = Harness::registered(2).await;
    let mut controller = h.resumed().await;
    let mut notices = controller.notices().unwrap();
    assert!(controller.notices().is_none());

    h.backend.fail_next(Operation::Update, 1);
    controller.select_option(qid("q1"), oid("b")).unwrap();
    controller.flush().await;

    match notices.try_recv().unwrap() {
        SessionNotice::AnswerSyncFailed(err) => {
            assert!(matches!(err, SessionError::AnswerSyncFailed { .. }));
            assert_eq!(err.disposition(), Disposition::Warn);
        }
        other => panic!("unexpected notice: {other:?}"),
    }
    // Local selection survives the failure.
    assert_eq!(
        controller.state().unwrap().selected_option(&qid("q1")),
        Some(&oid("b"))
    );
    assert!(!controller.is_saved(&qid("q1")));
    assert_eq!(controller.progress().unwrap().unsynced, 1);

    controller.advance(Direction::Next).unwrap();
    controller.flush().await;

    assert!(matches!(
        notices.try_recv().unwrap(),
        SessionNotice::AnswerSaved { .. }
    ));
    assert!(controller.is_saved(&qid("q1")));
    assert_eq!(h.backend.recorded_answer(&h.attempt_id, &qid("q1")), Some(oid("b")));
    assert_eq!(h.backend.calls_of(Operation::Update).len(), 2);
}

#[tokio::test]
async fn advancing_past_a_synced_answer_sends_nothing() {
    let h = Harness::registered(2).await;
    let mut controller = h.resumed().await;
    controller.select_option(qid("q1"), oid("a")).unwrap();
    controller.flush().await;

    controller.advance(Direction::Next).unwrap();
    controller.advance(Direction::Previous).unwrap();
    controller.advance(Direction::Next).unwrap();
    controller.flush().await;

    assert_eq!(h.backend.calls_of(Operation::Update).len(), 1);
}

#[tokio::test]
async fn legacy_keys_are_resumable() {
    let backend = InMemoryAttemptService::new(vec![(question(1), oid("a"))], fixed_clock());
    let attempt_id = AttemptId::new("legacy-7").unwrap();
    backend.insert_attempt(
        attempt_id.clone(),
        StudentSnapshot::new(StudentId::new("s-9").unwrap(), "Grace Hopper"),
    );
    let raw = InMemorySessionStore::new();
    let questions = serde_json::to_string(&vec![question(1)]).unwrap();
    raw.set("attemptId", "legacy-7").await.unwrap();
    raw.set("attemptStatus", "active").await.unwrap();
    raw.set("quizQuestions", &questions).await.unwrap();

    let mut controller =
        QuizSessionController::new(Arc::new(backend), SnapshotStore::new(Arc::new(raw.clone())))
            .with_clock(fixed_clock());
    controller.resume().await.unwrap();

    assert_eq!(controller.state().unwrap().attempt_id(), &attempt_id);
    // Recording the start time rewrites the session in the current layout.
    let snapshot = SessionSnapshot::decode(
        &raw.get(storage::snapshot_store::SNAPSHOT_KEY)
            .await
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(snapshot.started_at(), Some(fixed_now()));
    assert_eq!(raw.keys().await.unwrap().len(), 1);
}

#[tokio::test]
async fn history_failure_on_legacy_keys_redirects() {
    let backend = InMemoryAttemptService::new(vec![(question(1), oid("a"))], fixed_clock());
    backend.insert_attempt(
        AttemptId::new("legacy-8").unwrap(),
        StudentSnapshot::new(StudentId::new("s-9").unwrap(), "Grace Hopper"),
    );
    backend.fail_next(Operation::History, 1);
    let raw = InMemorySessionStore::new();
    let questions = serde_json::to_string(&vec![question(1)]).unwrap();
    raw.set("attemptId", "legacy-8").await.unwrap();
    raw.set("attemptStatus", "ACTIVE").await.unwrap();
    raw.set("quizQuestions", &questions).await.unwrap();

    let mut controller = QuizSessionController::new(
        Arc::new(backend.clone()),
        SnapshotStore::new(Arc::new(raw.clone())),
    )
    .with_clock(fixed_clock());
    let err = controller.resume().await.unwrap_err();

    assert!(matches!(err, SessionError::HistoryFetchFailed { .. }));
    assert_eq!(err.disposition(), Disposition::RedirectToRegistration);
    assert!(!controller.is_loaded());
    assert_eq!(backend.calls_of(Operation::History).len(), 1);
    // The legacy layout is untouched and no start time was written.
    assert_eq!(
        raw.get(storage::snapshot_store::SNAPSHOT_KEY).await.unwrap(),
        None
    );
    assert_eq!(raw.keys().await.unwrap().len(), 3);
}

#[tokio::test]
async fn advancing_resends_the_unsaved_answer_it_leaves() {
    let h = Harness::registered(3).await;
    let mut controller = h.resumed().await;

    h.backend.fail_next(Operation::Update, 1);
    controller.select_option(qid("q1"), oid("a")).unwrap();
    controller.flush().await;
    assert!(!controller.is_saved(&qid("q1")));

    // Nothing retries q1 until the student moves away from it.
    let mark = h.backend.calls().len();
    controller.flush().await;
    assert!(h.calls_since(mark).is_empty());

    controller.advance(Direction::Next).unwrap();
    controller.flush().await;
    assert_eq!(
        h.calls_since(mark),
        vec![AttemptCall::Update(h.attempt_id.clone(), qid("q1"), oid("a"))]
    );
    assert!(controller.is_saved(&qid("q1")));

    controller.select_option(qid("q2"), oid("b")).unwrap();
    controller.advance(Direction::Next).unwrap();
    controller.flush().await;

    let mark = h.backend.calls().len();
    let err = controller.submit().await.unwrap_err();
    assert!(matches!(err, SessionError::IncompleteAttempt { .. }));
    assert!(h.calls_since(mark).is_empty());
}

#[tokio::test]
async fn dropping_the_controller_finishes_pending_syncs() {
    let h = Harness::registered(2).await;
    let mut controller = h.resumed().await;

    controller.select_option(qid("q1"), oid("a")).unwrap();
    controller.select_option(qid("q1"), oid("b")).unwrap();
    controller.advance(Direction::Next).unwrap();
    controller.select_option(qid("q2"), oid("c")).unwrap();
    drop(controller);

    for _ in 0..50 {
        if h.backend.calls_of(Operation::Update).len() == 3 {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert_eq!(h.backend.recorded_answer(&h.attempt_id, &qid("q1")), Some(oid("b")));
    assert_eq!(h.backend.recorded_answer(&h.attempt_id, &qid("q2")), Some(oid("c")));
    assert_eq!(h.backend.calls_of(Operation::Update).len(), 3);
}
