use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::GradingConfig;
use crate::error::ApiError;
use crate::metrics::{EXAMS_SUBMITTED_TOTAL, SESSIONS_ACTIVE, SESSIONS_TOTAL};
use crate::models::result::ExamResult;
use crate::models::timer::TimerSnapshot;
use crate::models::{ExamDefinition, Session, SessionStatus, SessionView};
use crate::services::grading;
use crate::services::question_bank::QuestionBank;
use crate::services::result_store::ResultStore;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// The single authority over exam attempt state. All mutations of one
/// session happen under that session's lock, so the Active -> Submitting
/// transition is atomic with the answers snapshot and submission happens
/// exactly once no matter how timer ticks and submit requests interleave.
pub struct SessionEngine {
    question_bank: Arc<dyn QuestionBank>,
    result_store: Arc<dyn ResultStore>,
    grading_config: GradingConfig,
    /// Bound on how long a duplicate submit waits for an in-flight pass.
    submit_wait: Duration,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

struct SessionHandle {
    inner: Mutex<Attempt>,
}

struct Attempt {
    session: Session,
    exam: Arc<ExamDefinition>,
    /// Frozen at the first Active -> Submitting transition and reused on
    /// retry, so a retried grading pass sees identical answers.
    snapshot: Option<HashMap<String, String>>,
    result_id: Option<String>,
    countdown: Option<JoinHandle<()>>,
}

impl SessionEngine {
    pub fn new(
        question_bank: Arc<dyn QuestionBank>,
        result_store: Arc<dyn ResultStore>,
        grading_config: GradingConfig,
        submit_wait: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            question_bank,
            result_store,
            grading_config,
            submit_wait,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Starts a new attempt: loads the exam, creates the session and spawns
    /// its countdown task.
    pub async fn start(
        self: &Arc<Self>,
        exam_id: &str,
        student_id: &str,
    ) -> Result<(String, Arc<ExamDefinition>, u32), ApiError> {
        let exam = self.question_bank.load_exam(exam_id).await?;
        if !exam.allows(student_id) {
            return Err(ApiError::Unauthorized(format!(
                "student {} has no access to exam {}",
                student_id, exam_id
            )));
        }

        let session_id = Uuid::new_v4().to_string();
        let remaining_seconds = exam.duration_seconds;
        let session = Session {
            id: session_id.clone(),
            exam_id: exam_id.to_string(),
            student_id: student_id.to_string(),
            started_at: Utc::now(),
            current_question_index: 0,
            answers: HashMap::new(),
            flagged: Default::default(),
            remaining_seconds,
            status: SessionStatus::Active,
        };

        let handle = Arc::new(SessionHandle {
            inner: Mutex::new(Attempt {
                session,
                exam: Arc::clone(&exam),
                snapshot: None,
                result_id: None,
                countdown: None,
            }),
        });

        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session_id.clone(), Arc::clone(&handle));
        }

        let countdown = self.spawn_countdown(session_id.clone());
        handle.inner.lock().await.countdown = Some(countdown);

        SESSIONS_TOTAL.with_label_values(&["created"]).inc();
        SESSIONS_ACTIVE.inc();
        tracing::info!(
            "Session created: {} for student {} on exam {}",
            session_id,
            student_id,
            exam_id
        );

        Ok((session_id, exam, remaining_seconds))
    }

    fn spawn_countdown(self: &Arc<Self>, session_id: String) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                if !engine.tick(&session_id).await {
                    break;
                }
            }
        })
    }

    /// One countdown step. Returns false when the session left Active (or
    /// no longer exists) and the countdown task should stop. A stale tick
    /// against a terminal session is a safe no-op.
    pub async fn tick(&self, session_id: &str) -> bool {
        let handle = match self.lookup(session_id).await {
            Ok(handle) => handle,
            Err(_) => return false,
        };
        let mut attempt = handle.inner.lock().await;

        if attempt.session.status != SessionStatus::Active {
            return false;
        }

        attempt.session.remaining_seconds = attempt.session.remaining_seconds.saturating_sub(1);
        if attempt.session.remaining_seconds > 0 {
            return true;
        }

        // Time is up. Finalize under the lock we already hold, so no user
        // action can slip in between the transition and the snapshot.
        tracing::info!("Session {} expired, auto-submitting", session_id);
        if let Err(err) = self.finalize(&mut attempt).await {
            tracing::warn!("Auto-submit for session {} failed: {}", session_id, err);
        }
        false
    }

    pub async fn view(&self, session_id: &str, student_id: &str) -> Result<SessionView, ApiError> {
        let handle = self.lookup(session_id).await?;
        let attempt = handle.inner.lock().await;
        authorize(&attempt, student_id)?;
        Ok(SessionView::from(&attempt.session))
    }

    /// Clock and answer progress under one lock; the SSE stream polls this.
    pub async fn timer_snapshot(
        &self,
        session_id: &str,
        student_id: &str,
    ) -> Result<TimerSnapshot, ApiError> {
        let handle = self.lookup(session_id).await?;
        let attempt = handle.inner.lock().await;
        authorize(&attempt, student_id)?;
        Ok(TimerSnapshot {
            status: attempt.session.status,
            remaining_seconds: attempt.session.remaining_seconds,
            total_seconds: attempt.exam.duration_seconds,
            answered_count: attempt.session.answers.len(),
            total_questions: attempt.exam.total_questions(),
        })
    }

    pub async fn go_to(
        &self,
        session_id: &str,
        student_id: &str,
        index: i64,
    ) -> Result<usize, ApiError> {
        let handle = self.lookup(session_id).await?;
        let mut attempt = handle.inner.lock().await;
        authorize(&attempt, student_id)?;
        require_active(&attempt)?;

        let index = checked_index(index, attempt.exam.total_questions())?;
        attempt.session.current_question_index = index;
        Ok(index)
    }

    pub async fn answer(
        &self,
        session_id: &str,
        student_id: &str,
        question_id: &str,
        value: String,
    ) -> Result<(), ApiError> {
        let handle = self.lookup(session_id).await?;
        let mut attempt = handle.inner.lock().await;
        authorize(&attempt, student_id)?;
        require_active(&attempt)?;

        if attempt.exam.question(question_id).is_none() {
            return Err(ApiError::UnknownQuestion(question_id.to_string()));
        }

        // Overwrites any earlier answer for the same question.
        attempt
            .session
            .answers
            .insert(question_id.to_string(), value);

        crate::metrics::ANSWERS_RECORDED_TOTAL
            .with_label_values(&[attempt.session.exam_id.as_str()])
            .inc();
        Ok(())
    }

    /// Flags are advisory only; they never block submission or affect
    /// grading.
    pub async fn toggle_flag(
        &self,
        session_id: &str,
        student_id: &str,
        index: i64,
    ) -> Result<bool, ApiError> {
        let handle = self.lookup(session_id).await?;
        let mut attempt = handle.inner.lock().await;
        authorize(&attempt, student_id)?;
        require_active(&attempt)?;

        let index = checked_index(index, attempt.exam.total_questions())?;
        let flagged = if attempt.session.flagged.remove(&index) {
            false
        } else {
            attempt.session.flagged.insert(index);
            true
        };
        Ok(flagged)
    }

    /// Idempotent submission entry point. The first call grades and
    /// persists; concurrent calls wait (bounded) on the session lock and
    /// then resolve to the already-computed result id; calls after a store
    /// failure retry the pass on the frozen snapshot.
    pub async fn submit(&self, session_id: &str, student_id: &str) -> Result<String, ApiError> {
        let handle = self.lookup(session_id).await?;
        let mut attempt = tokio::time::timeout(self.submit_wait, handle.inner.lock())
            .await
            .map_err(|_| ApiError::Timeout(session_id.to_string()))?;
        authorize(&attempt, student_id)?;

        match attempt.session.status {
            SessionStatus::Submitted => attempt
                .result_id
                .clone()
                .ok_or_else(|| ApiError::InvalidState("submitted without result".to_string())),
            SessionStatus::Submitting => {
                Err(ApiError::AlreadyInProgress(session_id.to_string()))
            }
            SessionStatus::Active | SessionStatus::Failed => {
                let result_id = self.finalize(&mut attempt).await?;
                // Manual submit cancels the countdown; the expiry path lets
                // its own task run off the end instead.
                if let Some(task) = attempt.countdown.take() {
                    task.abort();
                }
                Ok(result_id)
            }
        }
    }

    /// Drops a terminal session from the registry once the caller is done
    /// with it. The Result itself lives on in the result store.
    pub async fn discard(&self, session_id: &str, student_id: &str) -> Result<(), ApiError> {
        let handle = self.lookup(session_id).await?;
        {
            let attempt = handle.inner.lock().await;
            authorize(&attempt, student_id)?;
            if !attempt.session.status.is_terminal() {
                return Err(ApiError::InvalidState(
                    "session is still in progress".to_string(),
                ));
            }
        }
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }

    /// Grades the frozen snapshot and persists the result. Caller holds the
    /// session lock; status on return is Submitted or Failed.
    async fn finalize(&self, attempt: &mut Attempt) -> Result<String, ApiError> {
        let was_active = attempt.session.status == SessionStatus::Active;
        attempt.session.status = SessionStatus::Submitting;
        if was_active {
            SESSIONS_ACTIVE.dec();
        }

        let snapshot = attempt
            .snapshot
            .get_or_insert_with(|| attempt.session.answers.clone())
            .clone();

        let sheet = match grading::grade(&attempt.exam, &snapshot, &self.grading_config) {
            Ok(sheet) => sheet,
            Err(err) => {
                // Engine bug, not recoverable within this session.
                attempt.session.status = SessionStatus::Failed;
                EXAMS_SUBMITTED_TOTAL
                    .with_label_values(&["grading_failed"])
                    .inc();
                tracing::error!(
                    "Grading failed for session {}: {}",
                    attempt.session.id,
                    err
                );
                return Err(err);
            }
        };

        let result = ExamResult {
            id: Uuid::new_v4().to_string(),
            exam_id: attempt.session.exam_id.clone(),
            exam_title: attempt.exam.title.clone(),
            student_id: attempt.session.student_id.clone(),
            completed_at: Utc::now(),
            duration_seconds: attempt.exam.duration_seconds,
            time_taken_seconds: attempt
                .exam
                .duration_seconds
                .saturating_sub(attempt.session.remaining_seconds),
            sheet,
        };

        let store = Arc::clone(&self.result_store);
        let persisted = retry_async_with_config(RetryConfig::default(), || async {
            store.persist(&result).await
        })
        .await;

        if let Err(err) = persisted {
            attempt.session.status = SessionStatus::Failed;
            SESSIONS_TOTAL.with_label_values(&["failed"]).inc();
            EXAMS_SUBMITTED_TOTAL
                .with_label_values(&["store_failed"])
                .inc();
            tracing::warn!(
                "Result store rejected result for session {}: {}",
                attempt.session.id,
                err
            );
            return Err(ApiError::StoreUnavailable(err.to_string()));
        }

        attempt.session.status = SessionStatus::Submitted;
        attempt.result_id = Some(result.id.clone());
        SESSIONS_TOTAL.with_label_values(&["submitted"]).inc();
        EXAMS_SUBMITTED_TOTAL
            .with_label_values(&["submitted"])
            .inc();
        tracing::info!(
            "Session {} submitted, result {} ({} / {} marks)",
            attempt.session.id,
            result.id,
            result.sheet.obtained_marks,
            result.sheet.total_marks
        );

        Ok(result.id)
    }

    async fn lookup(&self, session_id: &str) -> Result<Arc<SessionHandle>, ApiError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("session {}", session_id)))
    }
}

fn authorize(attempt: &Attempt, student_id: &str) -> Result<(), ApiError> {
    if attempt.session.student_id != student_id {
        return Err(ApiError::Unauthorized(
            "session belongs to another student".to_string(),
        ));
    }
    Ok(())
}

fn require_active(attempt: &Attempt) -> Result<(), ApiError> {
    match attempt.session.status {
        SessionStatus::Active => Ok(()),
        status => Err(ApiError::InvalidState(format!(
            "session is {:?}",
            status
        ))),
    }
}

fn checked_index(index: i64, question_count: usize) -> Result<usize, ApiError> {
    if index < 0 || index as usize >= question_count {
        return Err(ApiError::OutOfRange(format!(
            "index {} not in [0, {})",
            index, question_count
        )));
    }
    Ok(index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exam::{AnswerKind, Question};
    use crate::services::question_bank::InMemoryQuestionBank;
    use crate::services::result_store::InMemoryResultStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn question(id: &str, correct: &str) -> Question {
        Question {
            id: id.to_string(),
            prompt: format!("prompt {}", id),
            options: vec![correct.to_string(), "other".to_string()],
            kind: AnswerKind::SingleChoice,
            correct_answer: correct.to_string(),
            marks: 10,
            subject: "Algebra".to_string(),
            difficulty: "Easy".to_string(),
            explanation: None,
        }
    }

    fn exam(id: &str, duration_seconds: u32, questions: Vec<Question>) -> ExamDefinition {
        ExamDefinition {
            id: id.to_string(),
            title: format!("Exam {}", id),
            duration_seconds,
            instructions: vec![],
            questions,
            restricted_to: None,
        }
    }

    async fn engine_with(
        exams: Vec<ExamDefinition>,
        store: Arc<dyn ResultStore>,
    ) -> Arc<SessionEngine> {
        let bank = InMemoryQuestionBank::new();
        for exam in exams {
            bank.insert(exam).await;
        }
        SessionEngine::new(
            Arc::new(bank),
            store,
            crate::config::GradingConfig::default(),
            Duration::from_secs(5),
        )
    }

    /// Counts persist calls so exactly-once grading is observable.
    struct CountingStore {
        inner: InMemoryResultStore,
        persists: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryResultStore::new(),
                persists: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ResultStore for CountingStore {
        async fn persist(&self, result: &ExamResult) -> Result<(), ApiError> {
            self.persists.fetch_add(1, Ordering::SeqCst);
            self.inner.persist(result).await
        }

        async fn fetch(&self, result_id: &str) -> Result<ExamResult, ApiError> {
            self.inner.fetch(result_id).await
        }
    }

    /// Fails the first `failures` persists with StoreUnavailable.
    struct FlakyStore {
        inner: InMemoryResultStore,
        failures: AtomicUsize,
    }

    impl FlakyStore {
        fn failing(failures: usize) -> Self {
            Self {
                inner: InMemoryResultStore::new(),
                failures: AtomicUsize::new(failures),
            }
        }
    }

    #[async_trait]
    impl ResultStore for FlakyStore {
        async fn persist(&self, result: &ExamResult) -> Result<(), ApiError> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ApiError::StoreUnavailable("injected failure".to_string()));
            }
            self.inner.persist(result).await
        }

        async fn fetch(&self, result_id: &str) -> Result<ExamResult, ApiError> {
            self.inner.fetch(result_id).await
        }
    }

    /// Blocks `persist` until released, keeping a finalize pass observable
    /// mid-flight.
    struct GatedStore {
        inner: InMemoryResultStore,
        entered: std::sync::atomic::AtomicBool,
        release: tokio::sync::Notify,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: InMemoryResultStore::new(),
                entered: std::sync::atomic::AtomicBool::new(false),
                release: tokio::sync::Notify::new(),
            }
        }
    }

    #[async_trait]
    impl ResultStore for GatedStore {
        async fn persist(&self, result: &ExamResult) -> Result<(), ApiError> {
            self.entered.store(true, Ordering::SeqCst);
            self.release.notified().await;
            self.inner.persist(result).await
        }

        async fn fetch(&self, result_id: &str) -> Result<ExamResult, ApiError> {
            self.inner.fetch(result_id).await
        }
    }

    #[tokio::test]
    async fn start_unknown_exam_is_not_found() {
        let engine = engine_with(vec![], Arc::new(InMemoryResultStore::new())).await;
        let err = engine.start("missing", "stu-1").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn restricted_exam_rejects_unlisted_student() {
        let mut restricted = exam("e1", 600, vec![question("q1", "A")]);
        restricted.restricted_to = Some(vec!["stu-1".to_string()]);
        let engine = engine_with(vec![restricted], Arc::new(InMemoryResultStore::new())).await;

        assert!(engine.start("e1", "stu-1").await.is_ok());
        let err = engine.start("e1", "stu-2").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn navigation_is_bounds_checked_and_state_preserving() {
        let engine = engine_with(
            vec![exam("e1", 600, vec![question("q1", "A"), question("q2", "B")])],
            Arc::new(InMemoryResultStore::new()),
        )
        .await;
        let (sid, _, _) = engine.start("e1", "stu-1").await.unwrap();

        assert_eq!(engine.go_to(&sid, "stu-1", 1).await.unwrap(), 1);

        let err = engine.go_to(&sid, "stu-1", -1).await.unwrap_err();
        assert!(matches!(err, ApiError::OutOfRange(_)));
        let err = engine.go_to(&sid, "stu-1", 2).await.unwrap_err();
        assert!(matches!(err, ApiError::OutOfRange(_)));

        // failed navigation left the index unchanged
        let view = engine.view(&sid, "stu-1").await.unwrap();
        assert_eq!(view.current_question_index, 1);
    }

    #[tokio::test]
    async fn answer_rejects_foreign_question_ids() {
        let engine = engine_with(
            vec![exam("e1", 600, vec![question("q1", "A")])],
            Arc::new(InMemoryResultStore::new()),
        )
        .await;
        let (sid, _, _) = engine.start("e1", "stu-1").await.unwrap();

        let err = engine
            .answer(&sid, "stu-1", "q-foreign", "A".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnknownQuestion(_)));
    }

    #[tokio::test]
    async fn answers_overwrite_and_flags_toggle() {
        let engine = engine_with(
            vec![exam("e1", 600, vec![question("q1", "A")])],
            Arc::new(InMemoryResultStore::new()),
        )
        .await;
        let (sid, _, _) = engine.start("e1", "stu-1").await.unwrap();

        engine
            .answer(&sid, "stu-1", "q1", "other".to_string())
            .await
            .unwrap();
        engine
            .answer(&sid, "stu-1", "q1", "A".to_string())
            .await
            .unwrap();
        let view = engine.view(&sid, "stu-1").await.unwrap();
        assert_eq!(view.answers["q1"], "A");
        assert_eq!(view.answered_count, 1);

        let snapshot = engine.timer_snapshot(&sid, "stu-1").await.unwrap();
        assert_eq!(snapshot.answered_count, 1);
        assert_eq!(snapshot.total_questions, 1);

        assert!(engine.toggle_flag(&sid, "stu-1", 0).await.unwrap());
        assert!(!engine.toggle_flag(&sid, "stu-1", 0).await.unwrap());
    }

    #[tokio::test]
    async fn session_operations_check_the_acting_student() {
        let engine = engine_with(
            vec![exam("e1", 600, vec![question("q1", "A")])],
            Arc::new(InMemoryResultStore::new()),
        )
        .await;
        let (sid, _, _) = engine.start("e1", "stu-1").await.unwrap();

        let err = engine.view(&sid, "stu-2").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
        let err = engine.submit(&sid, "stu-2").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn concurrent_submits_yield_one_result() {
        let store = Arc::new(CountingStore::new());
        let engine = engine_with(
            vec![exam("e1", 600, vec![question("q1", "A")])],
            store.clone() as Arc<dyn ResultStore>,
        )
        .await;
        let (sid, _, _) = engine.start("e1", "stu-1").await.unwrap();
        engine
            .answer(&sid, "stu-1", "q1", "A".to_string())
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            let sid = sid.clone();
            tasks.push(tokio::spawn(
                async move { engine.submit(&sid, "stu-1").await },
            ));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }

        assert_eq!(store.persists.load(Ordering::SeqCst), 1);
        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn tick_to_zero_submits_and_stale_ticks_are_noops() {
        let store = Arc::new(CountingStore::new());
        let engine = engine_with(
            vec![exam("e1", 2, vec![question("q1", "A")])],
            store.clone() as Arc<dyn ResultStore>,
        )
        .await;
        let (sid, _, _) = engine.start("e1", "stu-1").await.unwrap();

        assert!(engine.tick(&sid).await);
        assert!(!engine.tick(&sid).await); // hits zero, auto-submits

        let view = engine.view(&sid, "stu-1").await.unwrap();
        assert_eq!(view.status, SessionStatus::Submitted);
        assert_eq!(view.remaining_seconds, 0);

        // a timer firing late against the terminal session does nothing
        assert!(!engine.tick(&sid).await);
        assert_eq!(store.persists.load(Ordering::SeqCst), 1);

        // manual submit after expiry resolves to the same result
        let result_id = engine.submit(&sid, "stu-1").await.unwrap();
        assert_eq!(store.persists.load(Ordering::SeqCst), 1);
        assert!(store.fetch(&result_id).await.is_ok());
    }

    #[tokio::test]
    async fn timer_and_manual_submit_race_grades_once() {
        let store = Arc::new(CountingStore::new());
        let engine = engine_with(
            vec![exam("e1", 1, vec![question("q1", "A")])],
            store.clone() as Arc<dyn ResultStore>,
        )
        .await;
        let (sid, _, _) = engine.start("e1", "stu-1").await.unwrap();

        let tick_engine = Arc::clone(&engine);
        let tick_sid = sid.clone();
        let ticker = tokio::spawn(async move { tick_engine.tick(&tick_sid).await });
        let submit = engine.submit(&sid, "stu-1");

        let (_, submitted) = tokio::join!(ticker, submit);
        // whichever path lost the race resolved as a no-op
        assert_eq!(store.persists.load(Ordering::SeqCst), 1);
        if let Ok(result_id) = submitted {
            assert!(store.fetch(&result_id).await.is_ok());
        }
    }

    #[tokio::test]
    async fn answer_racing_finalize_is_rejected_not_dropped() {
        let store = Arc::new(GatedStore::new());
        let engine = engine_with(
            vec![exam("e1", 600, vec![question("q1", "A"), question("q2", "B")])],
            store.clone() as Arc<dyn ResultStore>,
        )
        .await;
        let (sid, _, _) = engine.start("e1", "stu-1").await.unwrap();
        engine
            .answer(&sid, "stu-1", "q1", "A".to_string())
            .await
            .unwrap();

        let submit_engine = Arc::clone(&engine);
        let submit_sid = sid.clone();
        let submitting =
            tokio::spawn(async move { submit_engine.submit(&submit_sid, "stu-1").await });

        // wait until finalize has frozen the snapshot and reached the store
        while !store.entered.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        let answer_engine = Arc::clone(&engine);
        let answer_sid = sid.clone();
        let answering = tokio::spawn(async move {
            answer_engine
                .answer(&answer_sid, "stu-1", "q2", "B".to_string())
                .await
        });
        // let the answer call queue up on the session lock, then unblock
        // the store
        tokio::task::yield_now().await;
        store.release.notify_one();

        let result_id = submitting.await.unwrap().unwrap();
        let err = answering.await.unwrap().unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));

        // the racing answer was rejected, never folded into the graded result
        let result = store.fetch(&result_id).await.unwrap();
        assert_eq!(result.sheet.correct_answers, 1);
        let q2 = result
            .sheet
            .question_results
            .iter()
            .find(|q| q.question_id == "q2")
            .unwrap();
        assert!(q2.student_answer.is_none());
    }

    #[tokio::test]
    async fn answers_after_submission_fail_with_invalid_state() {
        let engine = engine_with(
            vec![exam("e1", 600, vec![question("q1", "A")])],
            Arc::new(InMemoryResultStore::new()),
        )
        .await;
        let (sid, _, _) = engine.start("e1", "stu-1").await.unwrap();
        engine.submit(&sid, "stu-1").await.unwrap();

        let err = engine
            .answer(&sid, "stu-1", "q1", "A".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
        let err = engine.go_to(&sid, "stu-1", 0).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[tokio::test]
    async fn store_failure_leaves_session_failed_and_retryable() {
        // default retry makes 5 attempts per finalize; fail them all once
        let store = Arc::new(FlakyStore::failing(5));
        let engine = engine_with(
            vec![exam("e1", 600, vec![question("q1", "A")])],
            store.clone() as Arc<dyn ResultStore>,
        )
        .await;
        let (sid, _, _) = engine.start("e1", "stu-1").await.unwrap();
        engine
            .answer(&sid, "stu-1", "q1", "A".to_string())
            .await
            .unwrap();

        let err = engine.submit(&sid, "stu-1").await.unwrap_err();
        assert!(matches!(err, ApiError::StoreUnavailable(_)));
        assert!(err.is_retryable());
        let view = engine.view(&sid, "stu-1").await.unwrap();
        assert_eq!(view.status, SessionStatus::Failed);

        // retry re-enters the submission path and grades the same snapshot
        let result_id = engine.submit(&sid, "stu-1").await.unwrap();
        let result = store.fetch(&result_id).await.unwrap();
        assert_eq!(result.sheet.obtained_marks, 10);
        let view = engine.view(&sid, "stu-1").await.unwrap();
        assert_eq!(view.status, SessionStatus::Submitted);
    }

    #[tokio::test]
    async fn zero_question_exam_submits_cleanly() {
        let store = Arc::new(InMemoryResultStore::new());
        let engine = engine_with(
            vec![exam("empty", 600, vec![])],
            store.clone() as Arc<dyn ResultStore>,
        )
        .await;
        let (sid, _, _) = engine.start("empty", "stu-1").await.unwrap();

        let result_id = engine.submit(&sid, "stu-1").await.unwrap();
        let result = store.fetch(&result_id).await.unwrap();
        assert_eq!(result.sheet.total_marks, 0);
        assert_eq!(result.sheet.percentage, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_expiry_auto_submits() {
        let store = Arc::new(CountingStore::new());
        let engine = engine_with(
            vec![exam("e1", 3, vec![question("q1", "A")])],
            store.clone() as Arc<dyn ResultStore>,
        )
        .await;
        let (sid, _, _) = engine.start("e1", "stu-1").await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;

        let view = engine.view(&sid, "stu-1").await.unwrap();
        assert_eq!(view.status, SessionStatus::Submitted);
        assert_eq!(store.persists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn discard_removes_only_terminal_sessions() {
        let engine = engine_with(
            vec![exam("e1", 600, vec![question("q1", "A")])],
            Arc::new(InMemoryResultStore::new()),
        )
        .await;
        let (sid, _, _) = engine.start("e1", "stu-1").await.unwrap();

        let err = engine.discard(&sid, "stu-1").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));

        engine.submit(&sid, "stu-1").await.unwrap();
        engine.discard(&sid, "stu-1").await.unwrap();
        let err = engine.view(&sid, "stu-1").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
