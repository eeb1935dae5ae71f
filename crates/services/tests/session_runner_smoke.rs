use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use exam_core::ConfigurationError;
use exam_core::model::{
    AnswerPayload, QuestionKind, RawQuestion, SessionConfig, SessionId, SessionMode, SessionResult,
};
use exam_core::time::fixed_now;
use services::{
    AnswerOutcome, ChannelListener, Clock, ExamServices, Navigation, NoopListener, SessionError,
    SessionEvent, SessionState, SubmitRequest,
};
use storage::repository::{
    InMemoryRepository, SessionResultRepository, SessionResultRow, Storage, StorageError,
};
use tokio::sync::mpsc;

fn raw_questions(count: usize) -> Vec<RawQuestion> {
    let items: Vec<String> = (1..=count)
        .map(|i| {
            format!(
                r#"{{"id": "q{i}", "type": "ASK_AND_ANSWER",
                    "answers": [{{"id": "a", "isCorrect": true}}, {{"id": "b"}}, {{"id": "c"}}]}}"#
            )
        })
        .collect();
    serde_json::from_str(&format!("[{}]", items.join(","))).unwrap()
}

fn services() -> ExamServices {
    ExamServices::in_memory(Clock::fixed(fixed_now()))
}

#[tokio::test(start_paused = true)]
async fn final_test_auto_submits_when_time_runs_out() {
    let services = services();
    let (tx, mut events) = mpsc::unbounded_channel();
    let (handle, join) = services
        .launch(
            raw_questions(3),
            SessionConfig::final_test(60).with_warning_thresholds(vec![10, 30, 300]),
            ChannelListener::new(tx),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(61)).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Submitted);
    assert_eq!(snapshot.timer.unwrap().remaining, 0);

    let id = handle.result_id().await.unwrap().expect("result stored");
    let stored = services.results().get_result(id).await.unwrap();
    assert_eq!(stored.correct_answers, 0);
    assert_eq!(stored.answered_questions, 0);
    assert_eq!(stored.passed, Some(false));

    handle.shutdown();
    let result = join.await.unwrap().expect("runner returns the result");
    assert_eq!(result, stored);

    let mut warnings = Vec::new();
    let mut completed = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::TimeWarning { remaining_secs } => warnings.push(remaining_secs),
            SessionEvent::Completed(_) => completed += 1,
            _ => {}
        }
    }
    assert_eq!(warnings, vec![30, 10]);
    assert_eq!(completed, 1);
}

#[tokio::test(start_paused = true)]
async fn pause_stops_the_countdown() {
    let services = services();
    let (handle, _join) = services
        .launch(raw_questions(2), SessionConfig::final_test(10), NoopListener)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert!(handle.pause().await.unwrap());

    tokio::time::sleep(Duration::from_secs(30)).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Paused);
    assert_eq!(snapshot.timer.unwrap().remaining, 7);
    assert_eq!(
        handle.answer(AnswerPayload::single("a")).await.unwrap(),
        AnswerOutcome::Rejected
    );

    assert!(handle.resume().await.unwrap());
    tokio::time::sleep(Duration::from_secs(8)).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Submitted);
}

#[tokio::test]
async fn explicit_submit_persists_once() {
    let services = services();
    let (handle, _join) = services
        .launch(raw_questions(2), SessionConfig::final_test(600), NoopListener)
        .unwrap();

    handle.answer(AnswerPayload::single("a")).await.unwrap();
    assert_eq!(
        handle.request_submit().await.unwrap(),
        SubmitRequest::ConfirmationRequired { unanswered: 1 }
    );
    assert_eq!(handle.next().await.unwrap(), Navigation::Moved(1));
    handle.answer(AnswerPayload::single("b")).await.unwrap();

    let result = handle.submit().await.unwrap();
    assert_eq!(result.correct_answers, 1);
    assert!((result.accuracy - 50.0).abs() < f64::EPSILON);
    assert_eq!(result.passed, Some(true));

    let err = handle.submit().await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadySubmitted));

    let rows = services
        .recent_results(Some(SessionMode::FinalTest), 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].result, result);
    assert_eq!(handle.result_id().await.unwrap(), Some(rows[0].id));
}

#[tokio::test]
async fn lesson_submits_from_the_last_question() {
    let services = services();
    let (handle, _join) = services
        .launch(raw_questions(2), SessionConfig::lesson(), NoopListener)
        .unwrap();

    assert_eq!(handle.next().await.unwrap(), Navigation::Blocked);
    assert_eq!(
        handle.answer(AnswerPayload::single("a")).await.unwrap(),
        AnswerOutcome::Checked { correct: true }
    );
    assert_eq!(handle.next().await.unwrap(), Navigation::Moved(1));
    assert_eq!(
        handle.answer(AnswerPayload::single("c")).await.unwrap(),
        AnswerOutcome::Checked { correct: false }
    );
    assert_eq!(handle.next().await.unwrap(), Navigation::Submitted);

    let id = handle.result_id().await.unwrap().expect("lesson result stored");
    let stored = services.results().get_result(id).await.unwrap();
    assert_eq!(stored.mode, SessionMode::Lesson);
    assert_eq!(stored.passed, None);
    assert_eq!(stored.correct_answers, 1);
}

#[tokio::test(start_paused = true)]
async fn exit_discards_pending_timeout() {
    let services = services();
    let (handle, _join) = services
        .launch(raw_questions(1), SessionConfig::final_test(2), NoopListener)
        .unwrap();
    let first_id = handle.snapshot().await.unwrap().session_id;

    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.exit().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::NotStarted);
    assert_eq!(snapshot.timer.unwrap().remaining, 2);
    assert_eq!(handle.result_id().await.unwrap(), None);
    assert!(services.recent_results(None, 10).await.unwrap().is_empty());

    assert!(handle.restart().await.unwrap());
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::InProgress);
    assert_ne!(snapshot.session_id, first_id);
}

/// Fails the first write, then delegates to memory.
#[derive(Default)]
struct FlakyRepository {
    failed_once: AtomicBool,
    inner: InMemoryRepository,
}

#[async_trait]
impl SessionResultRepository for FlakyRepository {
    async fn append_result(&self, result: &SessionResult) -> Result<i64, StorageError> {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(StorageError::Connection("disk unavailable".into()));
        }
        self.inner.append_result(result).await
    }

    async fn get_result(&self, id: i64) -> Result<SessionResult, StorageError> {
        self.inner.get_result(id).await
    }

    async fn find_by_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<SessionResultRow>, StorageError> {
        self.inner.find_by_session(session_id).await
    }

    async fn list_results(
        &self,
        mode: Option<SessionMode>,
        limit: u32,
    ) -> Result<Vec<SessionResultRow>, StorageError> {
        self.inner.list_results(mode, limit).await
    }
}

#[tokio::test]
async fn failed_write_can_be_retried() {
    let results: Arc<dyn SessionResultRepository> = Arc::new(FlakyRepository::default());
    let services = ExamServices::from_storage(Storage { results }, Clock::fixed(fixed_now()));
    let (handle, _join) = services
        .launch(raw_questions(1), SessionConfig::final_test(60), NoopListener)
        .unwrap();

    let err = handle.submit().await.unwrap_err();
    assert!(matches!(err, SessionError::Storage(_)));
    assert_eq!(
        handle.snapshot().await.unwrap().state,
        SessionState::Submitted
    );
    assert_eq!(handle.result_id().await.unwrap(), None);

    let id = handle.persist_result().await.unwrap();
    assert_eq!(id, Some(1));
    assert_eq!(handle.persist_result().await.unwrap(), Some(1));
}

#[tokio::test]
async fn invalid_set_is_rejected_before_spawning() {
    let err = services()
        .launch(Vec::new(), SessionConfig::lesson(), NoopListener)
        .unwrap_err();
    assert!(matches!(err, SessionError::Configuration(_)));
}

#[tokio::test]
async fn mismatched_shape_is_rejected_before_spawning() {
    let raw: Vec<RawQuestion> = serde_json::from_str(
        r#"[{"id": "q1", "type": "CONVERSATION_PIECE",
             "answers": [{"id": "a", "isCorrect": true}, {"id": "b"}]}]"#,
    )
    .unwrap();
    let err = services()
        .launch(raw, SessionConfig::lesson(), NoopListener)
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Configuration(ConfigurationError::ExpectedSubQuestions { .. })
    ));
}

#[tokio::test]
async fn handle_exposes_the_validated_questions() {
    let (handle, _join) = services()
        .launch(raw_questions(3), SessionConfig::lesson(), NoopListener)
        .unwrap();
    let ids: Vec<&str> = handle.questions().iter().map(|q| q.id.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2", "q3"]);
    assert_eq!(handle.questions()[0].kind, QuestionKind::AskAndAnswer);
}

#[tokio::test]
async fn calls_fail_after_shutdown() {
    let (handle, join) = services()
        .launch(raw_questions(1), SessionConfig::lesson(), NoopListener)
        .unwrap();
    handle.shutdown();
    assert!(join.await.unwrap().is_none());

    let err = handle.snapshot().await.unwrap_err();
    assert!(matches!(err, SessionError::RunnerClosed));
}
