//! Builds the immutable [`SessionResult`] at submission.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::evaluator;
use crate::model::{
    AnswerStore, Difficulty, Question, QuestionKind, QuestionStat, SessionConfig, SessionId,
    SessionMode, SessionResult, SessionStats,
};
use crate::time::elapsed_between;

/// Everything the aggregator reads. Borrowed from the session at submit time.
#[derive(Debug, Clone, Copy)]
pub struct ResultInput<'a> {
    pub session_id: SessionId,
    pub config: &'a SessionConfig,
    pub questions: &'a [Question],
    pub answers: &'a AnswerStore,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub paused: Duration,
}

/// Scores every question in order and derives the session totals.
#[must_use]
pub fn aggregate(input: ResultInput<'_>) -> SessionResult {
    let total_time_spent =
        elapsed_between(input.started_at, input.submitted_at).saturating_sub(input.paused);

    let question_stats: Vec<QuestionStat> = input
        .questions
        .iter()
        .map(|question| {
            let recorded = input.answers.get(&question.id);
            QuestionStat {
                question_id: question.id.clone(),
                kind: question.kind,
                answered: recorded.is_some(),
                correct: evaluator::evaluate(question, recorded.map(|a| &a.payload)),
                time_spent: recorded.map_or(Duration::ZERO, |a| a.time_spent),
                difficulty: Difficulty::Unrated,
            }
        })
        .collect();

    let total_questions = question_stats.len();
    let answered_questions = question_stats.iter().filter(|s| s.answered).count();
    let correct_answers = question_stats.iter().filter(|s| s.correct).count();
    let accuracy = percentage(correct_answers, total_questions);

    let passed = match input.config.mode() {
        SessionMode::FinalTest => Some(accuracy >= input.config.pass_threshold()),
        SessionMode::Lesson => None,
    };

    SessionResult {
        session_id: input.session_id,
        mode: input.config.mode(),
        started_at: input.started_at,
        submitted_at: input.submitted_at,
        total_questions,
        answered_questions,
        correct_answers,
        accuracy,
        passed,
        total_time_spent,
        type_accuracy: type_accuracy(&question_stats),
        stats: session_stats(&question_stats),
        question_stats,
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

fn type_accuracy(stats: &[QuestionStat]) -> BTreeMap<QuestionKind, f64> {
    QuestionKind::ALL
        .into_iter()
        .map(|kind| {
            let (total, correct) = stats
                .iter()
                .filter(|s| s.kind == kind)
                .fold((0, 0), |(t, c), s| (t + 1, c + usize::from(s.correct)));
            (kind, percentage(correct, total))
        })
        .collect()
}

/// Timing figures cover answered questions only; with none answered they are zero.
fn session_stats(stats: &[QuestionStat]) -> SessionStats {
    let times: Vec<Duration> = stats
        .iter()
        .filter(|s| s.answered)
        .map(|s| s.time_spent)
        .collect();

    let average_time = u32::try_from(times.len())
        .ok()
        .filter(|n| *n > 0)
        .map_or(Duration::ZERO, |n| times.iter().sum::<Duration>() / n);

    SessionStats {
        average_time,
        fastest_time: times.iter().min().copied().unwrap_or_default(),
        slowest_time: times.iter().max().copied().unwrap_or_default(),
        completion_rate: percentage(times.len(), stats.len()) / 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerOption, AnswerPayload, QuestionId, SubQuestion, UserAnswer};
    use crate::time::fixed_now;

    fn opts(correct: &str) -> Vec<AnswerOption> {
        ["a", "b", "c"]
            .into_iter()
            .map(|id| AnswerOption::new(id, id, id == correct))
            .collect()
    }

    fn record(store: &mut AnswerStore, q: &str, payload: AnswerPayload, secs: u64) {
        store.record(UserAnswer {
            question_id: QuestionId::new(q),
            payload,
            answered_at: fixed_now(),
            time_spent: Duration::from_secs(secs),
        });
    }

    fn input<'a>(
        config: &'a SessionConfig,
        questions: &'a [Question],
        answers: &'a AnswerStore,
    ) -> ResultInput<'a> {
        ResultInput {
            session_id: SessionId::generate(),
            config,
            questions,
            answers,
            started_at: fixed_now(),
            submitted_at: fixed_now() + chrono::Duration::seconds(100),
            paused: Duration::from_secs(20),
        }
    }

    #[test]
    fn mixed_set_scores_half() {
        let questions = vec![
            Question::single("q1", QuestionKind::AskAndAnswer, opts("a")),
            Question::grouped(
                "q2",
                QuestionKind::ShortTalk,
                vec![SubQuestion::new("s1", opts("b")), SubQuestion::new("s2", opts("c"))],
            ),
            Question::grouped(
                "q3",
                QuestionKind::ConversationPiece,
                vec![SubQuestion::new("t1", opts("a")), SubQuestion::new("t2", opts("a"))],
            ),
            Question::single("q4", QuestionKind::FillInBlank, opts("c")),
        ];
        let mut answers = AnswerStore::new();
        record(&mut answers, "q1", AnswerPayload::single("a"), 10);
        record(&mut answers, "q2", AnswerPayload::grouped([("s1", "b"), ("s2", "c")]), 30);
        record(&mut answers, "q3", AnswerPayload::grouped([("t1", "a"), ("t2", "b")]), 50);
        let config = SessionConfig::final_test(600);

        let result = aggregate(input(&config, &questions, &answers));

        assert_eq!(result.correct_answers, 2);
        assert_eq!(result.answered_questions, 3);
        assert!((result.accuracy - 50.0).abs() < f64::EPSILON);
        assert_eq!(result.passed, Some(true));
        assert_eq!(result.total_time_spent, Duration::from_secs(80));
        assert_eq!(result.question_stats[3].time_spent, Duration::ZERO);
        assert!(!result.question_stats[3].answered);
    }

    #[test]
    fn type_accuracy_reports_zero_for_absent_kinds() {
        let questions = vec![
            Question::single("q1", QuestionKind::AskAndAnswer, opts("a")),
            Question::single("q2", QuestionKind::AskAndAnswer, opts("a")),
        ];
        let mut answers = AnswerStore::new();
        record(&mut answers, "q1", AnswerPayload::single("a"), 5);
        let config = SessionConfig::lesson();

        let result = aggregate(input(&config, &questions, &answers));

        assert!((result.accuracy_for(QuestionKind::AskAndAnswer) - 50.0).abs() < f64::EPSILON);
        assert_eq!(result.type_accuracy.len(), QuestionKind::ALL.len());
        for kind in QuestionKind::ALL {
            assert!(!result.accuracy_for(kind).is_nan());
        }
        assert!(result.accuracy_for(QuestionKind::ShortTalk).abs() < f64::EPSILON);
        assert_eq!(result.passed, None);
    }

    #[test]
    fn timing_stats_cover_answered_questions() {
        let questions: Vec<_> = (1..=4)
            .map(|i| Question::single(format!("q{i}"), QuestionKind::ImageDescription, opts("a")))
            .collect();
        let mut answers = AnswerStore::new();
        record(&mut answers, "q1", AnswerPayload::single("a"), 10);
        record(&mut answers, "q2", AnswerPayload::single("b"), 20);
        record(&mut answers, "q3", AnswerPayload::single("a"), 60);
        let config = SessionConfig::lesson();

        let result = aggregate(input(&config, &questions, &answers));

        assert_eq!(result.stats.average_time, Duration::from_secs(30));
        assert_eq!(result.stats.fastest_time, Duration::from_secs(10));
        assert_eq!(result.stats.slowest_time, Duration::from_secs(60));
        assert!((result.stats.completion_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn failing_below_configured_threshold() {
        let questions = vec![
            Question::single("q1", QuestionKind::AskAndAnswer, opts("a")),
            Question::single("q2", QuestionKind::AskAndAnswer, opts("a")),
        ];
        let mut answers = AnswerStore::new();
        record(&mut answers, "q1", AnswerPayload::single("a"), 5);
        let config = SessionConfig::final_test(60).with_pass_threshold(70.0);

        let result = aggregate(input(&config, &questions, &answers));
        assert_eq!(result.passed, Some(false));
    }

    #[test]
    fn nothing_answered_gives_zero_stats() {
        let questions = vec![Question::single("q1", QuestionKind::FillInBlank, opts("a"))];
        let answers = AnswerStore::new();
        let config = SessionConfig::final_test(60);

        let result = aggregate(input(&config, &questions, &answers));

        assert_eq!(result.correct_answers, 0);
        assert_eq!(result.stats.average_time, Duration::ZERO);
        assert!(result.stats.completion_rate.abs() < f64::EPSILON);
        assert_eq!(result.passed, Some(false));
    }
}
