//! Per-kind correctness rules.
//!
//! Every rule is a pure function of the question and the recorded payload.
//! Malformed input never fails the caller: it scores as incorrect and logs.

use crate::model::{AnswerId, AnswerPayload, Question, QuestionKind};

/// Decides whether `payload` answers `question` correctly.
///
/// Single-answer kinds compare one selection against the flagged option;
/// grouped kinds require every sub-question to be answered correctly.
#[must_use]
pub fn is_correct(question: &Question, payload: &AnswerPayload) -> bool {
    match question.kind {
        QuestionKind::ImageDescription => image_description(question, payload),
        QuestionKind::AskAndAnswer => ask_and_answer(question, payload),
        QuestionKind::FillInBlank => fill_in_blank(question, payload),
        QuestionKind::ConversationPiece => conversation_piece(question, payload),
        QuestionKind::ShortTalk => short_talk(question, payload),
        QuestionKind::FillInParagraph => fill_in_paragraph(question, payload),
        QuestionKind::ReadAndUnderstand => read_and_understand(question, payload),
    }
}

/// Scores an optional answer; a missing answer is incorrect.
#[must_use]
pub fn evaluate(question: &Question, payload: Option<&AnswerPayload>) -> bool {
    payload.is_some_and(|p| is_correct(question, p))
}

/// True when the payload covers everything the question asks for.
///
/// For grouped kinds every sub-question needs a selection; having an entry
/// for the question alone is not enough.
#[must_use]
pub fn is_complete(question: &Question, payload: Option<&AnswerPayload>) -> bool {
    match payload {
        None => false,
        Some(AnswerPayload::Single(_)) => !question.kind.is_grouped(),
        Some(AnswerPayload::Grouped(map)) => {
            question.has_sub_questions()
                && question.questions.iter().all(|sub| map.contains_key(&sub.id))
        }
    }
}

pub fn image_description(question: &Question, payload: &AnswerPayload) -> bool {
    single_choice(question, payload)
}

pub fn ask_and_answer(question: &Question, payload: &AnswerPayload) -> bool {
    single_choice(question, payload)
}

pub fn fill_in_blank(question: &Question, payload: &AnswerPayload) -> bool {
    single_choice(question, payload)
}

pub fn conversation_piece(question: &Question, payload: &AnswerPayload) -> bool {
    all_sub_questions(question, payload)
}

pub fn short_talk(question: &Question, payload: &AnswerPayload) -> bool {
    all_sub_questions(question, payload)
}

pub fn fill_in_paragraph(question: &Question, payload: &AnswerPayload) -> bool {
    all_sub_questions(question, payload)
}

pub fn read_and_understand(question: &Question, payload: &AnswerPayload) -> bool {
    all_sub_questions(question, payload)
}

fn single_choice(question: &Question, payload: &AnswerPayload) -> bool {
    let AnswerPayload::Single(selected) = payload else {
        log::warn!(
            "question {} ({}) got a grouped answer; scoring as incorrect",
            question.id,
            question.kind
        );
        return false;
    };
    let Some(correct) = question.correct_answer() else {
        log::warn!(
            "question {} ({}) has no answer flagged correct",
            question.id,
            question.kind
        );
        return false;
    };
    selected == correct
}

fn all_sub_questions(question: &Question, payload: &AnswerPayload) -> bool {
    let AnswerPayload::Grouped(selections) = payload else {
        log::warn!(
            "question {} ({}) got a single answer; scoring as incorrect",
            question.id,
            question.kind
        );
        return false;
    };
    if !question.has_sub_questions() {
        log::warn!(
            "question {} ({}) has no sub-questions to score",
            question.id,
            question.kind
        );
        return false;
    }

    question.questions.iter().all(|sub| {
        let Some(correct) = sub.correct_answer() else {
            log::warn!(
                "sub-question {} of {} has no answer flagged correct",
                sub.id,
                question.id
            );
            return false;
        };
        selections.get(&sub.id).is_some_and(|selected: &AnswerId| selected == correct)
    })
}
