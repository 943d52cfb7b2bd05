use std::collections::HashSet;

use serde_json::Value;

use crate::extract::{extract_json, normalize_quotes, strip_code_fence};
use crate::models::{QuizItem, RankedSection, TestPayload};
use crate::quality;
use crate::synthesis;

const MIN_QUESTION_CHARS: usize = 10;
const MIN_THEORY_CHARS: usize = 50;

/// Per-request repair progression. Terminal state is always `Done` with
/// a structurally valid payload; nothing in this module returns an error
/// to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Extracting,
    Extracted,
    ExtractionFailed,
    Validating,
    QualityOk,
    QualityLow,
    Synthesizing,
    Done,
}

fn trace_stage(flow: &'static str, stage: Stage) {
    tracing::debug!(flow, stage = ?stage, "repair pipeline");
}

/// Parse a full-test reply into repaired theory + validated questions.
/// `None` means extraction failed outright and the caller should
/// synthesize the whole payload from the ranked sections.
pub fn repair_full_test(
    raw: &str,
    topic: &str,
    ranked: &[RankedSection],
) -> Option<(String, Vec<QuizItem>)> {
    trace_stage("full_test", Stage::Received);
    trace_stage("full_test", Stage::Extracting);

    let cleaned = normalize_quotes(&strip_code_fence(raw));
    let Some(value) = extract_json(&cleaned) else {
        trace_stage("full_test", Stage::ExtractionFailed);
        return None;
    };
    trace_stage("full_test", Stage::Extracted);
    trace_stage("full_test", Stage::Validating);

    let theory = value
        .get("theory")
        .or_else(|| value.get("explanation"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    let theory = if theory.chars().count() < MIN_THEORY_CHARS
        || !quality::is_grounded(theory, ranked)
    {
        trace_stage("full_test", Stage::QualityLow);
        trace_stage("full_test", Stage::Synthesizing);
        synthesis::fallback_theory(topic, ranked)
    } else {
        trace_stage("full_test", Stage::QualityOk);
        theory.to_string()
    };

    let questions: Vec<QuizItem> = value
        .get("questions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| repair_question(item, index, ranked))
                .collect()
        })
        .unwrap_or_default();

    Some((theory, questions))
}

/// Pad with synthesized questions or truncate so the payload holds
/// exactly `question_count` entries, then renumber.
pub fn finalize_test(
    topic: &str,
    theory: String,
    mut questions: Vec<QuizItem>,
    ranked: &[RankedSection],
    question_count: usize,
) -> TestPayload {
    if questions.len() < question_count {
        trace_stage("full_test", Stage::Synthesizing);
        while questions.len() < question_count {
            questions.push(synthesis::fallback_question(questions.len(), topic, ranked));
        }
    }
    questions.truncate(question_count);

    for (index, question) in questions.iter_mut().enumerate() {
        question.id = index;
    }

    trace_stage("full_test", Stage::Done);
    TestPayload {
        topic: topic.to_string(),
        theory,
        questions,
    }
}

/// Parse a lesson reply into (explanation, optional quiz). Never fails:
/// a reply that defeats the extraction chain yields synthesized content.
pub fn repair_lesson(
    raw: &str,
    topic: &str,
    ranked: &[RankedSection],
) -> (String, Option<QuizItem>) {
    trace_stage("lesson", Stage::Received);
    trace_stage("lesson", Stage::Extracting);

    let cleaned = normalize_quotes(&strip_code_fence(raw));
    let Some(value) = extract_json(&cleaned) else {
        trace_stage("lesson", Stage::ExtractionFailed);
        trace_stage("lesson", Stage::Synthesizing);
        trace_stage("lesson", Stage::Done);
        return (
            synthesis::fallback_theory(topic, ranked),
            Some(synthesis::fallback_quiz(topic, ranked)),
        );
    };
    trace_stage("lesson", Stage::Extracted);
    trace_stage("lesson", Stage::Validating);

    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    let explanation = if explanation.is_empty() || !quality::is_grounded(explanation, ranked) {
        trace_stage("lesson", Stage::QualityLow);
        trace_stage("lesson", Stage::Synthesizing);
        synthesis::fallback_theory(topic, ranked)
    } else {
        trace_stage("lesson", Stage::QualityOk);
        explanation.to_string()
    };

    let quiz = match value.get("quiz") {
        None | Some(Value::Null) => None,
        Some(quiz_value) => Some(
            repair_question(quiz_value, 0, ranked)
                .unwrap_or_else(|| synthesis::fallback_quiz(topic, ranked)),
        ),
    };

    trace_stage("lesson", Stage::Done);
    (explanation, quiz)
}

/// Parse a question-batch reply. An unusable reply is just an empty
/// batch; the caller decides whether to retry.
pub fn parse_question_batch(raw: &str, ranked: &[RankedSection]) -> Vec<QuizItem> {
    let cleaned = normalize_quotes(&strip_code_fence(raw));
    let Some(value) = extract_json(&cleaned) else {
        return vec![];
    };

    value
        .get("questions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| repair_question(item, index, ranked))
                .collect()
        })
        .unwrap_or_default()
}

/// Validate and repair one question object. Returns `None` when the
/// object is beyond repair: no usable question text, or a question the
/// quality gate rejects as trivial. Everything else is fixed in place:
/// options forced to four distinct entries, the answer index forced in
/// range, a missing explanation replaced with a source reference.
pub fn repair_question(value: &Value, id: usize, ranked: &[RankedSection]) -> Option<QuizItem> {
    let object = value.as_object()?;

    let question = object
        .get("question")
        .and_then(Value::as_str)
        .map(str::trim)?
        .to_string();

    if question.chars().count() < MIN_QUESTION_CHARS || !quality::is_meaningful_question(&question)
    {
        return None;
    }

    let options = repair_options(object.get("options")).unwrap_or_else(placeholder_options);

    let correct_answer = object
        .get("correct_answer")
        .and_then(Value::as_i64)
        .filter(|answer| (0..=3).contains(answer))
        .unwrap_or(0) as usize;

    let explanation = object
        .get("explanation")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_explanation(ranked));

    Some(QuizItem {
        id,
        question,
        options,
        correct_answer,
        explanation,
    })
}

/// The structural invariant every repaired item satisfies.
pub fn quiz_item_is_valid(item: &QuizItem) -> bool {
    item.options.len() == 4
        && item.correct_answer < item.options.len()
        && item.options.iter().collect::<HashSet<_>>().len() >= 3
        && item.question.trim().chars().count() >= MIN_QUESTION_CHARS
        && !item.explanation.trim().is_empty()
}

fn repair_options(value: Option<&Value>) -> Option<Vec<String>> {
    let mut options: Vec<String> = value?
        .as_array()?
        .iter()
        .filter_map(|option| option.as_str())
        .map(|option| option.trim().to_string())
        .collect();

    options.truncate(4);
    if options.len() != 4 {
        return None;
    }

    let unique: HashSet<&String> = options.iter().collect();
    if unique.len() < 3 {
        return None;
    }

    Some(options)
}

fn placeholder_options() -> Vec<String> {
    vec![
        "Вариант 1".to_string(),
        "Вариант 2".to_string(),
        "Вариант 3".to_string(),
        "Вариант 4".to_string(),
    ]
}

fn default_explanation(ranked: &[RankedSection]) -> String {
    match ranked.first() {
        Some(section) => {
            let page = section
                .page
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!(
                "Объяснение основано на разделе \"{}\" (стр. {page}) руководства.",
                section.title
            )
        }
        None => "Объяснение основано на материалах руководства.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sections() -> Vec<RankedSection> {
        vec![RankedSection {
            score: 35,
            title: "Страница 3".to_string(),
            content: "Компьютер обрабатывает информацию и помогает решать задачи. \
                      Монитор отображает результат работы программы пользователя. \
                      Клавиатура и мышь позволяют управлять процессами."
                .to_string(),
            page: Some(3),
        }]
    }

    #[test]
    fn out_of_range_answer_resets_to_zero() {
        let value = json!({
            "question": "Что рекомендуется делать при работе с паролями?",
            "options": ["Хранить в менеджере", "Записывать на стикер", "Сообщать друзьям", "Использовать один"],
            "correct_answer": 7,
            "explanation": "Менеджер паролей безопаснее."
        });

        let item = repair_question(&value, 0, &sections()).expect("item");
        assert_eq!(item.correct_answer, 0);
    }

    #[test]
    fn extra_options_are_truncated() {
        let value = json!({
            "question": "Что рекомендуется делать при сбоях программы?",
            "options": ["Перезапустить", "Подождать", "Обновить", "Переустановить", "Паниковать"],
            "correct_answer": 2
        });

        let item = repair_question(&value, 1, &sections()).expect("item");
        assert_eq!(item.options.len(), 4);
        assert_eq!(item.correct_answer, 2);
    }

    #[test]
    fn degenerate_options_become_placeholders() {
        let value = json!({
            "question": "Что рекомендуется делать при работе с файлами?",
            "options": ["Да", "Да", "Да", "Нет"],
            "correct_answer": 1
        });

        let item = repair_question(&value, 0, &sections()).expect("item");
        assert_eq!(item.options, placeholder_options());
    }

    #[test]
    fn missing_explanation_references_source_section() {
        let value = json!({
            "question": "Что рекомендуется делать при работе с монитором?",
            "options": ["А", "Б", "В", "Г"],
            "correct_answer": 0
        });

        let item = repair_question(&value, 0, &sections()).expect("item");
        assert!(item.explanation.contains("Страница 3"));
        assert!(item.explanation.contains("стр. 3"));
    }

    #[test]
    fn trivial_question_is_rejected() {
        let value = json!({
            "question": "Сколько кнопок у компьютерной мыши?",
            "options": ["Одна", "Две", "Три", "Четыре"],
            "correct_answer": 1
        });

        assert!(repair_question(&value, 0, &sections()).is_none());
    }

    #[test]
    fn repair_is_idempotent() {
        let value = json!({
            "question": "Что рекомендуется делать при работе с интернетом?",
            "options": ["Проверять адрес сайта", "Открывать все ссылки", "Отключать защиту", "Игнорировать предупреждения"],
            "correct_answer": 9,
        });

        let repaired = repair_question(&value, 0, &sections()).expect("item");
        assert!(quiz_item_is_valid(&repaired));

        let round_trip =
            repair_question(&serde_json::to_value(&repaired).expect("json"), 0, &sections())
                .expect("item");
        assert_eq!(round_trip, repaired);
    }

    #[test]
    fn prose_reply_fails_extraction() {
        let raw = "К сожалению, я могу ответить только обычным текстом без структуры.";
        assert!(repair_full_test(raw, "компьютер", &sections()).is_none());
    }

    #[test]
    fn short_theory_is_replaced_from_sections() {
        let raw = r#"{"theory": "Коротко.", "questions": []}"#;
        let (theory, questions) = repair_full_test(raw, "компьютер", &sections()).expect("extracted");
        assert!(theory.contains("обрабатывает информацию"));
        assert!(questions.is_empty());
    }

    #[test]
    fn grounded_theory_survives() {
        let raw = r#"{
            "theory": "Компьютер обрабатывает информацию, монитор отображает результат, а клавиатура позволяет управлять процессами и решать задачи.",
            "questions": []
        }"#;
        let (theory, _) = repair_full_test(raw, "компьютер", &sections()).expect("extracted");
        assert!(theory.starts_with("Компьютер обрабатывает"));
    }

    #[test]
    fn finalize_pads_to_exact_count() {
        let payload = finalize_test("мышь", "Теория.".to_string(), vec![], &sections(), 5);
        assert_eq!(payload.questions.len(), 5);
        for (index, question) in payload.questions.iter().enumerate() {
            assert_eq!(question.id, index);
            assert!(quiz_item_is_valid(question));
        }
    }

    #[test]
    fn finalize_truncates_extras() {
        let extra: Vec<QuizItem> = (0..8)
            .map(|i| synthesis::fallback_question(i, "мышь", &sections()))
            .collect();
        let payload = finalize_test("мышь", "Теория.".to_string(), extra, &sections(), 5);
        assert_eq!(payload.questions.len(), 5);
    }

    #[test]
    fn lesson_prose_falls_back_to_synthesis() {
        let raw = "Просто текст без какой-либо структуры.";
        let (explanation, quiz) = repair_lesson(raw, "компьютер", &sections());
        assert!(explanation.contains("обрабатывает информацию"));
        let quiz = quiz.expect("quiz");
        assert!(quiz_item_is_valid(&quiz));
    }

    #[test]
    fn lesson_without_quiz_keeps_explanation_only() {
        let raw = r#"{"explanation": "Компьютер обрабатывает информацию, монитор отображает результат, клавиатура позволяет управлять процессами."}"#;
        let (explanation, quiz) = repair_lesson(raw, "компьютер", &sections());
        assert!(explanation.starts_with("Компьютер"));
        assert!(quiz.is_none());
    }

    #[test]
    fn batch_reply_with_fence_is_parsed() {
        let raw = "```json\n{\"questions\": [{\"question\": \"Что рекомендуется делать при работе с файлами?\", \"options\": [\"А\", \"Б\", \"В\", \"Г\"], \"correct_answer\": 1, \"explanation\": \"Пояснение.\"}]}\n```";
        let batch = parse_question_batch(raw, &sections());
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].correct_answer, 1);
    }
}
