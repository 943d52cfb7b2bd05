use regex::Regex;

use crate::models::{QuizItem, RankedSection, TestPayload};
use crate::prompts::truncate_chars;

const THEORY_CHAR_CAP: usize = 500;
const THEORY_SENTENCE_MIN_CHARS: usize = 20;
const THEORY_SENTENCE_COUNT: usize = 3;

/// All builders here are pure functions of (index, topic, sections):
/// the same inputs always produce the same payload, so tests and
/// repeated requests are reproducible. Template choice is driven by the
/// caller-supplied index, never by process randomness.

pub fn fallback_theory(topic: &str, sections: &[RankedSection]) -> String {
    if sections.is_empty() {
        return format!(
            "Тема \"{topic}\" рассматривается в руководстве по цифровой грамотности. \
             Рекомендуется изучить соответствующие разделы для получения практических навыков."
        );
    }

    let mut picked: Vec<String> = Vec::new();
    for section in sections.iter().take(2) {
        for sentence in long_sentences(&section.content, THEORY_SENTENCE_MIN_CHARS) {
            picked.push(sentence);
            if picked.len() == THEORY_SENTENCE_COUNT {
                break;
            }
        }
        if picked.len() == THEORY_SENTENCE_COUNT {
            break;
        }
    }

    if picked.is_empty() {
        // No usable sentences; fall back to raw openings of the sections.
        let mut parts = Vec::new();
        for section in sections.iter().take(2) {
            if section.content.chars().count() > 100 {
                parts.push(format!("{}...", truncate_chars(&section.content, 200)));
            }
        }
        if parts.is_empty() {
            return format!("Тема \"{topic}\" рассматривается в руководстве по цифровой грамотности.");
        }
        return parts.join(" ");
    }

    let theory = format!("{}.", picked.join(". "));
    if theory.chars().count() > THEORY_CHAR_CAP {
        format!("{}...", truncate_chars(&theory, THEORY_CHAR_CAP))
    } else {
        theory
    }
}

/// A full synthesized quiz question. The section backing the question
/// rotates through the ranked list so a five-question test does not
/// hammer one page.
pub fn fallback_question(index: usize, topic: &str, sections: &[RankedSection]) -> QuizItem {
    let templates = question_templates(topic);
    let question = templates[index % templates.len()].clone();

    if sections.is_empty() {
        return QuizItem {
            id: index,
            question,
            options: vec![
                "Правильный вариант, соответствующий руководству".to_string(),
                "Неправильный вариант".to_string(),
                "Ошибочное утверждение".to_string(),
                "Неверная информация".to_string(),
            ],
            correct_answer: 0,
            explanation: "Этот вопрос проверяет знания по указанной теме.".to_string(),
        };
    }

    let section = &sections[index % sections.len()];

    QuizItem {
        id: index,
        question,
        options: vec![
            "Следовать рекомендациям из руководства".to_string(),
            "Экспериментировать без ограничений".to_string(),
            "Обратиться к случайным источникам".to_string(),
            "Прекратить использование".to_string(),
        ],
        correct_answer: 0,
        explanation: answer_explanation(index, section),
    }
}

/// Single-question fallback for the lesson flow: the correct option is
/// the first substantial sentence of the top section.
pub fn fallback_quiz(topic: &str, sections: &[RankedSection]) -> QuizItem {
    let Some(first) = sections.first() else {
        return fallback_question(0, topic, sections);
    };

    let correct = long_sentences(&first.content, 30)
        .into_iter()
        .next()
        .unwrap_or_else(|| truncate_chars(&first.content, 100));

    QuizItem {
        id: 0,
        question: format!("Что говорится в руководстве о теме \"{topic}\"?"),
        options: vec![
            format!("{}...", truncate_chars(&correct, 80)),
            "Информация не соответствует руководству".to_string(),
            "Это распространенное заблуждение".to_string(),
            "Данные отсутствуют в руководстве".to_string(),
        ],
        correct_answer: 0,
        explanation: format!(
            "Правильный ответ основан на информации из раздела \"{}\" руководства.",
            first.title
        ),
    }
}

pub fn synthesize_full_test(
    topic: &str,
    sections: &[RankedSection],
    question_count: usize,
) -> TestPayload {
    TestPayload {
        topic: topic.to_string(),
        theory: fallback_theory(topic, sections),
        questions: (0..question_count)
            .map(|index| fallback_question(index, topic, sections))
            .collect(),
    }
}

fn question_templates(topic: &str) -> Vec<String> {
    vec![
        format!("Как правильно использовать {topic} согласно руководству?"),
        format!("Что рекомендуется делать при работе с {topic}?"),
        format!("Какой способ работы с {topic} считается наиболее эффективным?"),
        format!("Что важно учитывать при использовании {topic}?"),
        format!("Как избежать типичных ошибок при работе с {topic}?"),
        format!("Для чего преимущественно используется {topic}?"),
        format!("Что нужно сделать перед началом работы с {topic}?"),
        format!("Как проверить, что {topic} работает правильно?"),
        format!("Что делать, если возникли проблемы с {topic}?"),
        format!("Какие меры безопасности важны при работе с {topic}?"),
    ]
}

fn answer_explanation(index: usize, section: &RankedSection) -> String {
    let preview = if section.content.chars().count() > 150 {
        format!("{}...", truncate_chars(&section.content, 150))
    } else {
        section.content.clone()
    };
    let title = &section.title;
    let page = section
        .page
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());

    let variants = [
        format!(
            "Этот ответ правильный, потому что он соответствует информации из раздела \
             \"{title}\" (страница {page}). В руководстве указано: \"{preview}\""
        ),
        format!(
            "Правильный ответ основан на материалах руководства. В разделе \"{title}\" \
             на странице {page} объясняется: \"{preview}\""
        ),
        format!(
            "Этот вариант верный, так как он точно отражает содержание руководства. \
             Согласно разделу \"{title}\": \"{preview}\""
        ),
        format!(
            "Да, это правильный ответ! В руководстве в разделе \"{title}\" (стр. {page}) \
             говорится: \"{preview}\""
        ),
        format!(
            "Верно! Этот ответ соответствует информации из руководства. В разделе \
             \"{title}\" на странице {page} указано: \"{preview}\""
        ),
    ];

    variants[index % variants.len()].clone()
}

pub(crate) fn long_sentences(text: &str, min_chars: usize) -> Vec<String> {
    let splitter = Regex::new(r"[.!?]+").unwrap_or_else(|_| Regex::new("$").unwrap());
    splitter
        .split(text)
        .map(str::trim)
        .filter(|sentence| sentence.chars().count() > min_chars)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections() -> Vec<RankedSection> {
        vec![
            RankedSection {
                score: 35,
                title: "Страница 3".to_string(),
                content: "Компьютер - это универсальное устройство для работы. \
                          Он помогает решать повседневные задачи пользователя. \
                          Основные компоненты работают вместе и дополняют друг друга. \
                          Четвертое предложение остается про запас."
                    .to_string(),
                page: Some(3),
            },
            RankedSection {
                score: 20,
                title: "Страница 7".to_string(),
                content: "Мышь управляет курсором на экране монитора.".to_string(),
                page: Some(7),
            },
        ]
    }

    #[test]
    fn theory_takes_first_three_long_sentences() {
        let theory = fallback_theory("компьютер", &sections());
        assert!(theory.contains("универсальное устройство"));
        assert!(theory.contains("повседневные задачи"));
        assert!(theory.contains("дополняют друг друга"));
        assert!(!theory.contains("про запас"));
        assert!(theory.chars().count() <= 503);
    }

    #[test]
    fn theory_without_sections_names_the_topic() {
        let theory = fallback_theory("браузер", &[]);
        assert!(theory.contains("браузер"));
    }

    #[test]
    fn question_synthesis_is_deterministic() {
        let first = fallback_question(2, "мышь", &sections());
        let second = fallback_question(2, "мышь", &sections());
        assert_eq!(first, second);
    }

    #[test]
    fn questions_rotate_through_sections() {
        let q0 = fallback_question(0, "мышь", &sections());
        let q1 = fallback_question(1, "мышь", &sections());
        assert!(q0.explanation.contains("Страница 3"));
        assert!(q1.explanation.contains("Страница 7"));
    }

    #[test]
    fn synthesized_test_has_exact_shape() {
        let test = synthesize_full_test("файлы", &sections(), 5);
        assert_eq!(test.questions.len(), 5);
        for question in &test.questions {
            assert_eq!(question.options.len(), 4);
            assert!(question.correct_answer < 4);
            assert!(!question.explanation.is_empty());
        }
    }

    #[test]
    fn quiz_uses_top_section_sentence_as_correct_option() {
        let quiz = fallback_quiz("компьютер", &sections());
        assert!(quiz.options[0].contains("универсальное устройство"));
        assert_eq!(quiz.correct_answer, 0);
        assert_eq!(quiz.options.len(), 4);
    }
}
