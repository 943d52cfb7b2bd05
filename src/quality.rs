use std::collections::HashSet;

use regex::Regex;

use crate::models::RankedSection;

/// Question shapes that test nothing ("how many buttons", "what color",
/// bare definition trivia). Data like the synonym map: tuned to the
/// Russian guide corpus, swappable without touching the gate itself.
const TRIVIAL_QUESTION_PATTERNS: &[&str] = &[
    r"сколько.*кнопок",
    r"какого.*цвета",
    r"что такое.*\?$",
    r"как называется.*\?$",
    r"упоминается ли.*\?$",
];

const MIN_THEORY_CHARS: usize = 150;
const MIN_THEORY_SENTENCES: usize = 4;
const MAX_BULLET_MARKS: usize = 3;

/// A text counts as grounded when more than two distinct content words
/// (four or more characters) from the ranked sections appear in it,
/// case-insensitively. Anything below that reads as generic filler the
/// model produced without the excerpts.
pub fn is_grounded(text: &str, sections: &[RankedSection]) -> bool {
    if text.trim().is_empty() {
        return false;
    }

    let word_re = Regex::new(r"\b\w{4,}\b").unwrap_or_else(|_| Regex::new("$").unwrap());

    let mut keywords: HashSet<String> = HashSet::new();
    for section in sections {
        let content_lower = section.content.to_lowercase();
        for found in word_re.find_iter(&content_lower) {
            keywords.insert(found.as_str().to_string());
        }
    }

    let text_lower = text.to_lowercase();
    let matches = keywords
        .iter()
        .filter(|word| text_lower.contains(word.as_str()))
        .count();

    tracing::debug!(matches, "groundedness keyword overlap");
    matches > 2
}

pub fn is_meaningful_question(question: &str) -> bool {
    let question_lower = question.to_lowercase();
    for pattern in TRIVIAL_QUESTION_PATTERNS {
        let re = Regex::new(pattern).unwrap_or_else(|_| Regex::new("$").unwrap());
        if re.is_match(question_lower.trim()) {
            return false;
        }
    }
    true
}

/// Flags a fact-dump instead of an explanation: too short, mostly a
/// bullet list, or fewer than four sentences.
pub fn is_low_quality_theory(theory: &str) -> bool {
    let trimmed = theory.trim();
    if trimmed.chars().count() < MIN_THEORY_CHARS {
        return true;
    }

    if trimmed.matches('-').count() > MAX_BULLET_MARKS
        || trimmed.matches('•').count() > MAX_BULLET_MARKS
    {
        return true;
    }

    let splitter = Regex::new(r"[.!?]+").unwrap_or_else(|_| Regex::new("$").unwrap());
    let sentences = splitter
        .split(trimmed)
        .filter(|sentence| !sentence.trim().is_empty())
        .count();

    sentences < MIN_THEORY_SENTENCES
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections() -> Vec<RankedSection> {
        vec![RankedSection {
            score: 35,
            title: "Страница 3".to_string(),
            content: "Компьютер обрабатывает информацию. Монитор отображает результат, \
                      а клавиатура позволяет управлять процессами."
                .to_string(),
            page: Some(3),
        }]
    }

    #[test]
    fn overlapping_text_is_grounded() {
        let text = "Компьютер работает так: монитор показывает результат, \
                    клавиатура передает команды, информация обрабатывается.";
        assert!(is_grounded(text, &sections()));
    }

    #[test]
    fn generic_text_is_not_grounded() {
        let text = "Это очень важная тема, рекомендуем изучить её подробнее.";
        assert!(!is_grounded(text, &sections()));
    }

    #[test]
    fn empty_text_is_not_grounded() {
        assert!(!is_grounded("   ", &sections()));
    }

    #[test]
    fn trivial_question_shapes_are_rejected() {
        assert!(!is_meaningful_question("Сколько кнопок у мыши?"));
        assert!(!is_meaningful_question("Какого цвета курсор?"));
        assert!(!is_meaningful_question("Что такое браузер?"));
        assert!(!is_meaningful_question("Как называется главный экран?"));
    }

    #[test]
    fn substantive_questions_pass() {
        assert!(is_meaningful_question(
            "Что рекомендуется сделать перед установкой новой программы?"
        ));
        // A definition form with a follow-up is no longer bare trivia.
        assert!(is_meaningful_question(
            "Что такое антивирус и зачем его регулярно обновлять? Выберите точный ответ."
        ));
    }

    #[test]
    fn short_theory_is_low_quality() {
        assert!(is_low_quality_theory("Коротко."));
    }

    #[test]
    fn bullet_heavy_theory_is_low_quality() {
        let theory = format!(
            "{} - пункт один - пункт два - пункт три - пункт четыре.",
            "х".repeat(200)
        );
        assert!(is_low_quality_theory(&theory));
    }

    #[test]
    fn connected_prose_passes() {
        let theory = "Компьютер помогает автоматизировать повседневные задачи. \
                      С его помощью можно работать с документами и искать информацию. \
                      Основные компоненты работают вместе и дополняют друг друга. \
                      Понимание этих основ делает работу уверенной и безопасной.";
        assert!(!is_low_quality_theory(theory));
    }
}
