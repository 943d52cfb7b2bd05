use regex::Regex;

use crate::models::RankedSection;

/// Kind of question requested from a batch generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    Understanding,
    Application,
}

impl QuestionKind {
    pub fn label(self) -> &'static str {
        match self {
            QuestionKind::Understanding => "ПОНИМАНИЕ",
            QuestionKind::Application => "ПРИМЕНЕНИЕ",
        }
    }

    fn hint(self) -> &'static str {
        match self {
            QuestionKind::Understanding => "- Вопросы на понимание сути и концепций",
            QuestionKind::Application => {
                "- Вопросы на применение знаний в практических ситуациях"
            }
        }
    }
}

/// Combined explanation + single quiz question. Quotes at most two
/// sections, 500 characters each. The JSON shape spelled out here is a
/// contract: the repair pipeline expects `explanation` and `quiz` keys.
pub fn lesson_prompt(topic: &str, sections: &[RankedSection]) -> String {
    let quoted = sections
        .iter()
        .take(2)
        .enumerate()
        .map(|(i, section)| {
            format!(
                "РАЗДЕЛ {} '{}':\n{}",
                i + 1,
                section.title,
                truncate_chars(&section.content, 500)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"ИСПОЛЬЗУЙ ТОЛЬКО ЭТУ ИНФОРМАЦИЮ ИЗ РУКОВОДСТВА:

{quoted}

ЗАПРЕЩЕНО:
- Придумывать информацию
- Использовать свои знания
- Давать общие фразы

ЗАДАЧА 1: ОБЪЯСНЕНИЕ ТЕМЫ "{topic_upper}"
- Используй ТОЛЬКО факты из текста выше
- Цитируй КОНКРЕТНЫЕ фразы из руководства
- Объяснение: 3-4 предложения

ЗАДАЧА 2: ТЕСТОВЫЙ ВОПРОС
- Вопрос должен проверять КОНКРЕТНЫЙ факт из текста
- Варианты ответов должны быть основаны на тексте
- Только один вариант должен быть точной цитатой или прямым следствием из текста

ФОРМАТ ОТВЕТА (ТОЛЬКО JSON):
{{
    "explanation": "Твое объяснение с ЦИТАТАМИ из текста...",
    "quiz": {{
        "question": "Конкретный вопрос по тексту выше...",
        "options": ["вариант1", "вариант2", "вариант3", "вариант4"],
        "correct_answer": 0,
        "explanation": "Правильный ответ - вариант X, потому что в тексте сказано: 'ЦИТАТА ИЗ РУКОВОДСТВА'."
    }}
}}

НАЧИНАЙ ОТВЕТ С {{"#,
        topic_upper = topic.to_uppercase(),
    )
}

/// Theory-only explanation with an explicit formatting contract:
/// labeled subsections ending in a colon, dash bullets, bold terms.
/// Quotes up to four sections with longer, sentence-filtered excerpts.
pub fn explanation_prompt(topic: &str, sections: &[RankedSection]) -> String {
    let quoted = sections
        .iter()
        .take(4)
        .enumerate()
        .filter_map(|(i, section)| {
            let excerpt = meaningful_excerpt(&section.content, 8);
            if excerpt.is_empty() {
                None
            } else {
                Some(format!(
                    "--- РАЗДЕЛ {}: {} ---\n{}",
                    i + 1,
                    section.title,
                    excerpt
                ))
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let quoted = if quoted.is_empty() {
        "В разделах есть общая информация по теме.".to_string()
    } else {
        quoted
    };

    format!(
        r#"ТЫ - ЭКСПЕРТ-ПРЕПОДАВАТЕЛЬ ПО ЦИФРОВОЙ ГРАМОТНОСТИ. ДАЙ КАЧЕСТВЕННОЕ ОБЪЯСНЕНИЕ ПО ТЕМЕ: "{topic_upper}"

КОНКРЕТНЫЙ МАТЕРИАЛ ИЗ РУКОВОДСТВА:
{quoted}

ТВОЯ ЗАДАЧА:
СОСТАВЬ СТРУКТУРИРОВАННОЕ ОБЪЯСНЕНИЕ С ЧЕТКОЙ СТРУКТУРОЙ:

Основная концепция:
- Кратко объясни суть темы

Как это работает:
- Опиши механизм работы
- Используй конкретные примеры из руководства

Практическое применение:
- Как именно использовать на практике
- Пошаговые рекомендации

Важные моменты:
- Ключевые аспекты для запоминания
- Частые ошибки и как их избежать

ТРЕБОВАНИЯ К ФОРМАТУ:
- Используй заголовки с двоеточием в конце
- Используй маркированные списки через дефис
- Выделяй **важные термины** двойными звездочками
- Разделяй блоки пустыми строками
- Давай конкретные примеры из руководства

ОТВЕЧАЙ ТОЛЬКО ТЕКСТОМ ОБЪЯСНЕНИЯ, без вступлений и заключений."#,
        topic_upper = topic.to_uppercase(),
    )
}

/// Full test: a theory paragraph plus exactly `question_count` questions.
/// Quotes up to three sections, 800 characters each.
pub fn full_test_prompt(topic: &str, sections: &[RankedSection], question_count: usize) -> String {
    let quoted = sections
        .iter()
        .take(3)
        .enumerate()
        .map(|(i, section)| {
            format!(
                "РАЗДЕЛ {} '{}':\n{}",
                i + 1,
                section.title,
                truncate_chars(&section.content, 800)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"ТЫ - ЭКСПЕРТ ПО СОЗДАНИЮ ТЕСТОВ. СОЗДАЙ ТЕСТ ИЗ {question_count} ВОПРОСОВ ПО ТЕМЕ "{topic_upper}".

ИСПОЛЬЗУЙ ТОЛЬКО ЭТУ ИНФОРМАЦИЮ ИЗ РУКОВОДСТВА:

{quoted}

КРИТИЧЕСКИ ВАЖНЫЕ ПРАВИЛА:
1. НЕ придумывай информацию - используй ТОЛЬКО текст выше
2. Каждый вопрос должен проверять КОНКРЕТНЫЙ факт из руководства
3. Все 4 варианта ответа должны быть РАЗНЫМИ и ОСМЫСЛЕННЫМИ
4. Только один вариант должен быть ПРАВИЛЬНЫМ
5. correct_answer ДОЛЖЕН БЫТЬ ЧИСЛОМ от 0 до 3

СТРУКТУРА ТЕСТА:

1. ТЕОРЕТИЧЕСКАЯ СПРАВКА (5-7 предложений):
   - Краткое объяснение темы на основе руководства
   - Используй КОНКРЕТНЫЕ факты из текста

2. {question_count} ВОПРОСОВ:
   - Каждый вопрос = 4 разных варианта ответа
   - Правильный ответ = точная цитата или прямое следствие из текста
   - Неправильные ответы = правдоподобные, но неверные утверждения
   - Вопросы должны охватывать РАЗНЫЕ аспекты темы

ПРИМЕР ПРАВИЛЬНОГО ВОПРОСА:
Вопрос: "Для чего используется клавиша Enter согласно руководству?"
Варианты: [
    "Для подтверждения ввода команд",
    "Для удаления текста",
    "Для включения caps lock",
    "Для вызова диспетчера задач"
]
Правильный ответ: 0

ФОРМАТ ОТВЕТА (СТРОГО СОБЛЮДАЙ, ТОЛЬКО JSON):

{{
    "theory": "Теоретическая справка с конкретными фактами из руководства...",
    "questions": [
        {{
            "question": "Вопрос 1...",
            "options": ["вариант1", "вариант2", "вариант3", "вариант4"],
            "correct_answer": 0,
            "explanation": "Объяснение с цитатой из руководства"
        }}
    ]
}}

ВАЖНО: Должно быть РОВНО {question_count} вопросов с РАЗНЫМИ вариантами ответов!"#,
        topic_upper = topic.to_uppercase(),
    )
}

/// A batch of questions of one kind, given already-generated theory.
pub fn question_batch_prompt(
    topic: &str,
    theory: &str,
    kind: QuestionKind,
    count: usize,
) -> String {
    format!(
        r#"СОЗДАЙ {count} КАЧЕСТВЕННЫХ ВОПРОСОВ ДЛЯ ПРОВЕРКИ ПОНИМАНИЯ ТЕМЫ: "{topic}"

ТЕОРЕТИЧЕСКАЯ СПРАВКА:
{theory}

ТИП ВОПРОСОВ: {kind_label}
{kind_hint}

ВАЖНЫЕ ПРАВИЛА:
1. ВОЗВРАЩАЙ ТОЛЬКО ВАЛИДНЫЙ JSON БЕЗ ЛЮБЫХ ДОПОЛНИТЕЛЬНЫХ ТЕКСТОВ
2. correct_answer ДОЛЖЕН БЫТЬ ЧИСЛОМ от 0 до 3
3. options ДОЛЖЕН СОДЕРЖАТЬ РОВНО 4 ВАРИАНТА
4. Объяснение (explanation) должно быть подробным и полезным для обучения

ТРЕБОВАНИЯ К ОБЪЯСНЕНИЯМ:
- Объяснение должно помочь понять, ПОЧЕМУ ответ правильный
- Укажите, КАКИЕ конкретно знания из руководства подтверждают ответ
- Объяснение должно быть понятным и обучающим

ФОРМАТ ОТВЕТА (ТОЛЬКО JSON):
{{
    "questions": [
        {{
            "question": "Текст вопроса...",
            "options": ["Вариант 1", "Вариант 2", "Вариант 3", "Вариант 4"],
            "correct_answer": 0,
            "explanation": "Детальное объяснение, которое поможет понять материал."
        }}
    ]
}}

НЕ ДОБАВЛЯЙ КОММЕНТАРИИ, ОБЪЯСНЕНИЯ ИЛИ ДРУГОЙ ТЕКСТ ВНЕ JSON СТРУКТУРЫ!"#,
        kind_label = kind.label(),
        kind_hint = kind.hint(),
    )
}

/// Character-safe prefix of `text` (PDF text is Cyrillic-heavy, so byte
/// slicing would panic on boundaries).
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Keeps only substantive sentences: longer than 25 characters, not a
/// run of digits and punctuation, not table-of-contents boilerplate.
pub(crate) fn meaningful_excerpt(text: &str, max_sentences: usize) -> String {
    let splitter = Regex::new(r"[.!?]+").unwrap_or_else(|_| Regex::new("$").unwrap());
    let numeric = Regex::new(r"^[\d\s.\-]+$").unwrap_or_else(|_| Regex::new("$").unwrap());

    let sentences: Vec<&str> = splitter
        .split(text)
        .map(str::trim)
        .filter(|sentence| {
            let lower = sentence.to_lowercase();
            sentence.chars().count() > 25
                && !numeric.is_match(sentence)
                && !lower.contains("оглавление")
                && !lower.contains("страница")
        })
        .take(max_sentences)
        .collect();

    if sentences.is_empty() {
        return String::new();
    }

    format!("{}.", sentences.join(". "))
}
