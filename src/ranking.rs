use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::{GuideSection, RankedSection};

const TITLE_TERM_WEIGHT: i64 = 25;
const CONTENT_TERM_WEIGHT: i64 = 10;
const TITLE_WORD_WEIGHT: i64 = 8;
const CONTENT_WORD_WEIGHT: i64 = 3;

/// Topic-to-related-terms mapping used to widen the lexical search.
///
/// The term lists are data, not logic: the built-in set matches the
/// Russian digital-literacy guides this trainer ships with, and a JSON
/// file of `{"topic": ["term", ...]}` pairs can replace it wholesale.
#[derive(Clone, Debug, Default)]
pub struct SynonymMap {
    map: HashMap<String, Vec<String>>,
}

impl SynonymMap {
    pub fn builtin() -> Self {
        let pairs: [(&str, &[&str]); 7] = [
            (
                "интернет",
                &["интернет", "сеть", "online", "браузер", "веб", "сайт", "проводник"],
            ),
            (
                "компьютер",
                &["компьютер", "пк", "ноутбук", "системный блок", "монитор"],
            ),
            ("мышь", &["мышь", "мышка", "курсор", "манипулятор"]),
            ("клавиатура", &["клавиатура", "клавиши", "ввод текста"]),
            (
                "безопасность",
                &["безопасность", "защита", "антивирус", "пароль", "вирус"],
            ),
            ("файлы", &["файлы", "документы", "папки", "сохранение"]),
            ("программы", &["программы", "приложения", "софт", "установка"]),
        ];

        let map = pairs
            .into_iter()
            .map(|(topic, terms)| {
                (
                    topic.to_string(),
                    terms.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect();

        Self { map }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read synonym file: {}", path.display()))?;
        let map: HashMap<String, Vec<String>> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid synonym file: {}", path.display()))?;
        Ok(Self { map })
    }

    /// Built-in map unless an override file is configured and loads cleanly.
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::from_file(path).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "falling back to built-in synonym map");
                Self::builtin()
            }),
            None => Self::builtin(),
        }
    }

    pub fn related_terms(&self, topic_lower: &str) -> &[String] {
        self.map
            .get(topic_lower)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Score sections against a topic with lexical heuristics and return the
/// best `top_k`. Matching is case-insensitive substring containment over
/// the topic, its synonyms, and the individual topic words longer than
/// two characters. Sections scoring below 1 are dropped; ties keep the
/// original page/id order. An empty result means the guides do not cover
/// the topic.
pub fn rank(
    topic: &str,
    sections: &[GuideSection],
    synonyms: &SynonymMap,
    top_k: usize,
) -> Vec<RankedSection> {
    let topic_lower = topic.to_lowercase();

    let mut seen = HashSet::new();
    let mut search_terms: Vec<String> = Vec::new();
    for term in std::iter::once(topic_lower.as_str())
        .chain(synonyms.related_terms(&topic_lower).iter().map(String::as_str))
    {
        if seen.insert(term.to_string()) {
            search_terms.push(term.to_string());
        }
    }

    let topic_words: Vec<&str> = topic_lower
        .split_whitespace()
        .filter(|word| word.chars().count() > 2)
        .collect();

    let mut ranked = Vec::new();
    for section in sections {
        let title = section.title.to_lowercase();
        let content = section.content.to_lowercase();

        let mut score = 0i64;
        for term in &search_terms {
            if title.contains(term.as_str()) {
                score += TITLE_TERM_WEIGHT;
            }
            if content.contains(term.as_str()) {
                score += CONTENT_TERM_WEIGHT;
            }
        }
        for word in &topic_words {
            if title.contains(word) {
                score += TITLE_WORD_WEIGHT;
            }
            if content.contains(word) {
                score += CONTENT_WORD_WEIGHT;
            }
        }

        if score >= 1 {
            ranked.push(RankedSection {
                score,
                title: section.title.clone(),
                content: section.content.clone(),
                page: section.page_number,
            });
        }
    }

    // Stable sort: equal scores stay in page/id order.
    ranked.sort_by_key(|section| std::cmp::Reverse(section.score));
    ranked.truncate(top_k);

    for section in &ranked {
        tracing::info!(title = %section.title, score = section.score, "ranked section");
    }

    ranked
}
