use regex::Regex;
use serde_json::Value;

/// An extraction strategy: free text in, structured value out if the
/// strategy recognizes one. Strategies are tried in declaration order.
pub type Strategy = fn(&str) -> Option<Value>;

pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct_slice", direct_slice),
    ("balanced_braces", balanced_braces),
    ("loose_literal", loose_literal),
];

/// Replace typographic quotation marks with plain ASCII ones and
/// non-breaking spaces with regular spaces. Models routinely emit curly
/// quotes inside otherwise valid JSON, which is the single most common
/// decode failure. Idempotent.
pub fn normalize_quotes(text: &str) -> String {
    text.replace(
        ['\u{201C}', '\u{201D}', '\u{201E}', '\u{00AB}', '\u{00BB}'],
        "\"",
    )
    .replace(['\u{2018}', '\u{2019}', '`', '\u{00B4}'], "'")
    .replace('\u{00A0}', " ")
}

/// Strip a surrounding markdown code fence if the whole reply is wrapped
/// in one.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let re = Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```$").unwrap_or_else(|_| {
        Regex::new("^$").unwrap()
    });
    if let Some(caps) = re.captures(trimmed) {
        if let Some(body) = caps.get(1) {
            return body.as_str().trim().to_string();
        }
    }

    trimmed.replace("```", "").trim().to_string()
}

/// Run the strategy chain over already-normalized text.
pub fn extract_json(text: &str) -> Option<Value> {
    for (name, strategy) in STRATEGIES {
        if let Some(value) = strategy(text) {
            tracing::debug!(strategy = name, "extracted structured payload");
            return Some(value);
        }
    }
    None
}

/// Slice from the first `{` to the last `}` and parse as strict JSON.
pub(crate) fn direct_slice(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Match brace-balanced object candidates (nested braces up to two
/// levels deep) and try each one. Picks up a well-formed object embedded
/// in surrounding prose that confuses the direct slice.
pub(crate) fn balanced_braces(text: &str) -> Option<Value> {
    let re = Regex::new(r"(?s)\{(?:[^{}]|\{(?:[^{}]|\{[^{}]*\})*\})*\}")
        .unwrap_or_else(|_| Regex::new("^$").unwrap());

    for candidate in re.find_iter(text) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate.as_str()) {
            return Some(value);
        }
    }
    None
}

/// Permissive parse for near-miss output written as a Python-style
/// literal: single-quoted strings and True/False/None keywords are
/// rewritten into JSON before decoding.
pub(crate) fn loose_literal(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    let body = &text[start..=end];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    let mut delimiter: Option<char> = None;

    while let Some(c) = chars.next() {
        match delimiter {
            Some(open) => {
                if c == '\\' {
                    match chars.next() {
                        // A single quote only needs escaping inside
                        // single-quoted literals; JSON wants it bare.
                        Some('\'') => out.push('\''),
                        Some(next) => {
                            out.push('\\');
                            out.push(next);
                        }
                        None => out.push('\\'),
                    }
                } else if c == open {
                    out.push('"');
                    delimiter = None;
                } else if c == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    out.push('"');
                    delimiter = Some(c);
                }
                'T' | 'F' | 'N' => {
                    let mut word = String::from(c);
                    while let Some(&next) = chars.peek() {
                        if next.is_ascii_alphabetic() {
                            word.push(next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    match word.as_str() {
                        "True" => out.push_str("true"),
                        "False" => out.push_str("false"),
                        "None" => out.push_str("null"),
                        other => out.push_str(other),
                    }
                }
                _ => out.push(c),
            },
        }
    }

    serde_json::from_str(&out).ok()
}
