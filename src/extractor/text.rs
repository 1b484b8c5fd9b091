//! Text normalisation and summary generation.

use crate::config::Limits;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;

static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").unwrap());

static NOISE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)Advertisement\s*",
        r"(?i)Subscribe to.*?newsletter",
        r"(?i)Follow us on",
        r"(?i)Click here to",
        r"(?i)Read more",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const BOILERPLATE_OPENERS: [&str; 4] = ["click", "subscribe", "follow", "read more"];

/// Collapse every whitespace run to one space and trim both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an element.
///
/// Text nodes are concatenated as written, so inline markup such as
/// `AI<b>ops</b>` stays one word, then whitespace runs collapse to a single
/// space and the ends are trimmed.
pub fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// Collapse whitespace and strip boilerplate phrases, case-insensitively.
pub fn clean_text(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let mut out = collapse_whitespace(text);
    for pattern in NOISE.iter() {
        out = pattern.replace_all(&out, "").into_owned();
    }
    collapse_whitespace(&out)
}

/// First `max` characters, with `...` appended when anything was cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push_str("...");
        out
    }
}

fn is_summary_sentence(sentence: &str, limits: &Limits) -> bool {
    let lower = sentence.to_lowercase();
    sentence.chars().count() > limits.min_sentence_chars
        && sentence.split_whitespace().count() > limits.min_sentence_words
        && !BOILERPLATE_OPENERS.iter().any(|p| lower.starts_with(p))
}

/// Build a summary from the leading informative sentences of `body`.
///
/// Falls back to the head of the body when no sentence qualifies.
pub fn generate_summary(body: &str, limits: &Limits) -> String {
    let body = body.trim();
    if body.is_empty() {
        return String::new();
    }
    let picked: Vec<&str> = SENTENCE_BREAK
        .split(body)
        .map(str::trim)
        .filter(|s| is_summary_sentence(s, limits))
        .take(limits.summary_sentences)
        .collect();

    if picked.is_empty() {
        return truncate_chars(body, limits.max_summary_chars);
    }
    truncate_chars(&picked.join(". "), limits.max_summary_chars)
}
