//! Quality prompt and the line-oriented reply parser.
//!
//! The model is asked to answer in a fixed `Field: value` layout, but replies
//! routinely add markdown, reorder fields, or drop some entirely. Parsing is a
//! single pass over the lines:
//!
//! - a line whose prefix (case-insensitive, after markdown emphasis) names a
//!   field sets that field;
//! - bullet lines directly after `Insights:` append further insights;
//! - everything else is ignored.
//!
//! Scores take the first integer in the value, sign included, clamped to
//! `[1, 10]`; integers too large for `i64` saturate before clamping. Scores
//! stay at the neutral 5 when no integer is present. A reply in which no field
//! header appears at all is treated like a failed call.

use crate::models::{ArticleCandidate, QualityAnalysis, Score};
use once_cell::sync::Lazy;
use regex::Regex;
use std::num::IntErrorKind;

static FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?[0-9]+").unwrap());

const BULLETS: [char; 3] = ['•', '-', '*'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Quality,
    Relevance,
    Category,
    Insights,
    Reason,
}

const FIELDS: [(&str, Field); 5] = [
    ("quality:", Field::Quality),
    ("relevance:", Field::Relevance),
    ("category:", Field::Category),
    ("insights:", Field::Insights),
    ("reason:", Field::Reason),
];

/// Quality prompt for one candidate.
///
/// The model sees title, summary and source only; the body is reserved for
/// the more expensive insight pass.
pub fn build_prompt(article: &ArticleCandidate) -> String {
    format!(
        "Analyze this AI news article and provide a quality assessment:\n\
         \n\
         Title: {title}\n\
         Summary: {summary}\n\
         Source: {source}\n\
         \n\
         Rate it on a scale of 1-10 and provide:\n\
         1. Quality Score (1-10): overall quality and value\n\
         2. Relevance Score (1-10): relevance to AI professionals\n\
         3. Category: Research/Industry/Tools/Business/Tutorial\n\
         4. Key Insights: 2-3 main takeaways\n\
         5. Reason: a brief explanation of the scores\n\
         \n\
         Format your response exactly as:\n\
         Quality: X/10\n\
         Relevance: X/10\n\
         Category: [Category]\n\
         Insights: [Key insights]\n\
         Reason: [Brief explanation]\n",
        title = article.title,
        summary = article.summary,
        source = article.source,
    )
}

fn strip_emphasis(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '*' || c == '#' || c == '_').trim()
}

/// Split `line` into a known field and its value, if it starts with one.
fn match_field(line: &str) -> Option<(Field, &str)> {
    let line = line.trim_start_matches(|c: char| c == '*' || c == '#' || c.is_whitespace());
    FIELDS.iter().find_map(|(prefix, field)| {
        let head = line.get(..prefix.len())?;
        head.eq_ignore_ascii_case(prefix)
            .then(|| (*field, strip_emphasis(&line[prefix.len()..])))
    })
}

/// First signed integer in `digits`, saturating at the `i64` bounds.
fn saturating_int(digits: &str) -> Option<i64> {
    match digits.parse::<i64>() {
        Ok(n) => Some(n),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

fn lenient_score(value: &str) -> Score {
    FIRST_INTEGER
        .find(value)
        .and_then(|m| saturating_int(m.as_str()))
        .map(Score::clamped)
        .unwrap_or_default()
}

fn bullet_text(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(BULLETS)?;
    let rest = rest.trim();
    (!rest.is_empty()).then_some(rest)
}

/// Parse a quality reply. Never fails; see the module docs for the rules.
pub fn parse_reply(reply: &str, default_category: &str) -> QualityAnalysis {
    let mut analysis = QualityAnalysis {
        quality_score: Score::NEUTRAL,
        relevance_score: Score::NEUTRAL,
        category: default_category.to_string(),
        insights: Vec::new(),
        reason: String::new(),
        llm_analysis: true,
        raw_response: Some(reply.to_string()),
    };
    let mut matched_any = false;
    let mut current = None;

    for line in reply.lines().map(str::trim) {
        if let Some((field, value)) = match_field(line) {
            matched_any = true;
            current = Some(field);
            match field {
                Field::Quality => analysis.quality_score = lenient_score(value),
                Field::Relevance => analysis.relevance_score = lenient_score(value),
                Field::Category if !value.is_empty() => analysis.category = value.to_string(),
                Field::Category => {}
                Field::Insights if !value.is_empty() => analysis.insights.push(value.to_string()),
                Field::Insights => {}
                Field::Reason => analysis.reason = value.to_string(),
            }
        } else if current == Some(Field::Insights) {
            if let Some(text) = bullet_text(line) {
                analysis.insights.push(text.to_string());
            }
        }
    }

    if matched_any {
        analysis
    } else {
        QualityAnalysis {
            raw_response: Some(reply.to_string()),
            ..QualityAnalysis::fallback(default_category)
        }
    }
}

impl QualityAnalysis {
    /// The record used whenever generation fails or returns nothing usable.
    pub fn fallback(default_category: &str) -> Self {
        Self {
            quality_score: Score::NEUTRAL,
            relevance_score: Score::NEUTRAL,
            category: default_category.to_string(),
            insights: vec!["Unable to analyze with LLM".to_string()],
            reason: "LLM analysis failed".to_string(),
            llm_analysis: false,
            raw_response: None,
        }
    }
}
