//! Detailed insight prompt and its section state machine.
//!
//! The reply is read line by line with a "current section" pointer:
//!
//! ```text
//!            TAKEAWAYS:        BUSINESS IMPACT:   TECHNICAL DETAILS:   ACTION ITEMS:
//!   None ──────────────▶ Takeaways ───────▶ Impact ──────────▶ Details ─────────▶ Actions
//!     ▲                 (any header line switches to its section from any state)
//!     └──────────────────────────── END_ANALYSIS ─────────────────────────────────┘
//! ```
//!
//! Bullet lines append to the list sections (takeaways, actions); plain lines
//! append to the prose sections (impact, details). Everything else is dropped,
//! so a reply without headers yields an empty record rather than an error.

use crate::models::{ArticleCandidate, DetailedInsights};

/// Where the parser currently appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    None,
    Takeaways,
    Impact,
    Details,
    Actions,
}

impl Section {
    fn is_list(self) -> bool {
        matches!(self, Self::Takeaways | Self::Actions)
    }

    fn is_prose(self) -> bool {
        matches!(self, Self::Impact | Self::Details)
    }
}

/// One reply line, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// A section header plus whatever followed its colon on the same line.
    Header(Section, &'a str),
    Bullet(&'a str),
    Text(&'a str),
    End,
    Blank,
}

const HEADERS: [(&str, Section); 4] = [
    ("TAKEAWAYS:", Section::Takeaways),
    ("BUSINESS IMPACT:", Section::Impact),
    ("TECHNICAL DETAILS:", Section::Details),
    ("ACTION ITEMS:", Section::Actions),
];

const END_MARKER: &str = "END_ANALYSIS";

/// Byte offset of the first ASCII case-insensitive occurrence of `needle`.
///
/// Offsets are into `haystack` itself, so they are always char boundaries.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.char_indices().map(|(i, _)| i).find(|&i| {
        haystack
            .get(i..i + needle.len())
            .is_some_and(|window| window.eq_ignore_ascii_case(needle))
    })
}

/// Classify one reply line.
///
/// Headers and the end marker are recognised anywhere on the line, in any
/// ASCII case, so `**Takeaways:**` and `1. TAKEAWAYS:` both open the
/// takeaways section.
///
/// # Arguments
///
/// * `raw` - A single line of model output, untrimmed.
///
/// # Returns
///
/// The [`Line`] kind. A header carries the text after its colon with
/// markdown emphasis removed.
pub fn classify_line(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    for (marker, section) in HEADERS {
        if let Some(pos) = find_ascii_ci(line, marker) {
            let rest = line
                .get(pos + marker.len()..)
                .unwrap_or("")
                .trim_matches(|c: char| c == '*' || c.is_whitespace());
            return Line::Header(section, rest);
        }
    }
    if find_ascii_ci(line, END_MARKER).is_some() {
        return Line::End;
    }
    match line.strip_prefix(['•', '-']) {
        Some(rest) => Line::Bullet(rest.trim()),
        None => Line::Text(line),
    }
}

/// Next parser section after reading `line` while in `current`.
pub fn transition(current: Section, line: &Line<'_>) -> Section {
    match line {
        Line::Header(next, _) => *next,
        Line::End => Section::None,
        _ => current,
    }
}

fn append_prose(mut insights: DetailedInsights, section: Section, text: &str) -> DetailedInsights {
    let target = match section {
        Section::Impact => &mut insights.business_impact,
        Section::Details => &mut insights.technical_details,
        _ => return insights,
    };
    target.push_str(text);
    target.push(' ');
    insights
}

fn append_item(mut insights: DetailedInsights, section: Section, text: &str) -> DetailedInsights {
    if text.is_empty() {
        return insights;
    }
    match section {
        Section::Takeaways => insights.takeaways.push(text.to_string()),
        Section::Actions => insights.action_items.push(text.to_string()),
        _ => {}
    }
    insights
}

/// Apply one classified line, with `section` already transitioned for it.
pub fn accumulate(insights: DetailedInsights, section: Section, line: &Line<'_>) -> DetailedInsights {
    match *line {
        Line::Header(_, rest) if !rest.is_empty() && section.is_prose() => {
            append_prose(insights, section, rest)
        }
        Line::Header(_, rest) if section.is_list() => append_item(insights, section, rest),
        Line::Bullet(text) if section.is_list() => append_item(insights, section, text),
        Line::Text(text) if section.is_prose() => append_prose(insights, section, text),
        _ => insights,
    }
}

/// Parse a detailed insight reply into its four sections.
///
/// Never fails: lines outside any section are dropped, so a reply without
/// headers gives an empty record with `raw_response` set.
pub fn parse_reply(reply: &str) -> DetailedInsights {
    let (mut insights, _) = reply.lines().fold(
        (DetailedInsights::default(), Section::None),
        |(insights, section), raw| {
            let line = classify_line(raw);
            let next = transition(section, &line);
            (accumulate(insights, next, &line), next)
        },
    );
    insights.business_impact = insights.business_impact.trim().to_string();
    insights.technical_details = insights.technical_details.trim().to_string();
    insights.raw_response = reply.to_string();
    insights
}

/// Prompt for one article; the body (or summary when there is none) is cut to `max_chars`.
pub fn build_prompt(article: &ArticleCandidate, max_chars: usize) -> String {
    let text = if article.body.trim().is_empty() {
        &article.summary
    } else {
        &article.body
    };
    let text: String = text.chars().take(max_chars).collect();
    format!(
        "Analyze this AI news article and provide detailed insights:\n\
         \n\
         Title: {title}\n\
         Content: {text}\n\
         \n\
         Provide:\n\
         1. KEY TAKEAWAYS (3-4 bullet points of main insights)\n\
         2. BUSINESS IMPACT (how this affects companies and professionals)\n\
         3. TECHNICAL DETAILS (key technical aspects explained simply)\n\
         4. ACTION ITEMS (what readers should do about this)\n\
         \n\
         Format your response as:\n\
         TAKEAWAYS:\n\
         • [Key insight 1]\n\
         • [Key insight 2]\n\
         • [Key insight 3]\n\
         \n\
         BUSINESS IMPACT:\n\
         [2-3 sentences about business implications]\n\
         \n\
         TECHNICAL DETAILS:\n\
         [2-3 sentences explaining the technology]\n\
         \n\
         ACTION ITEMS:\n\
         • [Action 1]\n\
         • [Action 2]\n\
         \n\
         {END_MARKER}",
        title = article.title,
    )
}

impl DetailedInsights {
    /// Templated insights used when generation is unavailable.
    pub fn fallback(title: &str) -> Self {
        Self {
            takeaways: vec![
                format!("AI development: {title}"),
                "Industry advancement in artificial intelligence".to_string(),
                "Potential impact on business and technology".to_string(),
            ],
            business_impact: format!(
                "This development in AI technology may affect how businesses approach {}. \
                 Companies should monitor these changes for potential opportunities.",
                title.to_lowercase()
            ),
            technical_details: format!(
                "Technical advancement related to {title}. See article for specific implementation details."
            ),
            action_items: vec![
                "Monitor this development for business impact".to_string(),
                "Consider implications for your AI strategy".to_string(),
                "Stay updated on similar advancements".to_string(),
            ],
            raw_response: "Fallback analysis due to LLM unavailability".to_string(),
        }
    }
}
