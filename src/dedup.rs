//! Two-stage deduplication.
//!
//! - [`dedup_by_url`] runs per source once the fetch chain has merged its
//!   strategies; exact URL match, first occurrence wins.
//! - [`dedup_by_title`] runs after all sources are aggregated; trimmed,
//!   case-insensitive title match, applied only to titles long enough to be
//!   distinctive. Short titles always pass through.
//!
//! Both passes are stable: the output is a subsequence of the input.

use crate::models::ArticleCandidate;
use itertools::Itertools;
use std::collections::HashSet;
use tracing::debug;

/// Drop candidates whose URL was already seen. The first occurrence wins.
///
/// # Arguments
///
/// * `candidates` - Candidates in discovery order
///
/// # Returns
///
/// The candidates with unique URLs, order preserved.
pub fn dedup_by_url(candidates: Vec<ArticleCandidate>) -> Vec<ArticleCandidate> {
    let before = candidates.len();
    let unique: Vec<_> = candidates
        .into_iter()
        .unique_by(|c| c.url.clone())
        .collect();
    debug!(before, after = unique.len(), "URL dedup");
    unique
}

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Drop later candidates whose normalised title (longer than `min_chars`) was already seen.
pub fn dedup_by_title(candidates: Vec<ArticleCandidate>, min_chars: usize) -> Vec<ArticleCandidate> {
    let before = candidates.len();
    let mut seen = HashSet::new();
    let unique: Vec<_> = candidates
        .into_iter()
        .filter(|c| {
            let key = title_key(&c.title);
            key.chars().count() <= min_chars || seen.insert(key)
        })
        .collect();
    debug!(before, after = unique.len(), "Title dedup");
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionMethod;

    fn c(title: &str, url: &str) -> ArticleCandidate {
        ArticleCandidate::new(title, url, "src", ExtractionMethod::Static)
    }

    fn titles(v: &[ArticleCandidate]) -> Vec<&str> {
        v.iter().map(|c| c.title.as_str()).collect()
    }

    #[test]
    fn test_url_dedup_first_wins() {
        let out = dedup_by_url(vec![
            c("first", "https://a.example/1"),
            c("second", "https://a.example/2"),
            c("third", "https://a.example/1"),
        ]);
        assert_eq!(titles(&out), vec!["first", "second"]);
    }

    #[test]
    fn test_title_dedup_case_and_whitespace() {
        let out = dedup_by_title(
            vec![
                c("OpenAI ships a new reasoning model", "https://a.example/1"),
                c("  openai SHIPS a new reasoning model ", "https://b.example/1"),
                c("Something else entirely here", "https://a.example/2"),
            ],
            15,
        );
        assert_eq!(
            titles(&out),
            vec!["OpenAI ships a new reasoning model", "Something else entirely here"]
        );
    }

    #[test]
    fn test_short_titles_are_never_deduped() {
        let out = dedup_by_title(
            vec![
                c("AI news", "https://a.example/1"),
                c("AI news", "https://a.example/2"),
                c("exactly 15 char", "https://a.example/3"),
                c("exactly 15 char", "https://a.example/4"),
            ],
            15,
        );
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_title_dedup_is_idempotent() {
        let input = vec![
            c("A long enough headline one", "https://a.example/1"),
            c("a long enough headline ONE", "https://a.example/2"),
            c("Short", "https://a.example/3"),
            c("Short", "https://a.example/4"),
            c("Another long enough headline", "https://a.example/5"),
        ];
        let once = dedup_by_title(input, 15);
        let twice = dedup_by_title(once.clone(), 15);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 4);
    }
}
