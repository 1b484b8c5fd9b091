//! Static listing-page strategy.
//!
//! Fetches the source's landing page and walks the [`ListingProfile`] selector
//! cascade. Each group is tried in order and the first one that yields any
//! usable link wins. A link is usable when it resolves to an absolute http(s)
//! URL, its visible text is longer than the group's minimum, and it matches
//! none of the profile's exclusion fragments.

use crate::config::{ListingProfile, SelectorGroup};
use crate::error::{PipelineError, Result};
use crate::extractor::text::{collapse_whitespace, element_text};
use crate::http::DocumentFetcher;
use crate::models::{ArticleCandidate, ExtractionMethod, Source};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

fn usable_link(base: &Url, href: &str, text: &str, group: &SelectorGroup, exclude: &[String]) -> Option<Url> {
    if text.chars().count() <= group.min_text_chars {
        return None;
    }
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let resolved = base.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    let lower = resolved.as_str().to_lowercase();
    let raw_lower = href.to_lowercase();
    if exclude
        .iter()
        .any(|skip| lower.contains(skip.as_str()) || raw_lower.contains(skip.as_str()))
    {
        return None;
    }
    if group.same_host_only && resolved.host_str() != base.host_str() {
        return None;
    }
    if resolved == *base {
        return None;
    }
    Some(resolved)
}

/// Apply the selector cascade to a listing page.
pub fn extract_links(
    html: &str,
    base: &Url,
    profile: &ListingProfile,
    cap: usize,
    source: &str,
) -> Vec<ArticleCandidate> {
    let doc = Html::parse_document(html);

    for group in &profile.groups {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        'selectors: for raw in &group.selectors {
            let selector = match Selector::parse(raw) {
                Ok(s) => s,
                Err(e) => {
                    warn!(selector = %raw, error = ?e, "Skipping unparsable selector");
                    continue;
                }
            };
            for el in doc.select(&selector) {
                if found.len() >= cap {
                    break 'selectors;
                }
                let Some(href) = el.value().attr("href") else {
                    continue;
                };
                let text = collapse_whitespace(&element_text(el));
                if let Some(url) = usable_link(base, href, &text, group, &profile.exclude) {
                    if seen.insert(url.to_string()) {
                        found.push(ArticleCandidate::new(
                            text,
                            url.to_string(),
                            source,
                            ExtractionMethod::Static,
                        ));
                    }
                }
            }
        }

        if !found.is_empty() {
            debug!(group = %group.name, count = found.len(), "Selector group matched");
            return found;
        }
    }
    Vec::new()
}

/// Second link in the chain: links scraped from the static listing page.
pub struct ListingStrategy<'a, F> {
    fetcher: &'a F,
    timeout: Duration,
    profile: &'a ListingProfile,
    cap: usize,
}

impl<'a, F: DocumentFetcher> ListingStrategy<'a, F> {
    pub fn new(fetcher: &'a F, timeout: Duration, profile: &'a ListingProfile, cap: usize) -> Self {
        Self {
            fetcher,
            timeout,
            profile,
            cap,
        }
    }

    /// Fetch `source.url` and run [`extract_links`] with the source's own
    /// listing profile, or the default cascade when it has none.
    #[instrument(level = "info", skip_all, fields(source = %source.name))]
    pub async fn fetch(&self, source: &Source) -> Result<Vec<ArticleCandidate>> {
        let base = Url::parse(&source.url)
            .map_err(|e| PipelineError::Parse(format!("source url {}: {e}", source.url)))?;
        let html = self.fetcher.fetch_text(&source.url, self.timeout).await?;
        let profile = source.listing.as_ref().unwrap_or(self.profile);
        let candidates = extract_links(&html, &base, profile, self.cap, &source.name);
        info!(count = candidates.len(), "Extracted listing links");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://news.example/ai/").unwrap()
    }

    fn urls(v: &[ArticleCandidate]) -> Vec<&str> {
        v.iter().map(|c| c.url.as_str()).collect()
    }

    #[test]
    fn test_first_matching_group_wins() {
        let html = r#"<html><body>
            <article><a href="/2025/03/first-story">A first story with a long headline</a></article>
            <article><a href="https://news.example/2025/03/second">Second story with a long headline</a></article>
            <h2><a href="/2025/03/heading-story">Heading story that should not be used</a></h2>
        </body></html>"#;
        let out = extract_links(html, &base(), &ListingProfile::default(), 15, "news");
        assert_eq!(
            urls(&out),
            vec![
                "https://news.example/2025/03/first-story",
                "https://news.example/2025/03/second"
            ]
        );
        assert!(out.iter().all(|c| c.extraction_method == ExtractionMethod::Static));
        assert_eq!(out[0].title, "A first story with a long headline");
    }

    #[test]
    fn test_falls_through_to_later_group() {
        let html = r#"<html><body>
            <article><a href="/x">short</a></article>
            <h3><a href="/posts/heading-story">  A heading   story long enough </a></h3>
        </body></html>"#;
        let out = extract_links(html, &base(), &ListingProfile::default(), 15, "news");
        assert_eq!(urls(&out), vec!["https://news.example/posts/heading-story"]);
        assert_eq!(out[0].title, "A heading story long enough");
    }

    #[test]
    fn test_exclusions_and_dedup() {
        let html = r#"<html><body>
            <h2><a href="/tag/llm">Everything tagged with LLM here</a></h2>
            <h2><a href="/about">About this publication and staff</a></h2>
            <h2><a href="javascript:void(0)">Open the menu in javascript</a></h2>
            <h2><a href="/story#comments">Comments on a long story title</a></h2>
            <h2><a href="/story-one">The one real story on this page</a></h2>
            <h3><a href="/story-one">The one real story on this page</a></h3>
        </body></html>"#;
        let out = extract_links(html, &base(), &ListingProfile::default(), 15, "news");
        assert_eq!(urls(&out), vec!["https://news.example/story-one"]);
    }

    #[test]
    fn test_cap_is_enforced() {
        let links: String = (0..30)
            .map(|i| format!(r#"<h2><a href="/story-{i}">Story number {i} with a long title</a></h2>"#))
            .collect();
        let html = format!("<html><body>{links}</body></html>");
        let out = extract_links(&html, &base(), &ListingProfile::default(), 15, "news");
        assert_eq!(out.len(), 15);
    }

    #[test]
    fn test_same_host_group_rejects_foreign_links() {
        let html = r#"<html><body>
            <div><a href="https://other.example/post">A foreign link with a long text</a></div>
            <div><a href="/local-post">A local link with a long text</a></div>
        </body></html>"#;
        let out = extract_links(html, &base(), &ListingProfile::default(), 15, "news");
        assert_eq!(urls(&out), vec!["https://news.example/local-post"]);
    }
}
