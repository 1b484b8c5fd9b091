//! Heuristic full-text extraction for article pages.
//!
//! The sites we read have no article API and no shared markup, so the
//! extractor works through ordered selector cascades:
//!
//! 1. **Strip** scripts, styles, navigation, headers, footers, asides, iframes
//!    and ad containers.
//! 2. **Body** via three tiers: the first known content container whose text
//!    exceeds `min_body_chars`; else every block element longer than
//!    `min_block_chars` joined, if that exceeds `min_body_chars`; else every
//!    paragraph joined, or the sentinel [`NO_CONTENT`].
//! 3. **Title, author, date** via their own short cascades.
//! 4. **Summary** from the leading informative sentences of the cleaned body.
//!
//! Extraction never fails the pipeline: a fetch error produces an
//! [`ExtractedContent`] with `success = false` and the candidate is kept as is.

pub mod text;

use crate::config::Limits;
use crate::http::DocumentFetcher;
use crate::models::{ArticleCandidate, ExtractedContent};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::time::Duration;
use text::{clean_text, element_text, generate_summary};
use tracing::{debug, info, instrument, warn};

/// Body text of a page where no cascade tier found anything.
pub const NO_CONTENT: &str = "No content extracted";

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().map(|s| Selector::parse(s).unwrap()).collect()
}

static STRIP: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "script, style, noscript, nav, header, footer, aside, iframe, menu, \
         advertisement, sidebar, .advertisement, .ads, .sidebar",
    )
    .unwrap()
});

static CONTENT_CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "article",
        ".article-content",
        ".post-content",
        ".entry-content",
        ".content",
        ".main-content",
        "main",
        ".story-body",
        ".article-body",
        ".post-body",
    ])
});

static BLOCKS: Lazy<Selector> = Lazy::new(|| Selector::parse("p, div").unwrap());
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

static TITLES: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&["h1", ".article-title", ".post-title", ".entry-title", "title"])
});

static AUTHORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        ".author",
        ".byline",
        ".post-author",
        "[rel=\"author\"]",
        ".article-author",
    ])
});

static DATES: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&["time", ".date", ".published", ".post-date", ".article-date"])
});

fn strip_non_content(doc: &mut Html) {
    let ids: Vec<_> = doc.select(&STRIP).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn extract_body(doc: &Html, limits: &Limits) -> String {
    for selector in CONTENT_CONTAINERS.iter() {
        if let Some(el) = doc.select(selector).next() {
            let text = element_text(el);
            if text.chars().count() > limits.min_body_chars {
                return text;
            }
        }
    }

    let blocks: Vec<String> = doc
        .select(&BLOCKS)
        .map(element_text)
        .filter(|t| t.chars().count() > limits.min_block_chars)
        .collect();
    let joined = blocks.join(" ");
    if joined.chars().count() > limits.min_body_chars {
        return joined;
    }

    let paragraphs = doc
        .select(&PARAGRAPHS)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if paragraphs.is_empty() {
        NO_CONTENT.to_string()
    } else {
        paragraphs
    }
}

fn extract_title(doc: &Html, limits: &Limits) -> String {
    TITLES
        .iter()
        .filter_map(|sel| doc.select(sel).next())
        .map(element_text)
        .find(|t| t.chars().count() > limits.min_title_chars)
        .unwrap_or_default()
}

fn extract_author(doc: &Html) -> String {
    AUTHORS
        .iter()
        .filter_map(|sel| doc.select(sel).next())
        .map(element_text)
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

fn extract_date(doc: &Html) -> String {
    for sel in DATES.iter() {
        if let Some(el) = doc.select(sel).next() {
            if let Some(dt) = el.value().attr("datetime").filter(|d| !d.trim().is_empty()) {
                return dt.trim().to_string();
            }
            let text = element_text(el);
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// Run the full heuristic cascade over one HTML document.
pub fn extract_document(html: &str, limits: &Limits) -> ExtractedContent {
    let mut doc = Html::parse_document(html);
    strip_non_content(&mut doc);

    let body = clean_text(&extract_body(&doc, limits));
    let summary = generate_summary(&body, limits);

    ExtractedContent {
        title: extract_title(&doc, limits),
        word_count: body.split_whitespace().count(),
        author: extract_author(&doc),
        date: extract_date(&doc),
        summary,
        body,
        success: true,
        error: None,
    }
}

/// Fetches article pages and merges their extracted text into candidates.
pub struct ContentExtractor<'a, F> {
    fetcher: &'a F,
    limits: &'a Limits,
    timeout: Duration,
}

impl<'a, F: DocumentFetcher> ContentExtractor<'a, F> {
    pub fn new(fetcher: &'a F, limits: &'a Limits, timeout: Duration) -> Self {
        Self {
            fetcher,
            limits,
            timeout,
        }
    }

    /// Fetch `url` and run [`extract_document`] over it.
    ///
    /// # Returns
    ///
    /// The extracted content, or a record with `success: false` and the error
    /// string when the URL is empty or the fetch fails. Never an `Err`.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn extract(&self, url: &str) -> ExtractedContent {
        if url.trim().is_empty() {
            return ExtractedContent::failed("No URL provided");
        }
        match self.fetcher.fetch_text(url, self.timeout).await {
            Ok(html) => extract_document(&html, self.limits),
            Err(e) => ExtractedContent::failed(e.to_string()),
        }
    }

    /// Return the candidate enriched with full text, or unchanged plus an error marker.
    pub async fn enrich(&self, candidate: ArticleCandidate) -> ArticleCandidate {
        if candidate.url.contains("/categories/") {
            debug!(url = %candidate.url, "Listing-page URL; not fetching content");
            return candidate.skipped();
        }
        let content = self.extract(&candidate.url).await;
        if content.success {
            info!(url = %candidate.url, words = content.word_count, "Extracted article content");
            candidate.with_content(&content, self.limits.max_stored_body_chars)
        } else {
            let error = content.error.unwrap_or_else(|| "unknown error".to_string());
            warn!(url = %candidate.url, %error, "Content extraction failed; keeping candidate");
            candidate.with_extraction_error(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, Result};
    use crate::models::{Enrichment, ExtractionMethod};
    use std::collections::HashMap;

    struct FakeFetcher(HashMap<String, String>);

    impl DocumentFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>> {
            self.0
                .get(url)
                .map(|s| s.clone().into_bytes())
                .ok_or_else(|| PipelineError::network(url, "HTTP 404"))
        }
    }

    const ARTICLE: &str = r#"<html><head><title>Fallback page title text</title>
        <script>var tracking = "Lots of script text that must never show up in the body at all";</script></head>
        <body>
          <nav>Home News About Contact Subscribe Careers Advertise Privacy Terms Sitemap</nav>
          <h1>Open model beats benchmarks</h1>
          <span class="byline">Jane Doe</span>
          <time datetime="2025-03-04T10:00:00Z">March 4</time>
          <article>
            <p>Researchers released a new open model for code generation this week, with weights available.</p>
            <p>The model beats earlier baselines on several public benchmarks and runs on a single GPU.</p>
            <p>Advertisement</p>
            <p>It was trained on a curated dataset of permissively licensed code from public repositories.</p>
          </article>
          <footer>Copyright footer text that is long enough to be a block element on its own right here</footer>
        </body></html>"#;

    #[test]
    fn test_extract_document_container_tier() {
        let content = extract_document(ARTICLE, &Limits::default());
        assert!(content.success);
        assert_eq!(content.title, "Open model beats benchmarks");
        assert_eq!(content.author, "Jane Doe");
        assert_eq!(content.date, "2025-03-04T10:00:00Z");
        assert!(content.body.starts_with("Researchers released a new open model"));
        assert!(!content.body.contains("Advertisement"));
        assert!(!content.body.contains("tracking"));
        assert!(!content.body.contains("Copyright"));
        assert!(content.summary.starts_with("Researchers released"));
        assert_eq!(content.word_count, content.body.split_whitespace().count());
    }

    #[test]
    fn test_single_short_paragraph_is_kept_verbatim() {
        let para = "A lone paragraph with exactly sixty characters of plain text";
        assert_eq!(para.len(), 60);
        let html = format!("<html><body><p>{para}</p></body></html>");
        let content = extract_document(&html, &Limits::default());
        assert_eq!(content.body, para);
        assert_ne!(content.body, NO_CONTENT);
    }

    #[test]
    fn test_block_tier_joins_long_blocks() {
        let block = "A block of text that is comfortably longer than fifty characters.";
        let html = format!(
            "<html><body><section><p>{block}</p><p>{block}</p><p>{block}</p><p>{block}</p><p>tiny</p></section></body></html>"
        );
        let content = extract_document(&html, &Limits::default());
        assert_eq!(content.body, [block; 4].join(" "));
    }

    #[test]
    fn test_empty_document_yields_sentinel() {
        let content = extract_document("<html><body><span>hi</span></body></html>", &Limits::default());
        assert_eq!(content.body, NO_CONTENT);
    }

    #[test]
    fn test_title_falls_back_to_document_title() {
        let html = "<html><head><title>Document level title here</title></head><body><h1>Short</h1></body></html>";
        let content = extract_document(html, &Limits::default());
        assert_eq!(content.title, "Document level title here");
    }

    #[tokio::test]
    async fn test_enrich_success_and_failure() {
        let mut pages = HashMap::new();
        pages.insert("https://a.example/good".to_string(), ARTICLE.to_string());
        let fetcher = FakeFetcher(pages);
        let limits = Limits::default();
        let extractor = ContentExtractor::new(&fetcher, &limits, Duration::from_secs(1));

        let good = ArticleCandidate::new(
            "Listing title for good",
            "https://a.example/good",
            "a",
            ExtractionMethod::Static,
        );
        let enriched = extractor.enrich(good).await;
        assert!(enriched.content_extracted());
        assert_eq!(enriched.title, "Listing title for good");
        assert_eq!(enriched.author, "Jane Doe");

        let bad = ArticleCandidate::new(
            "Listing title for bad",
            "https://a.example/missing",
            "a",
            ExtractionMethod::Feed,
        )
        .with_summary("from feed");
        let kept = extractor.enrich(bad.clone()).await;
        assert_eq!(kept.summary, "from feed");
        assert!(matches!(kept.enrichment, Enrichment::Failed { .. }));

        let category = ArticleCandidate::new(
            "Category page link",
            "https://a.example/categories/ai",
            "a",
            ExtractionMethod::Static,
        );
        assert_eq!(extractor.enrich(category).await.enrichment, Enrichment::Skipped);
    }
}
