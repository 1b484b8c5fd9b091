//! RSS 2.0 and Atom feed strategy.
//!
//! The cheapest and most reliable strategy, tried first whenever a source
//! declares a `feed_url`. Items become candidates tagged
//! [`ExtractionMethod::Feed`]; HTML in descriptions is reduced to text.

use crate::error::{PipelineError, Result};
use crate::extractor::text::{collapse_whitespace, element_text};
use crate::http::DocumentFetcher;
use crate::models::{ArticleCandidate, ExtractionMethod, Source};
use quick_xml::de::from_str;
use scraper::Html;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

const MAX_FEED_SUMMARY_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

impl AtomEntry {
    fn alternate_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.links.first())
            .and_then(|l| l.href.as_deref())
    }
}

/// HTML entities that are common in feeds but undefined in XML.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

fn html_to_text(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    collapse_whitespace(&element_text(doc.root_element()))
}

fn feed_summary(raw: Option<&str>) -> String {
    raw.map(html_to_text)
        .unwrap_or_default()
        .chars()
        .take(MAX_FEED_SUMMARY_CHARS)
        .collect()
}

fn candidate(source: &str, title: &str, link: &str, summary: String, date: &str) -> ArticleCandidate {
    ArticleCandidate::new(
        collapse_whitespace(title),
        link.trim(),
        source,
        ExtractionMethod::Feed,
    )
    .with_summary(summary)
    .with_date(date.trim())
}

/// Parse an RSS or Atom document into at most `limit` candidates.
///
/// Entries missing a title or link are still returned, with empty fields, so
/// the caller's validation step can count them.
pub fn parse_feed(xml: &str, source: &str, limit: usize) -> Result<Vec<ArticleCandidate>> {
    let xml = scrub_html_entities_for_xml(xml);

    if let Ok(rss) = from_str::<Rss>(&xml) {
        return Ok(rss
            .channel
            .items
            .into_iter()
            .take(limit)
            .map(|item| {
                candidate(
                    source,
                    item.title.as_deref().unwrap_or_default(),
                    item.link.as_deref().unwrap_or_default(),
                    feed_summary(item.description.as_deref()),
                    item.pub_date.as_deref().unwrap_or_default(),
                )
            })
            .collect());
    }

    if !xml.contains("<feed") {
        return Err(PipelineError::Parse(format!(
            "feed for {source} is neither RSS nor Atom"
        )));
    }
    let atom: AtomFeed =
        from_str(&xml).map_err(|e| PipelineError::Parse(format!("feed for {source}: {e}")))?;
    Ok(atom
        .entries
        .iter()
        .take(limit)
        .map(|entry| {
            let summary = entry
                .summary
                .as_ref()
                .or(entry.content.as_ref())
                .map(|t| t.value.as_str());
            candidate(
                source,
                entry.title.as_ref().map(|t| t.value.as_str()).unwrap_or_default(),
                entry.alternate_link().unwrap_or_default(),
                feed_summary(summary),
                entry
                    .published
                    .as_deref()
                    .or(entry.updated.as_deref())
                    .unwrap_or_default(),
            )
        })
        .collect())
}

/// First link in the chain: a source's declared RSS or Atom feed.
pub struct FeedStrategy<'a, F> {
    fetcher: &'a F,
    timeout: Duration,
    limit: usize,
}

impl<'a, F: DocumentFetcher> FeedStrategy<'a, F> {
    pub fn new(fetcher: &'a F, timeout: Duration, limit: usize) -> Self {
        Self {
            fetcher,
            timeout,
            limit,
        }
    }

    /// Fetch and parse `source.feed_url`. A source without a feed yields no
    /// candidates.
    ///
    /// # Errors
    ///
    /// Network or parse failures. The chain logs these and moves on.
    #[instrument(level = "info", skip_all, fields(source = %source.name))]
    pub async fn fetch(&self, source: &Source) -> Result<Vec<ArticleCandidate>> {
        let Some(feed_url) = source.feed_url.as_deref() else {
            return Ok(Vec::new());
        };
        let xml = self.fetcher.fetch_text(feed_url, self.timeout).await?;
        let candidates = parse_feed(&xml, &source.name, self.limit)?;
        info!(count = candidates.len(), %feed_url, "Parsed feed");
        Ok(candidates)
    }
}
