//! Headless-rendered listing strategy, the last link in the fetch chain.

use crate::config::RenderProfile;
use crate::error::{PipelineError, Result};
use crate::extractor::text::{collapse_whitespace, element_text};
use crate::models::{ArticleCandidate, ExtractionMethod, Source};
use crate::render::PageRenderer;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

const MAX_RENDERED_SUMMARY_CHARS: usize = 300;

static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

fn parse_all(raw: &[String]) -> Vec<Selector> {
    raw.iter()
        .filter_map(|s| match Selector::parse(s) {
            Ok(sel) => Some(sel),
            Err(e) => {
                warn!(selector = %s, error = ?e, "Skipping unparsable selector");
                None
            }
        })
        .collect()
}

fn first_text(el: ElementRef<'_>, selectors: &[Selector], min_chars: usize) -> Option<String> {
    selectors
        .iter()
        .flat_map(|sel| el.select(sel))
        .map(|found| collapse_whitespace(&element_text(found)))
        .find(|t| t.chars().count() > min_chars)
}

/// Turn each matching container of a rendered page into a candidate.
///
/// A container without a title longer than `min_title_chars` is discarded.
/// One without a resolvable link becomes a candidate with an empty URL so
/// validation can count it.
pub fn extract_containers(
    html: &str,
    base: &Url,
    profile: &RenderProfile,
    source: &str,
) -> Vec<ArticleCandidate> {
    let doc = Html::parse_document(html);
    let titles = parse_all(&profile.titles);
    let summaries = parse_all(&profile.summaries);

    let Some(containers) = parse_all(&profile.containers).into_iter().find_map(|sel| {
        let found: Vec<_> = doc.select(&sel).take(profile.max_containers).collect();
        (!found.is_empty()).then_some(found)
    }) else {
        return Vec::new();
    };

    containers
        .into_iter()
        .filter_map(|container| {
            let title = first_text(container, &titles, profile.min_title_chars)?;
            let url = container
                .select(&LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| base.join(href.trim()).ok())
                .map(|u| u.to_string())
                .unwrap_or_default();
            let summary: String = first_text(container, &summaries, profile.min_summary_chars)
                .unwrap_or_default()
                .chars()
                .take(MAX_RENDERED_SUMMARY_CHARS)
                .collect();
            Some(
                ArticleCandidate::new(title, url, source, ExtractionMethod::Rendered)
                    .with_summary(summary),
            )
        })
        .collect()
}

/// Last link in the chain: containers read from a headless render.
pub struct RenderedStrategy<'a, R> {
    renderer: &'a R,
    profile: &'a RenderProfile,
    timeout: Duration,
}

impl<'a, R: PageRenderer> RenderedStrategy<'a, R> {
    pub fn new(renderer: &'a R, profile: &'a RenderProfile, timeout: Duration) -> Self {
        Self {
            renderer,
            profile,
            timeout,
        }
    }

    #[instrument(level = "info", skip_all, fields(source = %source.name))]
    pub async fn fetch(&self, source: &Source) -> Result<Vec<ArticleCandidate>> {
        let base = Url::parse(&source.url)
            .map_err(|e| PipelineError::Parse(format!("source url {}: {e}", source.url)))?;
        let html = self
            .renderer
            .render(&source.url, &self.profile.wait_selector, self.timeout)
            .await?;
        let candidates = extract_containers(&html, &base, self.profile, &source.name);
        info!(count = candidates.len(), "Extracted rendered containers");
        Ok(candidates)
    }
}
