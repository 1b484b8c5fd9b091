//! List-fetch strategies and the per-source fetch chain.
//!
//! A source is turned into article candidates by trying strategies in a fixed
//! priority order until enough candidates have been found:
//!
//! | Order | Strategy | Module | Runs when |
//! |-------|----------|--------|-----------|
//! | 1 | RSS / Atom feed | [`feed`] | the source declares a `feed_url` |
//! | 2 | Static listing page | [`listing`] | fewer than `sufficient_candidates` so far |
//! | 3 | Headless-rendered page | [`rendered`] | still fewer than `sufficient_candidates` |
//!
//! Every strategy returns a result; [`FetchChain`] turns an error into an
//! empty contribution and moves on, so the chain always runs to sufficiency
//! or exhaustion. Candidates are validated as they arrive (non-empty title,
//! absolute http(s) URL) and the merged list is URL-deduplicated.

pub mod feed;
pub mod listing;
pub mod rendered;

use crate::config::PipelineConfig;
use crate::dedup::dedup_by_url;
use crate::error::Result;
use crate::http::DocumentFetcher;
use crate::models::{ArticleCandidate, ExtractionMethod, Source};
use crate::render::PageRenderer;
use feed::FeedStrategy;
use listing::ListingStrategy;
use rendered::RenderedStrategy;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// Order in which strategies are tried.
pub const CHAIN_ORDER: [ExtractionMethod; 3] = [
    ExtractionMethod::Feed,
    ExtractionMethod::Static,
    ExtractionMethod::Rendered,
];

/// What the chain produced for one source.
#[derive(Debug, Clone, Default)]
pub struct ChainOutcome {
    /// Valid, URL-unique candidates in discovery order.
    pub candidates: Vec<ArticleCandidate>,
    /// Candidates rejected by validation.
    pub dropped: usize,
    /// Raw candidate count per strategy that ran, in order.
    pub strategies: Vec<(ExtractionMethod, usize)>,
}

/// Tries each strategy in [`CHAIN_ORDER`] until a source has enough candidates.
///
/// Strategy failures never escape: each one is logged and counts as an empty
/// result.
pub struct FetchChain<'a, F, R> {
    fetcher: &'a F,
    renderer: &'a R,
    config: &'a PipelineConfig,
}

impl<'a, F: DocumentFetcher, R: PageRenderer> FetchChain<'a, F, R> {
    pub fn new(fetcher: &'a F, renderer: &'a R, config: &'a PipelineConfig) -> Self {
        Self {
            fetcher,
            renderer,
            config,
        }
    }

    async fn attempt(&self, method: ExtractionMethod, source: &Source) -> Result<Vec<ArticleCandidate>> {
        let http = &self.config.http;
        let limits = &self.config.limits;
        match method {
            ExtractionMethod::Feed => {
                FeedStrategy::new(self.fetcher, http.request_timeout(), limits.feed_cap)
                    .fetch(source)
                    .await
            }
            ExtractionMethod::Static => {
                ListingStrategy::new(
                    self.fetcher,
                    http.request_timeout(),
                    &self.config.listing,
                    limits.listing_cap,
                )
                .fetch(source)
                .await
            }
            ExtractionMethod::Rendered => {
                RenderedStrategy::new(self.renderer, &self.config.render, http.render_timeout())
                    .fetch(source)
                    .await
            }
        }
    }

    /// Run the strategies in [`CHAIN_ORDER`] until the source has enough candidates.
    #[instrument(level = "info", skip_all, fields(source = %source.name))]
    pub async fn run(&self, source: &Source) -> ChainOutcome {
        let sufficient = self.config.limits.sufficient_candidates;
        let mut outcome = ChainOutcome::default();
        let mut urls = HashSet::new();

        for method in CHAIN_ORDER {
            if urls.len() >= sufficient {
                debug!(found = urls.len(), "Sufficient candidates; chain stops");
                break;
            }
            if method == ExtractionMethod::Feed && source.feed_url.is_none() {
                continue;
            }

            let found = match self.attempt(method, source).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(strategy = %method, error = %e, "Strategy failed; treating as empty");
                    Vec::new()
                }
            };
            outcome.strategies.push((method, found.len()));

            for candidate in found {
                if candidate.is_valid() {
                    urls.insert(candidate.url.clone());
                    outcome.candidates.push(candidate);
                } else {
                    outcome.dropped += 1;
                }
            }
        }

        outcome.candidates = dedup_by_url(outcome.candidates);
        info!(
            candidates = outcome.candidates.len(),
            dropped = outcome.dropped,
            strategies = ?outcome.strategies,
            "Fetch chain finished"
        );
        outcome
    }
}
