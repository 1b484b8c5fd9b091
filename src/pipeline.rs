//! Orchestration of one pipeline run.
//!
//! ```text
//! sources ──▶ FetchChain ──▶ ContentExtractor ──▶ title dedup ──▶ Curator ──▶ select_top
//!  (bounded, per-source timeout)   (bounded, same deadline)                        │
//!                                                          insights ◀──────────┤
//!                                                          trends   ◀──────────┤
//!                                                          ArticleStore ◀──────┘
//! ```
//!
//! Sources run concurrently up to `source_workers`; article pages within a
//! source up to `article_workers`; generation calls up to `llm_workers`.
//! Politeness towards each host is enforced by the fetcher itself.
//!
//! Nothing here returns an error. Failed sources report zero articles, failed
//! generation yields fallback records and a failed store is reported in the
//! [`RunReport`] while trends and insights are still produced. Raising the
//! [`CancelFlag`] stops new work from being started and the run returns what
//! it has.

use crate::api::TextGenerator;
use crate::config::PipelineConfig;
use crate::curator::{Curator, NO_TREND_ANALYSIS};
use crate::dedup::dedup_by_title;
use crate::error::Result;
use crate::extractor::ContentExtractor;
use crate::http::DocumentFetcher;
use crate::models::{
    ArticleCandidate, DetailedInsights, ScoredArticle, Source, SourceResult, StoredArticle, Trend,
};
use crate::render::PageRenderer;
use crate::scrapers::{ChainOutcome, FetchChain};
use crate::trends;
use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

/// Shared run-wide cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Ask every stage to stop starting new work.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Downstream consumer of curated articles (search index, archive, ...).
pub trait ArticleStore {
    async fn store(&self, articles: &[StoredArticle]) -> Result<StorageOutcome>;
}

/// What a successful store call reports back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageOutcome {
    pub stored: usize,
    pub location: String,
}

/// Result of the storage hand-off for one run.
///
/// `Skipped` means nothing was selected, so the store was never called.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StorageStatus {
    /// Nothing was selected, so nothing was handed off.
    Skipped,
    Stored(StorageOutcome),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreStats {
    pub average: f64,
    pub maximum: f64,
    pub minimum: f64,
}

/// Counts and score spread over a set of curated articles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub total_articles: usize,
    pub by_source: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub by_method: BTreeMap<String, usize>,
    /// Absent when there are no articles.
    pub scores: Option<ScoreStats>,
    pub generated_at: DateTime<Utc>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl RunStats {
    /// Statistics over a set of scored articles.
    ///
    /// # Arguments
    ///
    /// * `articles` - Usually the selected articles of a run
    ///
    /// # Returns
    ///
    /// Counts by source, category and extraction method, plus average, maximum
    /// and minimum final score rounded to two places. `scores` is `None` for an
    /// empty input.
    pub fn from_articles(articles: &[ScoredArticle]) -> Self {
        let mut by_source = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        let mut by_method = BTreeMap::new();
        for s in articles {
            let a = s.article();
            *by_source.entry(a.source.clone()).or_insert(0) += 1;
            *by_category.entry(a.category.clone()).or_insert(0) += 1;
            *by_method.entry(a.extraction_method.to_string()).or_insert(0) += 1;
        }

        let scores = (!articles.is_empty()).then(|| {
            let all = articles.iter().map(ScoredArticle::final_score);
            ScoreStats {
                average: round2(all.clone().sum::<f64>() / articles.len() as f64),
                maximum: round2(all.clone().fold(f64::MIN, f64::max)),
                minimum: round2(all.fold(f64::MAX, f64::min)),
            }
        });

        Self {
            total_articles: articles.len(),
            by_source,
            by_category,
            by_method,
            scores,
            generated_at: Utc::now(),
        }
    }
}

/// Detailed insights for one selected article, keyed by URL.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleInsights {
    pub url: String,
    pub title: String,
    pub insights: DetailedInsights,
}

/// Everything one run produced, partial if it was cancelled.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub sources: Vec<SourceResult>,
    /// Candidates across all sources before title dedup.
    pub collected: usize,
    /// Candidates left after title dedup.
    pub unique: usize,
    /// Articles that received a quality analysis.
    pub curated: usize,
    pub selected: Vec<ScoredArticle>,
    pub insights: Vec<ArticleInsights>,
    pub trends: Vec<Trend>,
    pub trend_summary: String,
    pub storage: StorageStatus,
    pub stats: RunStats,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// The orchestrator for one run.
///
/// Holds borrowed capabilities only, so a test can drive it with in-memory
/// fakes and the binary with the real fetcher, renderer and backend.
pub struct Pipeline<'a, F, R, G> {
    config: &'a PipelineConfig,
    fetcher: &'a F,
    renderer: &'a R,
    generator: &'a G,
    cancel: CancelFlag,
}

impl<'a, F, R, G> Pipeline<'a, F, R, G>
where
    F: DocumentFetcher,
    R: PageRenderer,
    G: TextGenerator,
{
    /// # Arguments
    ///
    /// * `config` - Source table, limits and concurrency
    /// * `fetcher` - Static document fetches, feeds included
    /// * `renderer` - Last-resort headless rendering
    /// * `generator` - Text generation for curation, insights and trends
    pub fn new(config: &'a PipelineConfig, fetcher: &'a F, renderer: &'a R, generator: &'a G) -> Self {
        Self {
            config,
            fetcher,
            renderer,
            generator,
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_cancel(self, cancel: CancelFlag) -> Self {
        Self { cancel, ..self }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn curator(&self) -> Curator<'a, G> {
        Curator::new(self.generator, &self.config.curation)
            .with_workers(self.config.concurrency.llm_workers)
            .with_cancel(self.cancel.clone())
    }

    /// One source: the fetch chain, then enrichment of each candidate.
    ///
    /// The source timeout bounds the chain. Enrichment shares the same
    /// deadline; candidates whose page is still loading when it passes are
    /// kept un-enriched and the result is flagged `timed_out`.
    async fn fetch_source(
        &self,
        chain: &FetchChain<'_, F, R>,
        extractor: &ContentExtractor<'_, F>,
        source: &Source,
    ) -> SourceResult {
        let timeout = self.config.concurrency.source_timeout();
        let deadline = Instant::now() + timeout;

        let ChainOutcome {
            candidates,
            dropped,
            strategies,
        } = match tokio::time::timeout_at(deadline, chain.run(source)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(source = %source.name, timeout_secs = timeout.as_secs(), "Source timed out");
                return SourceResult {
                    timed_out: true,
                    ..SourceResult::empty(source)
                };
            }
        };

        let enriched: Vec<(ArticleCandidate, bool)> = stream::iter(candidates)
            .map(|candidate| async move {
                if self.cancel.is_cancelled() {
                    return (candidate, false);
                }
                let url = candidate.url.clone();
                let fallback = candidate.clone();
                match tokio::time::timeout_at(deadline, extractor.enrich(candidate)).await {
                    Ok(article) => (article, false),
                    Err(_) => {
                        warn!(source = %source.name, %url, "Source time budget spent; keeping candidate un-enriched");
                        (fallback.with_extraction_error("source timeout"), true)
                    }
                }
            })
            .buffered(self.config.concurrency.article_workers.max(1))
            .collect()
            .await;

        let timed_out = enriched.iter().any(|(_, late)| *late);
        let articles: Vec<ArticleCandidate> = enriched.into_iter().map(|(a, _)| a).collect();
        info!(source = %source.name, articles = articles.len(), dropped, timed_out, "Source finished");
        SourceResult {
            article_count: articles.len(),
            articles,
            dropped,
            strategies,
            timed_out,
            success: true,
            ..SourceResult::empty(source)
        }
    }

    /// Run the fetch chain and content extraction for every source.
    ///
    /// Results come back in source order. Sources not started before
    /// cancellation are absent.
    #[instrument(level = "info", skip_all, fields(sources = sources.len()))]
    pub async fn fetch_all_sources(&self, sources: &[Source]) -> Vec<SourceResult> {
        let chain = FetchChain::new(self.fetcher, self.renderer, self.config);
        let extractor = ContentExtractor::new(
            self.fetcher,
            &self.config.limits,
            self.config.http.request_timeout(),
        );

        let mut results: Vec<(usize, SourceResult)> = stream::iter(sources.iter().enumerate())
            .take_while(|_| future::ready(!self.cancel.is_cancelled()))
            .map(|(i, source)| {
                let chain = &chain;
                let extractor = &extractor;
                async move { (i, self.fetch_source(chain, extractor, source).await) }
            })
            .buffer_unordered(self.config.concurrency.source_workers.max(1))
            .collect()
            .await;
        results.sort_by_key(|(i, _)| *i);

        let total: usize = results.iter().map(|(_, r)| r.article_count).sum();
        info!(total, "All sources fetched");
        results.into_iter().map(|(_, r)| r).collect()
    }

    /// Score, rank and keep the best `count` articles.
    pub async fn curate(&self, candidates: Vec<ArticleCandidate>, count: usize) -> Vec<ScoredArticle> {
        let curator = self.curator();
        let scored = curator.curate(candidates).await;
        curator.select_top(scored, count)
    }

    /// Keyword trends over the given articles' titles and summaries.
    pub fn detect_trends(&self, articles: &[ScoredArticle]) -> Vec<Trend> {
        trends::detect_trends(articles.iter().map(ScoredArticle::article), &self.config.trends)
    }

    /// Fetch, curate, analyse and hand off one complete run.
    #[instrument(level = "info", skip_all)]
    pub async fn run<S: ArticleStore>(&self, store: &S) -> RunReport {
        let started_at = Utc::now();
        let sources = self.fetch_all_sources(&self.config.enabled_sources()).await;

        let collected: Vec<ArticleCandidate> =
            sources.iter().flat_map(|r| r.articles.iter().cloned()).collect();
        let collected_count = collected.len();
        let unique = dedup_by_title(collected, self.config.limits.min_dedup_title_chars);
        let unique_count = unique.len();
        info!(collected = collected_count, unique = unique_count, "Aggregated candidates");

        let curator = self.curator();
        let scored = curator.curate(unique).await;
        let curated = scored.len();
        let selected = curator.select_top(scored, self.config.curation.output_count);

        let insights: Vec<ArticleInsights> = stream::iter(selected.iter().take(self.config.curation.insight_count))
            .take_while(|_| future::ready(!self.cancel.is_cancelled()))
            .map(|s| {
                let curator = &curator;
                async move {
                    ArticleInsights {
                        url: s.article().url.clone(),
                        title: s.article().title.clone(),
                        insights: curator.detailed_insights(s.article()).await,
                    }
                }
            })
            .buffered(self.config.concurrency.llm_workers.max(1))
            .collect()
            .await;

        let trends = self.detect_trends(&selected);
        let trend_summary = if self.cancel.is_cancelled() {
            NO_TREND_ANALYSIS.to_string()
        } else {
            curator.summarize_trends(&selected).await
        };

        let storage = if selected.is_empty() {
            StorageStatus::Skipped
        } else {
            let records: Vec<StoredArticle> = selected.iter().map(StoredArticle::from).collect();
            match store.store(&records).await {
                Ok(outcome) => StorageStatus::Stored(outcome),
                Err(e) => {
                    error!(error = %e, "Storing curated articles failed");
                    StorageStatus::Failed { error: e.to_string() }
                }
            }
        };

        let stats = RunStats::from_articles(&selected);
        let cancelled = self.cancel.is_cancelled();
        info!(
            selected = selected.len(),
            trends = trends.len(),
            cancelled,
            "Pipeline run finished"
        );

        RunReport {
            sources,
            collected: collected_count,
            unique: unique_count,
            curated,
            selected,
            insights,
            trends,
            trend_summary,
            storage,
            stats,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::models::{Enrichment, ExtractionMethod, QualityAnalysis};
    use crate::render::NoRenderer;
    use std::sync::atomic::AtomicUsize;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeFetcher(HashMap<String, String>);

    impl DocumentFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>> {
            self.0
                .get(url)
                .map(|s| s.clone().into_bytes())
                .ok_or_else(|| PipelineError::network(url, "HTTP 404"))
        }
    }

    /// Scores articles whose title mentions "GPT" highly, everything else low.
    struct Judge;

    impl TextGenerator for Judge {
        async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String> {
            if prompt.contains("TAKEAWAYS") {
                return Ok("TAKEAWAYS:\n• Bigger models\nEND_ANALYSIS".into());
            }
            if prompt.contains("top 3 trends") {
                return Ok("Trend 1: GPT - everywhere".into());
            }
            if prompt.contains("Title: GPT") {
                Ok("Quality: 9/10\nRelevance: 8/10\nCategory: Research".into())
            } else {
                Ok("Quality: 3/10\nRelevance: 4/10\nCategory: Other".into())
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        fail: bool,
        seen: Mutex<Vec<StoredArticle>>,
    }

    impl ArticleStore for MemoryStore {
        async fn store(&self, articles: &[StoredArticle]) -> Result<StorageOutcome> {
            if self.fail {
                return Err(PipelineError::Storage("index unavailable".into()));
            }
            let mut seen = self.seen.lock().unwrap();
            seen.extend_from_slice(articles);
            Ok(StorageOutcome {
                stored: articles.len(),
                location: "memory".into(),
            })
        }
    }

    fn feed(items: &[(&str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(title, link)| {
                format!("<item><title>{title}</title><link>{link}</link><description>{title} summary</description></item>")
            })
            .collect();
        format!("<rss><channel>{body}</channel></rss>")
    }

    fn source(name: &str) -> Source {
        let mut s = Source::new(name, format!("https://{name}.example/"));
        s.feed_url = Some(format!("https://{name}.example/feed"));
        s
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            sources: vec![source("alpha"), source("beta"), source("down")],
            ..PipelineConfig::default()
        }
    }

    fn fetcher() -> FakeFetcher {
        let mut pages = HashMap::new();
        pages.insert(
            "https://alpha.example/feed".into(),
            feed(&[
                ("GPT agents reach new highs", "https://alpha.example/1"),
                ("Quarterly hardware roundup", "https://alpha.example/2"),
                ("GPT tooling for data teams", "https://alpha.example/3"),
                ("Yet another vendor webinar", "https://alpha.example/4"),
                ("A listing of events this week", "https://alpha.example/5"),
            ]),
        );
        pages.insert(
            "https://beta.example/feed".into(),
            feed(&[
                ("gpt agents reach new highs", "https://beta.example/1"),
                ("Conference travel notes here", "https://beta.example/2"),
                ("Office furniture reviews again", "https://beta.example/3"),
                ("Some unrelated gadget launch", "https://beta.example/4"),
                ("The weekly podcast episode", "https://beta.example/5"),
            ]),
        );
        pages.insert(
            "https://alpha.example/1".into(),
            "<html><body><h1>GPT agents reach new highs</h1><span class=\"byline\">Ada</span><p>Short body.</p></body></html>".into(),
        );
        FakeFetcher(pages)
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let config = config();
        let fetcher = fetcher();
        let store = MemoryStore::default();
        let pipeline = Pipeline::new(&config, &fetcher, &NoRenderer, &Judge);

        let report = pipeline.run(&store).await;

        let names: Vec<_> = report.sources.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "down"]);
        assert_eq!(report.sources[0].article_count, 5);
        assert_eq!(report.sources[2].article_count, 0);
        assert!(!report.sources[2].timed_out);

        assert_eq!(report.collected, 10);
        assert_eq!(report.unique, 9);
        assert_eq!(report.curated, 9);

        let selected: Vec<_> = report.selected.iter().map(|s| s.article().title.as_str()).collect();
        assert_eq!(selected, vec!["GPT agents reach new highs", "GPT tooling for data teams"]);
        assert_eq!(report.selected[0].article().author, "Ada");

        assert_eq!(report.insights.len(), 2);
        assert_eq!(report.insights[0].insights.takeaways, vec!["Bigger models"]);
        assert_eq!(report.trend_summary, "Trend 1: GPT - everywhere");

        assert_eq!(report.trends.len(), 1);
        assert_eq!(report.trends[0].term, "GPT");

        assert_eq!(
            report.storage,
            StorageStatus::Stored(StorageOutcome {
                stored: 2,
                location: "memory".into()
            })
        );
        assert_eq!(store.seen.lock().unwrap()[0].category, "Research");
        assert_eq!(report.stats.total_articles, 2);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_stop_trends() {
        let config = config();
        let fetcher = fetcher();
        let store = MemoryStore {
            fail: true,
            ..MemoryStore::default()
        };
        let pipeline = Pipeline::new(&config, &fetcher, &NoRenderer, &Judge);
        let report = pipeline.run(&store).await;
        assert!(matches!(report.storage, StorageStatus::Failed { .. }));
        assert_eq!(report.trends.len(), 1);
        assert_eq!(report.insights.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_returns_empty_report() {
        let config = config();
        let fetcher = fetcher();
        let store = MemoryStore::default();
        let cancel = CancelFlag::default();
        cancel.cancel();
        let pipeline = Pipeline::new(&config, &fetcher, &NoRenderer, &Judge).with_cancel(cancel);
        let report = pipeline.run(&store).await;
        assert!(report.cancelled);
        assert!(report.sources.is_empty());
        assert!(report.selected.is_empty());
        assert_eq!(report.storage, StorageStatus::Skipped);
        assert_eq!(report.trend_summary, NO_TREND_ANALYSIS);
    }

    #[tokio::test]
    async fn test_slow_article_pages_keep_feed_candidates() {
        /// Serves feeds at once; article pages never finish loading.
        struct SlowPages(FakeFetcher);
        impl DocumentFetcher for SlowPages {
            async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
                if url.ends_with("/feed") {
                    return self.0.fetch(url, timeout).await;
                }
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
        }

        let mut config = config();
        config.sources.truncate(1);
        config.concurrency.source_timeout_secs = 1;
        let fetcher = SlowPages(fetcher());
        let pipeline = Pipeline::new(&config, &fetcher, &NoRenderer, &Judge);

        let results = pipeline.fetch_all_sources(&config.enabled_sources()).await;
        let alpha = &results[0];
        assert!(alpha.timed_out);
        assert!(alpha.success);
        assert_eq!(alpha.article_count, 5);
        assert_eq!(alpha.articles[0].title, "GPT agents reach new highs");
        assert!(alpha.articles.iter().all(|a| !a.content_extracted()));
        assert!(matches!(
            &alpha.articles[1].enrichment,
            Enrichment::Failed { error } if error == "source timeout"
        ));
    }

    /// Returns high scores and raises the cancel flag on the nth call.
    struct CancelAfter {
        after: usize,
        calls: AtomicUsize,
        cancel: CancelFlag,
    }

    impl TextGenerator for CancelAfter {
        async fn generate(&self, _prompt: &str, _temperature: f32) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
                self.cancel.cancel();
            }
            Ok("Quality: 9/10\nRelevance: 9/10\nCategory: Research".into())
        }
    }

    #[tokio::test]
    async fn test_cancel_during_curation_keeps_scored_articles() {
        let mut config = config();
        config.concurrency.llm_workers = 1;
        let fetcher = fetcher();
        let store = MemoryStore::default();
        let cancel = CancelFlag::default();
        let generator = CancelAfter {
            after: 3,
            calls: AtomicUsize::new(0),
            cancel: cancel.clone(),
        };
        let pipeline = Pipeline::new(&config, &fetcher, &NoRenderer, &generator).with_cancel(cancel);

        let report = pipeline.run(&store).await;

        assert!(report.cancelled);
        assert_eq!(report.unique, 9);
        assert_eq!(report.curated, 3);
        assert_eq!(report.selected.len(), 3);
        assert!(report.insights.is_empty());
        assert_eq!(report.trend_summary, NO_TREND_ANALYSIS);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_source_timeout_is_reported() {
        struct Stuck;
        impl DocumentFetcher for Stuck {
            async fn fetch(&self, _url: &str, _timeout: Duration) -> Result<Vec<u8>> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
        }
        let mut config = config();
        config.concurrency.source_timeout_secs = 0;
        let pipeline = Pipeline::new(&config, &Stuck, &NoRenderer, &Judge);
        let results = pipeline.fetch_all_sources(&config.enabled_sources()).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.timed_out && r.article_count == 0));
    }

    #[test]
    fn test_run_stats() {
        let mk = |title: &str, source: &str, method, q, r| {
            let a = ArticleCandidate::new(title, "https://a.example/x", source, method);
            let analysis = QualityAnalysis {
                quality_score: crate::models::Score::clamped(q),
                relevance_score: crate::models::Score::clamped(r),
                ..QualityAnalysis::fallback("AI/ML")
            };
            ScoredArticle::new(a, analysis)
        };
        let articles = vec![
            mk("a", "kdnuggets", ExtractionMethod::Feed, 9, 8),
            mk("b", "kdnuggets", ExtractionMethod::Static, 7, 6),
            mk("c", "ai_news", ExtractionMethod::Feed, 6, 7),
        ];
        let stats = RunStats::from_articles(&articles);
        assert_eq!(stats.total_articles, 3);
        assert_eq!(stats.by_source["kdnuggets"], 2);
        assert_eq!(stats.by_method["feed"], 2);
        assert_eq!(stats.by_category["AI/ML"], 3);
        let scores = stats.scores.unwrap();
        assert_eq!(scores.average, 7.17);
        assert_eq!(scores.maximum, 8.5);
        assert_eq!(scores.minimum, 6.5);

        assert!(RunStats::from_articles(&[]).scores.is_none());
    }
}
