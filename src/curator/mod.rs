//! LLM-assisted curation.
//!
//! [`Curator`] scores every candidate through a [`TextGenerator`], ranks the
//! results and selects the best, then runs a richer insight pass over the top
//! few. Generation is never allowed to fail the run: an error, a timeout, an
//! empty reply or a reply with no recognisable fields all degrade to the
//! deterministic fallback records in [`quality`] and [`insights`].

pub mod insights;
pub mod quality;

use crate::api::TextGenerator;
use crate::config::CurationConfig;
use crate::error::{PipelineError, Result};
use crate::models::{ArticleCandidate, DetailedInsights, QualityAnalysis, ScoredArticle};
use crate::pipeline::CancelFlag;
use crate::utils::truncate_for_log;
use futures::future;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

const TREND_SAMPLE: usize = 10;
/// Narrative used when the trend prompt fails or the run was cancelled.
pub const NO_TREND_ANALYSIS: &str = "Unable to analyze trends";

/// Scores, ranks and annotates articles through a [`TextGenerator`].
///
/// Borrows the generator and config for the length of a run; cloning is
/// never needed.
pub struct Curator<'a, G> {
    generator: &'a G,
    config: &'a CurationConfig,
    workers: usize,
    cancel: CancelFlag,
}

impl<'a, G: TextGenerator> Curator<'a, G> {
    /// # Arguments
    ///
    /// * `generator` - Backend every prompt is sent to
    /// * `config` - Thresholds, temperatures and the per-call timeout
    ///
    /// # Returns
    ///
    /// A curator with a single worker and its own, never-raised cancel flag.
    pub fn new(generator: &'a G, config: &'a CurationConfig) -> Self {
        Self {
            generator,
            config,
            workers: 1,
            cancel: CancelFlag::default(),
        }
    }

    /// Number of generation calls in flight at once.
    pub fn with_workers(self, workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            ..self
        }
    }

    /// Share a run-wide cancel flag.
    pub fn with_cancel(self, cancel: CancelFlag) -> Self {
        Self { cancel, ..self }
    }

    /// One bounded generation call. Empty replies count as failures.
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let timeout = self.config.generation_timeout();
        match tokio::time::timeout(timeout, self.generator.generate(prompt, temperature)).await {
            Ok(Ok(reply)) if reply.trim().is_empty() => {
                Err(PipelineError::Generation("empty reply".into()))
            }
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PipelineError::Generation(format!(
                "no reply within {}s",
                timeout.as_secs()
            ))),
        }
    }

    /// Quality analysis for one article; the fallback record on any failure.
    #[instrument(level = "debug", skip_all, fields(url = %article.url))]
    pub async fn analyze(&self, article: &ArticleCandidate) -> QualityAnalysis {
        let prompt = quality::build_prompt(article);
        match self.generate(&prompt, self.config.quality_temperature).await {
            Ok(reply) => {
                debug!(reply = %truncate_for_log(&reply, 200), "Quality reply");
                quality::parse_reply(&reply, &self.config.default_category)
            }
            Err(e) => {
                warn!(error = %e, "Quality analysis failed; using fallback scores");
                QualityAnalysis::fallback(&self.config.default_category)
            }
        }
    }

    /// Score every article and sort by final score, highest first.
    ///
    /// The sort is stable, so equal scores keep their input order. Once the
    /// cancel flag is raised no further articles are scored; whatever was
    /// scored already is returned.
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    pub async fn curate(&self, articles: Vec<ArticleCandidate>) -> Vec<ScoredArticle> {
        let total = articles.len();
        let mut scored: Vec<ScoredArticle> = stream::iter(articles)
            .take_while(|_| future::ready(!self.cancel.is_cancelled()))
            .map(|article| async move {
                let analysis = self.analyze(&article).await;
                ScoredArticle::new(article, analysis)
            })
            .buffered(self.workers)
            .collect()
            .await;

        scored.sort_by(|a, b| b.final_score().total_cmp(&a.final_score()));
        let fallbacks = scored.iter().filter(|s| !s.analysis().llm_analysis).count();
        info!(total, scored = scored.len(), fallbacks, "Curation finished");
        scored
    }

    /// Keep articles at or above the minimum final score, at most `count` of them.
    pub fn select_top(&self, curated: Vec<ScoredArticle>, count: usize) -> Vec<ScoredArticle> {
        let considered = curated.len();
        let selected: Vec<_> = curated
            .into_iter()
            .filter(|s| s.final_score() >= self.config.min_final_score)
            .take(count)
            .collect();
        info!(considered, selected = selected.len(), "Selected high-quality articles");
        selected
    }

    /// Takeaways, business impact, technical details and action items for one article.
    ///
    /// # Returns
    ///
    /// The parsed reply, or [`DetailedInsights::fallback`] built from the title
    /// when generation fails.
    #[instrument(level = "debug", skip_all, fields(url = %article.url))]
    pub async fn detailed_insights(&self, article: &ArticleCandidate) -> DetailedInsights {
        let prompt = insights::build_prompt(article, self.config.max_prompt_body_chars);
        match self.generate(&prompt, self.config.insight_temperature).await {
            Ok(reply) => insights::parse_reply(&reply),
            Err(e) => {
                warn!(error = %e, "Insight generation failed; using templated insights");
                DetailedInsights::fallback(&article.title)
            }
        }
    }

    /// A free-text narrative of the themes across the first ten articles.
    pub async fn summarize_trends(&self, articles: &[ScoredArticle]) -> String {
        if articles.is_empty() {
            return "No articles to analyze".to_string();
        }
        let listing = articles
            .iter()
            .take(TREND_SAMPLE)
            .enumerate()
            .map(|(i, s)| format!("{}. {} - {}", i + 1, s.article().title, s.article().summary))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Analyze these AI news articles and identify the top 3 trends or themes:\n\
             \n\
             {listing}\n\
             \n\
             Provide the top 3 trends, a brief explanation of each, and which articles support it.\n\
             \n\
             Format as:\n\
             Trend 1: [Trend name] - [Brief explanation]\n\
             Trend 2: [Trend name] - [Brief explanation]\n\
             Trend 3: [Trend name] - [Brief explanation]\n"
        );
        match self.generate(&prompt, self.config.trend_temperature).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Trend narrative failed");
                NO_TREND_ANALYSIS.to_string()
            }
        }
    }
}
