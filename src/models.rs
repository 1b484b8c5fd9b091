//! Data models for candidates, extracted content and curated articles.
//!
//! This module defines the records that flow through the pipeline:
//! - [`Source`]: one configured site
//! - [`ArticleCandidate`]: an article reference discovered by the fetch chain,
//!   optionally enriched with full text by the content extractor
//! - [`ExtractedContent`]: the result of running the extractor on one URL
//! - [`ScoredArticle`]: a candidate plus its [`QualityAnalysis`]
//! - [`DetailedInsights`], [`Trend`], [`SourceResult`] and [`StoredArticle`]
//!
//! Records are transformed by value: every stage takes a record and returns a
//! new one instead of patching shared maps in place.

use crate::config::ListingProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A site the pipeline pulls articles from.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Source {
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// RSS or Atom feed for the site, tried before any HTML scraping.
    #[serde(default)]
    pub feed_url: Option<String>,
    /// Per-site selector cascade overriding the global listing profile.
    #[serde(default)]
    pub listing: Option<ListingProfile>,
}

fn default_enabled() -> bool {
    true
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
            feed_url: None,
            listing: None,
        }
    }
}

/// Which list-fetch strategy discovered a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Feed,
    Static,
    Rendered,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Static => "static",
            Self::Rendered => "rendered",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the full-text pass for one candidate.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Enrichment {
    #[default]
    Pending,
    Extracted,
    /// The URL looked like a listing page and was not fetched.
    Skipped,
    Failed {
        error: String,
    },
}

/// A discovered article reference.
///
/// `title` and `url` are required for a candidate to survive validation;
/// `url` is the deduplication key within a run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArticleCandidate {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub source: String,
    pub category: String,
    pub extraction_method: ExtractionMethod,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub enrichment: Enrichment,
}

impl ArticleCandidate {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
        extraction_method: ExtractionMethod,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            summary: String::new(),
            source: source.into(),
            category: "AI/ML".to_string(),
            extraction_method,
            extracted_at: Utc::now(),
            body: String::new(),
            author: String::new(),
            date: String::new(),
            word_count: 0,
            enrichment: Enrichment::Pending,
        }
    }

    /// Candidate with `summary` replaced.
    pub fn with_summary(self, summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..self
        }
    }

    pub fn with_date(self, date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            ..self
        }
    }

    /// Non-empty title and an absolute http(s) URL.
    pub fn is_valid(&self) -> bool {
        if self.title.trim().is_empty() {
            return false;
        }
        url::Url::parse(&self.url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false)
    }

    /// Merge a successful extraction. The candidate's own title wins unless empty.
    pub fn with_content(self, content: &ExtractedContent, max_body_chars: usize) -> Self {
        let title = if self.title.trim().is_empty() {
            content.title.clone()
        } else {
            self.title
        };
        Self {
            title,
            summary: content.summary.clone(),
            body: content.body.chars().take(max_body_chars).collect(),
            author: content.author.clone(),
            date: if content.date.is_empty() {
                self.date
            } else {
                content.date.clone()
            },
            word_count: content.word_count,
            enrichment: Enrichment::Extracted,
            ..self
        }
    }

    /// Keep every original field, only record why extraction failed.
    pub fn with_extraction_error(self, error: impl Into<String>) -> Self {
        Self {
            enrichment: Enrichment::Failed {
                error: error.into(),
            },
            ..self
        }
    }

    pub fn skipped(self) -> Self {
        Self {
            enrichment: Enrichment::Skipped,
            ..self
        }
    }

    /// Whether the full-text pass succeeded for this candidate.
    pub fn content_extracted(&self) -> bool {
        self.enrichment == Enrichment::Extracted
    }
}

/// Result of the heuristic extractor for one document.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ExtractedContent {
    pub title: String,
    pub body: String,
    pub author: String,
    pub date: String,
    pub summary: String,
    pub word_count: usize,
    pub success: bool,
    pub error: Option<String>,
}

impl ExtractedContent {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// An integer score in `[1, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;
    pub const NEUTRAL: Score = Score(5);

    /// Clamp any integer into `[1, 10]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use news_curator::models::Score;
    /// assert_eq!(Score::clamped(-3).value(), 1);
    /// assert_eq!(Score::clamped(42).value(), 10);
    /// ```
    pub fn clamped(raw: i64) -> Self {
        Score(raw.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// What the curator learned about one article.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QualityAnalysis {
    pub quality_score: Score,
    pub relevance_score: Score,
    pub category: String,
    pub insights: Vec<String>,
    pub reason: String,
    /// False when the record is a fallback rather than a parsed reply.
    pub llm_analysis: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// A candidate with its quality analysis. `final_score` is always derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredArticle {
    #[serde(flatten)]
    article: ArticleCandidate,
    analysis: QualityAnalysis,
    final_score: f64,
}

impl ScoredArticle {
    /// Pair a candidate with its analysis.
    ///
    /// The article's category is taken from the analysis so downstream records
    /// carry the curated category.
    pub fn new(mut article: ArticleCandidate, analysis: QualityAnalysis) -> Self {
        let final_score = (f64::from(analysis.quality_score.value())
            + f64::from(analysis.relevance_score.value()))
            / 2.0;
        article.category = analysis.category.clone();
        Self {
            article,
            analysis,
            final_score,
        }
    }

    pub fn article(&self) -> &ArticleCandidate {
        &self.article
    }

    pub fn analysis(&self) -> &QualityAnalysis {
        &self.analysis
    }

    /// Mean of quality and relevance, in `[1.0, 10.0]`.
    pub fn final_score(&self) -> f64 {
        self.final_score
    }

    pub fn into_parts(self) -> (ArticleCandidate, QualityAnalysis) {
        (self.article, self.analysis)
    }
}

/// Output of the secondary, section-based insight pass.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct DetailedInsights {
    pub takeaways: Vec<String>,
    pub business_impact: String,
    pub technical_details: String,
    pub action_items: Vec<String>,
    pub raw_response: String,
}

/// A keyword that recurs across the curated corpus.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Trend {
    pub term: String,
    pub count: usize,
    pub description: String,
}

/// Everything one source produced in a run.
#[derive(Debug, Clone, Serialize)]
pub struct SourceResult {
    pub source: String,
    pub url: String,
    pub articles: Vec<ArticleCandidate>,
    pub article_count: usize,
    /// Candidates discarded for missing title or unusable URL.
    pub dropped: usize,
    /// Candidate count contributed by each strategy that ran, in order.
    pub strategies: Vec<(ExtractionMethod, usize)>,
    pub timed_out: bool,
    pub extracted_at: DateTime<Utc>,
    pub success: bool,
}

impl SourceResult {
    pub fn empty(source: &Source) -> Self {
        Self {
            source: source.name.clone(),
            url: source.url.clone(),
            articles: Vec::new(),
            article_count: 0,
            dropped: 0,
            strategies: Vec::new(),
            timed_out: false,
            extracted_at: Utc::now(),
            success: false,
        }
    }
}

/// The record shape handed to downstream storage and search.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoredArticle {
    pub title: String,
    pub summary: String,
    pub source: String,
    pub author: String,
    pub date: String,
    pub url: String,
    pub category: String,
}

impl From<&ScoredArticle> for StoredArticle {
    fn from(scored: &ScoredArticle) -> Self {
        let a = scored.article();
        Self {
            title: a.title.clone(),
            summary: a.summary.clone(),
            source: a.source.clone(),
            author: a.author.clone(),
            date: a.date.clone(),
            url: a.url.clone(),
            category: scored.analysis().category.clone(),
        }
    }
}
