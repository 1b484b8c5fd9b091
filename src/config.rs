//! Pipeline configuration.
//!
//! Everything the pipeline treats as a tuning decision lives here: the source
//! table, HTTP politeness settings, the selector cascades, every length and
//! count threshold, concurrency limits and curation parameters. The file
//! format is YAML; each section has serde defaults, so a partial file only
//! overrides what it names.
//!
//! ```yaml
//! sources:
//!   - name: kdnuggets
//!     url: https://www.kdnuggets.com/
//!     feed_url: https://www.kdnuggets.com/feed
//! concurrency:
//!   source_workers: 2
//! curation:
//!   min_final_score: 6.5
//! ```

use crate::error::{PipelineError, Result};
use crate::models::Source;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Complete pipeline configuration.
///
/// Every section falls back to its `Default`, so `PipelineConfig::default()`
/// is a runnable config apart from its empty source table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sources: Vec<Source>,
    pub http: HttpConfig,
    pub limits: Limits,
    pub concurrency: ConcurrencyConfig,
    pub listing: ListingProfile,
    pub render: RenderProfile,
    pub curation: CurationConfig,
    pub llm: LlmConfig,
    pub trends: TrendConfig,
}

impl PipelineConfig {
    /// Load a YAML config file. An empty file yields the defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.as_ref().display())))?;
        let mut config: PipelineConfig = if raw.trim().is_empty() {
            PipelineConfig::default()
        } else {
            serde_yaml::from_str(&raw)?
        };
        if config.sources.is_empty() {
            config.sources = default_sources();
        }
        info!(sources = config.sources.len(), "Loaded pipeline configuration");
        Ok(config)
    }

    /// Config with the built-in source table.
    pub fn with_default_sources() -> Self {
        Self {
            sources: default_sources(),
            ..Self::default()
        }
    }

    /// Sources with `enabled: true`, in table order.
    pub fn enabled_sources(&self) -> Vec<Source> {
        self.sources.iter().filter(|s| s.enabled).cloned().collect()
    }

    /// Problems that would make a run pointless. Empty means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.enabled_sources().is_empty() {
            issues.push("No news sources are enabled".to_string());
        }
        if self.llm.model.trim().is_empty() {
            issues.push("LLM model not specified".to_string());
        }
        if self.concurrency.source_workers == 0
            || self.concurrency.article_workers == 0
            || self.concurrency.llm_workers == 0
        {
            issues.push("Concurrency limits must be at least 1".to_string());
        }
        if self.http.max_per_host == 0 {
            issues.push("http.max_per_host must be at least 1".to_string());
        }
        if self.listing.groups.is_empty() {
            issues.push("Listing selector cascade is empty".to_string());
        }
        issues
    }
}

fn default_sources() -> Vec<Source> {
    vec![
        Source {
            name: "kdnuggets".into(),
            url: "https://www.kdnuggets.com/".into(),
            enabled: true,
            feed_url: Some("https://www.kdnuggets.com/feed".into()),
            listing: None,
        },
        Source {
            name: "ai_news".into(),
            url: "https://artificialintelligence-news.com/".into(),
            enabled: true,
            feed_url: None,
            listing: None,
        },
        Source {
            name: "the_new_stack".into(),
            url: "https://thenewstack.io/ai/".into(),
            enabled: true,
            feed_url: Some("https://thenewstack.io/blog/ai/feed/".into()),
            listing: None,
        },
    ]
}

/// HTTP client identity and politeness settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub headers: BTreeMap<String, String>,
    pub request_timeout_secs: u64,
    /// Minimum gap between two requests to the same host.
    pub min_delay_ms: u64,
    /// Concurrent in-flight requests allowed per host.
    pub max_per_host: usize,
    pub render_timeout_secs: u64,
    /// How long the headless browser may sit unused before Chrome drops it.
    pub browser_idle_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let headers = [
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
            ("Accept-Language", "en-US,en;q=0.9"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers,
            request_timeout_secs: 20,
            min_delay_ms: 1000,
            max_per_host: 2,
            render_timeout_secs: 30,
            browser_idle_secs: 600,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn browser_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_idle_secs)
    }
}

/// Length and count thresholds used throughout acquisition and extraction.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Limits {
    /// Candidates needed before the fetch chain stops trying strategies.
    pub sufficient_candidates: usize,
    pub feed_cap: usize,
    pub listing_cap: usize,
    /// Body text a content container must exceed to be accepted.
    pub min_body_chars: usize,
    /// Block elements shorter than this are ignored by the second extraction tier.
    pub min_block_chars: usize,
    pub min_title_chars: usize,
    pub min_sentence_chars: usize,
    pub min_sentence_words: usize,
    pub summary_sentences: usize,
    pub max_summary_chars: usize,
    /// Titles at or below this length are never title-deduplicated.
    pub min_dedup_title_chars: usize,
    pub max_stored_body_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            sufficient_candidates: 5,
            feed_cap: 15,
            listing_cap: 15,
            min_body_chars: 200,
            min_block_chars: 50,
            min_title_chars: 10,
            min_sentence_chars: 30,
            min_sentence_words: 5,
            summary_sentences: 3,
            max_summary_chars: 300,
            min_dedup_title_chars: 15,
            max_stored_body_chars: 2000,
        }
    }
}

/// Worker pool sizes and the per-source time budget.
///
/// Generation is kept at one worker by default: a local inference server
/// has no admission control.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub source_workers: usize,
    pub article_workers: usize,
    pub llm_workers: usize,
    /// Upper bound on the whole fetch chain for one source.
    pub source_timeout_secs: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            source_workers: 3,
            article_workers: 2,
            llm_workers: 1,
            source_timeout_secs: 300,
        }
    }
}

impl ConcurrencyConfig {
    /// Budget for one source: the fetch chain plus content enrichment.
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}

/// One step of the listing selector cascade.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SelectorGroup {
    pub name: String,
    pub selectors: Vec<String>,
    /// Link text must be strictly longer than this.
    #[serde(default = "default_min_link_text")]
    pub min_text_chars: usize,
    /// Only accept links on the same host as the listing page.
    #[serde(default)]
    pub same_host_only: bool,
}

fn default_min_link_text() -> usize {
    15
}

/// Data-driven selector cascade for the static listing strategy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListingProfile {
    pub groups: Vec<SelectorGroup>,
    /// Lower-cased URL fragments that mark non-article links.
    pub exclude: Vec<String>,
}

impl Default for ListingProfile {
    fn default() -> Self {
        let group = |name: &str, selectors: &[&str], same_host_only: bool| SelectorGroup {
            name: name.to_string(),
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            min_text_chars: default_min_link_text(),
            same_host_only,
        };
        Self {
            groups: vec![
                group(
                    "article-containers",
                    &[
                        "article a[href]",
                        ".post-title a[href]",
                        ".entry-title a[href]",
                        ".story-title a[href]",
                        ".news-item a[href]",
                    ],
                    false,
                ),
                group("heading-anchors", &["h2 a[href]", "h3 a[href]"], false),
                group(
                    "link-patterns",
                    &[
                        "a[href*=\"/news/\"]",
                        "a[href*=\"/article/\"]",
                        "a[href*=\"/2025/\"]",
                        "a[href*=\"/2024/\"]",
                    ],
                    false,
                ),
                group("same-host-links", &["a[href]"], true),
            ],
            exclude: [
                "/category",
                "/categories/",
                "/tag/",
                "/tags/",
                "/about",
                "/contact",
                "javascript:",
                "#",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Generic selector set applied to headless-rendered listing pages.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderProfile {
    pub wait_selector: String,
    pub containers: Vec<String>,
    pub titles: Vec<String>,
    pub summaries: Vec<String>,
    pub max_containers: usize,
    pub min_title_chars: usize,
    pub min_summary_chars: usize,
}

impl Default for RenderProfile {
    fn default() -> Self {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            wait_selector: "article, .post, .entry, main".to_string(),
            containers: owned(&[
                "article",
                ".post",
                ".entry",
                ".news-item",
                ".story-item",
                "div[class*=\"post\"]",
                "div[class*=\"article\"]",
            ]),
            titles: owned(&["h1", "h2", "h3", ".title", ".headline"]),
            summaries: owned(&[".excerpt", ".summary", "p"]),
            max_containers: 20,
            min_title_chars: 10,
            min_summary_chars: 20,
        }
    }
}

/// Selection thresholds, sampling temperatures and retry policy for curation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CurationConfig {
    pub min_final_score: f64,
    pub output_count: usize,
    /// How many of the top-ranked articles get the detailed insight pass.
    pub insight_count: usize,
    pub default_category: String,
    pub quality_temperature: f32,
    pub insight_temperature: f32,
    pub trend_temperature: f32,
    pub generation_timeout_secs: u64,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    /// Article text sent to the insight prompt is cut to this many characters.
    pub max_prompt_body_chars: usize,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            min_final_score: 6.0,
            output_count: 15,
            insight_count: 5,
            default_category: "AI/ML".to_string(),
            quality_temperature: 0.1,
            insight_temperature: 0.3,
            trend_temperature: 0.2,
            generation_timeout_secs: 120,
            max_retries: 0,
            retry_base_delay_ms: 1000,
            max_prompt_body_chars: 2000,
        }
    }
}

impl CurationConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Text-generation backend settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub ollama_url: String,
    pub model: String,
    pub num_predict: u32,
    /// awful_aj chat template name, used by the `awful` backend.
    pub template: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            num_predict: 1000,
            template: "news_curator".to_string(),
        }
    }
}

/// Keyword vocabulary and cut-offs for [`detect_trends`](crate::trends::detect_trends).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrendConfig {
    pub vocabulary: Vec<String>,
    pub min_count: usize,
    pub top: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            vocabulary: [
                "GPT",
                "LLM",
                "Large Language Model",
                "ChatGPT",
                "OpenAI",
                "machine learning",
                "deep learning",
                "neural network",
                "transformer",
                "AI model",
                "artificial intelligence",
                "computer vision",
                "natural language processing",
                "NLP",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            min_count: 2,
            top: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
sources:
  - name: example
    url: https://example.com/
concurrency:
  source_workers: 1
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert!(config.sources[0].enabled);
        assert_eq!(config.sources[0].feed_url, None);
        assert_eq!(config.concurrency.source_workers, 1);
        assert_eq!(config.concurrency.article_workers, 2);
        assert_eq!(config.limits.sufficient_candidates, 5);
        assert_eq!(config.curation.min_final_score, 6.0);
        assert_eq!(config.listing.groups.len(), 4);
    }

    #[test]
    fn test_enabled_sources_filters_disabled() {
        let mut config = PipelineConfig::with_default_sources();
        config.sources[1].enabled = false;
        let names: Vec<_> = config
            .enabled_sources()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["kdnuggets", "the_new_stack"]);
    }

    #[test]
    fn test_validate_reports_issues() {
        assert!(PipelineConfig::with_default_sources().validate().is_empty());

        let mut config = PipelineConfig::default();
        config.llm.model = " ".into();
        config.concurrency.llm_workers = 0;
        let issues = config.validate();
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().any(|i| i.contains("No news sources")));
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!(
            "news_curator_empty_{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "").unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.http.min_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = PipelineConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(!err.is_recoverable());
    }
}
