//! Keyword trend detection over a curated corpus.

use crate::config::TrendConfig;
use crate::models::{ArticleCandidate, Trend};
use tracing::debug;

/// Count each vocabulary term across all titles and summaries.
///
/// Matching is case-insensitive and counts non-overlapping substring
/// occurrences, so `GPT` also counts inside `ChatGPT`. Terms below
/// `min_count` are dropped; the rest are ordered by count, ties keeping
/// vocabulary order, and cut to `top`.
pub fn detect_trends<'a, I>(articles: I, config: &TrendConfig) -> Vec<Trend>
where
    I: IntoIterator<Item = &'a ArticleCandidate>,
{
    let corpus = articles
        .into_iter()
        .map(|a| format!("{} {}", a.title, a.summary))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let mut trends: Vec<Trend> = config
        .vocabulary
        .iter()
        .filter(|term| !term.trim().is_empty())
        .map(|term| (term, corpus.matches(&term.to_lowercase()).count()))
        .filter(|(_, count)| *count >= config.min_count)
        .map(|(term, count)| Trend {
            term: term.clone(),
            count,
            description: format!("{term} developments (mentioned {count} times)"),
        })
        .collect();

    trends.sort_by(|a, b| b.count.cmp(&a.count));
    trends.truncate(config.top);
    debug!(found = trends.len(), "Detected trends");
    trends
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionMethod;

    fn article(title: &str, summary: &str) -> ArticleCandidate {
        ArticleCandidate::new(title, "https://a.example/x", "a", ExtractionMethod::Feed)
            .with_summary(summary)
    }

    fn descriptions(trends: &[Trend]) -> Vec<&str> {
        trends.iter().map(|t| t.description.as_str()).collect()
    }

    #[test]
    fn test_gpt_three_times_nlp_once() {
        let corpus = [
            article("GPT update ships", "The new GPT release is faster."),
            article("Benchmarks for gpt agents", "An NLP study of tool use."),
        ];
        let trends = detect_trends(&corpus, &TrendConfig::default());
        assert_eq!(descriptions(&trends), vec!["GPT developments (mentioned 3 times)"]);
    }

    #[test]
    fn test_at_most_top_and_min_count() {
        let text = "OpenAI OpenAI OpenAI transformer transformer GPT GPT GPT GPT \
                    deep learning deep learning computer vision computer vision";
        let corpus = [article("Roundup", text)];
        let trends = detect_trends(&corpus, &TrendConfig::default());
        assert_eq!(trends.len(), 3);
        assert!(trends.iter().all(|t| t.count >= 2));
        assert_eq!(trends[0].term, "GPT");
        assert_eq!(trends[1].term, "OpenAI");
        // Tie at 2 resolved by vocabulary order.
        assert_eq!(trends[2].term, "deep learning");
    }

    #[test]
    fn test_empty_corpus() {
        let corpus: Vec<ArticleCandidate> = Vec::new();
        assert!(detect_trends(&corpus, &TrendConfig::default()).is_empty());
    }
}
