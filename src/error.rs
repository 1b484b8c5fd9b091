//! Error taxonomy for the acquisition and curation pipeline.
//!
//! Every remote interaction in this crate can fail, and almost every failure
//! is recoverable: a failed strategy hands over to the next one, a failed
//! extraction keeps the original candidate, a failed generation call yields a
//! fallback record. [`PipelineError`] carries enough context for logging and
//! [`ErrorKind`] lets callers branch on the category without matching on
//! message text.

use thiserror::Error;

/// Coarse failure category, used for logging and counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Timeout, non-2xx status, DNS or connection failure.
    Network,
    /// Malformed document, feed or selector.
    Parse,
    /// Text-generation backend unavailable or reply unusable.
    Generation,
    /// A record is missing a required field.
    Validation,
    /// The downstream article store rejected the hand-off.
    Storage,
    /// Invalid configuration; the only non-recoverable kind.
    Config,
}

/// Every failure the pipeline can observe.
///
/// Only `Config` is fatal; the rest are recorded and the run moves on.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("network failure for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("parse failure: {0}")]
    Parse(String),

    #[error("generation failure: {0}")]
    Generation(String),

    #[error("validation failure: {0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Network failure for `url` with a human-readable reason.
    pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Generation(_) => ErrorKind::Generation,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether the pipeline may carry on after this error.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::Config
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        Self::Network {
            url,
            reason: e.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_is_fatal() {
        assert!(PipelineError::network("https://a.example", "timeout").is_recoverable());
        assert!(PipelineError::Parse("bad xml".into()).is_recoverable());
        assert!(PipelineError::Generation("down".into()).is_recoverable());
        assert!(PipelineError::Storage("disk full".into()).is_recoverable());
        assert!(!PipelineError::Config("no sources".into()).is_recoverable());
    }

    #[test]
    fn test_network_display_includes_url() {
        let e = PipelineError::network("https://a.example/x", "HTTP 503");
        assert_eq!(e.kind(), ErrorKind::Network);
        assert_eq!(
            e.to_string(),
            "network failure for https://a.example/x: HTTP 503"
        );
    }
}
