//! Text-generation backends with exponential backoff retry logic.
//!
//! The curator only needs one capability: send a prompt at a temperature and
//! get free text back. That contract is [`TextGenerator`]. Two backends
//! implement it:
//!
//! - [`OllamaGenerator`]: a local Ollama server's `/api/generate` endpoint
//! - [`AwfulJadeGenerator`]: any OpenAI-compatible API through `awful_aj`,
//!   using the same `config.yaml` and chat templates as the `aj` CLI
//!
//! [`RetryGenerator`] decorates either one with retries, and [`Backend`]
//! picks between them at runtime.
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```
//!
//! Local inference servers have no admission control, so the default is zero
//! retries; a failed call becomes a fallback record in the curator instead.

use crate::config::LlmConfig;
use crate::error::{PipelineError, Result};
use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, config_dir, template::ChatTemplate};
use rand::{rng, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Something that turns a prompt into free text.
pub trait TextGenerator {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String>;

    /// Cheap reachability probe. Backends without one report `true`.
    async fn is_available(&self) -> bool {
        true
    }
}

/// Adds exponential backoff retries to any [`TextGenerator`].
pub struct RetryGenerator<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: TextGenerator> RetryGenerator<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryGenerator")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: TextGenerator> TextGenerator for RetryGenerator<T> {
    #[instrument(level = "debug", skip_all)]
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.generate(prompt, temperature).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        if self.max_retries > 0 {
                            error!(
                                attempt,
                                max = self.max_retries,
                                elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                                error = %e,
                                "generate() exhausted retries"
                            );
                        }
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                        ?delay,
                        error = %e,
                        "generate() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn is_available(&self) -> bool {
        self.inner.is_available().await
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaReply {
    #[serde(default)]
    response: String,
}

/// Ollama `/api/generate`, non-streaming.
#[derive(Debug)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    num_predict: u32,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("ollama client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            num_predict: config.num_predict,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str, temperature: f32) -> OllamaRequest<'a> {
        OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature,
                num_predict: self.num_predict,
            },
        }
    }
}

impl TextGenerator for OllamaGenerator {
    #[instrument(level = "debug", skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let t0 = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&self.request(prompt, temperature))
            .send()
            .await
            .map_err(|e| PipelineError::Generation(format!("ollama unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Generation(format!(
                "ollama returned HTTP {}",
                status.as_u16()
            )));
        }
        let reply: OllamaReply = response
            .json()
            .await
            .map_err(|e| PipelineError::Generation(format!("ollama reply: {e}")))?;
        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, chars = reply.response.len(), "Ollama replied");
        Ok(reply.response.trim().to_string())
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                warn!(%url, error = %e, "Ollama health check failed");
                false
            }
        }
    }
}

/// Any OpenAI-compatible endpoint through `awful_aj`.
///
/// Sampling parameters come from the `awful_aj` config, so the per-call
/// temperature is not forwarded.
pub struct AwfulJadeGenerator {
    config: AwfulJadeConfig,
    template: ChatTemplate,
}

impl fmt::Debug for AwfulJadeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwfulJadeGenerator").finish_non_exhaustive()
    }
}

impl AwfulJadeGenerator {
    pub fn new(config: AwfulJadeConfig, template: ChatTemplate) -> Self {
        Self { config, template }
    }

    /// Load `config.yaml` from the `awful_aj` config dir and the named template.
    #[instrument(level = "info")]
    pub async fn load(template_name: &str) -> Result<Self> {
        let template = awful_aj::template::load_template(template_name)
            .await
            .map_err(|e| PipelineError::Config(format!("template {template_name}: {e}")))?;
        let conf_file = config_dir()
            .map_err(|e| PipelineError::Config(format!("awful_aj config dir: {e}")))?
            .join("config.yaml");
        let config_path = conf_file
            .to_str()
            .ok_or_else(|| PipelineError::Config("awful_aj config path is not UTF-8".into()))?;
        let config = awful_aj::config::load_config(config_path)
            .map_err(|e| PipelineError::Config(format!("{config_path}: {e}")))?;
        info!(config_path, template = template_name, "Loaded awful_aj backend");
        Ok(Self::new(config, template))
    }
}

impl TextGenerator for AwfulJadeGenerator {
    #[instrument(level = "debug", skip_all)]
    async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String> {
        let t0 = Instant::now();
        let res = ask(&self.config, prompt.to_string(), &self.template, None, None).await;
        match res {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "API call failed");
                Err(PipelineError::Generation(e.to_string()))
            }
        }
    }
}

/// Runtime choice of backend.
#[derive(Debug)]
pub enum Backend {
    Ollama(RetryGenerator<OllamaGenerator>),
    Awful(RetryGenerator<AwfulJadeGenerator>),
}

impl TextGenerator for Backend {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        match self {
            Self::Ollama(g) => g.generate(prompt, temperature).await,
            Self::Awful(g) => g.generate(prompt, temperature).await,
        }
    }

    async fn is_available(&self) -> bool {
        match self {
            Self::Ollama(g) => g.is_available().await,
            Self::Awful(g) => g.is_available().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    impl TextGenerator for Flaky {
        async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(PipelineError::Generation("connection refused".into()))
            } else {
                Ok(format!("echo: {prompt}"))
            }
        }
    }

    fn flaky(failures: usize) -> Flaky {
        Flaky {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let api = RetryGenerator::new(flaky(2), 3, Duration::from_millis(1));
        assert_eq!(api.generate("hi", 0.1).await.unwrap(), "echo: hi");
        assert_eq!(api.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let api = RetryGenerator::new(flaky(usize::MAX), 1, Duration::from_millis(1));
        let err = api.generate("hi", 0.1).await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
        assert_eq!(api.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_is_single_attempt() {
        let api = RetryGenerator::new(flaky(1), 0, Duration::from_millis(1));
        assert!(api.generate("hi", 0.1).await.is_err());
        assert_eq!(api.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let api = RetryGenerator::new(flaky(0), 40, Duration::from_secs(1));
        let d = api.backoff(30);
        assert!(d >= Duration::from_secs(30));
        assert!(d <= Duration::from_millis(30_250));
    }

    #[test]
    fn test_ollama_payload_shape() {
        let generator = OllamaGenerator::new(&LlmConfig::default(), Duration::from_secs(5)).unwrap();
        let body = serde_json::to_value(generator.request("Rate this", 0.5)).unwrap();
        assert_eq!(body["model"], "llama3.1:8b");
        assert_eq!(body["prompt"], "Rate this");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.5);
        assert_eq!(body["options"]["num_predict"], 1000);
    }
}
