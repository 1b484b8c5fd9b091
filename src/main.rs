//! # News Curator
//!
//! Binary entry point: parse the CLI, load the pipeline config, build the
//! fetcher, renderer and text-generation backend, then run one curation pass
//! and archive the result as JSON.
//!
//! ## Usage
//!
//! ```sh
//! news_curator -j ./json
//! news_curator -j ./json -c sources.yaml --backend awful
//! ```
//!
//! Ctrl-C stops new work from being started; the run still writes whatever
//! it finished.

use clap::Parser;
use news_curator::api::{AwfulJadeGenerator, Backend, OllamaGenerator, RetryGenerator, TextGenerator};
use news_curator::config::PipelineConfig;
use news_curator::error::{PipelineError, Result as PipelineResult};
use news_curator::http::{DocumentFetcher, HttpFetcher};
use news_curator::outputs::json::JsonArchive;
use news_curator::pipeline::{CancelFlag, Pipeline, StorageStatus};
use news_curator::render::PageRenderer;
use news_curator::utils::ensure_writable_dir;
use std::error::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;

use cli::{BackendKind, Cli};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_curator starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::with_default_sources(),
    };
    apply_overrides(&mut config, &args);
    for issue in config.validate() {
        warn!(%issue, "Configuration issue");
    }

    // Early check: fail before any network work if the archive can't be written
    if let Err(e) = ensure_writable_dir(&args.json_output_dir).await {
        error!(
            path = %args.json_output_dir.display(),
            error = %e,
            "JSON output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let fetcher = HttpFetcher::new(&config.http)?;
    let generator = build_backend(&config, args.backend).await?;
    if generator.is_available().await {
        info!(backend = ?args.backend, model = %config.llm.model, "Text generation backend reachable");
    } else {
        warn!(backend = ?args.backend, "Text generation backend unreachable; curation will use fallback scores");
    }

    let cancel = CancelFlag::default();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing with partial results");
            on_interrupt.cancel();
        }
    });

    let archive = JsonArchive::new(&args.json_output_dir);

    #[cfg(feature = "render")]
    let renderer = news_curator::render::ChromeRenderer::new(config.http.browser_idle_timeout());
    #[cfg(not(feature = "render"))]
    let renderer = news_curator::render::NoRenderer;

    let pipeline = Pipeline::new(&config, &fetcher, &renderer, &generator).with_cancel(cancel);
    let outcome = if args.extract_only {
        extract_only(&pipeline, &config, &archive).await
    } else {
        curate(&pipeline, &archive).await
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    outcome.map_err(Into::into)
}

/// CLI flags win over the config file.
fn apply_overrides(config: &mut PipelineConfig, args: &Cli) {
    if let Some(url) = &args.ollama_url {
        config.llm.ollama_url = url.clone();
    }
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    if let Some(template) = &args.template {
        config.llm.template = template.clone();
    }
    if let Some(count) = args.count {
        config.curation.output_count = count;
    }
}

async fn build_backend(config: &PipelineConfig, kind: BackendKind) -> PipelineResult<Backend> {
    let curation = &config.curation;
    let backend = match kind {
        BackendKind::Ollama => Backend::Ollama(RetryGenerator::new(
            OllamaGenerator::new(&config.llm, curation.generation_timeout())?,
            curation.max_retries,
            curation.retry_base_delay(),
        )),
        BackendKind::Awful => Backend::Awful(RetryGenerator::new(
            AwfulJadeGenerator::load(&config.llm.template).await?,
            curation.max_retries,
            curation.retry_base_delay(),
        )),
    };
    Ok(backend)
}

async fn extract_only<F, R, G>(
    pipeline: &Pipeline<'_, F, R, G>,
    config: &PipelineConfig,
    archive: &JsonArchive,
) -> PipelineResult<()>
where
    F: DocumentFetcher,
    R: PageRenderer,
    G: TextGenerator,
{
    let results = pipeline.fetch_all_sources(&config.enabled_sources()).await;
    let articles: usize = results.iter().map(|r| r.article_count).sum();
    let path = archive
        .write_json(&format!("{}_sources", archive.edition()), &results)
        .await?;
    info!(path = %path.display(), sources = results.len(), articles, "Wrote extraction results");
    Ok(())
}

async fn curate<F, R, G>(pipeline: &Pipeline<'_, F, R, G>, archive: &JsonArchive) -> PipelineResult<()>
where
    F: DocumentFetcher,
    R: PageRenderer,
    G: TextGenerator,
{
    let report = pipeline.run(archive).await;
    info!(
        collected = report.collected,
        unique = report.unique,
        curated = report.curated,
        selected = report.selected.len(),
        trends = report.trends.len(),
        cancelled = report.cancelled,
        "Run complete"
    );

    let path = archive
        .write_json(&format!("{}_run", archive.edition()), &report)
        .await?;
    info!(path = %path.display(), "Wrote run report");

    match report.storage {
        StorageStatus::Failed { error } => Err(PipelineError::Storage(error)),
        _ => Ok(()),
    }
}
