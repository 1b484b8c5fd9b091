//! Command-line interface definitions for News Curator.
//!
//! Every option can also come from the environment, so the binary runs
//! unchanged from cron or a container.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Which text-generation backend scores the articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Local Ollama server
    Ollama,
    /// OpenAI-compatible API configured through awful_aj
    Awful,
}

/// Command-line arguments for the News Curator application.
///
/// # Examples
///
/// ```sh
/// # Defaults: built-in sources, local Ollama
/// news_curator -j ./json
///
/// # Custom sources and model
/// news_curator -j ./json -c sources.yaml --model qwen2.5:7b
///
/// # Any OpenAI-compatible API through awful_aj
/// news_curator -j ./json --backend awful --template news_curator
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Output directory for the dated JSON archive
    #[arg(short, long, env = "NEWS_CURATOR_JSON_DIR", default_value = "./json")]
    pub json_output_dir: PathBuf,

    /// Optional path to a pipeline config YAML file
    #[arg(short, long, env = "NEWS_CURATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Text-generation backend
    #[arg(long, value_enum, default_value_t = BackendKind::Ollama)]
    pub backend: BackendKind,

    /// Ollama base URL, overrides the config file
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Model name, overrides the config file
    #[arg(long, env = "OLLAMA_MODEL")]
    pub model: Option<String>,

    /// awful_aj chat template name, overrides the config file
    #[arg(long)]
    pub template: Option<String>,

    /// Number of curated articles to keep, overrides the config file
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Fetch and extract only; skip curation and write the per-source results
    #[arg(long)]
    pub extract_only: bool,
}
