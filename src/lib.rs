//! # News Curator
//!
//! Aggregates AI news from sites with inconsistent markup and curates it
//! with a language model.
//!
//! ## Architecture
//!
//! 1. **Fetching**: each source goes through a cascading fetch chain
//!    (feed, static listing, headless render) until enough candidates exist
//! 2. **Extraction**: every candidate page is reduced to body text, author,
//!    date and a short summary by heuristic selector cascades
//! 3. **Dedup**: by URL inside a source, then by normalized title across sources
//! 4. **Curation**: an LLM scores quality and relevance; the best articles get
//!    a detailed insight pass, and keyword trends are counted over the result
//! 5. **Output**: curated records are handed to an [`pipeline::ArticleStore`],
//!    by default the dated JSON archive in [`outputs::json`]
//!
//! [`pipeline::Pipeline`] ties the stages together with bounded concurrency,
//! per-source timeouts and cooperative cancellation.

pub mod api;
pub mod config;
pub mod curator;
pub mod dedup;
pub mod error;
pub mod extractor;
pub mod http;
pub mod models;
pub mod outputs;
pub mod pipeline;
pub mod render;
pub mod scrapers;
pub mod trends;
pub mod utils;
