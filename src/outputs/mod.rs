//! Output sinks for curated articles.
//!
//! - [`json`]: dated JSON archive, the default [`ArticleStore`](crate::pipeline::ArticleStore)

pub mod json;
